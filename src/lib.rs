use axum::{
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch, post},
    Router,
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use std::time::Duration;
use tower_governor::{governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod auth;
pub mod batch;
pub mod config;
pub mod db;
pub mod entities;
pub mod error;
pub mod integrations;
pub mod metrics;
pub mod recruitment;
pub mod routes;

use config::Config;

/// Shared by every handler; cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub config: Arc<Config>,
    pub http_client: reqwest::Client,
}

impl AppState {
    pub fn new(db: DatabaseConnection, config: Config) -> Self {
        AppState {
            db,
            config: Arc::new(config),
            http_client: reqwest::Client::new(),
        }
    }
}

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = String)
    )
)]
async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "Service is healthy")
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "TeamDesk API",
        version = "0.1.0",
        description = "Consultant staffing, utilization tracking and recruitment"
    ),
    paths(
        health_check,
        routes::register,
        routes::session,
        routes::get_organization,
        routes::update_organization,
        routes::get_levels,
        routes::update_levels,
        routes::list_admins,
        routes::add_admin,
        routes::remove_admin,
        routes::get_onboarding,
        routes::update_onboarding,
        routes::list_consultants,
        routes::create_consultant,
        routes::get_consultant,
        routes::update_consultant,
        routes::delete_consultant,
        routes::list_projects,
        routes::create_project,
        routes::get_project,
        routes::update_project,
        routes::delete_project,
        routes::assign_consultant,
        routes::unassign_consultant,
        routes::update_assignment,
        routes::update_chance_to_close,
        routes::get_project_financials,
        routes::get_utilization,
        routes::get_forecast,
        routes::get_ranking,
        routes::get_financial,
        routes::get_bench,
        routes::batch_upload,
        routes::get_available_slots,
        routes::connect_calendar,
        routes::calendar_status,
        routes::disconnect_calendar,
        routes::monitor_email_responses,
        routes::list_jobs,
        routes::create_job,
        routes::get_job,
        routes::update_job,
        routes::delete_job,
        routes::get_public_job,
        routes::apply,
        routes::update_candidate,
        routes::shortlist,
        routes::auto_shortlist,
        routes::submit_feedback,
        routes::contact_job_candidates,
        routes::sap_import,
        routes::screen_job_candidates,
        routes::generate_job_description
    ),
    components(schemas(
        entities::organization::Model,
        entities::user::Model,
        entities::consultant::Model,
        entities::project::Model,
        entities::job::Model,
        entities::job::Candidate,
        error::ValidationIssue,
        metrics::UtilizationMode,
        routes::RegisterRequest,
        routes::RegisterResponse,
        routes::SessionResponse,
        routes::UpdateOrganization,
        routes::LevelsPayload,
        routes::NewAdmin,
        routes::NewAdminResponse,
        routes::OnboardingUpdate,
        routes::OnboardingProgress,
        routes::NewConsultant,
        routes::UpdateConsultant,
        routes::DeletedResponse,
        routes::NewProject,
        routes::UpdateProject,
        routes::AssignmentRequest,
        routes::UnassignRequest,
        routes::ChanceToCloseRequest,
        routes::SuccessResponse,
        routes::RankingResponse,
        routes::ForecastResponse,
        routes::BatchUploadResponse,
        routes::SlotsResponse,
        routes::ConnectCalendar,
        routes::CalendarStatus,
        routes::MonitorResponse,
        routes::JobSummary,
        routes::NewJob,
        routes::UpdateJob,
        routes::PublicJob,
        routes::Application,
        routes::ApplicationResponse,
        routes::CandidateUpdate,
        routes::CandidateResponse,
        routes::ShortlistRequest,
        routes::ShortlistResponse,
        routes::FeedbackRequest,
        routes::ContactCandidatesRequest,
        routes::ContactCandidatesResponse,
        recruitment::outreach::SchedulingMethod,
        routes::SapImportRequest,
        routes::SapPreview,
        routes::SapImportResponse,
        routes::SapImportResult,
        integrations::sap::SapConnection,
        batch::ConsultantRow,
        batch::ProjectRow,
        routes::ScreeningResponse,
        routes::GenerateJdRequest,
        routes::GenerateJdResponse
    ))
)]
pub struct ApiDoc;

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/api/auth/register", post(routes::register))
        .route("/api/auth/session", get(routes::session))
        .route(
            "/api/organization",
            get(routes::get_organization).patch(routes::update_organization),
        )
        .route(
            "/api/organization/levels",
            get(routes::get_levels).put(routes::update_levels),
        )
        .route(
            "/api/organization/admins",
            get(routes::list_admins).post(routes::add_admin),
        )
        .route("/api/organization/admins/{id}", axum::routing::delete(routes::remove_admin))
        .route(
            "/api/user/onboarding",
            get(routes::get_onboarding).patch(routes::update_onboarding),
        )
        .route(
            "/api/workforce",
            get(routes::list_consultants).post(routes::create_consultant),
        )
        .route(
            "/api/workforce/{id}",
            get(routes::get_consultant)
                .patch(routes::update_consultant)
                .delete(routes::delete_consultant),
        )
        .route("/api/projects", get(routes::list_projects).post(routes::create_project))
        .route(
            "/api/projects/{id}",
            get(routes::get_project)
                .patch(routes::update_project)
                .delete(routes::delete_project),
        )
        .route("/api/projects/{id}/assign", post(routes::assign_consultant))
        .route("/api/projects/{id}/unassign", post(routes::unassign_consultant))
        .route("/api/projects/{id}/update-assignment", patch(routes::update_assignment))
        .route("/api/projects/{id}/chance-to-close", patch(routes::update_chance_to_close))
        .route("/api/projects/{id}/financials", get(routes::get_project_financials))
        .route("/api/metrics/utilization", get(routes::get_utilization))
        .route("/api/metrics/forecast", get(routes::get_forecast))
        .route("/api/metrics/ranking", get(routes::get_ranking))
        .route("/api/metrics/financial", get(routes::get_financial))
        .route("/api/bench", get(routes::get_bench))
        .route("/api/batch-upload", post(routes::batch_upload))
        .route("/api/integrations/sap/import", post(routes::sap_import))
        .route("/api/calendar/available-slots", get(routes::get_available_slots))
        .route("/api/calendar/connect", post(routes::connect_calendar))
        .route("/api/calendar/status", get(routes::calendar_status))
        .route("/api/calendar/disconnect", axum::routing::delete(routes::disconnect_calendar))
        .route("/api/email/monitor-responses", post(routes::monitor_email_responses))
        .route("/api/recruitment/jobs", get(routes::list_jobs).post(routes::create_job))
        .route(
            "/api/recruitment/jobs/{id}",
            get(routes::get_job).patch(routes::update_job).delete(routes::delete_job),
        )
        .route("/api/recruitment/jobs/public/{link}", get(routes::get_public_job))
        .route("/api/recruitment/apply", post(routes::apply))
        .route("/api/recruitment/jobs/{id}/update-candidate", post(routes::update_candidate))
        .route("/api/recruitment/jobs/{id}/shortlist", post(routes::shortlist))
        .route("/api/recruitment/jobs/{id}/auto-shortlist", post(routes::auto_shortlist))
        .route("/api/recruitment/jobs/{id}/feedback", post(routes::submit_feedback))
        .route(
            "/api/recruitment/jobs/{id}/contact-candidates",
            post(routes::contact_job_candidates),
        )
        .route(
            "/api/recruitment/jobs/{id}/screen-candidates-alt",
            post(routes::screen_job_candidates),
        )
        .route("/api/recruitment/generate-jd", post(routes::generate_job_description))
}

/// Create the application with all routes and middleware
pub fn create_app(state: AppState) -> Router {
    let mut api = api_routes();

    // Rate limiting keys on the client IP, so the server must be started with
    // `into_make_service_with_connect_info::<SocketAddr>()`.
    let per_minute = state.config.rate_limit_per_minute;
    if per_minute > 0 {
        let governor_conf = GovernorConfigBuilder::default()
            .key_extractor(SmartIpKeyExtractor)
            .period(Duration::from_millis(60_000 / u64::from(per_minute)))
            .burst_size(per_minute)
            .finish();
        match governor_conf {
            Some(config) => {
                api = api.layer(GovernorLayer { config: Arc::new(config) });
            }
            None => tracing::warn!("Invalid rate limit {}, limiter disabled", per_minute),
        }
    }

    Router::new()
        .route("/health", get(health_check))
        .merge(api)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
