use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, ModelTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::entities::organization::{self, ConsultantLevel, ConsultantLevels, PlanType};
use crate::entities::{consultant, job, project, user, Consultant, Job, Project, User};
use crate::error::AppError;
use crate::AppState;

const FREE_PLAN_ADMINS: u64 = 1;
const PREMIUM_PLAN_ADMINS: u64 = 5;

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOrganization {
    pub name: Option<String>,
    pub description: Option<String>,
    pub perks: Option<String>,
    pub plan_type: Option<PlanType>,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct LevelsPayload {
    pub levels: Vec<ConsultantLevel>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewAdmin {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AdminsResponse {
    pub admins: Vec<user::Model>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct NewAdminResponse {
    pub message: String,
    pub admin: user::Model,
    /// API token for the new admin; shown once
    pub token: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingUpdate {
    pub tutorial_dismissed: bool,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingProgress {
    pub settings_configured: bool,
    pub has_consultants: bool,
    pub has_projects: bool,
    pub has_jobs: bool,
    pub tutorial_dismissed: bool,
}

#[utoipa::path(
    get,
    path = "/api/organization",
    responses((status = 200, description = "Caller's organization", body = organization::Model))
)]
pub async fn get_organization(auth: AuthUser) -> Json<organization::Model> {
    Json(auth.organization)
}

#[utoipa::path(
    patch,
    path = "/api/organization",
    request_body = UpdateOrganization,
    responses((status = 200, description = "Updated organization", body = organization::Model))
)]
#[tracing::instrument(skip(state, auth, payload), fields(organization_id = %auth.organization.id))]
pub async fn update_organization(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<UpdateOrganization>,
) -> Result<Json<organization::Model>, AppError> {
    if payload.plan_type.is_some() {
        auth.require_admin()?;
    }

    let mut active = auth.organization.into_active_model();
    if let Some(name) = payload.name {
        if name.trim().is_empty() {
            return Err(AppError::InvalidRequest("Organization name cannot be empty".to_string()));
        }
        active.name = Set(name.trim().to_string());
    }
    if let Some(description) = payload.description {
        active.description = Set(description);
    }
    if let Some(perks) = payload.perks {
        active.perks = Set(perks);
    }
    if let Some(plan_type) = payload.plan_type {
        active.plan_type = Set(plan_type);
    }
    active.updated_at = Set(Utc::now());
    Ok(Json(active.update(&state.db).await?))
}

#[utoipa::path(
    get,
    path = "/api/organization/levels",
    responses((status = 200, description = "Active levels, most junior first", body = LevelsPayload))
)]
pub async fn get_levels(auth: AuthUser) -> Json<LevelsPayload> {
    Json(LevelsPayload { levels: auth.organization.consultant_levels.active_sorted() })
}

pub fn validate_levels(levels: &[ConsultantLevel]) -> Result<(), AppError> {
    if levels.is_empty() {
        return Err(AppError::InvalidRequest("At least one level is required".to_string()));
    }
    if levels.iter().any(|l| l.id.trim().is_empty() || l.name.trim().is_empty()) {
        return Err(AppError::InvalidRequest("Invalid level format".to_string()));
    }
    let mut ids: Vec<String> = levels.iter().map(|l| l.id.to_lowercase()).collect();
    ids.sort();
    ids.dedup();
    if ids.len() != levels.len() {
        return Err(AppError::InvalidRequest("Level ids must be unique".to_string()));
    }
    Ok(())
}

#[utoipa::path(
    put,
    path = "/api/organization/levels",
    request_body = LevelsPayload,
    responses(
        (status = 200, description = "Levels replaced", body = LevelsPayload),
        (status = 400, description = "Empty or malformed level list")
    )
)]
#[tracing::instrument(skip(state, auth, payload), fields(organization_id = %auth.organization.id))]
pub async fn update_levels(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<LevelsPayload>,
) -> Result<Json<LevelsPayload>, AppError> {
    validate_levels(&payload.levels)?;

    let mut active = auth.organization.into_active_model();
    active.consultant_levels = Set(ConsultantLevels(payload.levels));
    active.updated_at = Set(Utc::now());
    let updated = active.update(&state.db).await?;

    Ok(Json(LevelsPayload { levels: updated.consultant_levels.active_sorted() }))
}

#[utoipa::path(
    get,
    path = "/api/organization/admins",
    responses((status = 200, description = "Admins of the organization, oldest first", body = AdminsResponse))
)]
pub async fn list_admins(State(state): State<AppState>, auth: AuthUser) -> Result<Json<AdminsResponse>, AppError> {
    let admins = User::find()
        .filter(user::Column::OrganizationId.eq(auth.organization_id()))
        .filter(user::Column::IsAdmin.eq(true))
        .order_by_asc(user::Column::CreatedAt)
        .all(&state.db)
        .await?;
    Ok(Json(AdminsResponse { admins }))
}

#[utoipa::path(
    post,
    path = "/api/organization/admins",
    request_body = NewAdmin,
    responses(
        (status = 201, description = "Admin added", body = NewAdminResponse),
        (status = 400, description = "Missing fields or duplicate email"),
        (status = 403, description = "Caller is not an admin, or the plan's admin limit is reached")
    )
)]
#[tracing::instrument(skip(state, auth, payload), fields(organization_id = %auth.organization.id))]
pub async fn add_admin(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<NewAdmin>,
) -> Result<impl IntoResponse, AppError> {
    auth.require_admin()?;

    let admin_count = User::find()
        .filter(user::Column::OrganizationId.eq(auth.organization_id()))
        .filter(user::Column::IsAdmin.eq(true))
        .count(&state.db)
        .await?;
    let limit = match auth.organization.plan_type {
        PlanType::Free => FREE_PLAN_ADMINS,
        PlanType::Premium => PREMIUM_PLAN_ADMINS,
    };
    if admin_count >= limit {
        return Err(AppError::Forbidden(match auth.organization.plan_type {
            PlanType::Free => "Free plan is limited to 1 admin. Please upgrade to premium for up to 5 admins.".to_string(),
            PlanType::Premium => format!("Premium plan is limited to {} admins.", PREMIUM_PLAN_ADMINS),
        }));
    }

    let email = payload.email.trim().to_lowercase();
    if payload.name.trim().is_empty() || !email.contains('@') {
        return Err(AppError::InvalidRequest("Name and email are required".to_string()));
    }
    let taken = User::find()
        .filter(user::Column::Email.eq(email.as_str()))
        .count(&state.db)
        .await?;
    if taken > 0 {
        return Err(AppError::InvalidRequest("A user with this email already exists".to_string()));
    }

    let now = Utc::now();
    let admin = user::ActiveModel {
        id: Set(Uuid::new_v4()),
        organization_id: Set(auth.organization_id()),
        name: Set(payload.name.trim().to_string()),
        email: Set(email),
        api_token: Set(Uuid::new_v4().to_string()),
        is_admin: Set(true),
        calendar_credentials: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(&state.db)
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(NewAdminResponse {
            message: "Admin added successfully".to_string(),
            token: admin.api_token.clone(),
            admin,
        }),
    ))
}

#[utoipa::path(
    delete,
    path = "/api/organization/admins/{id}",
    params(("id" = Uuid, Path, description = "Admin user id")),
    responses(
        (status = 200, description = "Admin removed"),
        (status = 400, description = "Last admin or self-removal"),
        (status = 404, description = "No such admin")
    )
)]
#[tracing::instrument(skip(state, auth), fields(organization_id = %auth.organization.id))]
pub async fn remove_admin(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    auth.require_admin()?;

    let admin_count = User::find()
        .filter(user::Column::OrganizationId.eq(auth.organization_id()))
        .filter(user::Column::IsAdmin.eq(true))
        .count(&state.db)
        .await?;
    if admin_count <= 1 {
        return Err(AppError::InvalidRequest(
            "Cannot remove the last admin from the organization".to_string(),
        ));
    }
    if id == auth.user.id {
        return Err(AppError::InvalidRequest("You cannot remove yourself as an admin".to_string()));
    }

    let admin = User::find_by_id(id)
        .filter(user::Column::OrganizationId.eq(auth.organization_id()))
        .filter(user::Column::IsAdmin.eq(true))
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Admin".to_string()))?;
    admin.delete(&state.db).await?;

    Ok(Json(serde_json::json!({ "message": "Admin removed successfully" })))
}

/// Recomputes the onboarding checklist from the organization's data.
#[utoipa::path(
    get,
    path = "/api/user/onboarding",
    responses((status = 200, description = "Onboarding checklist", body = OnboardingProgress))
)]
pub async fn get_onboarding(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<OnboardingProgress>, AppError> {
    let org_id = auth.organization_id();
    let (consultants, projects, jobs) = tokio::try_join!(
        Consultant::find().filter(consultant::Column::OrganizationId.eq(org_id)).count(&state.db),
        Project::find().filter(project::Column::OrganizationId.eq(org_id)).count(&state.db),
        Job::find().filter(job::Column::OrganizationId.eq(org_id)).count(&state.db),
    )?;

    let organization = auth.organization;
    Ok(Json(OnboardingProgress {
        settings_configured: !organization.description.trim().is_empty()
            && !organization.consultant_levels.0.is_empty(),
        has_consultants: consultants > 0,
        has_projects: projects > 0,
        has_jobs: jobs > 0,
        tutorial_dismissed: organization.onboarding.tutorial_dismissed,
    }))
}

#[utoipa::path(
    patch,
    path = "/api/user/onboarding",
    request_body = OnboardingUpdate,
    responses((status = 200, description = "Updated onboarding flags", body = organization::Onboarding))
)]
pub async fn update_onboarding(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<OnboardingUpdate>,
) -> Result<Json<organization::Onboarding>, AppError> {
    let mut onboarding = auth.organization.onboarding.clone();
    onboarding.tutorial_dismissed = payload.tutorial_dismissed;

    let mut active = auth.organization.into_active_model();
    active.onboarding = Set(onboarding);
    active.updated_at = Set(Utc::now());
    let updated = active.update(&state.db).await?;
    Ok(Json(updated.onboarding))
}

/// Flips onboarding flags after a write elsewhere. A no-op when nothing changes.
pub(crate) async fn mark_onboarding(
    db: &DatabaseConnection,
    organization: &organization::Model,
    update: impl FnOnce(&mut organization::Onboarding),
) -> Result<(), AppError> {
    let mut onboarding = organization.onboarding.clone();
    update(&mut onboarding);
    if onboarding == organization.onboarding {
        return Ok(());
    }
    let mut active = organization.clone().into_active_model();
    active.onboarding = Set(onboarding);
    active.updated_at = Set(Utc::now());
    active.update(db).await?;
    Ok(())
}
