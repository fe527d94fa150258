use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, ModelTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::entities::job::{
    self, Candidate, CandidateStatus, Candidates, FeedbackDecision, InterviewFeedback, InterviewRound,
    InterviewRounds, JobStatus,
};
use crate::entities::Job;
use crate::error::AppError;
use crate::integrations::google::GoogleClient;
use crate::integrations::llm::LlmClient;
use crate::recruitment::monitor::access_token_for;
use crate::recruitment::outreach::{contact_candidates, Invitation, SchedulingMethod};
use crate::recruitment::public_link_for;
use crate::recruitment::screening::screen_candidates;
use crate::routes::organization::mark_onboarding;
use crate::routes::workforce::DeletedResponse;
use crate::AppState;

const DEFAULT_SHORTLIST_COUNT: i32 = 5;

const JD_SYSTEM_PROMPT: &str = "You are an expert recruiter who creates professional job descriptions. \
Based on the user's input, create a comprehensive job description with the following sections:\n\
1. Job Title\n2. About the Company\n3. Job Overview\n4. Responsibilities\n5. Requirements\n\
6. Preferred Qualifications\n7. Benefits and Perks\n\n\
Format the output in a clean, professional way with appropriate headings and bullet points. \
Do not include any explanations or notes outside of the job description itself.";

#[derive(Debug, Deserialize, IntoParams)]
pub struct JobsQuery {
    /// Only jobs in this status
    pub status: Option<JobStatus>,
}

#[derive(Debug, Default, Serialize, ToSchema)]
pub struct CandidateCounts {
    pub total: usize,
    pub new: usize,
    pub shortlisted: usize,
    pub interviewing: usize,
    pub rejected: usize,
    pub offered: usize,
    pub hired: usize,
}

impl CandidateCounts {
    pub fn of(candidates: &[Candidate]) -> Self {
        let mut counts = CandidateCounts { total: candidates.len(), ..Default::default() };
        for c in candidates {
            let slot = match c.status {
                CandidateStatus::New => &mut counts.new,
                CandidateStatus::Shortlisted => &mut counts.shortlisted,
                CandidateStatus::Interviewing => &mut counts.interviewing,
                CandidateStatus::Rejected => &mut counts.rejected,
                CandidateStatus::Offered => &mut counts.offered,
                CandidateStatus::Hired => &mut counts.hired,
            };
            *slot += 1;
        }
        counts
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    #[serde(flatten)]
    pub job: job::Model,
    pub candidate_counts: CandidateCounts,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewJob {
    pub title: String,
    #[serde(default)]
    pub department: String,
    #[serde(default)]
    pub location: String,
    pub job_description: String,
    pub salary_min: Option<f64>,
    pub salary_max: Option<f64>,
    #[serde(default)]
    pub visa_sponsorship: bool,
    pub shortlist_count: Option<i32>,
    pub additional_instructions: Option<String>,
    #[serde(default)]
    pub interview_rounds: Vec<InterviewRound>,
    pub status: Option<JobStatus>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateJob {
    pub title: Option<String>,
    pub department: Option<String>,
    pub location: Option<String>,
    pub job_description: Option<String>,
    pub salary_min: Option<f64>,
    pub salary_max: Option<f64>,
    pub visa_sponsorship: Option<bool>,
    pub shortlist_count: Option<i32>,
    pub additional_instructions: Option<String>,
    pub interview_rounds: Option<Vec<InterviewRound>>,
    pub status: Option<JobStatus>,
}

/// What applicants see. Candidates and internal settings stay private.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PublicJob {
    pub id: String,
    pub title: String,
    pub department: String,
    pub location: String,
    pub description: String,
    pub salary_range: String,
    pub visa_sponsorship: bool,
    pub organization_id: Uuid,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    /// Public link slug of the job
    pub job_link: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub cover_letter: Option<String>,
    pub resume_url: Option<String>,
    pub salary_expectation: Option<f64>,
    pub visa_required: Option<bool>,
    pub available_from: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationResponse {
    pub success: bool,
    pub candidate_id: Uuid,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CandidateUpdate {
    pub candidate_id: Uuid,
    /// Fields to overwrite; anything omitted keeps its value
    #[schema(value_type = Object)]
    pub updated_candidate: Value,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CandidateResponse {
    pub success: bool,
    pub candidate: Candidate,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ShortlistRequest {
    #[serde(default)]
    pub candidate_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ShortlistResponse {
    pub success: bool,
    pub shortlisted_count: usize,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContactCandidatesRequest {
    #[serde(default)]
    pub candidate_ids: Vec<Uuid>,
    /// Email body; `{{candidate_name}}` and `{{scheduling_details}}` are filled in
    #[serde(default)]
    pub email_template: String,
    #[serde(default)]
    pub scheduling_details: String,
    #[serde(default)]
    pub scheduling_method: SchedulingMethod,
    pub calendly_link: Option<String>,
    pub available_dates: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContactCandidatesResponse {
    pub success: bool,
    pub sent_count: usize,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRequest {
    pub candidate_id: Uuid,
    pub round_index: i32,
    pub interviewer_email: String,
    pub decision: FeedbackDecision,
    #[serde(default)]
    pub comments: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScreeningResponse {
    pub success: bool,
    pub screened_count: usize,
    pub message: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct GenerateJdRequest {
    pub input: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct GenerateJdResponse {
    pub description: String,
}

async fn find_job(db: &DatabaseConnection, organization_id: Uuid, id: Uuid) -> Result<job::Model, AppError> {
    Job::find_by_id(id)
        .filter(job::Column::OrganizationId.eq(organization_id))
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Job".to_string()))
}

async fn save_candidates(db: &DatabaseConnection, job: job::Model) -> Result<job::Model, AppError> {
    let candidates = job.candidates.clone();
    let mut active = job.into_active_model();
    active.candidates = Set(candidates);
    active.updated_at = Set(Utc::now());
    Ok(active.update(db).await?)
}

fn check_salary_range(min: Option<f64>, max: Option<f64>) -> Result<(), AppError> {
    if let (Some(min), Some(max)) = (min, max) {
        if min > max {
            return Err(AppError::InvalidRequest(
                "Minimum salary cannot exceed maximum salary".to_string(),
            ));
        }
    }
    Ok(())
}

fn check_shortlist_count(count: i32) -> Result<i32, AppError> {
    if count < 1 {
        return Err(AppError::InvalidRequest("Shortlist count must be at least 1".to_string()));
    }
    Ok(count)
}

/// "$1,234" style amount.
fn dollars(amount: f64) -> String {
    let whole = amount.round() as i64;
    let digits = whole.unsigned_abs().to_string();
    let mut grouped = String::new();
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    let sign = if whole < 0 { "-" } else { "" };
    format!("{}${}", sign, grouped)
}

pub fn salary_range(min: Option<f64>, max: Option<f64>) -> String {
    match (min, max) {
        (Some(min), Some(max)) if min > 0.0 && max > 0.0 => format!("{} - {}", dollars(min), dollars(max)),
        _ => "Competitive".to_string(),
    }
}

/// Overlays the provided JSON fields on a candidate. The id never changes.
pub fn merge_candidate(candidate: &Candidate, patch: &Value) -> Result<Candidate, AppError> {
    let Value::Object(fields) = patch else {
        return Err(AppError::InvalidRequest("updatedCandidate must be an object".to_string()));
    };
    let mut merged = serde_json::to_value(candidate)?;
    if let Value::Object(target) = &mut merged {
        for (key, value) in fields {
            if key != "id" {
                target.insert(key.clone(), value.clone());
            }
        }
    }
    let mut updated: Candidate = serde_json::from_value(merged).map_err(|e| AppError::InvalidRequestDetails {
        error: "Invalid candidate fields".to_string(),
        details: e.to_string(),
    })?;
    updated.id = candidate.id;
    Ok(updated)
}

/// Ids of the top `count` New candidates by score; unscored ones rank last.
pub fn auto_shortlist_ids(candidates: &[Candidate], count: usize) -> Vec<Uuid> {
    let mut fresh: Vec<&Candidate> = candidates.iter().filter(|c| c.status == CandidateStatus::New).collect();
    fresh.sort_by_key(|c| std::cmp::Reverse(c.score.unwrap_or(0)));
    fresh.into_iter().take(count).map(|c| c.id).collect()
}

#[utoipa::path(
    get,
    path = "/api/recruitment/jobs",
    params(JobsQuery),
    responses((status = 200, description = "Jobs, newest first, with candidate counts per status", body = [JobSummary]))
)]
pub async fn list_jobs(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<JobsQuery>,
) -> Result<Json<Vec<JobSummary>>, AppError> {
    let mut select = Job::find().filter(job::Column::OrganizationId.eq(auth.organization_id()));
    if let Some(status) = query.status {
        select = select.filter(job::Column::Status.eq(status));
    }
    let jobs = select.order_by_desc(job::Column::CreatedAt).all(&state.db).await?;

    Ok(Json(
        jobs.into_iter()
            .map(|job| JobSummary {
                candidate_counts: CandidateCounts::of(&job.candidates.0),
                job,
            })
            .collect(),
    ))
}

#[utoipa::path(
    post,
    path = "/api/recruitment/jobs",
    request_body = NewJob,
    responses(
        (status = 201, description = "Job created with a public link", body = job::Model),
        (status = 400, description = "Missing title or description, or bad salary range")
    )
)]
#[tracing::instrument(skip(state, auth, payload), fields(organization_id = %auth.organization.id))]
pub async fn create_job(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<NewJob>,
) -> Result<impl IntoResponse, AppError> {
    if payload.title.trim().is_empty() || payload.job_description.trim().is_empty() {
        return Err(AppError::InvalidRequest("Title and job description are required".to_string()));
    }
    check_salary_range(payload.salary_min, payload.salary_max)?;
    let shortlist_count = check_shortlist_count(payload.shortlist_count.unwrap_or(DEFAULT_SHORTLIST_COUNT))?;

    let now = Utc::now();
    let created = job::ActiveModel {
        id: Set(Uuid::new_v4()),
        organization_id: Set(auth.organization_id()),
        created_by: Set(auth.user.id),
        title: Set(payload.title.trim().to_string()),
        department: Set(payload.department),
        location: Set(payload.location),
        job_description: Set(payload.job_description),
        salary_min: Set(payload.salary_min),
        salary_max: Set(payload.salary_max),
        visa_sponsorship: Set(payload.visa_sponsorship),
        shortlist_count: Set(shortlist_count),
        additional_instructions: Set(payload.additional_instructions.filter(|s| !s.trim().is_empty())),
        interview_rounds: Set(InterviewRounds(payload.interview_rounds)),
        public_link: Set(public_link_for(&payload.title)),
        status: Set(payload.status.unwrap_or(JobStatus::Published)),
        candidates: Set(Candidates::default()),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(&state.db)
    .await?;

    tracing::info!(job_id = %created.id, public_link = %created.public_link, "Job created");
    mark_onboarding(&state.db, &auth.organization, |o| o.has_jobs = true).await?;

    Ok((StatusCode::CREATED, Json(created)))
}

#[utoipa::path(
    get,
    path = "/api/recruitment/jobs/{id}",
    params(("id" = Uuid, Path, description = "Job id")),
    responses(
        (status = 200, description = "The job with its candidates", body = job::Model),
        (status = 404, description = "No such job in the organization")
    )
)]
pub async fn get_job(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<job::Model>, AppError> {
    Ok(Json(find_job(&state.db, auth.organization_id(), id).await?))
}

#[utoipa::path(
    patch,
    path = "/api/recruitment/jobs/{id}",
    params(("id" = Uuid, Path, description = "Job id")),
    request_body = UpdateJob,
    responses(
        (status = 200, description = "Updated job", body = job::Model),
        (status = 404, description = "No such job in the organization")
    )
)]
#[tracing::instrument(skip(state, auth, payload), fields(organization_id = %auth.organization.id))]
pub async fn update_job(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateJob>,
) -> Result<Json<job::Model>, AppError> {
    let existing = find_job(&state.db, auth.organization_id(), id).await?;
    check_salary_range(
        payload.salary_min.or(existing.salary_min),
        payload.salary_max.or(existing.salary_max),
    )?;

    let mut active = existing.into_active_model();
    if let Some(title) = payload.title {
        if title.trim().is_empty() {
            return Err(AppError::InvalidRequest("Title cannot be empty".to_string()));
        }
        active.title = Set(title.trim().to_string());
    }
    if let Some(department) = payload.department {
        active.department = Set(department);
    }
    if let Some(location) = payload.location {
        active.location = Set(location);
    }
    if let Some(description) = payload.job_description {
        active.job_description = Set(description);
    }
    if let Some(min) = payload.salary_min {
        active.salary_min = Set(Some(min));
    }
    if let Some(max) = payload.salary_max {
        active.salary_max = Set(Some(max));
    }
    if let Some(visa) = payload.visa_sponsorship {
        active.visa_sponsorship = Set(visa);
    }
    if let Some(count) = payload.shortlist_count {
        active.shortlist_count = Set(check_shortlist_count(count)?);
    }
    if let Some(instructions) = payload.additional_instructions {
        active.additional_instructions = Set(Some(instructions).filter(|s| !s.trim().is_empty()));
    }
    if let Some(rounds) = payload.interview_rounds {
        active.interview_rounds = Set(InterviewRounds(rounds));
    }
    if let Some(status) = payload.status {
        active.status = Set(status);
    }
    active.updated_at = Set(Utc::now());
    Ok(Json(active.update(&state.db).await?))
}

#[utoipa::path(
    delete,
    path = "/api/recruitment/jobs/{id}",
    params(("id" = Uuid, Path, description = "Job id")),
    responses(
        (status = 200, description = "Job and its candidates deleted", body = DeletedResponse),
        (status = 404, description = "No such job in the organization")
    )
)]
#[tracing::instrument(skip(state, auth), fields(organization_id = %auth.organization.id))]
pub async fn delete_job(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<DeletedResponse>, AppError> {
    let existing = find_job(&state.db, auth.organization_id(), id).await?;
    existing.delete(&state.db).await?;
    tracing::info!(job_id = %id, "Job deleted");
    Ok(Json(DeletedResponse {
        message: "Job deleted successfully".to_string(),
        id,
    }))
}

async fn published_job(db: &DatabaseConnection, link: &str) -> Result<job::Model, AppError> {
    Job::find()
        .filter(job::Column::PublicLink.eq(link))
        .filter(job::Column::Status.eq(JobStatus::Published))
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Job".to_string()))
}

#[utoipa::path(
    get,
    path = "/api/recruitment/jobs/public/{link}",
    params(("link" = String, Path, description = "Public link slug")),
    responses(
        (status = 200, description = "Published job, without candidates", body = PublicJob),
        (status = 404, description = "Unknown link or job not published")
    )
)]
pub async fn get_public_job(
    State(state): State<AppState>,
    Path(link): Path<String>,
) -> Result<Json<PublicJob>, AppError> {
    let job = published_job(&state.db, &link).await?;
    Ok(Json(PublicJob {
        id: link,
        title: job.title,
        department: job.department,
        location: job.location,
        description: job.job_description,
        salary_range: salary_range(job.salary_min, job.salary_max),
        visa_sponsorship: job.visa_sponsorship,
        organization_id: job.organization_id,
    }))
}

#[utoipa::path(
    post,
    path = "/api/recruitment/apply",
    request_body = Application,
    responses(
        (status = 201, description = "Application recorded", body = ApplicationResponse),
        (status = 400, description = "Missing required fields"),
        (status = 404, description = "Unknown link or job not published")
    )
)]
#[tracing::instrument(skip(state, payload), fields(job_link = %payload.job_link))]
pub async fn apply(
    State(state): State<AppState>,
    Json(payload): Json<Application>,
) -> Result<impl IntoResponse, AppError> {
    let email = payload.email.trim().to_lowercase();
    if payload.name.trim().is_empty() || !email.contains('@') {
        return Err(AppError::InvalidRequest("Missing required fields".to_string()));
    }
    let mut job = published_job(&state.db, &payload.job_link).await?;

    let candidate = Candidate {
        id: Uuid::new_v4(),
        name: payload.name.trim().to_string(),
        email,
        phone: payload.phone,
        cover_letter: payload.cover_letter,
        resume_url: payload.resume_url.filter(|u| !u.trim().is_empty()),
        status: CandidateStatus::New,
        salary_expectation: payload.salary_expectation,
        visa_required: payload.visa_required,
        available_from: payload.available_from,
        applied_at: Some(Utc::now()),
        ..Default::default()
    };
    let candidate_id = candidate.id;
    job.candidates.0.push(candidate);
    let job = save_candidates(&state.db, job).await?;
    tracing::info!(job_id = %job.id, %candidate_id, "Application received");

    Ok((
        StatusCode::CREATED,
        Json(ApplicationResponse { success: true, candidate_id }),
    ))
}

#[utoipa::path(
    post,
    path = "/api/recruitment/jobs/{id}/update-candidate",
    params(("id" = Uuid, Path, description = "Job id")),
    request_body = CandidateUpdate,
    responses(
        (status = 200, description = "Candidate after the merge", body = CandidateResponse),
        (status = 400, description = "Fields do not fit a candidate"),
        (status = 404, description = "Job or candidate not found")
    )
)]
#[tracing::instrument(skip(state, auth, payload), fields(organization_id = %auth.organization.id, candidate_id = %payload.candidate_id))]
pub async fn update_candidate(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<CandidateUpdate>,
) -> Result<Json<CandidateResponse>, AppError> {
    let mut job = find_job(&state.db, auth.organization_id(), id).await?;
    let slot = job
        .candidate_mut(payload.candidate_id)
        .ok_or_else(|| AppError::NotFound("Candidate".to_string()))?;
    let merged = merge_candidate(slot, &payload.updated_candidate)?;
    *slot = merged.clone();
    save_candidates(&state.db, job).await?;

    Ok(Json(CandidateResponse { success: true, candidate: merged }))
}

#[utoipa::path(
    post,
    path = "/api/recruitment/jobs/{id}/shortlist",
    params(("id" = Uuid, Path, description = "Job id")),
    request_body = ShortlistRequest,
    responses(
        (status = 200, description = "Candidates moved to Shortlisted", body = ShortlistResponse),
        (status = 400, description = "No candidate ids"),
        (status = 404, description = "No such job in the organization")
    )
)]
#[tracing::instrument(skip(state, auth, payload), fields(organization_id = %auth.organization.id))]
pub async fn shortlist(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<ShortlistRequest>,
) -> Result<Json<ShortlistResponse>, AppError> {
    if payload.candidate_ids.is_empty() {
        return Err(AppError::InvalidRequest("No candidate IDs provided".to_string()));
    }
    let mut job = find_job(&state.db, auth.organization_id(), id).await?;
    let mut shortlisted_count = 0;
    for candidate in job.candidates.0.iter_mut() {
        if payload.candidate_ids.contains(&candidate.id) {
            candidate.status = CandidateStatus::Shortlisted;
            shortlisted_count += 1;
        }
    }
    save_candidates(&state.db, job).await?;

    Ok(Json(ShortlistResponse { success: true, shortlisted_count }))
}

#[utoipa::path(
    post,
    path = "/api/recruitment/jobs/{id}/auto-shortlist",
    params(("id" = Uuid, Path, description = "Job id")),
    responses(
        (status = 200, description = "Top-scored New candidates shortlisted", body = ShortlistResponse),
        (status = 404, description = "No such job in the organization")
    )
)]
#[tracing::instrument(skip(state, auth), fields(organization_id = %auth.organization.id))]
pub async fn auto_shortlist(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ShortlistResponse>, AppError> {
    let mut job = find_job(&state.db, auth.organization_id(), id).await?;
    let count = usize::try_from(job.shortlist_count).unwrap_or(0);
    let ids = auto_shortlist_ids(&job.candidates.0, count);
    for candidate in job.candidates.0.iter_mut().filter(|c| ids.contains(&c.id)) {
        candidate.status = CandidateStatus::Shortlisted;
    }
    save_candidates(&state.db, job).await?;
    tracing::info!(shortlisted = ids.len(), "Auto-shortlist complete");

    Ok(Json(ShortlistResponse { success: true, shortlisted_count: ids.len() }))
}

#[utoipa::path(
    post,
    path = "/api/recruitment/jobs/{id}/contact-candidates",
    params(("id" = Uuid, Path, description = "Job id")),
    request_body = ContactCandidatesRequest,
    responses(
        (status = 200, description = "Invitations sent from the connected Gmail account", body = ContactCandidatesResponse),
        (status = 400, description = "Missing candidate ids or template, or calendar not connected"),
        (status = 404, description = "Job not found, or none of the ids belong to it"),
        (status = 502, description = "Gmail rejected every invitation")
    )
)]
#[tracing::instrument(skip(state, auth, payload), fields(organization_id = %auth.organization.id))]
pub async fn contact_job_candidates(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<ContactCandidatesRequest>,
) -> Result<Json<ContactCandidatesResponse>, AppError> {
    if payload.candidate_ids.is_empty() || payload.email_template.trim().is_empty() {
        return Err(AppError::InvalidRequest("Missing required fields".to_string()));
    }
    let mut job = find_job(&state.db, auth.organization_id(), id).await?;
    if !job.candidates.0.iter().any(|c| payload.candidate_ids.contains(&c.id)) {
        return Err(AppError::NotFound("Matching candidates".to_string()));
    }

    let access_token = access_token_for(&state.db, &state.http_client, &state.config, &auth.user).await?;
    let google = GoogleClient::new(&state.http_client, &state.config, access_token);
    let invitation = Invitation {
        template: payload.email_template,
        scheduling_details: payload.scheduling_details,
        method: payload.scheduling_method,
        calendly_link: payload.calendly_link,
        available_dates: payload.available_dates,
    };
    let sent_count = contact_candidates(&google, &mut job, &payload.candidate_ids, &invitation).await?;
    save_candidates(&state.db, job).await?;

    Ok(Json(ContactCandidatesResponse { success: true, sent_count }))
}

#[utoipa::path(
    post,
    path = "/api/recruitment/jobs/{id}/feedback",
    params(("id" = Uuid, Path, description = "Job id")),
    request_body = FeedbackRequest,
    responses(
        (status = 200, description = "Feedback recorded", body = CandidateResponse),
        (status = 400, description = "Round out of range or missing interviewer"),
        (status = 404, description = "Job or candidate not found")
    )
)]
#[tracing::instrument(skip(state, auth, payload), fields(organization_id = %auth.organization.id, candidate_id = %payload.candidate_id))]
pub async fn submit_feedback(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<FeedbackRequest>,
) -> Result<Json<CandidateResponse>, AppError> {
    if payload.interviewer_email.trim().is_empty() {
        return Err(AppError::InvalidRequest("Interviewer email is required".to_string()));
    }
    let mut job = find_job(&state.db, auth.organization_id(), id).await?;
    let rounds = job.interview_rounds.0.len();
    if payload.round_index < 0 || (rounds > 0 && payload.round_index as usize >= rounds) {
        return Err(AppError::InvalidRequest("Invalid interview round".to_string()));
    }

    let candidate = job
        .candidate_mut(payload.candidate_id)
        .ok_or_else(|| AppError::NotFound("Candidate".to_string()))?;
    candidate.interview_feedback.push(InterviewFeedback {
        round_index: payload.round_index,
        interviewer_email: payload.interviewer_email.trim().to_string(),
        decision: payload.decision,
        comments: payload.comments,
        submitted_at: Utc::now(),
    });
    let candidate = candidate.clone();
    save_candidates(&state.db, job).await?;

    Ok(Json(CandidateResponse { success: true, candidate }))
}

#[utoipa::path(
    post,
    path = "/api/recruitment/jobs/{id}/screen-candidates-alt",
    params(("id" = Uuid, Path, description = "Job id")),
    responses(
        (status = 200, description = "Unscored candidates scored against the job", body = ScreeningResponse),
        (status = 404, description = "No such job in the organization")
    )
)]
#[tracing::instrument(skip(state, auth), fields(organization_id = %auth.organization.id))]
pub async fn screen_job_candidates(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ScreeningResponse>, AppError> {
    let mut job = find_job(&state.db, auth.organization_id(), id).await?;
    if !job.candidates.0.iter().any(Candidate::needs_screening) {
        return Ok(Json(ScreeningResponse {
            success: true,
            screened_count: 0,
            message: "No candidates need screening".to_string(),
        }));
    }

    let screened_count = screen_candidates(&state.http_client, &state.config, &mut job).await;
    save_candidates(&state.db, job).await?;

    Ok(Json(ScreeningResponse {
        success: true,
        screened_count,
        message: format!("Successfully screened {} candidates", screened_count),
    }))
}

#[utoipa::path(
    post,
    path = "/api/recruitment/generate-jd",
    request_body = GenerateJdRequest,
    responses(
        (status = 200, description = "Generated job description", body = GenerateJdResponse),
        (status = 400, description = "Empty input"),
        (status = 502, description = "Language model unavailable")
    )
)]
#[tracing::instrument(skip(state, auth, payload), fields(organization_id = %auth.organization.id))]
pub async fn generate_job_description(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<GenerateJdRequest>,
) -> Result<Json<GenerateJdResponse>, AppError> {
    if payload.input.trim().is_empty() {
        return Err(AppError::InvalidRequest("Input is required".to_string()));
    }

    let mut prompt = format!(
        "Create a job description based on the following information: {}",
        payload.input.trim()
    );
    let organization = &auth.organization;
    if !organization.description.trim().is_empty() {
        prompt.push_str(&format!("\n\nAbout the company: {}", organization.description.trim()));
    }
    if !organization.perks.trim().is_empty() {
        prompt.push_str(&format!("\n\nBenefits and perks: {}", organization.perks.trim()));
    }

    let description = LlmClient::new(&state.http_client, &state.config)
        .complete(JD_SYSTEM_PROMPT, &prompt, 0.7)
        .await?;
    Ok(Json(GenerateJdResponse { description }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(name: &str, status: CandidateStatus, score: Option<i32>) -> Candidate {
        Candidate {
            id: Uuid::new_v4(),
            name: name.into(),
            email: format!("{}@example.com", name),
            status,
            score,
            ..Default::default()
        }
    }

    #[test]
    fn auto_shortlist_takes_best_new_candidates() {
        let candidates = vec![
            candidate("low", CandidateStatus::New, Some(40)),
            candidate("high", CandidateStatus::New, Some(90)),
            candidate("unscored", CandidateStatus::New, None),
            candidate("already", CandidateStatus::Interviewing, Some(99)),
        ];
        let ids = auto_shortlist_ids(&candidates, 2);
        assert_eq!(ids, vec![candidates[1].id, candidates[0].id]);
        assert_eq!(auto_shortlist_ids(&candidates, 10).len(), 3);
    }

    #[test]
    fn merge_keeps_id_and_untouched_fields() {
        let original = candidate("ada", CandidateStatus::New, Some(70));
        let patch = serde_json::json!({ "status": "Interviewing", "currentRound": 1, "id": Uuid::nil() });
        let merged = merge_candidate(&original, &patch).unwrap();
        assert_eq!(merged.id, original.id);
        assert_eq!(merged.status, CandidateStatus::Interviewing);
        assert_eq!(merged.current_round, 1);
        assert_eq!(merged.score, Some(70));
        assert!(merge_candidate(&original, &serde_json::json!({ "status": "Ghosted" })).is_err());
        assert!(merge_candidate(&original, &serde_json::json!([1, 2])).is_err());
    }

    #[test]
    fn counts_cover_every_status() {
        let candidates = vec![
            candidate("a", CandidateStatus::New, None),
            candidate("b", CandidateStatus::New, None),
            candidate("c", CandidateStatus::Hired, None),
        ];
        let counts = CandidateCounts::of(&candidates);
        assert_eq!(counts.total, 3);
        assert_eq!(counts.new, 2);
        assert_eq!(counts.hired, 1);
        assert_eq!(counts.offered, 0);
    }

    #[test]
    fn salary_ranges_are_formatted() {
        assert_eq!(salary_range(Some(60000.0), Some(85000.0)), "$60,000 - $85,000");
        assert_eq!(salary_range(Some(999.0), Some(1000.0)), "$999 - $1,000");
        assert_eq!(salary_range(None, Some(85000.0)), "Competitive");
    }
}
