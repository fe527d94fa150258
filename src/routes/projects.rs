use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{NaiveDate, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, ModelTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::entities::consultant::{self, Assignment, Assignments};
use crate::entities::project::{
    self, is_supported_date, AssignedConsultant, AssignedConsultants, ProjectStatus, TeamSize, SUPPORTED_YEARS,
};
use crate::entities::{name_key, Consultant, Project, StringList};
use crate::error::AppError;
use crate::metrics::availability::has_conflicts;
use crate::metrics::financial::{project_financials, ProjectFinancials};
use crate::routes::organization::mark_onboarding;
use crate::routes::workforce::{find_consultant, DeletedResponse};
use crate::AppState;

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewProject {
    pub name: String,
    #[serde(default)]
    pub client: String,
    #[serde(default)]
    pub required_skills: Vec<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Case-insensitive; defaults to Discussions
    pub status: Option<String>,
    #[serde(default)]
    pub team_size: TeamSize,
    pub chance_to_close: Option<i32>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProject {
    pub name: Option<String>,
    pub client: Option<String>,
    pub required_skills: Option<Vec<String>>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub status: Option<String>,
    pub team_size: Option<TeamSize>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentRequest {
    pub consultant_id: Uuid,
    pub percentage: f64,
    pub hourly_rate: Option<f64>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UnassignRequest {
    pub consultant_id: Uuid,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChanceToCloseRequest {
    pub chance_to_close: i32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SuccessResponse {
    pub success: bool,
}

fn parse_status(raw: &str) -> Result<ProjectStatus, AppError> {
    ProjectStatus::normalize(raw).ok_or_else(|| {
        AppError::InvalidRequest(format!(
            "Status must be one of: {}",
            ProjectStatus::ALL.map(|s| s.as_str()).join(", ")
        ))
    })
}

fn check_percentage(percentage: f64) -> Result<(), AppError> {
    if !(0.0..=100.0).contains(&percentage) {
        return Err(AppError::InvalidRequest("Percentage must be between 0 and 100".to_string()));
    }
    Ok(())
}

fn check_dates(start: NaiveDate, end: NaiveDate) -> Result<(), AppError> {
    if !is_supported_date(start) || !is_supported_date(end) {
        return Err(AppError::InvalidRequest(format!(
            "Project dates must fall between the years {} and {}",
            SUPPORTED_YEARS.start(),
            SUPPORTED_YEARS.end()
        )));
    }
    if end < start {
        return Err(AppError::InvalidRequest("End date cannot be before start date".to_string()));
    }
    Ok(())
}

fn name_in_use() -> AppError {
    AppError::InvalidRequest("A project with this name already exists in your organization".to_string())
}

/// Name keys of the organization's projects, optionally leaving one out.
pub(crate) async fn project_names(
    db: &DatabaseConnection,
    organization_id: Uuid,
    except: Option<Uuid>,
) -> Result<HashSet<String>, AppError> {
    let mut query = Project::find()
        .select_only()
        .column(project::Column::Name)
        .filter(project::Column::OrganizationId.eq(organization_id));
    if let Some(id) = except {
        query = query.filter(project::Column::Id.ne(id));
    }
    let names: Vec<String> = query.into_tuple().all(db).await?;
    Ok(names.iter().map(|n| name_key(n)).collect())
}

pub(crate) async fn find_project(
    db: &DatabaseConnection,
    organization_id: Uuid,
    id: Uuid,
) -> Result<project::Model, AppError> {
    Project::find_by_id(id)
        .filter(project::Column::OrganizationId.eq(organization_id))
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Project".to_string()))
}

async fn org_projects(db: &DatabaseConnection, organization_id: Uuid) -> Result<Vec<project::Model>, AppError> {
    Ok(Project::find()
        .filter(project::Column::OrganizationId.eq(organization_id))
        .all(db)
        .await?)
}

async fn save_assignments(
    db: &DatabaseConnection,
    consultant: consultant::Model,
    assignments: Vec<Assignment>,
) -> Result<consultant::Model, AppError> {
    let mut active = consultant.into_active_model();
    active.assignments = Set(Assignments(assignments));
    active.updated_at = Set(Utc::now());
    Ok(active.update(db).await?)
}

async fn save_snapshots(
    db: &DatabaseConnection,
    project: project::Model,
    snapshots: Vec<AssignedConsultant>,
    updated_by: Uuid,
) -> Result<project::Model, AppError> {
    let mut active = project.into_active_model();
    active.assigned_consultants = Set(AssignedConsultants(snapshots));
    active.updated_by = Set(Some(updated_by));
    active.updated_at = Set(Utc::now());
    Ok(active.update(db).await?)
}

#[utoipa::path(
    get,
    path = "/api/projects",
    responses((status = 200, description = "Projects of the organization, by start date", body = [project::Model]))
)]
pub async fn list_projects(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<project::Model>>, AppError> {
    let projects = Project::find()
        .filter(project::Column::OrganizationId.eq(auth.organization_id()))
        .order_by_asc(project::Column::StartDate)
        .all(&state.db)
        .await?;
    Ok(Json(projects))
}

#[utoipa::path(
    post,
    path = "/api/projects",
    request_body = NewProject,
    responses(
        (status = 201, description = "Project created", body = project::Model),
        (status = 400, description = "Invalid fields or duplicate name")
    )
)]
#[tracing::instrument(skip(state, auth, payload), fields(organization_id = %auth.organization.id))]
pub async fn create_project(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<NewProject>,
) -> Result<impl IntoResponse, AppError> {
    let org_id = auth.organization_id();
    let name = payload.name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::InvalidRequest("Name is required".to_string()));
    }
    check_dates(payload.start_date, payload.end_date)?;
    let status = match payload.status.as_deref() {
        Some(raw) => parse_status(raw)?,
        None => ProjectStatus::Discussions,
    };
    let chance_to_close = payload.chance_to_close.unwrap_or(100);
    if !(0..=100).contains(&chance_to_close) {
        return Err(AppError::InvalidRequest("Invalid chance to close value".to_string()));
    }

    if project_names(&state.db, org_id, None).await?.contains(&name_key(&name)) {
        return Err(name_in_use());
    }

    let now = Utc::now();
    let created = project::ActiveModel {
        id: Set(Uuid::new_v4()),
        organization_id: Set(org_id),
        name: Set(name),
        client: Set(payload.client.trim().to_string()),
        required_skills: Set(StringList(payload.required_skills)),
        start_date: Set(payload.start_date),
        end_date: Set(payload.end_date),
        status: Set(status),
        team_size: Set(payload.team_size),
        chance_to_close: Set(chance_to_close),
        assigned_consultants: Set(AssignedConsultants::default()),
        updated_by: Set(Some(auth.user.id)),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(&state.db)
    .await?;

    tracing::info!(project_id = %created.id, "Project created");
    mark_onboarding(&state.db, &auth.organization, |o| o.has_projects = true).await?;

    Ok((StatusCode::CREATED, Json(created)))
}

#[utoipa::path(
    get,
    path = "/api/projects/{id}",
    params(("id" = Uuid, Path, description = "Project id")),
    responses(
        (status = 200, description = "The project", body = project::Model),
        (status = 404, description = "No such project in the organization")
    )
)]
pub async fn get_project(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<project::Model>, AppError> {
    Ok(Json(find_project(&state.db, auth.organization_id(), id).await?))
}

#[utoipa::path(
    patch,
    path = "/api/projects/{id}",
    params(("id" = Uuid, Path, description = "Project id")),
    request_body = UpdateProject,
    responses(
        (status = 200, description = "Updated project", body = project::Model),
        (status = 400, description = "Invalid status or dates"),
        (status = 404, description = "No such project in the organization")
    )
)]
#[tracing::instrument(skip(state, auth, payload), fields(organization_id = %auth.organization.id))]
pub async fn update_project(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateProject>,
) -> Result<Json<project::Model>, AppError> {
    let existing = find_project(&state.db, auth.organization_id(), id).await?;
    check_dates(
        payload.start_date.unwrap_or(existing.start_date),
        payload.end_date.unwrap_or(existing.end_date),
    )?;

    let mut active = existing.into_active_model();
    if let Some(name) = payload.name {
        if name.trim().is_empty() {
            return Err(AppError::InvalidRequest("Name is required".to_string()));
        }
        if project_names(&state.db, auth.organization_id(), Some(id))
            .await?
            .contains(&name_key(&name))
        {
            return Err(name_in_use());
        }
        active.name = Set(name.trim().to_string());
    }
    if let Some(client) = payload.client {
        active.client = Set(client.trim().to_string());
    }
    if let Some(skills) = payload.required_skills {
        active.required_skills = Set(StringList(skills));
    }
    if let Some(start) = payload.start_date {
        active.start_date = Set(start);
    }
    if let Some(end) = payload.end_date {
        active.end_date = Set(end);
    }
    if let Some(status) = payload.status {
        active.status = Set(parse_status(&status)?);
    }
    if let Some(team_size) = payload.team_size {
        active.team_size = Set(team_size);
    }
    active.updated_by = Set(Some(auth.user.id));
    active.updated_at = Set(Utc::now());
    Ok(Json(active.update(&state.db).await?))
}

#[utoipa::path(
    delete,
    path = "/api/projects/{id}",
    params(("id" = Uuid, Path, description = "Project id")),
    responses(
        (status = 200, description = "Project deleted, assignments released", body = DeletedResponse),
        (status = 404, description = "No such project in the organization")
    )
)]
#[tracing::instrument(skip(state, auth), fields(organization_id = %auth.organization.id))]
pub async fn delete_project(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<DeletedResponse>, AppError> {
    let org_id = auth.organization_id();
    let existing = find_project(&state.db, org_id, id).await?;

    let consultants = Consultant::find()
        .filter(consultant::Column::OrganizationId.eq(org_id))
        .all(&state.db)
        .await?;
    for c in consultants.into_iter().filter(|c| c.assignment_for(id).is_some()) {
        let remaining = c.assignments.0.iter().filter(|a| a.project_id != id).cloned().collect();
        save_assignments(&state.db, c, remaining).await?;
    }

    existing.delete(&state.db).await?;
    tracing::info!(project_id = %id, "Project deleted");

    Ok(Json(DeletedResponse {
        message: "Project deleted successfully".to_string(),
        id,
    }))
}

#[utoipa::path(
    post,
    path = "/api/projects/{id}/assign",
    params(("id" = Uuid, Path, description = "Project id")),
    request_body = AssignmentRequest,
    responses(
        (status = 200, description = "Consultant assigned", body = SuccessResponse),
        (status = 400, description = "Out-of-range percentage, duplicate or overlapping assignment"),
        (status = 404, description = "Consultant or project not found")
    )
)]
#[tracing::instrument(skip(state, auth, payload), fields(organization_id = %auth.organization.id, consultant_id = %payload.consultant_id))]
pub async fn assign_consultant(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<AssignmentRequest>,
) -> Result<Json<SuccessResponse>, AppError> {
    check_percentage(payload.percentage)?;
    let org_id = auth.organization_id();
    let (consultant, all_projects) = tokio::try_join!(
        find_consultant(&state.db, org_id, payload.consultant_id),
        org_projects(&state.db, org_id),
    )?;
    let project = all_projects
        .iter()
        .find(|p| p.id == id)
        .cloned()
        .ok_or_else(|| AppError::NotFound("Project".to_string()))?;

    if project.has_consultant(consultant.id) || consultant.assignment_for(id).is_some() {
        return Err(AppError::InvalidRequest(
            "Consultant is already assigned to this project".to_string(),
        ));
    }
    if has_conflicts(consultant.id, &project, &all_projects) {
        return Err(AppError::InvalidRequest(
            "Consultant is not available during this period".to_string(),
        ));
    }

    let mut snapshots = project.assigned_consultants.0.clone();
    snapshots.push(AssignedConsultant {
        consultant_id: consultant.id,
        name: consultant.name.clone(),
        level: consultant.level.clone(),
        percentage: payload.percentage,
        hourly_rate: payload.hourly_rate,
    });
    let mut assignments = consultant.assignments.0.clone();
    assignments.push(Assignment {
        project_id: id,
        percentage: payload.percentage,
        hourly_rate: payload.hourly_rate,
    });

    save_snapshots(&state.db, project, snapshots, auth.user.id).await?;
    save_assignments(&state.db, consultant, assignments).await?;
    tracing::info!(project_id = %id, "Consultant assigned");

    Ok(Json(SuccessResponse { success: true }))
}

#[utoipa::path(
    post,
    path = "/api/projects/{id}/unassign",
    params(("id" = Uuid, Path, description = "Project id")),
    request_body = UnassignRequest,
    responses(
        (status = 200, description = "Assignment removed from both sides", body = SuccessResponse),
        (status = 404, description = "Consultant or project not found")
    )
)]
#[tracing::instrument(skip(state, auth, payload), fields(organization_id = %auth.organization.id, consultant_id = %payload.consultant_id))]
pub async fn unassign_consultant(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UnassignRequest>,
) -> Result<Json<SuccessResponse>, AppError> {
    let org_id = auth.organization_id();
    let (project, consultant) = tokio::try_join!(
        find_project(&state.db, org_id, id),
        find_consultant(&state.db, org_id, payload.consultant_id),
    )?;

    let snapshots = project
        .assigned_consultants
        .0
        .iter()
        .filter(|s| s.consultant_id != consultant.id)
        .cloned()
        .collect();
    let assignments = consultant.assignments.0.iter().filter(|a| a.project_id != id).cloned().collect();

    save_snapshots(&state.db, project, snapshots, auth.user.id).await?;
    save_assignments(&state.db, consultant, assignments).await?;

    Ok(Json(SuccessResponse { success: true }))
}

#[utoipa::path(
    patch,
    path = "/api/projects/{id}/update-assignment",
    params(("id" = Uuid, Path, description = "Project id")),
    request_body = AssignmentRequest,
    responses(
        (status = 200, description = "Percentage updated on both sides", body = SuccessResponse),
        (status = 400, description = "Percentage outside 0-100"),
        (status = 404, description = "Consultant, project or assignment not found")
    )
)]
#[tracing::instrument(skip(state, auth, payload), fields(organization_id = %auth.organization.id, consultant_id = %payload.consultant_id))]
pub async fn update_assignment(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<AssignmentRequest>,
) -> Result<Json<SuccessResponse>, AppError> {
    check_percentage(payload.percentage)?;
    let org_id = auth.organization_id();
    let (project, consultant) = tokio::try_join!(
        find_project(&state.db, org_id, id),
        find_consultant(&state.db, org_id, payload.consultant_id),
    )?;
    if !project.has_consultant(consultant.id) && consultant.assignment_for(id).is_none() {
        return Err(AppError::NotFound("Assignment".to_string()));
    }

    let mut snapshots = project.assigned_consultants.0.clone();
    for s in snapshots.iter_mut().filter(|s| s.consultant_id == consultant.id) {
        s.percentage = payload.percentage;
        if payload.hourly_rate.is_some() {
            s.hourly_rate = payload.hourly_rate;
        }
    }
    let mut assignments = consultant.assignments.0.clone();
    for a in assignments.iter_mut().filter(|a| a.project_id == id) {
        a.percentage = payload.percentage;
        if payload.hourly_rate.is_some() {
            a.hourly_rate = payload.hourly_rate;
        }
    }

    save_snapshots(&state.db, project, snapshots, auth.user.id).await?;
    save_assignments(&state.db, consultant, assignments).await?;

    Ok(Json(SuccessResponse { success: true }))
}

#[utoipa::path(
    patch,
    path = "/api/projects/{id}/chance-to-close",
    params(("id" = Uuid, Path, description = "Project id")),
    request_body = ChanceToCloseRequest,
    responses(
        (status = 200, description = "Updated project", body = project::Model),
        (status = 400, description = "Value outside 0-100 or project not in Discussions"),
        (status = 404, description = "No such project in the organization")
    )
)]
#[tracing::instrument(skip(state, auth, payload), fields(organization_id = %auth.organization.id))]
pub async fn update_chance_to_close(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<ChanceToCloseRequest>,
) -> Result<Json<project::Model>, AppError> {
    if !(0..=100).contains(&payload.chance_to_close) {
        return Err(AppError::InvalidRequest("Invalid chance to close value".to_string()));
    }
    let existing = find_project(&state.db, auth.organization_id(), id).await?;
    if existing.status != ProjectStatus::Discussions {
        return Err(AppError::InvalidRequest(
            "Can only modify chance to close for projects in Discussions status".to_string(),
        ));
    }

    let mut active = existing.into_active_model();
    active.chance_to_close = Set(payload.chance_to_close);
    active.updated_by = Set(Some(auth.user.id));
    active.updated_at = Set(Utc::now());
    Ok(Json(active.update(&state.db).await?))
}

#[utoipa::path(
    get,
    path = "/api/projects/{id}/financials",
    params(("id" = Uuid, Path, description = "Project id")),
    responses(
        (status = 200, description = "Revenue, cost and margin per assigned consultant", body = ProjectFinancials),
        (status = 404, description = "No such project in the organization")
    )
)]
pub async fn get_project_financials(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ProjectFinancials>, AppError> {
    let org_id = auth.organization_id();
    let project = find_project(&state.db, org_id, id).await?;
    let ids: Vec<Uuid> = project.assigned_consultants.0.iter().map(|s| s.consultant_id).collect();
    let consultants = Consultant::find()
        .filter(consultant::Column::OrganizationId.eq(org_id))
        .filter(consultant::Column::Id.is_in(ids))
        .all(&state.db)
        .await?;
    Ok(Json(project_financials(&project, &consultants)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_are_normalized_or_rejected() {
        assert_eq!(parse_status(" started ").unwrap(), ProjectStatus::Started);
        assert!(parse_status("Won").is_err());
    }

    #[test]
    fn percentages_outside_range_are_rejected() {
        assert!(check_percentage(0.0).is_ok());
        assert!(check_percentage(100.0).is_ok());
        assert!(check_percentage(100.5).is_err());
        assert!(check_percentage(-1.0).is_err());
    }

    #[test]
    fn end_date_may_equal_start_date() {
        let day = NaiveDate::from_ymd_opt(2025, 3, 3).unwrap();
        assert!(check_dates(day, day).is_ok());
        assert!(check_dates(day, day.pred_opt().unwrap()).is_err());
    }

    #[test]
    fn far_future_end_dates_are_rejected() {
        let day = NaiveDate::from_ymd_opt(2025, 3, 3).unwrap();
        assert!(check_dates(day, NaiveDate::MAX).is_err());
        assert!(check_dates(NaiveDate::MIN, day).is_err());
    }
}
