use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, ModelTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::entities::consultant::{self, Assignments, DEFAULT_PICTURE};
use crate::entities::project::{self, AssignedConsultants};
use crate::entities::{name_key, Consultant, Project, StringList};
use crate::error::AppError;
use crate::routes::organization::mark_onboarding;
use crate::AppState;

const DEFAULT_LEVEL: &str = "junior";

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewConsultant {
    pub name: String,
    pub level: Option<String>,
    pub salary: Option<f64>,
    #[serde(default)]
    pub skills: Vec<String>,
    pub picture: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateConsultant {
    pub name: Option<String>,
    pub level: Option<String>,
    pub salary: Option<f64>,
    pub skills: Option<Vec<String>>,
    pub picture: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DeletedResponse {
    pub message: String,
    pub id: Uuid,
}

/// Fails with 403 once a free organization holds `limit` consultants.
pub(crate) fn check_consultant_limit(
    auth: &AuthUser,
    existing: u64,
    adding: u64,
    limit: u64,
) -> Result<(), AppError> {
    if auth.organization.is_free_plan() && existing + adding > limit {
        return Err(AppError::Forbidden(format!(
            "Free plan is limited to {} consultants. Please upgrade to premium for unlimited consultants.",
            limit
        )));
    }
    Ok(())
}

pub(crate) async fn consultant_count(db: &DatabaseConnection, organization_id: Uuid) -> Result<u64, AppError> {
    Ok(Consultant::find()
        .filter(consultant::Column::OrganizationId.eq(organization_id))
        .count(db)
        .await?)
}

/// Name keys of the organization's consultants, optionally leaving one out.
pub(crate) async fn consultant_names(
    db: &DatabaseConnection,
    organization_id: Uuid,
    except: Option<Uuid>,
) -> Result<HashSet<String>, AppError> {
    let mut query = Consultant::find()
        .select_only()
        .column(consultant::Column::Name)
        .filter(consultant::Column::OrganizationId.eq(organization_id));
    if let Some(id) = except {
        query = query.filter(consultant::Column::Id.ne(id));
    }
    let names: Vec<String> = query.into_tuple().all(db).await?;
    Ok(names.iter().map(|n| name_key(n)).collect())
}

async fn name_taken(
    db: &DatabaseConnection,
    organization_id: Uuid,
    name: &str,
    except: Option<Uuid>,
) -> Result<bool, AppError> {
    Ok(consultant_names(db, organization_id, except).await?.contains(&name_key(name)))
}

pub(crate) async fn find_consultant(
    db: &DatabaseConnection,
    organization_id: Uuid,
    id: Uuid,
) -> Result<consultant::Model, AppError> {
    Consultant::find_by_id(id)
        .filter(consultant::Column::OrganizationId.eq(organization_id))
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Consultant".to_string()))
}

fn clean_skills(skills: Vec<String>) -> StringList {
    StringList(
        skills
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
    )
}

fn check_salary(salary: f64) -> Result<f64, AppError> {
    if !salary.is_finite() || salary < 0.0 {
        return Err(AppError::InvalidRequest("Salary must be a non-negative number".to_string()));
    }
    Ok(salary)
}

#[utoipa::path(
    get,
    path = "/api/workforce",
    responses((status = 200, description = "Consultants of the organization, by name", body = [consultant::Model]))
)]
pub async fn list_consultants(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<consultant::Model>>, AppError> {
    let consultants = Consultant::find()
        .filter(consultant::Column::OrganizationId.eq(auth.organization_id()))
        .order_by_asc(consultant::Column::Name)
        .all(&state.db)
        .await?;
    Ok(Json(consultants))
}

#[utoipa::path(
    post,
    path = "/api/workforce",
    request_body = NewConsultant,
    responses(
        (status = 201, description = "Consultant created", body = consultant::Model),
        (status = 400, description = "Missing name or duplicate name"),
        (status = 403, description = "Free plan consultant limit reached")
    )
)]
#[tracing::instrument(skip(state, auth, payload), fields(organization_id = %auth.organization.id))]
pub async fn create_consultant(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<NewConsultant>,
) -> Result<impl IntoResponse, AppError> {
    let org_id = auth.organization_id();
    let existing = consultant_count(&state.db, org_id).await?;
    check_consultant_limit(&auth, existing, 1, state.config.free_plan_consultant_limit)?;

    let name = payload.name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::InvalidRequest("Name is required".to_string()));
    }
    if name_taken(&state.db, org_id, &name, None).await? {
        return Err(AppError::InvalidRequest(
            "A consultant with this name already exists in your organization".to_string(),
        ));
    }

    let level = payload
        .level
        .map(|l| l.trim().to_lowercase())
        .filter(|l| !l.is_empty())
        .unwrap_or_else(|| DEFAULT_LEVEL.to_string());
    let salary = check_salary(payload.salary.unwrap_or(0.0))?;

    let now = Utc::now();
    let created = consultant::ActiveModel {
        id: Set(Uuid::new_v4()),
        organization_id: Set(org_id),
        name: Set(name),
        level: Set(level),
        salary: Set(salary),
        skills: Set(clean_skills(payload.skills)),
        assignments: Set(Assignments::default()),
        picture: Set(payload
            .picture
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_PICTURE.to_string())),
        created_by: Set(auth.user.id),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(&state.db)
    .await?;

    tracing::info!(consultant_id = %created.id, "Consultant created");
    mark_onboarding(&state.db, &auth.organization, |o| o.has_consultants = true).await?;

    Ok((StatusCode::CREATED, Json(created)))
}

#[utoipa::path(
    get,
    path = "/api/workforce/{id}",
    params(("id" = Uuid, Path, description = "Consultant id")),
    responses(
        (status = 200, description = "The consultant", body = consultant::Model),
        (status = 404, description = "No such consultant in the organization")
    )
)]
pub async fn get_consultant(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<consultant::Model>, AppError> {
    Ok(Json(find_consultant(&state.db, auth.organization_id(), id).await?))
}

#[utoipa::path(
    patch,
    path = "/api/workforce/{id}",
    params(("id" = Uuid, Path, description = "Consultant id")),
    request_body = UpdateConsultant,
    responses(
        (status = 200, description = "Updated consultant", body = consultant::Model),
        (status = 400, description = "Invalid field or duplicate name"),
        (status = 404, description = "No such consultant in the organization")
    )
)]
#[tracing::instrument(skip(state, auth, payload), fields(organization_id = %auth.organization.id))]
pub async fn update_consultant(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateConsultant>,
) -> Result<Json<consultant::Model>, AppError> {
    let org_id = auth.organization_id();
    let existing = find_consultant(&state.db, org_id, id).await?;
    let mut active = existing.clone().into_active_model();

    if let Some(name) = payload.name {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::InvalidRequest("Name is required".to_string()));
        }
        if name_taken(&state.db, org_id, &name, Some(id)).await? {
            return Err(AppError::InvalidRequest(
                "A consultant with this name already exists in your organization".to_string(),
            ));
        }
        active.name = Set(name);
    }
    if let Some(level) = payload.level {
        let level = level.trim().to_lowercase();
        if level.is_empty() {
            return Err(AppError::InvalidRequest("Level is required".to_string()));
        }
        active.level = Set(level);
    }
    if let Some(salary) = payload.salary {
        active.salary = Set(check_salary(salary)?);
    }
    if let Some(skills) = payload.skills {
        active.skills = Set(clean_skills(skills));
    }
    if let Some(picture) = payload.picture {
        active.picture = Set(picture);
    }
    active.updated_at = Set(Utc::now());
    let updated = active.update(&state.db).await?;

    if updated.name != existing.name || updated.level != existing.level {
        refresh_snapshots(&state.db, &updated).await?;
    }
    Ok(Json(updated))
}

/// Rewrites the name/level copies held by the consultant's projects.
async fn refresh_snapshots(db: &DatabaseConnection, consultant: &consultant::Model) -> Result<(), AppError> {
    let project_ids: Vec<Uuid> = consultant.assignments.0.iter().map(|a| a.project_id).collect();
    if project_ids.is_empty() {
        return Ok(());
    }
    let projects = Project::find()
        .filter(project::Column::Id.is_in(project_ids))
        .all(db)
        .await?;
    for p in projects {
        let mut snapshots = p.assigned_consultants.0.clone();
        for snapshot in snapshots.iter_mut().filter(|s| s.consultant_id == consultant.id) {
            snapshot.name = consultant.name.clone();
            snapshot.level = consultant.level.clone();
        }
        let mut active = p.into_active_model();
        active.assigned_consultants = Set(AssignedConsultants(snapshots));
        active.update(db).await?;
    }
    Ok(())
}

#[utoipa::path(
    delete,
    path = "/api/workforce/{id}",
    params(("id" = Uuid, Path, description = "Consultant id")),
    responses(
        (status = 200, description = "Consultant deleted", body = DeletedResponse),
        (status = 404, description = "No such consultant in the organization")
    )
)]
#[tracing::instrument(skip(state, auth), fields(organization_id = %auth.organization.id))]
pub async fn delete_consultant(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<DeletedResponse>, AppError> {
    let org_id = auth.organization_id();
    let existing = find_consultant(&state.db, org_id, id).await?;

    let projects = Project::find()
        .filter(project::Column::OrganizationId.eq(org_id))
        .all(&state.db)
        .await?;
    for p in projects.into_iter().filter(|p| p.has_consultant(id)) {
        let remaining: Vec<_> = p
            .assigned_consultants
            .0
            .iter()
            .filter(|s| s.consultant_id != id)
            .cloned()
            .collect();
        let mut active = p.into_active_model();
        active.assigned_consultants = Set(AssignedConsultants(remaining));
        active.updated_at = Set(Utc::now());
        active.update(&state.db).await?;
    }

    existing.delete(&state.db).await?;
    tracing::info!(consultant_id = %id, "Consultant deleted");

    Ok(Json(DeletedResponse {
        message: "Consultant deleted successfully".to_string(),
        id,
    }))
}
