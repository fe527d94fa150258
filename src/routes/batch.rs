use axum::{
    extract::{Multipart, State},
    Json,
};
use chrono::Utc;
use sea_orm::{ConnectionTrait, EntityTrait, Set, TransactionTrait};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::batch::{parse_upload, ConsultantRow, ParsedUpload, ProjectRow, UploadFormat, UploadKind};
use crate::entities::consultant::{self, Assignments, DEFAULT_PICTURE};
use crate::entities::project::{self, AssignedConsultants};
use crate::entities::{name_key, Consultant, Project};
use crate::error::{AppError, ValidationIssue};
use crate::routes::organization::mark_onboarding;
use crate::routes::projects::project_names;
use crate::routes::workforce::{check_consultant_limit, consultant_count, consultant_names};
use crate::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct BatchUploadResponse {
    pub created: usize,
}

/// Multipart form accepted by the upload endpoint, for documentation.
#[derive(Deserialize, ToSchema)]
#[allow(dead_code)]
pub struct BatchUploadForm {
    /// `consultants` or `projects`
    #[serde(rename = "type")]
    kind: String,
    #[schema(value_type = String, format = Binary)]
    file: Vec<u8>,
}

struct Upload {
    filename: String,
    bytes: Vec<u8>,
}

/// Flags names that repeat inside the file or already exist in the organization.
fn duplicate_names<'a>(
    rows: impl Iterator<Item = (usize, &'a str)>,
    existing: &HashSet<String>,
    what: &str,
) -> Vec<ValidationIssue> {
    let mut seen = HashSet::new();
    let mut issues = Vec::new();
    for (row, name) in rows {
        let key = name_key(name);
        if existing.contains(&key) {
            issues.push(ValidationIssue {
                row,
                field: "name".to_string(),
                message: format!("A {} with this name already exists in your organization", what),
            });
        } else if !seen.insert(key) {
            issues.push(ValidationIssue {
                row,
                field: "name".to_string(),
                message: format!("Duplicate {} name in file", what),
            });
        }
    }
    issues
}

/// Plan limit and name checks for consultants about to be inserted.
pub(crate) async fn check_new_consultants(
    state: &AppState,
    auth: &AuthUser,
    rows: &[ConsultantRow],
) -> Result<(), AppError> {
    let org_id = auth.organization_id();
    let existing = consultant_count(&state.db, org_id).await?;
    check_consultant_limit(auth, existing, rows.len() as u64, state.config.free_plan_consultant_limit)?;

    let names = consultant_names(&state.db, org_id, None).await?;
    let issues = duplicate_names(rows.iter().map(|r| (r.row, r.name.as_str())), &names, "consultant");
    if issues.is_empty() {
        Ok(())
    } else {
        Err(AppError::ValidationFailed(issues))
    }
}

pub(crate) async fn check_new_projects(
    state: &AppState,
    auth: &AuthUser,
    rows: &[ProjectRow],
) -> Result<(), AppError> {
    let names = project_names(&state.db, auth.organization_id(), None).await?;
    let issues = duplicate_names(rows.iter().map(|r| (r.row, r.name.as_str())), &names, "project");
    if issues.is_empty() {
        Ok(())
    } else {
        Err(AppError::ValidationFailed(issues))
    }
}

pub(crate) async fn insert_consultants<C: ConnectionTrait>(
    db: &C,
    auth: &AuthUser,
    rows: Vec<ConsultantRow>,
) -> Result<usize, AppError> {
    if rows.is_empty() {
        return Ok(0);
    }
    let now = Utc::now();
    let count = rows.len();
    let models = rows.into_iter().map(|r| consultant::ActiveModel {
        id: Set(Uuid::new_v4()),
        organization_id: Set(auth.organization_id()),
        name: Set(r.name),
        level: Set(r.level),
        salary: Set(r.salary),
        skills: Set(r.skills),
        assignments: Set(Assignments::default()),
        picture: Set(DEFAULT_PICTURE.to_string()),
        created_by: Set(auth.user.id),
        created_at: Set(now),
        updated_at: Set(now),
    });
    Consultant::insert_many(models).exec(db).await?;
    Ok(count)
}

pub(crate) async fn insert_projects<C: ConnectionTrait>(
    db: &C,
    auth: &AuthUser,
    rows: Vec<ProjectRow>,
) -> Result<usize, AppError> {
    if rows.is_empty() {
        return Ok(0);
    }
    let now = Utc::now();
    let count = rows.len();
    let models = rows.into_iter().map(|r| project::ActiveModel {
        id: Set(Uuid::new_v4()),
        organization_id: Set(auth.organization_id()),
        name: Set(r.name),
        client: Set(r.client),
        required_skills: Set(r.required_skills),
        start_date: Set(r.start_date),
        end_date: Set(r.end_date),
        status: Set(r.status),
        team_size: Set(r.team_size),
        chance_to_close: Set(r.chance_to_close),
        assigned_consultants: Set(AssignedConsultants::default()),
        updated_by: Set(Some(auth.user.id)),
        created_at: Set(now),
        updated_at: Set(now),
    });
    Project::insert_many(models).exec(db).await?;
    Ok(count)
}

#[utoipa::path(
    post,
    path = "/api/batch-upload",
    request_body(content = BatchUploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Rows inserted", body = BatchUploadResponse),
        (status = 400, description = "Missing file, unknown type, unreadable file, missing headers or row errors"),
        (status = 403, description = "Free plan consultant limit reached")
    )
)]
#[tracing::instrument(skip(state, auth, multipart), fields(organization_id = %auth.organization.id))]
pub async fn batch_upload(
    State(state): State<AppState>,
    auth: AuthUser,
    mut multipart: Multipart,
) -> Result<Json<BatchUploadResponse>, AppError> {
    let mut upload = None;
    let mut kind = None;
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await?.to_vec();
                upload = Some(Upload { filename, bytes });
            }
            "type" => kind = Some(field.text().await?),
            _ => {}
        }
    }

    let upload = upload.ok_or_else(|| AppError::InvalidRequest("No file provided".to_string()))?;
    let kind: UploadKind = kind.unwrap_or_default().parse()?;
    let format = UploadFormat::from_filename(&upload.filename)?;

    let parsed = parse_upload(kind, format, &upload.bytes, &auth.organization.consultant_levels)?;
    tracing::info!(rows = parsed.len(), filename = %upload.filename, "Parsed batch upload");

    let created = match parsed {
        ParsedUpload::Consultants(rows) => {
            check_new_consultants(&state, &auth, &rows).await?;
            let txn = state.db.begin().await?;
            let count = insert_consultants(&txn, &auth, rows).await?;
            txn.commit().await?;
            mark_onboarding(&state.db, &auth.organization, |o| o.has_consultants = true).await?;
            count
        }
        ParsedUpload::Projects(rows) => {
            check_new_projects(&state, &auth, &rows).await?;
            let txn = state.db.begin().await?;
            let count = insert_projects(&txn, &auth, rows).await?;
            txn.commit().await?;
            mark_onboarding(&state.db, &auth.organization, |o| o.has_projects = true).await?;
            count
        }
    };

    tracing::info!(created, "Batch upload stored");
    Ok(Json(BatchUploadResponse { created }))
}
