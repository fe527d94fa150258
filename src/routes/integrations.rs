use axum::{extract::State, Json};
use sea_orm::TransactionTrait;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::AuthUser;
use crate::batch::{ConsultantRow, ProjectRow};
use crate::error::AppError;
use crate::integrations::sap::{consultant_rows, project_rows, SapClient, SapConnection};
use crate::routes::batch::{check_new_consultants, check_new_projects, insert_consultants, insert_projects};
use crate::routes::organization::mark_onboarding;
use crate::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct SapImportRequest {
    /// `preview` or `import`
    pub action: String,
    pub config: SapConnection,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SapPreview {
    pub consultants: Vec<ConsultantRow>,
    pub projects: Vec<ProjectRow>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SapImportResponse {
    pub consultants_imported: usize,
    pub projects_imported: usize,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(untagged)]
pub enum SapImportResult {
    Preview(SapPreview),
    Imported(SapImportResponse),
}

#[utoipa::path(
    post,
    path = "/api/integrations/sap/import",
    request_body = SapImportRequest,
    responses(
        (status = 200, description = "Mapped records (preview) or inserted counts (import)", body = SapImportResult),
        (status = 400, description = "Unknown action, missing connection details, or records that fail validation"),
        (status = 403, description = "Free plan consultant limit reached"),
        (status = 502, description = "SAP API unreachable or returned an error")
    )
)]
#[tracing::instrument(skip(state, auth, payload), fields(organization_id = %auth.organization.id, action = %payload.action))]
pub async fn sap_import(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<SapImportRequest>,
) -> Result<Json<SapImportResult>, AppError> {
    let action = payload.action.trim();
    if action != "preview" && action != "import" {
        return Err(AppError::InvalidRequest("Invalid action".to_string()));
    }
    if payload.config.base_url.trim().is_empty() || payload.config.api_key.trim().is_empty() {
        return Err(AppError::InvalidRequest("SAP base URL and API key are required".to_string()));
    }

    let client = SapClient::new(&state.http_client, &state.config, &payload.config);
    let (resources, projects) = tokio::try_join!(client.fetch_resources(), client.fetch_projects())?;
    tracing::info!(resources = resources.len(), projects = projects.len(), "Fetched SAP records");

    let mut issues = Vec::new();
    let consultants = consultant_rows(resources, &auth.organization.consultant_levels, &mut issues);
    let projects = project_rows(projects, &mut issues);
    if !issues.is_empty() {
        return Err(AppError::ValidationFailed(issues));
    }
    if action == "preview" {
        return Ok(Json(SapImportResult::Preview(SapPreview { consultants, projects })));
    }

    check_new_consultants(&state, &auth, &consultants).await?;
    check_new_projects(&state, &auth, &projects).await?;
    let txn = state.db.begin().await?;
    let consultants_imported = insert_consultants(&txn, &auth, consultants).await?;
    let projects_imported = insert_projects(&txn, &auth, projects).await?;
    txn.commit().await?;

    mark_onboarding(&state.db, &auth.organization, |o| {
        o.has_consultants |= consultants_imported > 0;
        o.has_projects |= projects_imported > 0;
    })
    .await?;
    tracing::info!(consultants_imported, projects_imported, "SAP import stored");

    Ok(Json(SapImportResult::Imported(SapImportResponse {
        consultants_imported,
        projects_imported,
    })))
}
