use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, Set, TransactionTrait};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::entities::organization::{self, ConsultantLevels, Onboarding, PlanType};
use crate::entities::{user, User};
use crate::error::AppError;
use crate::AppState;

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub organization_name: String,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RegisterResponse {
    /// Bearer token for subsequent requests
    pub token: String,
    pub user: user::Model,
    pub organization: organization::Model,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SessionResponse {
    pub user: user::Model,
    pub organization: organization::Model,
}

/// Creates an organization with its first admin and returns the admin's API token.
#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Organization and admin created", body = RegisterResponse),
        (status = 400, description = "Missing fields or email already registered")
    )
)]
#[tracing::instrument(skip(state, payload), fields(email = %payload.email))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let email = payload.email.trim().to_lowercase();
    if payload.organization_name.trim().is_empty() || payload.name.trim().is_empty() || !email.contains('@') {
        return Err(AppError::InvalidRequest(
            "Organization name, name and a valid email are required".to_string(),
        ));
    }

    let existing = User::find()
        .filter(user::Column::Email.eq(email.as_str()))
        .count(&state.db)
        .await?;
    if existing > 0 {
        return Err(AppError::InvalidRequest("User already exists".to_string()));
    }

    let now = Utc::now();
    let txn = state.db.begin().await?;
    let organization = organization::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(payload.organization_name.trim().to_string()),
        description: Set(String::new()),
        perks: Set(String::new()),
        plan_type: Set(PlanType::Free),
        consultant_levels: Set(ConsultantLevels::default()),
        onboarding: Set(Onboarding::default()),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(&txn)
    .await?;

    let user = user::ActiveModel {
        id: Set(Uuid::new_v4()),
        organization_id: Set(organization.id),
        name: Set(payload.name.trim().to_string()),
        email: Set(email),
        api_token: Set(Uuid::new_v4().to_string()),
        is_admin: Set(true),
        calendar_credentials: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(&txn)
    .await?;
    txn.commit().await?;

    tracing::info!(organization_id = %organization.id, "Registered organization");
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse { token: user.api_token.clone(), user, organization }),
    ))
}

#[utoipa::path(
    get,
    path = "/api/auth/session",
    responses(
        (status = 200, description = "Current user and organization", body = SessionResponse),
        (status = 401, description = "Missing or invalid token")
    )
)]
pub async fn session(auth: AuthUser) -> Json<SessionResponse> {
    Json(SessionResponse { user: auth.user, organization: auth.organization })
}
