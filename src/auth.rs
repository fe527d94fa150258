use axum::{extract::FromRequestParts, http::header::AUTHORIZATION, http::request::Parts};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};

use crate::entities::{organization, user, Organization, User};
use crate::error::AppError;
use crate::AppState;

/// The caller behind a `Authorization: Bearer <token>` header, with their organization.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user: user::Model,
    pub organization: organization::Model,
}

impl AuthUser {
    pub fn organization_id(&self) -> uuid::Uuid {
        self.organization.id
    }

    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.user.is_admin {
            Ok(())
        } else {
            Err(AppError::Forbidden("Only admins can perform this action".to_string()))
        }
    }
}

pub fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .ok_or_else(|| AppError::Unauthorized("Missing bearer token".to_string()))?;

        let user = User::find()
            .filter(user::Column::ApiToken.eq(token))
            .one(&state.db)
            .await?
            .ok_or_else(|| AppError::Unauthorized("Invalid token".to_string()))?;

        let organization = Organization::find_by_id(user.organization_id)
            .one(&state.db)
            .await?
            .ok_or_else(|| AppError::Unauthorized("Organization no longer exists".to_string()))?;

        Ok(AuthUser { user, organization })
    }
}
