use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::DbErr;
use serde::Serialize;
use serde_json::json;
use std::fmt;
use utoipa::ToSchema;

/// One failed field of one uploaded row.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ValidationIssue {
    /// Spreadsheet row number, header being row 1
    pub row: usize,
    pub field: String,
    pub message: String,
}

#[derive(Debug)]
pub enum AppError {
    InvalidRequest(String),
    InvalidRequestDetails { error: String, details: String },
    ValidationFailed(Vec<ValidationIssue>),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    UpstreamError(String),
    DatabaseError(String),
    SerializationError(String),
    InternalError(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::InvalidRequest(msg) => write!(f, "{}", msg),
            AppError::InvalidRequestDetails { error, details } => write!(f, "{}: {}", error, details),
            AppError::ValidationFailed(issues) => write!(f, "Validation errors found ({} issues)", issues.len()),
            AppError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            AppError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            AppError::NotFound(what) => write!(f, "{} not found", what),
            AppError::UpstreamError(msg) => write!(f, "Upstream service error: {}", msg),
            AppError::DatabaseError(msg) => write!(f, "Database error: {}", msg),
            AppError::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            AppError::InternalError(msg) => write!(f, "Internal Server Error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::SerializationError(err.to_string())
    }
}

impl From<DbErr> for AppError {
    fn from(err: DbErr) -> Self {
        AppError::DatabaseError(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::UpstreamError(err.to_string())
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        AppError::InvalidRequestDetails {
            error: "Invalid multipart body".to_string(),
            details: err.body_text(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            AppError::InvalidRequestDetails { error, details } => (
                StatusCode::BAD_REQUEST,
                json!({ "error": error, "details": details }),
            ),
            AppError::ValidationFailed(issues) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "Validation errors found", "errors": issues }),
            ),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, json!({ "error": msg })),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, json!({ "error": msg })),
            AppError::NotFound(what) => (
                StatusCode::NOT_FOUND,
                json!({ "error": format!("{} not found", what) }),
            ),
            AppError::UpstreamError(msg) => {
                tracing::error!("Upstream call failed: {}", msg);
                (
                    StatusCode::BAD_GATEWAY,
                    json!({ "error": "Upstream service error", "details": msg }),
                )
            }
            err @ (AppError::DatabaseError(_)
            | AppError::SerializationError(_)
            | AppError::InternalError(_)) => {
                tracing::error!("{}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Internal server error" }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}
