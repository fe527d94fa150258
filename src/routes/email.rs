use axum::{extract::State, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::recruitment::monitor::monitor_responses;
use crate::AppState;

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MonitorResponse {
    pub success: bool,
    pub scheduled_count: usize,
}

#[utoipa::path(
    post,
    path = "/api/email/monitor-responses",
    responses(
        (status = 200, description = "Replies processed; number of interviews booked", body = MonitorResponse),
        (status = 400, description = "Calendar not connected"),
        (status = 401, description = "Token refresh failed")
    )
)]
pub async fn monitor_email_responses(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<MonitorResponse>, AppError> {
    let scheduled_count = monitor_responses(&state.db, &state.http_client, &state.config, &auth.user).await?;
    Ok(Json(MonitorResponse { success: true, scheduled_count }))
}
