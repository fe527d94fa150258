use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, Duration, Utc};
use sea_orm::{ActiveModelTrait, IntoActiveModel, Set};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::auth::AuthUser;
use crate::entities::user::CalendarCredentials;
use crate::error::AppError;
use crate::integrations::google::{expiry_after, GoogleClient, MAX_TOKEN_LIFETIME_SECS};
use crate::recruitment::monitor::access_token_for;
use crate::recruitment::slots::{available_slots, Slot};
use crate::AppState;

const DEFAULT_DAYS: i64 = 7;
const DEFAULT_DURATION_MINUTES: i64 = 60;

#[derive(Debug, Deserialize, IntoParams)]
pub struct SlotsQuery {
    /// Days to look ahead, default 7
    pub days: Option<i64>,
    /// Slot length in minutes, default 60
    pub duration: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SlotsResponse {
    pub available_slots: Vec<Slot>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConnectCalendar {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Absolute expiry; takes precedence over `expiresIn`
    pub expires_at: Option<DateTime<Utc>>,
    /// Seconds until the access token expires
    pub expires_in: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CalendarStatus {
    pub connected: bool,
    pub has_refresh_token: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

impl CalendarStatus {
    fn of(credentials: Option<&CalendarCredentials>) -> Self {
        CalendarStatus {
            connected: credentials.is_some(),
            has_refresh_token: credentials.is_some_and(|c| c.refresh_token.is_some()),
            expires_at: credentials.and_then(|c| c.expires_at),
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/calendar/available-slots",
    params(SlotsQuery),
    responses(
        (status = 200, description = "Free interview slots in business hours", body = SlotsResponse),
        (status = 400, description = "Calendar not connected or bad parameters"),
        (status = 401, description = "Token refresh failed"),
        (status = 502, description = "Calendar API error")
    )
)]
#[tracing::instrument(skip(state, auth), fields(user_id = %auth.user.id))]
pub async fn get_available_slots(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<SlotsQuery>,
) -> Result<Json<SlotsResponse>, AppError> {
    let days = query.days.unwrap_or(DEFAULT_DAYS);
    let duration = query.duration.unwrap_or(DEFAULT_DURATION_MINUTES);
    if !(1..=60).contains(&days) {
        return Err(AppError::InvalidRequest("days must be between 1 and 60".to_string()));
    }
    if !(15..=480).contains(&duration) {
        return Err(AppError::InvalidRequest("duration must be between 15 and 480 minutes".to_string()));
    }

    let access_token = access_token_for(&state.db, &state.http_client, &state.config, &auth.user).await?;
    let google = GoogleClient::new(&state.http_client, &state.config, access_token);

    let now = Utc::now();
    let busy = google.free_busy(now, now + Duration::days(days)).await?;
    let slots = available_slots(now, days, duration, &busy, state.config.business_offset());
    tracing::info!(busy = busy.len(), slots = slots.len(), "Computed available slots");

    Ok(Json(SlotsResponse { available_slots: slots }))
}

#[utoipa::path(
    post,
    path = "/api/calendar/connect",
    request_body = ConnectCalendar,
    responses(
        (status = 200, description = "Credentials stored", body = CalendarStatus),
        (status = 400, description = "Missing access token or expiresIn out of range")
    )
)]
#[tracing::instrument(skip(state, auth, payload), fields(user_id = %auth.user.id))]
pub async fn connect_calendar(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<ConnectCalendar>,
) -> Result<Json<CalendarStatus>, AppError> {
    if payload.access_token.trim().is_empty() {
        return Err(AppError::InvalidRequest("Access token is required".to_string()));
    }
    let expires_at = match (payload.expires_at, payload.expires_in) {
        (Some(at), _) => Some(at),
        (None, Some(secs)) => Some(expiry_after(Utc::now(), secs).ok_or_else(|| {
            AppError::InvalidRequest(format!(
                "expiresIn must be between -{0} and {0} seconds",
                MAX_TOKEN_LIFETIME_SECS
            ))
        })?),
        (None, None) => None,
    };
    let credentials = CalendarCredentials {
        access_token: payload.access_token.trim().to_string(),
        refresh_token: payload.refresh_token.filter(|t| !t.trim().is_empty()),
        expires_at,
    };

    let mut active = auth.user.into_active_model();
    active.calendar_credentials = Set(Some(credentials));
    active.updated_at = Set(Utc::now());
    let updated = active.update(&state.db).await?;
    tracing::info!("Calendar connected");

    Ok(Json(CalendarStatus::of(updated.calendar_credentials.as_ref())))
}

#[utoipa::path(
    get,
    path = "/api/calendar/status",
    responses((status = 200, description = "Whether the caller has a calendar connected", body = CalendarStatus))
)]
pub async fn calendar_status(auth: AuthUser) -> Json<CalendarStatus> {
    Json(CalendarStatus::of(auth.user.calendar_credentials.as_ref()))
}

#[utoipa::path(
    delete,
    path = "/api/calendar/disconnect",
    responses((status = 200, description = "Stored credentials removed", body = CalendarStatus))
)]
#[tracing::instrument(skip(state, auth), fields(user_id = %auth.user.id))]
pub async fn disconnect_calendar(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<CalendarStatus>, AppError> {
    let mut active = auth.user.into_active_model();
    active.calendar_credentials = Set(None);
    active.updated_at = Set(Utc::now());
    active.update(&state.db).await?;
    tracing::info!("Calendar disconnected");
    Ok(Json(CalendarStatus::of(None)))
}
