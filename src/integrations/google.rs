use base64::prelude::{Engine as _, BASE64_URL_SAFE};
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};

use crate::config::Config;
use crate::entities::user::CalendarCredentials;
use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct BusyInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct FreeBusyResponse {
    #[serde(default)]
    calendars: std::collections::HashMap<String, FreeBusyCalendar>,
}

#[derive(Debug, Deserialize)]
struct FreeBusyCalendar {
    #[serde(default)]
    busy: Vec<BusyInterval>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageList {
    #[serde(default)]
    messages: Vec<MessageRef>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Message {
    #[serde(default)]
    snippet: String,
}

#[derive(Debug, Deserialize)]
struct CreatedEvent {
    id: String,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    id: String,
}

/// Longest token lifetime accepted from clients or the token endpoint.
pub const MAX_TOKEN_LIFETIME_SECS: i64 = 365 * 24 * 60 * 60;

/// Absolute expiry `secs` seconds after `now`. `None` when the lifetime is
/// more than a year either way.
pub fn expiry_after(now: DateTime<Utc>, secs: i64) -> Option<DateTime<Utc>> {
    if !(-MAX_TOKEN_LIFETIME_SECS..=MAX_TOKEN_LIFETIME_SECS).contains(&secs) {
        return None;
    }
    Duration::try_seconds(secs).and_then(|lifetime| now.checked_add_signed(lifetime))
}

/// Plain-text RFC 822 message, base64url encoded for the Gmail `raw` field.
pub fn raw_message(to: &str, subject: &str, body: &str) -> String {
    let message = format!(
        "To: {}\r\nSubject: {}\r\nMIME-Version: 1.0\r\nContent-Type: text/plain; charset=\"UTF-8\"\r\n\r\n{}",
        to.replace(['\r', '\n'], ""),
        subject.replace(['\r', '\n'], " "),
        body
    );
    BASE64_URL_SAFE.encode(message)
}

/// A calendar event to create on the organizer's primary calendar.
#[derive(Debug, Clone, Serialize)]
pub struct NewEvent {
    pub summary: String,
    pub description: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub attendees: Vec<String>,
    /// Idempotency key for the generated video conference
    pub request_id: String,
}

/// Exchanges a refresh token for a new access token when the stored one has
/// expired. Returns `None` when the current credentials are still valid.
pub async fn refresh_if_expired(
    http: &Client,
    config: &Config,
    credentials: &CalendarCredentials,
) -> Result<Option<CalendarCredentials>, AppError> {
    if !credentials.is_expired(Utc::now()) {
        return Ok(None);
    }
    info!("Calendar token expired, refreshing");

    let refresh_token = credentials
        .refresh_token
        .as_deref()
        .ok_or_else(|| AppError::Unauthorized("Calendar token expired and no refresh token is stored".to_string()))?;
    let (client_id, client_secret) = config
        .google_client()
        .ok_or_else(|| AppError::Unauthorized("Failed to refresh token: OAuth client is not configured".to_string()))?;

    let response = http
        .post(&config.google_token_url)
        .timeout(config.http_timeout())
        .form(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", client_id),
            ("client_secret", client_secret),
        ])
        .send()
        .await
        .map_err(|e| AppError::Unauthorized(format!("Failed to refresh token: {}", e)))?;

    if !response.status().is_success() {
        error!("Token endpoint returned {}", response.status());
        return Err(AppError::Unauthorized(format!(
            "Failed to refresh token: status {}",
            response.status()
        )));
    }

    let token: TokenResponse = response
        .json()
        .await
        .map_err(|e| AppError::Unauthorized(format!("Failed to refresh token: {}", e)))?;

    Ok(Some(CalendarCredentials {
        access_token: token.access_token,
        refresh_token: token.refresh_token.or_else(|| credentials.refresh_token.clone()),
        expires_at: token
            .expires_in
            .and_then(|secs| expiry_after(Utc::now(), secs.clamp(0, MAX_TOKEN_LIFETIME_SECS))),
    }))
}

/// Calendar and Gmail calls made on behalf of one user.
pub struct GoogleClient<'a> {
    http: &'a Client,
    config: &'a Config,
    access_token: String,
}

impl<'a> GoogleClient<'a> {
    pub fn new(http: &'a Client, config: &'a Config, access_token: impl Into<String>) -> Self {
        GoogleClient { http, config, access_token: access_token.into() }
    }

    async fn checked<T: serde::de::DeserializeOwned>(
        what: &str,
        response: reqwest::Response,
    ) -> Result<T, AppError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("{} failed with status {}: {}", what, status, body);
            return Err(AppError::UpstreamError(format!("{} failed with status {}", what, status)));
        }
        Ok(response.json::<T>().await?)
    }

    /// Busy intervals on the primary calendar between `time_min` and `time_max`.
    pub async fn free_busy(
        &self,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> Result<Vec<BusyInterval>, AppError> {
        let url = format!("{}/freeBusy", self.config.google_calendar_base_url.trim_end_matches('/'));
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.access_token)
            .timeout(self.config.http_timeout())
            .json(&json!({
                "timeMin": time_min.to_rfc3339(),
                "timeMax": time_max.to_rfc3339(),
                "items": [{ "id": "primary" }],
            }))
            .send()
            .await?;

        let mut parsed: FreeBusyResponse = Self::checked("Calendar free/busy query", response).await?;
        Ok(parsed.calendars.remove("primary").map(|c| c.busy).unwrap_or_default())
    }

    /// Creates the event with a Meet conference and returns its id.
    pub async fn insert_event(&self, event: &NewEvent) -> Result<String, AppError> {
        let url = format!(
            "{}/calendars/primary/events",
            self.config.google_calendar_base_url.trim_end_matches('/')
        );
        let attendees: Vec<_> = event.attendees.iter().map(|email| json!({ "email": email })).collect();
        let response = self
            .http
            .post(&url)
            .query(&[("conferenceDataVersion", "1")])
            .bearer_auth(&self.access_token)
            .timeout(self.config.http_timeout())
            .json(&json!({
                "summary": event.summary,
                "description": event.description,
                "start": { "dateTime": event.start.to_rfc3339(), "timeZone": "UTC" },
                "end": { "dateTime": event.end.to_rfc3339(), "timeZone": "UTC" },
                "attendees": attendees,
                "conferenceData": {
                    "createRequest": {
                        "requestId": event.request_id,
                        "conferenceSolutionKey": { "type": "hangoutsMeet" }
                    }
                }
            }))
            .send()
            .await?;

        let created: CreatedEvent = Self::checked("Calendar event creation", response).await?;
        Ok(created.id)
    }

    /// Ids of the newest messages matching a Gmail search query.
    pub async fn search_messages(&self, query: &str, max_results: u32) -> Result<Vec<String>, AppError> {
        let url = format!("{}/users/me/messages", self.config.gmail_base_url.trim_end_matches('/'));
        let max_results = max_results.to_string();
        let response = self
            .http
            .get(&url)
            .query(&[("q", query), ("maxResults", max_results.as_str())])
            .bearer_auth(&self.access_token)
            .timeout(self.config.http_timeout())
            .send()
            .await?;

        let list: MessageList = Self::checked("Gmail search", response).await?;
        Ok(list.messages.into_iter().map(|m| m.id).collect())
    }

    /// Sends a plain-text email from the user's mailbox and returns the message id.
    pub async fn send_message(&self, to: &str, subject: &str, body: &str) -> Result<String, AppError> {
        let url = format!("{}/users/me/messages/send", self.config.gmail_base_url.trim_end_matches('/'));
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.access_token)
            .timeout(self.config.http_timeout())
            .json(&json!({ "raw": raw_message(to, subject, body) }))
            .send()
            .await?;

        let sent: SentMessage = Self::checked("Gmail send", response).await?;
        Ok(sent.id)
    }

    pub async fn message_snippet(&self, message_id: &str) -> Result<String, AppError> {
        let url = format!(
            "{}/users/me/messages/{}",
            self.config.gmail_base_url.trim_end_matches('/'),
            message_id
        );
        let response = self
            .http
            .get(&url)
            .query(&[("format", "metadata")])
            .bearer_auth(&self.access_token)
            .timeout(self.config.http_timeout())
            .send()
            .await?;

        let message: Message = Self::checked("Gmail message fetch", response).await?;
        Ok(message.snippet)
    }
}
