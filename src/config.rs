use chrono::{FixedOffset, Offset, Utc};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Runtime settings, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub database_url: String,
    /// Requests per minute per client IP. 0 turns the limiter off.
    pub rate_limit_per_minute: u32,
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub openai_model: String,
    pub google_client_id: Option<String>,
    pub google_client_secret: Option<String>,
    pub google_token_url: String,
    pub google_calendar_base_url: String,
    pub gmail_base_url: String,
    /// Gateway that serves `s3://bucket/key` objects as `{base}/{bucket}/{key}`
    pub resume_storage_base_url: String,
    pub business_utc_offset_minutes: i32,
    pub http_timeout_secs: u64,
    pub retry_max_elapsed_secs: u64,
    pub free_plan_consultant_limit: u64,
    pub monitor_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind_addr: "127.0.0.1:3000".to_string(),
            database_url: "sqlite:./teamdesk.sqlite?mode=rwc".to_string(),
            rate_limit_per_minute: 60,
            openai_api_key: None,
            openai_base_url: "https://api.openai.com/v1".to_string(),
            openai_model: "gpt-4o-mini".to_string(),
            google_client_id: None,
            google_client_secret: None,
            google_token_url: "https://oauth2.googleapis.com/token".to_string(),
            google_calendar_base_url: "https://www.googleapis.com/calendar/v3".to_string(),
            gmail_base_url: "https://gmail.googleapis.com/gmail/v1".to_string(),
            resume_storage_base_url: "https://s3.amazonaws.com".to_string(),
            business_utc_offset_minutes: 0,
            http_timeout_secs: 60,
            retry_max_elapsed_secs: 10,
            free_plan_consultant_limit: 10,
            monitor_interval_secs: 15 * 60,
        }
    }
}

impl Config {
    /// Loads `.env` (if present) and overlays environment variables on the defaults.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        let defaults = Config::default();

        Config {
            bind_addr: env::var("BIND_ADDR").unwrap_or(defaults.bind_addr),
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            rate_limit_per_minute: parse_var("RATE_LIMIT_PER_MINUTE", defaults.rate_limit_per_minute),
            openai_api_key: optional_var("OPENAI_API_KEY"),
            openai_base_url: env::var("OPENAI_BASE_URL").unwrap_or(defaults.openai_base_url),
            openai_model: env::var("OPENAI_MODEL").unwrap_or(defaults.openai_model),
            google_client_id: optional_var("GOOGLE_CLIENT_ID"),
            google_client_secret: optional_var("GOOGLE_CLIENT_SECRET"),
            google_token_url: env::var("GOOGLE_TOKEN_URL").unwrap_or(defaults.google_token_url),
            google_calendar_base_url: env::var("GOOGLE_CALENDAR_BASE_URL")
                .unwrap_or(defaults.google_calendar_base_url),
            gmail_base_url: env::var("GMAIL_BASE_URL").unwrap_or(defaults.gmail_base_url),
            resume_storage_base_url: env::var("RESUME_STORAGE_BASE_URL")
                .unwrap_or(defaults.resume_storage_base_url),
            business_utc_offset_minutes: parse_var(
                "BUSINESS_UTC_OFFSET_MINUTES",
                defaults.business_utc_offset_minutes,
            ),
            http_timeout_secs: parse_var("HTTP_TIMEOUT_SECS", defaults.http_timeout_secs),
            retry_max_elapsed_secs: parse_var("RETRY_MAX_ELAPSED_SECS", defaults.retry_max_elapsed_secs),
            free_plan_consultant_limit: parse_var(
                "FREE_PLAN_CONSULTANT_LIMIT",
                defaults.free_plan_consultant_limit,
            ),
            monitor_interval_secs: parse_var("MONITOR_INTERVAL_SECS", defaults.monitor_interval_secs),
        }
    }

    pub fn business_offset(&self) -> FixedOffset {
        self.business_utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .unwrap_or_else(|| Utc.fix())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn retry_max_elapsed(&self) -> Duration {
        Duration::from_secs(self.retry_max_elapsed_secs)
    }

    /// Client credentials for refreshing Google tokens, when both are configured.
    pub fn google_client(&self) -> Option<(&str, &str)> {
        match (&self.google_client_id, &self.google_client_secret) {
            (Some(id), Some(secret)) => Some((id.as_str(), secret.as_str())),
            _ => None,
        }
    }
}

fn optional_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T: FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!("Ignoring unparseable {}={:?}", name, raw);
                default
            }
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn business_offset_falls_back_to_utc_when_out_of_range() {
        let mut config = Config::default();
        config.business_utc_offset_minutes = 120;
        assert_eq!(config.business_offset().local_minus_utc(), 7200);
        config.business_utc_offset_minutes = 100_000;
        assert_eq!(config.business_offset().local_minus_utc(), 0);
        config.business_utc_offset_minutes = i32::MAX;
        assert_eq!(config.business_offset().local_minus_utc(), 0);
        config.business_utc_offset_minutes = i32::MIN;
        assert_eq!(config.business_offset().local_minus_utc(), 0);
    }

    #[test]
    fn google_client_needs_both_halves() {
        let mut config = Config::default();
        config.google_client_id = Some("id".into());
        assert!(config.google_client().is_none());
        config.google_client_secret = Some("secret".into());
        assert_eq!(config.google_client(), Some(("id", "secret")));
    }
}
