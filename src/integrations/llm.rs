use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::config::Config;
use crate::error::AppError;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// Client for an OpenAI-compatible chat completions endpoint.
#[derive(Clone)]
pub struct LlmClient<'a> {
    http: &'a Client,
    config: &'a Config,
}

impl<'a> LlmClient<'a> {
    pub fn new(http: &'a Client, config: &'a Config) -> Self {
        LlmClient { http, config }
    }

    /// Sends one system + user exchange and returns the trimmed reply text.
    pub async fn complete(&self, system: &str, user: &str, temperature: f32) -> Result<String, AppError> {
        let api_key = self
            .config
            .openai_api_key
            .as_deref()
            .ok_or_else(|| AppError::UpstreamError("OPENAI_API_KEY is not configured".to_string()))?;

        let request_body = ChatRequest {
            model: &self.config.openai_model,
            messages: vec![
                ChatMessage { role: "system", content: system },
                ChatMessage { role: "user", content: user },
            ],
            temperature,
        };

        let url = format!("{}/chat/completions", self.config.openai_base_url.trim_end_matches('/'));
        let response = self
            .http
            .post(&url)
            .bearer_auth(api_key)
            .timeout(self.config.http_timeout())
            .json(&request_body)
            .send()
            .await
            .map_err(|e| {
                error!("Network error calling chat completions: {}", e);
                AppError::UpstreamError(format!("Failed to call LLM: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("LLM returned status {}: {}", status, body);
            return Err(AppError::UpstreamError(format!("LLM returned error status: {}", status)));
        }

        let parsed = response.json::<ChatResponse>().await.map_err(|e| {
            error!("Failed to parse chat completion response: {}", e);
            AppError::UpstreamError(format!("Failed to parse LLM response: {}", e))
        })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|text| text.trim().to_string())
            .ok_or_else(|| AppError::UpstreamError("LLM returned no choices".to_string()))?;

        info!("LLM reply received ({} chars)", content.len());
        Ok(content)
    }
}
