use backoff::future::retry_notify;
use backoff::Error as BackoffError;
use backoff::ExponentialBackoff;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use url::Url;

use crate::config::Config;
use crate::error::AppError;

static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));
static GLUED_WORDS: Lazy<Regex> = Lazy::new(|| Regex::new(r"([a-z])([A-Z])").expect("valid glued-word regex"));

/// Maps a stored resume location to a fetchable URL. `s3://bucket/key` goes
/// through the configured storage gateway; http(s) URLs pass through.
pub fn resolve_resume_url(raw: &str, storage_base_url: &str) -> Result<Url, AppError> {
    let raw = raw.trim();
    if let Some(rest) = raw.strip_prefix("s3://") {
        let (bucket, key) = rest
            .split_once('/')
            .filter(|(bucket, key)| !bucket.is_empty() && !key.is_empty())
            .ok_or_else(|| AppError::InvalidRequest(format!("Invalid S3 URL format: {}", raw)))?;
        let joined = format!("{}/{}/{}", storage_base_url.trim_end_matches('/'), bucket, key);
        return Url::parse(&joined).map_err(|e| AppError::InvalidRequest(format!("Invalid resume URL: {}", e)));
    }

    let url = Url::parse(raw).map_err(|e| AppError::InvalidRequest(format!("Invalid resume URL: {}", e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(AppError::InvalidRequest(format!("Unsupported resume URL scheme: {}", other))),
    }
}

/// Normalizes extracted resume text for prompting.
pub fn clean_resume_text(text: &str) -> String {
    let spaced = GLUED_WORDS.replace_all(text, "$1 $2");
    WHITESPACE_RUN.replace_all(&spaced, " ").trim().to_string()
}

fn pdf_text(bytes: &[u8]) -> Result<String, lopdf::Error> {
    let document = lopdf::Document::load_mem(bytes)?;
    let pages: Vec<u32> = document.get_pages().keys().copied().collect();
    document.extract_text(&pages)
}

/// Text of a downloaded resume, cleaned for prompting. PDFs (by flag or by
/// their `%PDF-` header) are parsed; other files, and PDFs without
/// extractable text, are read as UTF-8.
pub fn resume_text(bytes: &[u8], is_pdf: bool) -> String {
    if is_pdf || bytes.starts_with(b"%PDF-") {
        match pdf_text(bytes) {
            Ok(text) if !text.trim().is_empty() => return clean_resume_text(&text),
            Ok(_) => tracing::warn!("PDF resume has no extractable text, reading it as UTF-8"),
            Err(e) => tracing::warn!("PDF parse failed, reading resume as UTF-8: {}", e),
        }
    }
    clean_resume_text(&String::from_utf8_lossy(bytes))
}

fn is_pdf_response(url: &Url, response: &reqwest::Response) -> bool {
    let pdf_content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.to_ascii_lowercase().starts_with("application/pdf"));
    pdf_content_type || url.path().to_ascii_lowercase().ends_with(".pdf")
}

fn retry_notify_handler<E>(err: E, duration: std::time::Duration)
where
    E: std::fmt::Display,
{
    tracing::warn!(
        "Resume download failed: {}. Retrying in {:.1}s...",
        err,
        duration.as_secs_f32()
    );
}

/// Downloads a resume and returns its cleaned text. 429s, 5xx responses and
/// connection problems are retried with exponential backoff.
#[tracing::instrument(skip(client, config))]
pub async fn fetch_resume_text(client: &Client, config: &Config, resume_url: &str) -> Result<String, AppError> {
    let url = resolve_resume_url(resume_url, &config.resume_storage_base_url)?;
    let backoff = ExponentialBackoff {
        max_elapsed_time: Some(config.retry_max_elapsed()),
        ..ExponentialBackoff::default()
    };

    let response = retry_notify(
        backoff,
        || async {
            match client.get(url.clone()).timeout(config.http_timeout()).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        Ok(resp)
                    } else if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                        Err(BackoffError::transient(anyhow::anyhow!(
                            "Storage returned retryable status: {}",
                            status
                        )))
                    } else {
                        Err(BackoffError::permanent(anyhow::anyhow!(
                            "Storage returned non-retryable status: {}",
                            status
                        )))
                    }
                }
                Err(err) if err.is_timeout() || err.is_connect() || err.is_request() => {
                    Err(BackoffError::transient(anyhow::Error::new(err)))
                }
                Err(err) => Err(BackoffError::permanent(anyhow::Error::new(err))),
            }
        },
        retry_notify_handler,
    )
    .await
    .map_err(|e| AppError::UpstreamError(format!("Failed to download resume: {}", e)))?;

    let is_pdf = is_pdf_response(&url, &response);
    let bytes = response.bytes().await?;
    tokio::task::spawn_blocking(move || resume_text(&bytes, is_pdf))
        .await
        .map_err(|e| AppError::InternalError(format!("Resume text extraction failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s3_urls_go_through_the_gateway() {
        let url = resolve_resume_url("s3://resumes/2025/ada.pdf", "http://127.0.0.1:9000/").unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:9000/resumes/2025/ada.pdf");
    }

    #[test]
    fn malformed_or_unknown_urls_are_rejected() {
        assert!(resolve_resume_url("s3://bucket-only", "http://gw").is_err());
        assert!(resolve_resume_url("ftp://example.com/cv.txt", "http://gw").is_err());
        assert!(resolve_resume_url("https://example.com/cv.txt", "http://gw").is_ok());
    }

    #[test]
    fn cleanup_splits_glued_words_and_collapses_whitespace() {
        let raw = b"Senior  EngineerExperience\n\n\tRustDeveloper at\xffAcme ";
        assert_eq!(
            resume_text(raw, false),
            "Senior Engineer Experience Rust Developer at\u{fffd}Acme"
        );
    }

    #[test]
    fn pdf_resumes_are_parsed_not_decoded() {
        let pdf = include_bytes!("../../tests/fixtures/resume.pdf");
        let text = resume_text(pdf, true);
        assert!(text.contains("Ada Lovelace"), "got {:?}", text);
        assert!(text.contains("Senior Rust Engineer with eight years of pricing systems"));
        assert!(!text.contains("%PDF"));
        assert!(!text.contains("endstream"));

        // Sniffed from the header even without a .pdf name.
        assert_eq!(resume_text(pdf, false), text);
    }

    #[test]
    fn broken_pdf_falls_back_to_utf8() {
        let text = resume_text(b"%PDF-1.4 not really a pdf\nRustDeveloper", true);
        assert_eq!(text, "%PDF-1.4 not really a pdf Rust Developer");
    }
}
