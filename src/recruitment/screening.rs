use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use tracing::{info, warn};

use crate::config::Config;
use crate::entities::job;
use crate::error::AppError;
use crate::integrations::llm::LlmClient;
use crate::integrations::storage::fetch_resume_text;

static FIRST_INTEGER: Lazy<Regex> = Lazy::new(|| Regex::new(r"-?\d+").expect("valid integer regex"));

/// Score stored when a resume could not be fetched or scored.
pub const FALLBACK_SCORE: i32 = 0;

/// First integer in the reply, clamped to 0..=100.
pub fn parse_score(reply: &str) -> Option<i32> {
    let found = FIRST_INTEGER.find(reply)?.as_str();
    let value = match found.parse::<i64>() {
        Ok(v) => v,
        // Too many digits for i64: saturate in the direction of the sign.
        Err(_) if found.starts_with('-') => i64::MIN,
        Err(_) => i64::MAX,
    };
    Some(value.clamp(0, 100) as i32)
}

pub fn screening_instructions(job: &job::Model) -> String {
    let extra = job
        .additional_instructions
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| format!("\nIMPORTANT SCREENING INSTRUCTIONS: {}\n", s))
        .unwrap_or_default();
    format!(
        "You are an expert recruiter who evaluates resumes against job descriptions.\n\
         Score the candidate's resume from 0-100 based on how well it matches the job requirements.\n\
         Consider skills, experience, education, and overall fit.\n{}\n\
         Return only a number from 0-100 representing the score.",
        extra
    )
}

async fn score_resume(
    http: &Client,
    config: &Config,
    job: &job::Model,
    resume_url: &str,
) -> Result<i32, AppError> {
    let resume_text = fetch_resume_text(http, config, resume_url).await?;
    let prompt = format!("Job Description:\n{}\n\nResume:\n{}", job.job_description, resume_text);
    let reply = LlmClient::new(http, config)
        .complete(&screening_instructions(job), &prompt, 0.3)
        .await?;
    parse_score(&reply).ok_or_else(|| AppError::UpstreamError(format!("No score in LLM reply: {:?}", reply)))
}

/// Scores every candidate that has no score yet (or a fallback 0), one at a
/// time. Candidates without a resume are left alone; any other failure
/// stores [`FALLBACK_SCORE`]. Returns how many candidates were screened.
#[tracing::instrument(skip(http, config, job), fields(job_id = %job.id))]
pub async fn screen_candidates(http: &Client, config: &Config, job: &mut job::Model) -> usize {
    let pending: Vec<usize> = job
        .candidates
        .0
        .iter()
        .enumerate()
        .filter(|(_, c)| c.needs_screening())
        .map(|(i, _)| i)
        .collect();
    info!("{} candidates to screen", pending.len());

    let mut screened = 0;
    for index in pending {
        let candidate = &job.candidates.0[index];
        let Some(resume_url) = candidate.resume_url.clone().filter(|u| !u.trim().is_empty()) else {
            info!(candidate_id = %candidate.id, "No resume URL, skipping");
            continue;
        };

        let score = match score_resume(http, config, job, &resume_url).await {
            Ok(score) => score,
            Err(e) => {
                warn!(candidate_id = %job.candidates.0[index].id, "Screening failed, storing fallback score: {}", e);
                FALLBACK_SCORE
            }
        };
        job.candidates.0[index].score = Some(score);
        screened += 1;
    }
    screened
}
