use chrono::{DateTime, Duration, FixedOffset, NaiveDateTime, TimeZone, Utc};
use reqwest::Client;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter, Set};
use tracing::{info, warn};

use crate::config::Config;
use crate::entities::job::{self, Candidate, CandidateStatus};
use crate::entities::user::{self, CalendarCredentials};
use crate::entities::Job;
use crate::error::AppError;
use crate::integrations::google::{self, GoogleClient, NewEvent};
use crate::integrations::llm::LlmClient;

pub const NO_TIME_FOUND: &str = "No specific time found";
pub const INVITATION_SUBJECT: &str = "Re: Interview Invitation";
const MAX_MESSAGES: u32 = 5;

const TIME_EXTRACTION_PROMPT: &str = "You are an assistant that extracts interview time preferences from candidate emails.\n\
Extract the date and time the candidate is available for an interview.\n\
If multiple times are mentioned, choose the earliest one.\n\
Return the result in ISO format (YYYY-MM-DDTHH:MM:SS) or \"No specific time found\" if none is mentioned.";

const DESCRIPTION_PROMPT: &str = "Generate a concise meeting description for an interview. Include:\n\
- Job title\n\
- Candidate name\n\
- Interview round number and name\n\
- Interviewers\n\
Keep it professional and brief.";

pub fn reply_search_query(candidate_email: &str) -> String {
    format!("from:{} subject:\"{}\"", candidate_email, INVITATION_SUBJECT)
}

/// Reads the time out of an LLM reply. Times without an offset are taken as
/// business-local time.
pub fn parse_proposed_time(reply: &str, offset: FixedOffset) -> Option<DateTime<Utc>> {
    let cleaned = reply.trim().trim_matches(|c: char| c == '"' || c == '`' || c == '\'').trim();
    if cleaned.is_empty() || cleaned.eq_ignore_ascii_case(NO_TIME_FOUND) {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(cleaned) {
        return Some(parsed.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(cleaned, fmt).ok())
        .and_then(|naive| offset.from_local_datetime(&naive).single())
        .map(|local| local.with_timezone(&Utc))
}

/// Candidate, organizer, then every interviewer that looks like an address.
pub fn attendees_for(candidate_email: &str, organizer_email: &str, interviewers: &[String]) -> Vec<String> {
    let mut attendees: Vec<String> = Vec::new();
    let candidates = [candidate_email, organizer_email]
        .into_iter()
        .chain(interviewers.iter().map(String::as_str).filter(|e| e.contains('@')));
    for email in candidates {
        let email = email.trim();
        if !email.is_empty() && !attendees.iter().any(|a| a.eq_ignore_ascii_case(email)) {
            attendees.push(email.to_string());
        }
    }
    attendees
}

fn fallback_description(job_title: &str, candidate_name: &str, round: i32, round_name: &str, interviewers: &[String]) -> String {
    format!(
        "Interview for {} with {}.\nRound {}: {}\nInterviewers: {}",
        job_title,
        candidate_name,
        round,
        round_name,
        interviewers.join(", ")
    )
}

struct Scheduled {
    start: DateTime<Utc>,
    event_id: String,
}

async fn schedule_from_reply(
    google: &GoogleClient<'_>,
    llm: &LlmClient<'_>,
    offset: FixedOffset,
    job: &job::Model,
    candidate: &Candidate,
    organizer_email: &str,
) -> Result<Option<Scheduled>, AppError> {
    let message_ids = google
        .search_messages(&reply_search_query(&candidate.email), MAX_MESSAGES)
        .await?;
    let Some(latest) = message_ids.first() else {
        info!(candidate_id = %candidate.id, "No reply yet");
        return Ok(None);
    };

    let snippet = google.message_snippet(latest).await?;
    let proposed = llm.complete(TIME_EXTRACTION_PROMPT, &snippet, 0.3).await?;
    let Some(start) = parse_proposed_time(&proposed, offset) else {
        info!(candidate_id = %candidate.id, "No usable time in reply: {:?}", proposed);
        return Ok(None);
    };

    let round_number = candidate.current_round.max(1);
    let Some(round) = job.round_for(candidate) else {
        warn!(candidate_id = %candidate.id, "Job has no interview round {}", round_number);
        return Ok(None);
    };

    let details = format!(
        "Job: {}\nCandidate: {}\nRound: {} - {}\nInterviewers: {}",
        job.title,
        candidate.name,
        round_number,
        round.name,
        round.interviewers.join(", ")
    );
    let description = match llm.complete(DESCRIPTION_PROMPT, &details, 0.7).await {
        Ok(text) if !text.is_empty() => text,
        Ok(_) | Err(_) => fallback_description(&job.title, &candidate.name, round_number, &round.name, &round.interviewers),
    };

    let event = NewEvent {
        summary: format!("Interview: {} with {}", job.title, candidate.name),
        description,
        start,
        end: start + Duration::hours(1),
        attendees: attendees_for(&candidate.email, organizer_email, &round.interviewers),
        request_id: format!("interview-{}-{}", job.id, candidate.id),
    };
    let event_id = google.insert_event(&event).await?;
    Ok(Some(Scheduled { start, event_id }))
}

/// Returns a usable access token, persisting a refreshed one when needed.
pub async fn access_token_for(
    db: &DatabaseConnection,
    http: &Client,
    config: &Config,
    user: &user::Model,
) -> Result<String, AppError> {
    let credentials: &CalendarCredentials = user.calendar_credentials.as_ref().ok_or_else(|| {
        AppError::InvalidRequestDetails {
            error: "Calendar not connected".to_string(),
            details: "No calendar credentials found. Please connect your Google Calendar.".to_string(),
        }
    })?;

    match google::refresh_if_expired(http, config, credentials).await? {
        Some(refreshed) => {
            let token = refreshed.access_token.clone();
            let mut active = user.clone().into_active_model();
            active.calendar_credentials = Set(Some(refreshed));
            active.updated_at = Set(Utc::now());
            active.update(db).await?;
            Ok(token)
        }
        None => Ok(credentials.access_token.clone()),
    }
}

/// Looks for interview-invitation replies from Interviewing candidates of the
/// user's organization and books the proposed times. Failures for a single
/// candidate are logged and skipped. Returns the number of interviews booked.
#[tracing::instrument(skip_all, fields(user_id = %user.id))]
pub async fn monitor_responses(
    db: &DatabaseConnection,
    http: &Client,
    config: &Config,
    user: &user::Model,
) -> Result<usize, AppError> {
    let access_token = access_token_for(db, http, config, user).await?;
    let google = GoogleClient::new(http, config, access_token);
    let llm = LlmClient::new(http, config);
    let offset = config.business_offset();

    let jobs = Job::find()
        .filter(job::Column::OrganizationId.eq(user.organization_id))
        .all(db)
        .await?;

    let mut scheduled_count = 0;
    for mut job in jobs {
        let waiting: Vec<usize> = job
            .candidates
            .0
            .iter()
            .enumerate()
            .filter(|(_, c)| c.status == CandidateStatus::Interviewing && !c.interview_scheduled)
            .map(|(i, _)| i)
            .collect();
        if waiting.is_empty() {
            continue;
        }
        info!(job_id = %job.id, "{} candidates awaiting scheduling", waiting.len());

        let mut changed = false;
        for index in waiting {
            let candidate = job.candidates.0[index].clone();
            match schedule_from_reply(&google, &llm, offset, &job, &candidate, &user.email).await {
                Ok(Some(Scheduled { start, event_id })) => {
                    let entry = &mut job.candidates.0[index];
                    entry.interview_scheduled = true;
                    entry.interview_time = Some(start);
                    entry.calendar_event_id = Some(event_id);
                    let note = format!("[{}] Interview scheduled for {}", Utc::now().to_rfc3339(), start.to_rfc3339());
                    entry.notes = Some(match entry.notes.take() {
                        Some(existing) if !existing.is_empty() => format!("{}\n{}", existing, note),
                        _ => note,
                    });
                    scheduled_count += 1;
                    changed = true;
                }
                Ok(None) => {}
                Err(e) => warn!(candidate_id = %candidate.id, "Skipping candidate: {}", e),
            }
        }

        if changed {
            let candidates = job.candidates.clone();
            let mut active = job.into_active_model();
            active.candidates = Set(candidates);
            active.updated_at = Set(Utc::now());
            if let Err(e) = active.update(db).await {
                warn!("Failed to save job after scheduling: {}", e);
            }
        }
    }

    info!("Email monitoring complete, scheduled {} interviews", scheduled_count);
    Ok(scheduled_count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_query_targets_invitation_replies() {
        assert_eq!(
            reply_search_query("ada@example.com"),
            "from:ada@example.com subject:\"Re: Interview Invitation\""
        );
    }

    #[test]
    fn proposed_times_parse_with_business_offset() {
        let utc = FixedOffset::east_opt(0).unwrap();
        let plus_one = FixedOffset::east_opt(3600).unwrap();
        let expected = Utc.with_ymd_and_hms(2025, 3, 4, 14, 0, 0).unwrap();
        assert_eq!(parse_proposed_time("2025-03-04T14:00:00", utc), Some(expected));
        assert_eq!(parse_proposed_time("\"2025-03-04T15:00:00\"", plus_one), Some(expected));
        assert_eq!(parse_proposed_time("2025-03-04T14:00:00Z", plus_one), Some(expected));
        assert_eq!(parse_proposed_time("No specific time found", utc), None);
        assert_eq!(parse_proposed_time("next tuesday maybe", utc), None);
    }

    #[test]
    fn attendees_skip_names_and_duplicates() {
        let interviewers = vec!["Bob".to_string(), "carol@corp.com".to_string(), "HR@corp.com".to_string()];
        let attendees = attendees_for("ada@example.com", "hr@corp.com", &interviewers);
        assert_eq!(attendees, vec!["ada@example.com", "hr@corp.com", "carol@corp.com"]);
    }
}
