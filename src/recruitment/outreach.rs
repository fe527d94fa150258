use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::entities::job::{self, CandidateStatus};
use crate::error::AppError;
use crate::integrations::google::GoogleClient;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SchedulingMethod {
    Calendly,
    #[default]
    Manual,
}

/// How the candidate should pick an interview time.
#[derive(Debug, Clone, Default)]
pub struct Invitation {
    pub template: String,
    pub scheduling_details: String,
    pub method: SchedulingMethod,
    pub calendly_link: Option<String>,
    pub available_dates: Option<String>,
}

impl Invitation {
    /// Replies arrive as "Re: Interview Invitation: ..." which the monitor searches for.
    pub fn subject(&self, job_title: &str) -> String {
        format!("Interview Invitation: {}", job_title)
    }

    pub fn body(&self, candidate_name: &str) -> String {
        self.template
            .replace("{{candidate_name}}", candidate_name)
            .replace("{{scheduling_details}}", &self.scheduling_details)
    }

    pub fn note(&self, now: DateTime<Utc>) -> String {
        let scheduling = match self.method {
            SchedulingMethod::Calendly => format!("Calendly link: {}", self.calendly_link.as_deref().unwrap_or("")),
            SchedulingMethod::Manual => format!("Available dates: {}", self.available_dates.as_deref().unwrap_or("")),
        };
        format!("[{}] Interview invitation sent. {}", now.to_rfc3339(), scheduling)
    }
}

/// Emails every selected candidate of the job. New and Shortlisted candidates
/// move to Interviewing round 1 once their email is out. A failed send is
/// logged and leaves that candidate untouched. Returns how many were sent.
#[tracing::instrument(skip_all, fields(job_id = %job.id))]
pub async fn contact_candidates(
    google: &GoogleClient<'_>,
    job: &mut job::Model,
    candidate_ids: &[uuid::Uuid],
    invitation: &Invitation,
) -> Result<usize, AppError> {
    let selected: Vec<usize> = job
        .candidates
        .0
        .iter()
        .enumerate()
        .filter(|(_, c)| candidate_ids.contains(&c.id))
        .map(|(i, _)| i)
        .collect();
    if selected.is_empty() {
        return Err(AppError::NotFound("Matching candidates".to_string()));
    }

    let subject = invitation.subject(&job.title);
    let mut sent = 0;
    let mut last_error = None;
    for index in selected {
        let candidate = &mut job.candidates.0[index];
        if let Err(e) = google.send_message(&candidate.email, &subject, &invitation.body(&candidate.name)).await {
            warn!(candidate_id = %candidate.id, "Invitation not sent: {}", e);
            last_error = Some(e);
            continue;
        }

        if matches!(candidate.status, CandidateStatus::New | CandidateStatus::Shortlisted) {
            candidate.status = CandidateStatus::Interviewing;
            candidate.current_round = 1;
        }
        let note = invitation.note(Utc::now());
        candidate.notes = Some(match candidate.notes.take() {
            Some(existing) if !existing.is_empty() => format!("{}\n{}", existing, note),
            _ => note,
        });
        sent += 1;
    }

    match (sent, last_error) {
        (0, Some(e)) => Err(e),
        _ => {
            info!("Sent {} interview invitations", sent);
            Ok(sent)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn invitation(method: SchedulingMethod) -> Invitation {
        Invitation {
            template: "Hi {{candidate_name}}, {{scheduling_details}} Thanks {{candidate_name}}!".to_string(),
            scheduling_details: "pick a slot".to_string(),
            method,
            calendly_link: Some("https://calendly.com/acme".to_string()),
            available_dates: Some("May 5 or May 6".to_string()),
        }
    }

    #[test]
    fn template_placeholders_are_filled_everywhere() {
        let body = invitation(SchedulingMethod::Manual).body("Ada");
        assert_eq!(body, "Hi Ada, pick a slot Thanks Ada!");
    }

    #[test]
    fn note_names_the_scheduling_method() {
        let now = Utc.with_ymd_and_hms(2025, 5, 1, 9, 0, 0).unwrap();
        let calendly = invitation(SchedulingMethod::Calendly).note(now);
        assert!(calendly.starts_with("[2025-05-01T09:00:00+00:00] Interview invitation sent."));
        assert!(calendly.ends_with("Calendly link: https://calendly.com/acme"));
        assert!(invitation(SchedulingMethod::Manual).note(now).ends_with("Available dates: May 5 or May 6"));
    }

    #[test]
    fn subject_matches_reply_search() {
        let subject = invitation(SchedulingMethod::Manual).subject("Rust Engineer");
        assert_eq!(subject, "Interview Invitation: Rust Engineer");
        assert!(format!("Re: {}", subject).starts_with(crate::recruitment::monitor::INVITATION_SUBJECT));
    }
}
