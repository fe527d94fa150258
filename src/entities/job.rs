use sea_orm::entity::prelude::*;
use sea_orm::FromJsonQueryResult;
use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use utoipa::ToSchema;

#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
pub enum JobStatus {
    #[sea_orm(string_value = "Draft")]
    Draft,
    #[sea_orm(string_value = "Published")]
    Published,
    #[sea_orm(string_value = "Closed")]
    Closed,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum CandidateStatus {
    #[default]
    New,
    Shortlisted,
    Interviewing,
    Rejected,
    Offered,
    Hired,
}

impl CandidateStatus {
    pub const ALL: [CandidateStatus; 6] = [
        CandidateStatus::New,
        CandidateStatus::Shortlisted,
        CandidateStatus::Interviewing,
        CandidateStatus::Rejected,
        CandidateStatus::Offered,
        CandidateStatus::Hired,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CandidateStatus::New => "New",
            CandidateStatus::Shortlisted => "Shortlisted",
            CandidateStatus::Interviewing => "Interviewing",
            CandidateStatus::Rejected => "Rejected",
            CandidateStatus::Offered => "Offered",
            CandidateStatus::Hired => "Hired",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum FeedbackDecision {
    Go,
    #[serde(rename = "No Go")]
    NoGo,
    Pending,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InterviewFeedback {
    pub round_index: i32,
    pub interviewer_email: String,
    pub decision: FeedbackDecision,
    #[serde(default)]
    pub comments: String,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InterviewRound {
    pub name: String,
    #[serde(default)]
    pub interviewers: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, FromJsonQueryResult, ToSchema)]
pub struct InterviewRounds(pub Vec<InterviewRound>);

/// An applicant, stored inside its job.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub cover_letter: Option<String>,
    #[serde(default)]
    pub resume_url: Option<String>,
    #[serde(default)]
    pub status: CandidateStatus,
    /// 0 until the first interview round starts
    #[serde(default)]
    pub current_round: i32,
    #[serde(default)]
    pub score: Option<i32>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub salary_expectation: Option<f64>,
    #[serde(default)]
    pub visa_required: Option<bool>,
    #[serde(default)]
    pub available_from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub interview_feedback: Vec<InterviewFeedback>,
    #[serde(default)]
    pub interview_scheduled: bool,
    #[serde(default)]
    pub interview_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub calendar_event_id: Option<String>,
    #[serde(default)]
    pub applied_at: Option<DateTime<Utc>>,
}

impl Candidate {
    /// Unscored candidates and those whose previous screening fell back to 0.
    pub fn needs_screening(&self) -> bool {
        matches!(self.score, None | Some(0))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, FromJsonQueryResult, ToSchema)]
pub struct Candidates(pub Vec<Candidate>);

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "jobs")]
#[serde(rename_all = "camelCase")]
#[schema(as = Job)]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub organization_id: Uuid,
    pub created_by: Uuid,
    pub title: String,
    pub department: String,
    pub location: String,
    #[sea_orm(column_type = "Text")]
    pub job_description: String,
    pub salary_min: Option<f64>,
    pub salary_max: Option<f64>,
    pub visa_sponsorship: bool,
    pub shortlist_count: i32,
    #[sea_orm(column_type = "Text", nullable)]
    pub additional_instructions: Option<String>,
    #[sea_orm(column_type = "Json")]
    pub interview_rounds: InterviewRounds,
    #[sea_orm(unique)]
    pub public_link: String,
    pub status: JobStatus,
    #[sea_orm(column_type = "Json")]
    pub candidates: Candidates,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn candidate_mut(&mut self, candidate_id: Uuid) -> Option<&mut Candidate> {
        self.candidates.0.iter_mut().find(|c| c.id == candidate_id)
    }

    /// Round the candidate is currently in, counting from 1.
    pub fn round_for(&self, candidate: &Candidate) -> Option<&InterviewRound> {
        let round = if candidate.current_round > 0 { candidate.current_round } else { 1 };
        self.interview_rounds.0.get((round - 1) as usize)
    }
}
