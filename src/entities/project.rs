use sea_orm::entity::prelude::*;
use sea_orm::FromJsonQueryResult;
use serde::{Deserialize, Serialize};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use std::collections::HashMap;
use std::fmt;
use std::ops::RangeInclusive;
use utoipa::ToSchema;

use super::StringList;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
pub enum ProjectStatus {
    #[sea_orm(string_value = "Discussions")]
    Discussions,
    #[sea_orm(string_value = "Sold")]
    Sold,
    #[sea_orm(string_value = "Started")]
    Started,
    #[sea_orm(string_value = "Completed")]
    Completed,
}

impl ProjectStatus {
    pub const ALL: [ProjectStatus; 4] = [
        ProjectStatus::Discussions,
        ProjectStatus::Sold,
        ProjectStatus::Started,
        ProjectStatus::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Discussions => "Discussions",
            ProjectStatus::Sold => "Sold",
            ProjectStatus::Started => "Started",
            ProjectStatus::Completed => "Completed",
        }
    }

    /// Trims and matches case-insensitively, so `" started "` reads as `Started`.
    pub fn normalize(raw: &str) -> Option<ProjectStatus> {
        let trimmed = raw.trim();
        Self::ALL
            .into_iter()
            .find(|s| s.as_str().eq_ignore_ascii_case(trimmed))
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Years accepted for project dates and as-of dates.
pub const SUPPORTED_YEARS: RangeInclusive<i32> = 1900..=9999;

pub fn is_supported_date(date: NaiveDate) -> bool {
    SUPPORTED_YEARS.contains(&date.year())
}

/// Target head count per seniority level. Fractions are allowed (half a partner).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, FromJsonQueryResult, ToSchema)]
pub struct TeamSize {
    #[serde(default)]
    pub junior: f64,
    #[serde(default)]
    pub manager: f64,
    #[serde(default)]
    pub partner: f64,
}

/// Snapshot of a consultant on the project side of an assignment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AssignedConsultant {
    pub consultant_id: Uuid,
    pub name: String,
    pub level: String,
    pub percentage: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hourly_rate: Option<f64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, FromJsonQueryResult, ToSchema)]
pub struct AssignedConsultants(pub Vec<AssignedConsultant>);

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "projects")]
#[serde(rename_all = "camelCase")]
#[schema(as = Project)]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub client: String,
    #[sea_orm(column_type = "Json")]
    pub required_skills: StringList,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: ProjectStatus,
    #[sea_orm(column_type = "Json")]
    pub team_size: TeamSize,
    /// Probability (0-100) of winning a project still in Discussions
    pub chance_to_close: i32,
    #[sea_orm(column_type = "Json")]
    pub assigned_consultants: AssignedConsultants,
    pub updated_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Inclusive on both ends.
    pub fn is_active_on(&self, date: NaiveDate) -> bool {
        self.start_date <= date && self.end_date >= date
    }

    pub fn overlaps(&self, start: NaiveDate, end: NaiveDate) -> bool {
        self.start_date <= end && self.end_date >= start
    }

    /// Weight applied to expected utilization. Completed projects carry none.
    pub fn expected_weight(&self) -> f64 {
        match self.status {
            ProjectStatus::Started | ProjectStatus::Sold => 1.0,
            ProjectStatus::Discussions => f64::from(self.chance_to_close) / 100.0,
            ProjectStatus::Completed => 0.0,
        }
    }

    pub fn has_consultant(&self, consultant_id: Uuid) -> bool {
        self.assigned_consultants
            .0
            .iter()
            .any(|c| c.consultant_id == consultant_id)
    }
}

/// Index projects by id for the calculators.
pub fn index_by_id(projects: &[Model]) -> HashMap<Uuid, &Model> {
    projects.iter().map(|p| (p.id, p)).collect()
}
