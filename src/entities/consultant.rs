use sea_orm::entity::prelude::*;
use sea_orm::FromJsonQueryResult;
use serde::{Deserialize, Serialize};
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
use utoipa::ToSchema;

use super::project;
use super::StringList;

pub const DEFAULT_PICTURE: &str = "https://www.gravatar.com/avatar/?d=mp";

/// A consultant's share of one project.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub project_id: Uuid,
    /// Share of the consultant's time, 0-100
    pub percentage: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hourly_rate: Option<f64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, FromJsonQueryResult, ToSchema)]
pub struct Assignments(pub Vec<Assignment>);

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "consultants")]
#[serde(rename_all = "camelCase")]
#[schema(as = Consultant)]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    /// Level id from the organization taxonomy
    pub level: String,
    pub salary: f64,
    #[sea_orm(column_type = "Json")]
    pub skills: StringList,
    #[sea_orm(column_type = "Json")]
    pub assignments: Assignments,
    pub picture: String,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn assignment_for(&self, project_id: Uuid) -> Option<&Assignment> {
        self.assignments.0.iter().find(|a| a.project_id == project_id)
    }

    /// Assignments paired with their project, skipping ids that no longer resolve.
    pub fn resolved_assignments<'a>(
        &'a self,
        projects: &'a HashMap<Uuid, &'a project::Model>,
    ) -> impl Iterator<Item = (&'a Assignment, &'a project::Model)> + 'a {
        self.assignments
            .0
            .iter()
            .filter_map(move |a| projects.get(&a.project_id).map(|p| (a, *p)))
    }

    /// Sum of assignment percentages on projects running on `date`.
    pub fn allocated_on(&self, projects: &HashMap<Uuid, &project::Model>, date: NaiveDate) -> f64 {
        self.resolved_assignments(projects)
            .filter(|(_, p)| p.is_active_on(date))
            .map(|(a, _)| a.percentage)
            .sum()
    }
}
