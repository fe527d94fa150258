use sea_orm::entity::prelude::*;
use sea_orm::FromJsonQueryResult;
use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use utoipa::ToSchema;

#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "lowercase")]
pub enum PlanType {
    #[sea_orm(string_value = "free")]
    Free,
    #[sea_orm(string_value = "premium")]
    Premium,
}

/// One entry of the organization's seniority taxonomy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConsultantLevel {
    /// Stable identifier stored on consultants, e.g. "junior"
    pub id: String,
    /// Display name, e.g. "Junior Consultant"
    pub name: String,
    /// Sort key, 1 = most junior
    pub order: i32,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult, ToSchema)]
pub struct ConsultantLevels(pub Vec<ConsultantLevel>);

impl Default for ConsultantLevels {
    fn default() -> Self {
        let level = |id: &str, name: &str, order: i32| ConsultantLevel {
            id: id.to_string(),
            name: name.to_string(),
            order,
            is_active: true,
        };
        ConsultantLevels(vec![
            level("junior", "Junior", 1),
            level("manager", "Manager", 2),
            level("partner", "Partner", 3),
        ])
    }
}

impl ConsultantLevels {
    /// Active levels ordered from most junior to most senior.
    pub fn active_sorted(&self) -> Vec<ConsultantLevel> {
        let mut levels: Vec<ConsultantLevel> =
            self.0.iter().filter(|l| l.is_active).cloned().collect();
        levels.sort_by_key(|l| l.order);
        levels
    }

    /// Resolves a stored level id to its display name. Unknown ids are shown
    /// with underscores turned into spaces.
    pub fn display_name(&self, level_id: &str) -> String {
        if level_id.is_empty() {
            return "Unknown Level".to_string();
        }
        self.0
            .iter()
            .find(|l| l.id == level_id)
            .map(|l| l.name.clone())
            .unwrap_or_else(|| level_id.replace('_', " "))
    }

    pub fn is_active_id(&self, level_id: &str) -> bool {
        self.0
            .iter()
            .any(|l| l.is_active && l.id.eq_ignore_ascii_case(level_id))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Onboarding {
    #[serde(default)]
    pub has_consultants: bool,
    #[serde(default)]
    pub has_projects: bool,
    #[serde(default)]
    pub has_jobs: bool,
    #[serde(default)]
    pub tutorial_dismissed: bool,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "organizations")]
#[serde(rename_all = "camelCase")]
#[schema(as = Organization)]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    #[sea_orm(column_type = "Text")]
    pub description: String,
    #[sea_orm(column_type = "Text")]
    pub perks: String,
    pub plan_type: PlanType,
    #[sea_orm(column_type = "Json")]
    pub consultant_levels: ConsultantLevels,
    #[sea_orm(column_type = "Json")]
    pub onboarding: Onboarding,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn is_free_plan(&self) -> bool {
        self.plan_type == PlanType::Free
    }
}
