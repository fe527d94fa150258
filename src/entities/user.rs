use sea_orm::entity::prelude::*;
use sea_orm::FromJsonQueryResult;
use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use utoipa::ToSchema;

/// OAuth tokens for the user's Google account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CalendarCredentials {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl CalendarCredentials {
    /// Treats tokens expiring within the next minute as already expired.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at <= now + chrono::Duration::seconds(60),
            None => false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "users")]
#[serde(rename_all = "camelCase")]
#[schema(as = User)]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    #[sea_orm(unique)]
    pub email: String,
    #[sea_orm(unique)]
    #[serde(skip_serializing)]
    pub api_token: String,
    pub is_admin: bool,
    #[sea_orm(column_type = "Json", nullable)]
    #[serde(skip_serializing)]
    pub calendar_credentials: Option<CalendarCredentials>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn credentials_expire_with_a_minute_of_slack() {
        let now = Utc.with_ymd_and_hms(2025, 3, 3, 12, 0, 0).unwrap();
        let creds = |expires_at| CalendarCredentials {
            access_token: "token".into(),
            refresh_token: None,
            expires_at,
        };
        assert!(!creds(None).is_expired(now));
        assert!(creds(Some(now + Duration::seconds(30))).is_expired(now));
        assert!(!creds(Some(now + Duration::minutes(10))).is_expired(now));
    }
}
