pub mod consultant;
pub mod job;
pub mod organization;
pub mod project;
pub mod user;

use sea_orm::FromJsonQueryResult;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub use consultant::Entity as Consultant;
pub use job::Entity as Job;
pub use organization::Entity as Organization;
pub use project::Entity as Project;
pub use user::Entity as User;

/// Consultant and project names are unique per organization, ignoring case
/// and surrounding whitespace.
pub fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Plain list of strings stored as a JSON column (skills, required skills).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult, ToSchema)]
pub struct StringList(pub Vec<String>);

impl StringList {
    /// Splits a comma separated cell ("rust, sql,") into trimmed, non-empty entries.
    pub fn from_comma_separated(raw: &str) -> Self {
        StringList(
            raw.split(',')
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string())
                .collect(),
        )
    }
}

impl From<Vec<String>> for StringList {
    fn from(values: Vec<String>) -> Self {
        StringList(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_keys_ignore_case_and_padding() {
        assert_eq!(name_key(" Ada "), name_key("ada"));
        assert_ne!(name_key("Ada"), name_key("Ada L"));
    }
}
