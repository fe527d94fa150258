//! Pure calculators over in-memory consultants and projects. Nothing in here
//! touches the database; handlers load the rows and pass slices in.

pub mod availability;
pub mod financial;
pub mod forecast;
pub mod utilization;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Official utilization counts only Started projects. Expected utilization
/// also counts Sold work and Discussions weighted by their chance to close.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum UtilizationMode {
    Official,
    Expected,
}
