use chrono::{Datelike, Months, NaiveDate};
use serde::Serialize;
use utoipa::ToSchema;

use super::UtilizationMode;
use crate::entities::project::{self, index_by_id, ProjectStatus};
use crate::entities::consultant;

pub const DEFAULT_FORECAST_TARGET: f64 = 85.0;
pub const DEFAULT_FORECAST_MONTHS: u32 = 6;

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub official_utilization: f64,
    pub expected_utilization: f64,
    pub target: f64,
}

/// Average allocation across all consultants on a single day.
pub fn point_utilization(
    consultants: &[consultant::Model],
    projects: &[project::Model],
    date: NaiveDate,
    mode: UtilizationMode,
) -> f64 {
    if consultants.is_empty() {
        return 0.0;
    }
    let by_id = index_by_id(projects);

    let allocated: f64 = consultants
        .iter()
        .flat_map(|c| c.resolved_assignments(&by_id))
        .filter(|(_, p)| p.is_active_on(date))
        .map(|(assignment, p)| {
            let weight = match (mode, p.status) {
                (UtilizationMode::Official, ProjectStatus::Started) => 1.0,
                (UtilizationMode::Official, _) => 0.0,
                (UtilizationMode::Expected, _) => p.expected_weight(),
            };
            assignment.percentage / 100.0 * weight
        })
        .sum();

    allocated / consultants.len() as f64 * 100.0
}

/// Dates sampled by the forecast: today, then the 2nd of each following month.
pub fn forecast_dates(today: NaiveDate, months: u32) -> Vec<NaiveDate> {
    let anchor = NaiveDate::from_ymd_opt(today.year(), today.month(), 2).unwrap_or(today);
    std::iter::once(today)
        .chain((1..=months).filter_map(|i| anchor.checked_add_months(Months::new(i))))
        .collect()
}

pub fn forecast(
    consultants: &[consultant::Model],
    projects: &[project::Model],
    today: NaiveDate,
    months: u32,
    target: f64,
) -> Vec<ForecastPoint> {
    forecast_dates(today, months)
        .into_iter()
        .map(|date| ForecastPoint {
            date,
            official_utilization: point_utilization(consultants, projects, date, UtilizationMode::Official),
            expected_utilization: point_utilization(consultants, projects, date, UtilizationMode::Expected),
            target,
        })
        .collect()
}
