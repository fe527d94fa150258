use chrono::{Datelike, Duration, Months, NaiveDate};
use serde::Serialize;
use std::collections::BTreeMap;
use utoipa::ToSchema;

use super::UtilizationMode;
use crate::entities::project::{self, ProjectStatus};
use crate::entities::{consultant, project::index_by_id};

pub const DEFAULT_TARGET: f64 = 75.0;

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct PeriodMetric {
    pub current: f64,
    pub target: f64,
    pub delta: f64,
}

impl PeriodMetric {
    fn new(current: f64, target: f64) -> Self {
        PeriodMetric { current, target, delta: current - target }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UtilizationMetrics {
    pub ytd: PeriodMetric,
    pub qtd: PeriodMetric,
    pub mtd: PeriodMetric,
    pub wtd: PeriodMetric,
    /// Full calendar months, oldest first, ending with the current month
    pub last_twelve_months: Vec<f64>,
    pub average_last_year: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ConsultantUtilization {
    pub name: String,
    pub utilization: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LevelUtilization {
    pub level: String,
    pub average_utilization: f64,
    pub consultant_count: usize,
    pub consultants: Vec<ConsultantUtilization>,
}

/// Days between two dates counting both ends, never less than 1.
fn inclusive_days(start: NaiveDate, end: NaiveDate) -> f64 {
    ((end - start).num_days() + 1).max(1) as f64
}

fn period(
    consultants: &[consultant::Model],
    projects: &[project::Model],
    start: NaiveDate,
    end: NaiveDate,
    mode: UtilizationMode,
) -> f64 {
    if consultants.is_empty() {
        return 0.0;
    }
    let by_id = index_by_id(projects);
    let window_days = inclusive_days(start, end);

    let assigned_days: f64 = consultants
        .iter()
        .flat_map(|c| c.resolved_assignments(&by_id))
        .filter(|(_, p)| p.overlaps(start, end))
        .map(|(assignment, p)| {
            let weight = match mode {
                UtilizationMode::Official if p.status == ProjectStatus::Started => 1.0,
                UtilizationMode::Official => 0.0,
                UtilizationMode::Expected => p.expected_weight(),
            };
            let overlap = inclusive_days(p.start_date.max(start), p.end_date.min(end));
            overlap * assignment.percentage / 100.0 * weight
        })
        .sum();

    assigned_days / (consultants.len() as f64 * window_days) * 100.0
}

/// Share of consultant-days in `[start, end]` spent on Started projects.
pub fn period_utilization(
    consultants: &[consultant::Model],
    projects: &[project::Model],
    start: NaiveDate,
    end: NaiveDate,
) -> f64 {
    period(consultants, projects, start, end, UtilizationMode::Official)
}

/// Like [`period_utilization`] but pipeline work is weighted in.
pub fn expected_period_utilization(
    consultants: &[consultant::Model],
    projects: &[project::Model],
    start: NaiveDate,
    end: NaiveDate,
) -> f64 {
    period(consultants, projects, start, end, UtilizationMode::Expected)
}

pub fn start_of_week(today: NaiveDate) -> NaiveDate {
    today - Duration::days(today.weekday().num_days_from_monday() as i64)
}

fn start_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

fn start_of_quarter(today: NaiveDate) -> NaiveDate {
    let month = (today.month0() / 3) * 3 + 1;
    NaiveDate::from_ymd_opt(today.year(), month, 1).unwrap_or(today)
}

fn start_of_year(today: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(today.year(), 1, 1).unwrap_or(today)
}

/// Calendar months ending with the one containing `today`, oldest first.
fn last_twelve_month_windows(today: NaiveDate) -> Vec<(NaiveDate, NaiveDate)> {
    let this_month = start_of_month(today);
    (0..12u32)
        .rev()
        .filter_map(|back| {
            let start = this_month.checked_sub_months(Months::new(back))?;
            let end = start.checked_add_months(Months::new(1))?.pred_opt()?;
            Some((start, end))
        })
        .collect()
}

pub fn utilization_metrics(
    consultants: &[consultant::Model],
    projects: &[project::Model],
    today: NaiveDate,
    target: f64,
) -> UtilizationMetrics {
    let last_twelve_months: Vec<f64> = last_twelve_month_windows(today)
        .into_iter()
        .map(|(start, end)| period_utilization(consultants, projects, start, end))
        .collect();
    let average_last_year = last_twelve_months.iter().sum::<f64>() / 12.0;

    let to_date = |start| PeriodMetric::new(period_utilization(consultants, projects, start, today), target);

    UtilizationMetrics {
        ytd: to_date(start_of_year(today)),
        qtd: to_date(start_of_quarter(today)),
        mtd: to_date(start_of_month(today)),
        wtd: to_date(start_of_week(today)),
        last_twelve_months,
        average_last_year,
    }
}

/// Levels ranked by the mean of their consultants' trailing-year utilization.
pub fn utilization_ranking(
    consultants: &[consultant::Model],
    projects: &[project::Model],
    today: NaiveDate,
) -> Vec<LevelUtilization> {
    let mut groups: BTreeMap<&str, Vec<&consultant::Model>> = BTreeMap::new();
    for c in consultants {
        groups.entry(c.level.as_str()).or_default().push(c);
    }

    let mut levels: Vec<LevelUtilization> = groups
        .into_iter()
        .map(|(level, members)| {
            let mut ranked: Vec<ConsultantUtilization> = members
                .iter()
                .map(|c| ConsultantUtilization {
                    name: c.name.clone(),
                    utilization: utilization_metrics(std::slice::from_ref(*c), projects, today, DEFAULT_TARGET)
                        .average_last_year,
                })
                .collect();
            ranked.sort_by(|a, b| b.utilization.total_cmp(&a.utilization));

            let average_utilization = ranked.iter().map(|c| c.utilization).sum::<f64>() / ranked.len() as f64;
            LevelUtilization {
                level: level.to_string(),
                average_utilization,
                consultant_count: members.len(),
                consultants: ranked,
            }
        })
        .collect();

    levels.sort_by(|a, b| b.average_utilization.total_cmp(&a.average_utilization));
    levels
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::fixtures::{consultant, date, project};

    #[test]
    fn no_assignments_means_zero() {
        let people = vec![consultant("Ada", "junior", 50_000.0, vec![])];
        let projects = vec![project(ProjectStatus::Started, date(2025, 1, 1), date(2025, 12, 31))];
        assert_eq!(period_utilization(&people, &projects, date(2025, 3, 1), date(2025, 3, 31)), 0.0);
        assert_eq!(period_utilization(&[], &projects, date(2025, 3, 1), date(2025, 3, 31)), 0.0);
    }

    #[test]
    fn full_assignment_over_the_window_is_one_hundred() {
        let p = project(ProjectStatus::Started, date(2025, 1, 1), date(2025, 12, 31));
        let people = vec![consultant("Ada", "junior", 50_000.0, vec![(p.id, 100.0)])];
        let value = period_utilization(&people, &[p], date(2025, 3, 1), date(2025, 3, 31));
        assert!((value - 100.0).abs() < 1e-9);
    }

    #[test]
    fn partial_overlap_counts_only_shared_days() {
        // Ten of thirty-one March days at 50%.
        let p = project(ProjectStatus::Started, date(2025, 3, 22), date(2025, 4, 30));
        let people = vec![consultant("Ada", "junior", 50_000.0, vec![(p.id, 50.0)])];
        let value = period_utilization(&people, &[p], date(2025, 3, 1), date(2025, 3, 31));
        assert!((value - 10.0 * 0.5 / 31.0 * 100.0).abs() < 1e-9);
    }

    #[test]
    fn official_mode_ignores_pipeline_work() {
        let sold = project(ProjectStatus::Sold, date(2025, 1, 1), date(2025, 12, 31));
        let people = vec![consultant("Ada", "junior", 50_000.0, vec![(sold.id, 100.0)])];
        let projects = vec![sold];
        assert_eq!(period_utilization(&people, &projects, date(2025, 3, 1), date(2025, 3, 31)), 0.0);
        let expected = expected_period_utilization(&people, &projects, date(2025, 3, 1), date(2025, 3, 31));
        assert!((expected - 100.0).abs() < 1e-9);
    }

    #[test]
    fn discussions_are_weighted_by_chance_to_close() {
        let started = project(ProjectStatus::Started, date(2025, 1, 1), date(2025, 12, 31));
        let mut talks = project(ProjectStatus::Discussions, date(2025, 1, 1), date(2025, 12, 31));
        talks.chance_to_close = 50;
        let a = vec![consultant("Ada", "junior", 0.0, vec![(started.id, 100.0)])];
        let b = vec![consultant("Bo", "junior", 0.0, vec![(talks.id, 100.0)])];
        let projects = vec![started, talks];
        let (from, to) = (date(2025, 6, 1), date(2025, 6, 30));
        let full = expected_period_utilization(&a, &projects, from, to);
        let half = expected_period_utilization(&b, &projects, from, to);
        assert!((half * 2.0 - full).abs() < 1e-9);
    }

    #[test]
    fn completed_projects_never_count() {
        let done = project(ProjectStatus::Completed, date(2025, 1, 1), date(2025, 12, 31));
        let people = vec![consultant("Ada", "junior", 0.0, vec![(done.id, 100.0)])];
        let projects = vec![done];
        assert_eq!(expected_period_utilization(&people, &projects, date(2025, 3, 1), date(2025, 3, 31)), 0.0);
    }

    #[test]
    fn unknown_projects_are_ignored() {
        let people = vec![consultant("Ada", "junior", 0.0, vec![(uuid::Uuid::new_v4(), 100.0)])];
        assert_eq!(period_utilization(&people, &[], date(2025, 3, 1), date(2025, 3, 31)), 0.0);
    }

    #[test]
    fn week_starts_on_monday() {
        // 2025-03-05 is a Wednesday, 2025-03-09 a Sunday.
        assert_eq!(start_of_week(date(2025, 3, 5)), date(2025, 3, 3));
        assert_eq!(start_of_week(date(2025, 3, 9)), date(2025, 3, 3));
        assert_eq!(start_of_week(date(2025, 3, 3)), date(2025, 3, 3));
    }

    #[test]
    fn twelve_month_windows_end_with_current_month() {
        let windows = last_twelve_month_windows(date(2025, 3, 15));
        assert_eq!(windows.len(), 12);
        assert_eq!(windows[0], (date(2024, 4, 1), date(2024, 4, 30)));
        assert_eq!(windows[10], (date(2025, 2, 1), date(2025, 2, 28)));
        assert_eq!(windows[11], (date(2025, 3, 1), date(2025, 3, 31)));
    }

    #[test]
    fn metrics_report_delta_against_target() {
        let p = project(ProjectStatus::Started, date(2024, 1, 1), date(2025, 12, 31));
        let people = vec![consultant("Ada", "junior", 0.0, vec![(p.id, 100.0)])];
        let metrics = utilization_metrics(&people, &[p], date(2025, 5, 14), DEFAULT_TARGET);
        assert!((metrics.mtd.current - 100.0).abs() < 1e-9);
        assert!((metrics.mtd.delta - 25.0).abs() < 1e-9);
        assert!((metrics.average_last_year - 100.0).abs() < 1e-9);
    }

    #[test]
    fn ranking_orders_levels_and_consultants() {
        let p = project(ProjectStatus::Started, date(2024, 1, 1), date(2025, 12, 31));
        let people = vec![
            consultant("Ada", "junior", 0.0, vec![(p.id, 20.0)]),
            consultant("Bo", "junior", 0.0, vec![(p.id, 60.0)]),
            consultant("Cy", "partner", 0.0, vec![(p.id, 80.0)]),
        ];
        let ranking = utilization_ranking(&people, &[p], date(2025, 5, 14));
        assert_eq!(ranking[0].level, "partner");
        assert_eq!(ranking[1].level, "junior");
        assert_eq!(ranking[1].consultant_count, 2);
        assert_eq!(ranking[1].consultants[0].name, "Bo");
        assert!((ranking[1].average_utilization - 40.0).abs() < 1e-9);
    }
}
