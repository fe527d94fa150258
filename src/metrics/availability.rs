use chrono::{Duration, NaiveDate};
use serde::Serialize;
use std::collections::HashMap;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::project::{self, index_by_id};
use crate::entities::consultant;

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentSummary {
    pub project_id: Uuid,
    pub project_name: String,
    pub client: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BenchEntry {
    pub consultant_id: Uuid,
    pub name: String,
    pub level: String,
    pub skills: Vec<String>,
    /// Free capacity today, in percent
    pub availability: f64,
    /// First day without an active assignment; null when that day is past
    /// the end of the calendar
    pub available_from: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_assignment: Option<AssignmentSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_assignment: Option<AssignmentSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BenchReport {
    pub as_of: NaiveDate,
    pub horizon_days: i64,
    pub current: Vec<BenchEntry>,
    pub upcoming: Vec<BenchEntry>,
}

/// True when the consultant already sits on another project whose dates
/// overlap `target`.
pub fn has_conflicts(consultant_id: Uuid, target: &project::Model, all_projects: &[project::Model]) -> bool {
    all_projects
        .iter()
        .filter(|p| p.id != target.id && p.has_consultant(consultant_id))
        .any(|p| p.overlaps(target.start_date, target.end_date))
}

/// Remaining capacity on `date`, never below zero.
pub fn availability_at(consultant: &consultant::Model, projects: &[project::Model], date: NaiveDate) -> f64 {
    let by_id = index_by_id(projects);
    (100.0 - consultant.allocated_on(&by_id, date)).max(0.0)
}

fn summary(assignment: &consultant::Assignment, p: &project::Model) -> AssignmentSummary {
    AssignmentSummary {
        project_id: p.id,
        project_name: p.name.clone(),
        client: p.client.clone(),
        start_date: p.start_date,
        end_date: p.end_date,
        percentage: assignment.percentage,
    }
}

pub fn current_assignment(
    consultant: &consultant::Model,
    projects: &HashMap<Uuid, &project::Model>,
    today: NaiveDate,
) -> Option<AssignmentSummary> {
    consultant
        .resolved_assignments(projects)
        .filter(|(_, p)| p.is_active_on(today))
        .min_by_key(|(_, p)| p.end_date)
        .map(|(a, p)| summary(a, p))
}

pub fn next_assignment(
    consultant: &consultant::Model,
    projects: &HashMap<Uuid, &project::Model>,
    today: NaiveDate,
) -> Option<AssignmentSummary> {
    consultant
        .resolved_assignments(projects)
        .filter(|(_, p)| p.start_date > today)
        .min_by_key(|(_, p)| p.start_date)
        .map(|(a, p)| summary(a, p))
}

/// Walks forward from `today` through back-to-back assignments and returns
/// the first day with no active assignment.
fn free_from(
    consultant: &consultant::Model,
    projects: &HashMap<Uuid, &project::Model>,
    today: NaiveDate,
) -> Option<NaiveDate> {
    let mut day = today;
    loop {
        let busy_until = consultant
            .resolved_assignments(projects)
            .filter(|(_, p)| p.is_active_on(day))
            .map(|(_, p)| p.end_date)
            .max();
        match busy_until {
            Some(end) => day = end.succ_opt()?,
            None => return Some(day),
        }
    }
}

/// Consultants idle today, and those whose current work ends within
/// `horizon_days`, sorted by the date they free up.
pub fn bench(
    consultants: &[consultant::Model],
    projects: &[project::Model],
    today: NaiveDate,
    horizon_days: i64,
) -> BenchReport {
    let by_id = index_by_id(projects);
    let horizon_end = Duration::try_days(horizon_days)
        .and_then(|horizon| today.checked_add_signed(horizon))
        .unwrap_or(NaiveDate::MAX);

    let mut current = Vec::new();
    let mut upcoming = Vec::new();

    for c in consultants {
        let entry = BenchEntry {
            consultant_id: c.id,
            name: c.name.clone(),
            level: c.level.clone(),
            skills: c.skills.0.clone(),
            availability: (100.0 - c.allocated_on(&by_id, today)).max(0.0),
            available_from: free_from(c, &by_id, today),
            current_assignment: current_assignment(c, &by_id, today),
            next_assignment: next_assignment(c, &by_id, today),
        };

        if entry.current_assignment.is_none() {
            current.push(entry);
        } else if entry.available_from.is_some_and(|free| free <= horizon_end) {
            upcoming.push(entry);
        }
    }

    current.sort_by(|a, b| a.name.cmp(&b.name));
    upcoming.sort_by(|a, b| a.available_from.cmp(&b.available_from).then_with(|| a.name.cmp(&b.name)));

    BenchReport { as_of: today, horizon_days, current, upcoming }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::project::{AssignedConsultant, ProjectStatus};
    use crate::metrics::fixtures::{consultant, date, project};

    fn assign(p: &mut project::Model, c: &consultant::Model) {
        p.assigned_consultants.0.push(AssignedConsultant {
            consultant_id: c.id,
            name: c.name.clone(),
            level: c.level.clone(),
            percentage: 100.0,
            hourly_rate: None,
        });
    }

    #[test]
    fn overlapping_projects_conflict() {
        let ada = consultant("Ada", "junior", 0.0, vec![]);
        let mut busy = project(ProjectStatus::Started, date(2025, 1, 1), date(2025, 3, 31));
        assign(&mut busy, &ada);
        let overlapping = project(ProjectStatus::Sold, date(2025, 3, 31), date(2025, 6, 30));
        let later = project(ProjectStatus::Sold, date(2025, 4, 1), date(2025, 6, 30));
        let all = vec![busy.clone(), overlapping.clone(), later.clone()];

        assert!(has_conflicts(ada.id, &overlapping, &all));
        assert!(!has_conflicts(ada.id, &later, &all));
        // A project never conflicts with itself.
        assert!(!has_conflicts(ada.id, &busy, &all));
    }

    #[test]
    fn availability_subtracts_active_assignments() {
        let a = project(ProjectStatus::Started, date(2025, 1, 1), date(2025, 3, 31));
        let b = project(ProjectStatus::Started, date(2025, 3, 1), date(2025, 6, 30));
        let ada = consultant("Ada", "junior", 0.0, vec![(a.id, 60.0), (b.id, 70.0)]);
        let projects = vec![a, b];
        assert_eq!(availability_at(&ada, &projects, date(2025, 2, 1)), 40.0);
        assert_eq!(availability_at(&ada, &projects, date(2025, 3, 15)), 0.0);
        assert_eq!(availability_at(&ada, &projects, date(2025, 8, 1)), 100.0);
    }

    #[test]
    fn bench_splits_idle_and_soon_free() {
        let today = date(2025, 5, 1);
        let short = project(ProjectStatus::Started, date(2025, 4, 1), date(2025, 5, 10));
        let long = project(ProjectStatus::Started, date(2025, 4, 1), date(2025, 12, 31));
        let future = project(ProjectStatus::Sold, date(2025, 7, 1), date(2025, 8, 31));
        let people = vec![
            consultant("Idle", "junior", 0.0, vec![(future.id, 100.0)]),
            consultant("Soon", "junior", 0.0, vec![(short.id, 100.0)]),
            consultant("Busy", "junior", 0.0, vec![(long.id, 100.0)]),
        ];
        let report = bench(&people, &[short, long, future], today, 30);

        assert_eq!(report.current.len(), 1);
        assert_eq!(report.current[0].name, "Idle");
        assert_eq!(report.current[0].next_assignment.as_ref().unwrap().start_date, date(2025, 7, 1));
        assert_eq!(report.upcoming.len(), 1);
        assert_eq!(report.upcoming[0].name, "Soon");
        assert_eq!(report.upcoming[0].available_from, Some(date(2025, 5, 11)));
    }

    #[test]
    fn back_to_back_assignments_extend_the_free_date() {
        let today = date(2025, 5, 1);
        let first = project(ProjectStatus::Started, date(2025, 4, 1), date(2025, 5, 10));
        let second = project(ProjectStatus::Sold, date(2025, 5, 11), date(2025, 5, 20));
        let people = vec![consultant("Ada", "junior", 0.0, vec![(first.id, 100.0), (second.id, 100.0)])];
        let report = bench(&people, &[first, second], today, 30);
        assert_eq!(report.upcoming[0].available_from, Some(date(2025, 5, 21)));
    }

    #[test]
    fn assignment_ending_on_the_last_calendar_day_never_frees_up() {
        let today = date(2025, 5, 1);
        let endless = project(ProjectStatus::Started, date(2025, 1, 1), NaiveDate::MAX);
        let people = vec![consultant("Ada", "junior", 0.0, vec![(endless.id, 100.0)])];
        let report = bench(&people, &[endless], NaiveDate::MAX, 365);
        assert!(report.current.is_empty());
        assert!(report.upcoming.is_empty());

        let endless = project(ProjectStatus::Started, date(2025, 1, 1), NaiveDate::MAX);
        let people = vec![consultant("Ada", "junior", 0.0, vec![(endless.id, 100.0)])];
        let report = bench(&people, &[endless], today, 30);
        assert!(report.upcoming.is_empty());
    }
}
