use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use utoipa::ToSchema;
use uuid::Uuid;

use super::utilization::{utilization_metrics, DEFAULT_TARGET};
use crate::entities::{consultant, project};

/// Consultants at or above this trailing-year utilization count as highly utilized.
pub const HIGH_UTILIZATION_THRESHOLD: f64 = 75.0;
pub const WORKING_DAYS_PER_YEAR: f64 = 252.0;
pub const HOURS_PER_WEEK: f64 = 40.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct CostBreakdown {
    pub salaries: f64,
    pub benefits: f64,
    pub overhead: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct WorkforceCost {
    pub annual: f64,
    pub monthly: f64,
    pub breakdown: CostBreakdown,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ConsultantRef {
    pub id: Uuid,
    pub name: String,
    pub level: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct SalaryExtreme {
    pub amount: f64,
    pub consultant: Option<ConsultantRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct LevelSalary {
    pub total: f64,
    pub average: f64,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SalaryGroup {
    pub average_salary: f64,
    pub consultant_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UtilizationCorrelation {
    pub high_utilization: SalaryGroup,
    pub low_utilization: SalaryGroup,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FinancialMetrics {
    pub total_annual_salaries: f64,
    pub average_salary: f64,
    pub median_salary: f64,
    pub highest_salary: SalaryExtreme,
    pub lowest_salary: SalaryExtreme,
    pub salary_by_level: BTreeMap<String, LevelSalary>,
    pub utilization_correlation: UtilizationCorrelation,
    pub total_workforce_cost: WorkforceCost,
    pub monthly_burn_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConsultantMargin {
    pub consultant_id: Uuid,
    pub name: String,
    pub level: String,
    pub percentage: f64,
    pub hourly_rate: f64,
    pub daily_salary: f64,
    pub revenue: f64,
    pub cost: f64,
    pub profit: f64,
    pub margin: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProjectFinancials {
    pub project_id: Uuid,
    pub weeks: i64,
    pub working_days: i64,
    pub total_revenue: f64,
    pub total_cost: f64,
    pub total_profit: f64,
    pub margin: f64,
    pub weekly_revenue: f64,
    pub consultants: Vec<ConsultantMargin>,
}

fn margin_pct(revenue: f64, profit: f64) -> f64 {
    if revenue > 0.0 {
        profit / revenue * 100.0
    } else {
        0.0
    }
}

fn salary_group(salaries: &[f64]) -> SalaryGroup {
    SalaryGroup {
        average_salary: salaries.iter().sum::<f64>() / salaries.len().max(1) as f64,
        consultant_count: salaries.len(),
    }
}

/// Benefits and overhead are carried at a zero rate.
pub fn total_workforce_cost(consultants: &[consultant::Model]) -> WorkforceCost {
    let salaries: f64 = consultants.iter().map(|c| c.salary).sum();
    let annual = salaries;
    WorkforceCost {
        annual,
        monthly: annual / 12.0,
        breakdown: CostBreakdown { salaries, benefits: 0.0, overhead: 0.0 },
    }
}

pub fn financial_metrics(
    consultants: &[consultant::Model],
    projects: &[project::Model],
    today: NaiveDate,
) -> FinancialMetrics {
    if consultants.is_empty() {
        return FinancialMetrics::default();
    }

    let mut by_salary: Vec<&consultant::Model> = consultants.iter().collect();
    by_salary.sort_by(|a, b| a.salary.total_cmp(&b.salary));

    let mid = by_salary.len() / 2;
    let median_salary = if by_salary.len() % 2 == 0 {
        (by_salary[mid - 1].salary + by_salary[mid].salary) / 2.0
    } else {
        by_salary[mid].salary
    };

    let extreme = |c: &consultant::Model| SalaryExtreme {
        amount: c.salary,
        consultant: Some(ConsultantRef { id: c.id, name: c.name.clone(), level: c.level.clone() }),
    };

    let mut salary_by_level: BTreeMap<String, LevelSalary> = BTreeMap::new();
    for c in consultants {
        let entry = salary_by_level.entry(c.level.clone()).or_default();
        entry.total += c.salary;
        entry.count += 1;
        entry.average = entry.total / entry.count as f64;
    }

    let (high, low): (Vec<f64>, Vec<f64>) = {
        let mut high = Vec::new();
        let mut low = Vec::new();
        for c in consultants {
            let average = utilization_metrics(std::slice::from_ref(c), projects, today, DEFAULT_TARGET)
                .average_last_year;
            if average >= HIGH_UTILIZATION_THRESHOLD {
                high.push(c.salary);
            } else {
                low.push(c.salary);
            }
        }
        (high, low)
    };

    let total_workforce_cost = total_workforce_cost(consultants);
    let total_annual_salaries = total_workforce_cost.breakdown.salaries;

    FinancialMetrics {
        total_annual_salaries,
        average_salary: total_annual_salaries / consultants.len() as f64,
        median_salary,
        highest_salary: by_salary.last().map(|c| extreme(*c)).unwrap_or_default(),
        lowest_salary: by_salary.first().map(|c| extreme(*c)).unwrap_or_default(),
        salary_by_level,
        utilization_correlation: UtilizationCorrelation {
            high_utilization: salary_group(&high),
            low_utilization: salary_group(&low),
        },
        monthly_burn_rate: total_workforce_cost.monthly,
        total_workforce_cost,
    }
}

/// Revenue, cost and margin of one project from its assignment snapshots.
/// Consultants that no longer exist are costed at a zero salary.
pub fn project_financials(project: &project::Model, consultants: &[consultant::Model]) -> ProjectFinancials {
    let weeks = ((project.end_date - project.start_date).num_weeks()).max(1);
    let working_days = weeks * 5;

    let salaries: HashMap<Uuid, f64> = consultants.iter().map(|c| (c.id, c.salary)).collect();

    let mut rows: Vec<ConsultantMargin> = project
        .assigned_consultants
        .0
        .iter()
        .map(|assigned| {
            let salary = salaries.get(&assigned.consultant_id).copied().unwrap_or(0.0);
            let share = assigned.percentage / 100.0;
            let hourly_rate = assigned.hourly_rate.unwrap_or(0.0);
            let daily_salary = salary / WORKING_DAYS_PER_YEAR;

            let revenue = hourly_rate * share * HOURS_PER_WEEK * weeks as f64;
            let cost = daily_salary * share * working_days as f64;
            let profit = revenue - cost;
            ConsultantMargin {
                consultant_id: assigned.consultant_id,
                name: assigned.name.clone(),
                level: assigned.level.clone(),
                percentage: assigned.percentage,
                hourly_rate,
                daily_salary,
                revenue,
                cost,
                profit,
                margin: margin_pct(revenue, profit),
            }
        })
        .collect();
    rows.sort_by(|a, b| b.margin.total_cmp(&a.margin));

    let total_revenue: f64 = rows.iter().map(|r| r.revenue).sum();
    let total_cost: f64 = rows.iter().map(|r| r.cost).sum();
    let total_profit = total_revenue - total_cost;

    ProjectFinancials {
        project_id: project.id,
        weeks,
        working_days,
        total_revenue,
        total_cost,
        total_profit,
        margin: margin_pct(total_revenue, total_profit),
        weekly_revenue: total_revenue / weeks as f64,
        consultants: rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::project::{AssignedConsultant, ProjectStatus};
    use crate::metrics::fixtures::{consultant, date, project};

    #[test]
    fn empty_workforce_is_all_zero() {
        let metrics = financial_metrics(&[], &[], date(2025, 5, 1));
        assert_eq!(metrics.total_annual_salaries, 0.0);
        assert!(metrics.highest_salary.consultant.is_none());
        assert!(metrics.salary_by_level.is_empty());
        assert_eq!(metrics.monthly_burn_rate, 0.0);
    }

    #[test]
    fn salary_statistics() {
        let people = vec![
            consultant("Ada", "junior", 40_000.0, vec![]),
            consultant("Bo", "junior", 60_000.0, vec![]),
            consultant("Cy", "partner", 200_000.0, vec![]),
            consultant("Di", "manager", 100_000.0, vec![]),
        ];
        let metrics = financial_metrics(&people, &[], date(2025, 5, 1));
        assert_eq!(metrics.total_annual_salaries, 400_000.0);
        assert_eq!(metrics.average_salary, 100_000.0);
        assert_eq!(metrics.median_salary, 80_000.0);
        assert_eq!(metrics.highest_salary.consultant.as_ref().unwrap().name, "Cy");
        assert_eq!(metrics.lowest_salary.amount, 40_000.0);
        assert_eq!(metrics.salary_by_level["junior"].average, 50_000.0);
        assert_eq!(metrics.salary_by_level["junior"].count, 2);
        assert!((metrics.monthly_burn_rate - 400_000.0 / 12.0).abs() < 1e-6);
        assert_eq!(metrics.utilization_correlation.low_utilization.consultant_count, 4);
        assert_eq!(metrics.utilization_correlation.high_utilization.average_salary, 0.0);
    }

    #[test]
    fn busy_consultants_fall_in_the_high_group() {
        let p = project(ProjectStatus::Started, date(2024, 1, 1), date(2025, 12, 31));
        let people = vec![
            consultant("Ada", "junior", 50_000.0, vec![(p.id, 100.0)]),
            consultant("Bo", "junior", 70_000.0, vec![(p.id, 10.0)]),
        ];
        let metrics = financial_metrics(&people, &[p], date(2025, 5, 1));
        let correlation = metrics.utilization_correlation;
        assert_eq!(correlation.high_utilization.consultant_count, 1);
        assert_eq!(correlation.high_utilization.average_salary, 50_000.0);
        assert_eq!(correlation.low_utilization.average_salary, 70_000.0);
    }

    #[test]
    fn project_margin_uses_weeks_and_working_days() {
        let ada = consultant("Ada", "junior", 252_000.0, vec![]);
        let mut p = project(ProjectStatus::Started, date(2025, 1, 6), date(2025, 2, 3));
        p.assigned_consultants.0.push(AssignedConsultant {
            consultant_id: ada.id,
            name: ada.name.clone(),
            level: ada.level.clone(),
            percentage: 50.0,
            hourly_rate: Some(100.0),
        });

        let result = project_financials(&p, &[ada]);
        assert_eq!(result.weeks, 4);
        assert_eq!(result.working_days, 20);
        // 100/h * 20h/week * 4 weeks
        assert!((result.total_revenue - 8_000.0).abs() < 1e-9);
        // 1000/day * 0.5 * 20 days
        assert!((result.total_cost - 10_000.0).abs() < 1e-9);
        assert!((result.margin - (-25.0)).abs() < 1e-9);
        assert!((result.weekly_revenue - 2_000.0).abs() < 1e-9);
    }

    #[test]
    fn short_projects_count_as_one_week_and_zero_revenue_has_zero_margin() {
        let ada = consultant("Ada", "junior", 50_000.0, vec![]);
        let mut p = project(ProjectStatus::Started, date(2025, 1, 6), date(2025, 1, 8));
        p.assigned_consultants.0.push(AssignedConsultant {
            consultant_id: ada.id,
            name: ada.name.clone(),
            level: ada.level.clone(),
            percentage: 100.0,
            hourly_rate: None,
        });
        let result = project_financials(&p, &[ada]);
        assert_eq!(result.weeks, 1);
        assert_eq!(result.consultants[0].margin, 0.0);
        assert_eq!(result.margin, 0.0);
    }

    #[test]
    fn consultants_are_ordered_by_margin() {
        let cheap = consultant("Cheap", "junior", 25_200.0, vec![]);
        let pricey = consultant("Pricey", "partner", 252_000.0, vec![]);
        let mut p = project(ProjectStatus::Started, date(2025, 1, 6), date(2025, 2, 3));
        for (c, rate) in [(&pricey, 200.0), (&cheap, 50.0)] {
            p.assigned_consultants.0.push(AssignedConsultant {
                consultant_id: c.id,
                name: c.name.clone(),
                level: c.level.clone(),
                percentage: 100.0,
                hourly_rate: Some(rate),
            });
        }

        let result = project_financials(&p, &[cheap, pricey]);
        // Pricey earns more revenue, Cheap keeps the better margin.
        assert!(result.consultants[1].revenue > result.consultants[0].revenue);
        assert_eq!(result.consultants[0].name, "Cheap");
        assert_eq!(result.consultants[1].name, "Pricey");
    }
}
