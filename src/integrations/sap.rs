//! SAP S/4HANA Professional Services import: resources become consultants and
//! enterprise projects become projects.

use chrono::{DateTime, NaiveDate};
use reqwest::Client;
use serde::{Deserialize, Deserializer};
use tracing::{error, info};
use utoipa::ToSchema;

use crate::batch::{parse_date, ConsultantRow, ProjectRow};
use crate::config::Config;
use crate::entities::organization::ConsultantLevels;
use crate::entities::project::{is_supported_date, ProjectStatus, TeamSize};
use crate::entities::StringList;
use crate::error::{AppError, ValidationIssue};

const RESOURCES_PATH: &str = "/s4hanacloud/sap/opu/odata/sap/API_PROJECTDEMAND/A_ProjDmndResourceAssignment";
const PROJECTS_PATH: &str = "/s4hanacloud/sap/opu/odata/sap/API_ENTERPRISE_PROJECT/Projects";
const PAGE_SIZE: &str = "50";

/// Where to reach the tenant's SAP API.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SapConnection {
    pub base_url: String,
    pub api_key: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Qualification {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SapResource {
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub job_grade: String,
    #[serde(default, deserialize_with = "lenient_number")]
    pub annual_cost: Option<f64>,
    #[serde(default)]
    pub qualifications: Vec<Qualification>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StaffingPlan {
    #[serde(default, deserialize_with = "lenient_number")]
    pub junior: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub manager: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub partner: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SapProject {
    #[serde(default)]
    pub project_name: String,
    #[serde(default)]
    pub customer_name: String,
    #[serde(default)]
    pub start_date: String,
    #[serde(default)]
    pub end_date: String,
    #[serde(default)]
    pub project_status: String,
    #[serde(default)]
    pub staffing_plan: Option<StaffingPlan>,
}

/// OData v2 wraps collections in `d.results`, v4 in `value`; some gateways
/// return the bare array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Collection<T> {
    V2 { d: Results<T> },
    V4 { value: Vec<T> },
    Bare(Vec<T>),
}

#[derive(Debug, Deserialize)]
struct Results<T> {
    results: Vec<T>,
}

impl<T> Collection<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            Collection::V2 { d } => d.results,
            Collection::V4 { value } => value,
            Collection::Bare(items) => items,
        }
    }
}

/// OData v2 sends decimals as strings.
fn lenient_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Lenient {
        Number(f64),
        Text(String),
        Null,
    }
    Ok(match Lenient::deserialize(deserializer)? {
        Lenient::Number(n) => Some(n),
        Lenient::Text(s) => s.trim().parse().ok(),
        Lenient::Null => None,
    })
}

/// P1/P2 junior, P3/P4 manager, P5 partner. Unknown grades start as junior.
pub fn level_for_grade(grade: &str) -> &'static str {
    match grade.trim().to_ascii_uppercase().as_str() {
        "P3" | "P4" => "manager",
        "P5" => "partner",
        _ => "junior",
    }
}

/// E0001..E0004 lifecycle codes. Unknown codes are still in Discussions.
pub fn status_for_code(code: &str) -> ProjectStatus {
    match code.trim().to_ascii_uppercase().as_str() {
        "E0002" => ProjectStatus::Sold,
        "E0003" => ProjectStatus::Started,
        "E0004" => ProjectStatus::Completed,
        _ => ProjectStatus::Discussions,
    }
}

/// Accepts `/Date(1735689600000)/` (optionally with an offset suffix), ISO
/// dates or datetimes, and the upload date formats.
pub fn parse_sap_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    let date = match raw.strip_prefix("/Date(").and_then(|r| r.strip_suffix(")/")) {
        Some(inner) => {
            let end = inner
                .char_indices()
                .skip(1)
                .find(|(_, c)| *c == '+' || *c == '-')
                .map_or(inner.len(), |(i, _)| i);
            let millis: i64 = inner[..end].parse().ok()?;
            DateTime::from_timestamp_millis(millis)?.date_naive()
        }
        None => match raw.get(..10).and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok()) {
            Some(date) => date,
            None => return parse_date(raw),
        },
    };
    Some(date).filter(|d| is_supported_date(*d))
}

fn issue(row: usize, field: &str, message: impl Into<String>) -> ValidationIssue {
    ValidationIssue { row, field: field.to_string(), message: message.into() }
}

/// Maps resources to consultant rows. Record numbers start at 1.
pub fn consultant_rows(
    resources: Vec<SapResource>,
    levels: &ConsultantLevels,
    issues: &mut Vec<ValidationIssue>,
) -> Vec<ConsultantRow> {
    let mut rows = Vec::new();
    for (index, resource) in resources.into_iter().enumerate() {
        let row = index + 1;
        let before = issues.len();
        let name = resource.full_name.trim().to_string();
        if name.is_empty() {
            issues.push(issue(row, "resource.fullName", "Name is required"));
        }
        let level = level_for_grade(&resource.job_grade);
        if !levels.is_active_id(level) {
            issues.push(issue(
                row,
                "resource.jobGrade",
                format!("Grade {} maps to level {}, which is not active", resource.job_grade, level),
            ));
        }
        let salary = resource.annual_cost.unwrap_or(0.0);
        if !salary.is_finite() || salary < 0.0 {
            issues.push(issue(row, "resource.annualCost", "Salary must be a non-negative number"));
        }
        if issues.len() > before {
            continue;
        }
        rows.push(ConsultantRow {
            row,
            name,
            level: level.to_string(),
            skills: StringList(
                resource
                    .qualifications
                    .into_iter()
                    .map(|q| q.name.trim().to_string())
                    .filter(|q| !q.is_empty())
                    .collect(),
            ),
            salary,
        });
    }
    rows
}

/// Maps enterprise projects to project rows, closed at 100%.
pub fn project_rows(projects: Vec<SapProject>, issues: &mut Vec<ValidationIssue>) -> Vec<ProjectRow> {
    let mut rows = Vec::new();
    for (index, project) in projects.into_iter().enumerate() {
        let row = index + 1;
        let before = issues.len();
        let name = project.project_name.trim().to_string();
        if name.is_empty() {
            issues.push(issue(row, "project.projectName", "Name is required"));
        }
        let client = project.customer_name.trim().to_string();
        if client.is_empty() {
            issues.push(issue(row, "project.customerName", "Client is required"));
        }
        let start = parse_sap_date(&project.start_date);
        if start.is_none() {
            issues.push(issue(row, "project.startDate", "Invalid start date format"));
        }
        let end = parse_sap_date(&project.end_date);
        if end.is_none() {
            issues.push(issue(row, "project.endDate", "Invalid end date format"));
        }
        let (Some(start_date), Some(end_date)) = (start, end) else {
            continue;
        };
        if end_date < start_date {
            issues.push(issue(row, "project.endDate", "End date must not be before start date"));
        }
        let plan = project.staffing_plan.unwrap_or_default();
        let team_size = TeamSize {
            junior: plan.junior.unwrap_or(0.0).max(0.0),
            manager: plan.manager.unwrap_or(0.0).max(0.0),
            partner: plan.partner.unwrap_or(0.0).max(0.0),
        };
        if issues.len() > before {
            continue;
        }
        rows.push(ProjectRow {
            row,
            name,
            client,
            required_skills: StringList::default(),
            start_date,
            end_date,
            team_size,
            status: status_for_code(&project.project_status),
            chance_to_close: 100,
        });
    }
    rows
}

pub struct SapClient<'a> {
    http: &'a Client,
    config: &'a Config,
    connection: &'a SapConnection,
}

impl<'a> SapClient<'a> {
    pub fn new(http: &'a Client, config: &'a Config, connection: &'a SapConnection) -> Self {
        SapClient { http, config, connection }
    }

    async fn collection<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, AppError> {
        let url = format!("{}{}", self.connection.base_url.trim_end_matches('/'), path);
        info!("Fetching {}", url);
        let response = self
            .http
            .get(&url)
            .query(&[("$inlinecount", "allpages"), ("$top", PAGE_SIZE)])
            .header("apikey", &self.connection.api_key)
            .header("DataServiceVersion", "2.0")
            .header(reqwest::header::ACCEPT, "application/json")
            .timeout(self.config.http_timeout())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("SAP API error {}: {}", status, body);
            return Err(AppError::UpstreamError(format!("SAP API error: {}", status)));
        }
        let collection: Collection<T> = response
            .json()
            .await
            .map_err(|e| AppError::UpstreamError(format!("Unexpected SAP response: {}", e)))?;
        Ok(collection.into_vec())
    }

    pub async fn fetch_resources(&self) -> Result<Vec<SapResource>, AppError> {
        self.collection(RESOURCES_PATH).await
    }

    pub async fn fetch_projects(&self) -> Result<Vec<SapProject>, AppError> {
        self.collection(PROJECTS_PATH).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::organization::ConsultantLevels;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn grades_and_codes_map_with_defaults() {
        assert_eq!(level_for_grade("p2"), "junior");
        assert_eq!(level_for_grade("P4"), "manager");
        assert_eq!(level_for_grade("P5"), "partner");
        assert_eq!(level_for_grade("X9"), "junior");
        assert_eq!(status_for_code("E0003"), ProjectStatus::Started);
        assert_eq!(status_for_code(""), ProjectStatus::Discussions);
    }

    #[test]
    fn odata_dates_are_understood() {
        assert_eq!(parse_sap_date("/Date(1735689600000)/"), Some(date(2025, 1, 1)));
        assert_eq!(parse_sap_date("/Date(1735689600000+0000)/"), Some(date(2025, 1, 1)));
        assert_eq!(parse_sap_date("2025-03-31T00:00:00"), Some(date(2025, 3, 31)));
        assert_eq!(parse_sap_date("03/31/2025"), Some(date(2025, 3, 31)));
        assert_eq!(parse_sap_date("/Date(253402300800000)/"), None);
        assert_eq!(parse_sap_date("soon"), None);
    }

    #[test]
    fn collections_accept_every_envelope() {
        let v2: Collection<SapResource> =
            serde_json::from_str(r#"{"d":{"results":[{"fullName":"Ada","annualCost":"55000.00"}]}}"#).unwrap();
        let resources = v2.into_vec();
        assert_eq!(resources[0].annual_cost, Some(55000.0));
        let bare: Collection<SapProject> = serde_json::from_str(r#"[{"projectName":"Alpha"}]"#).unwrap();
        assert_eq!(bare.into_vec()[0].project_name, "Alpha");
        let v4: Collection<SapProject> = serde_json::from_str(r#"{"value":[]}"#).unwrap();
        assert!(v4.into_vec().is_empty());
    }

    #[test]
    fn resources_become_consultants() {
        let mut issues = Vec::new();
        let rows = consultant_rows(
            vec![
                SapResource {
                    full_name: " Ada ".to_string(),
                    job_grade: "P3".to_string(),
                    annual_cost: Some(90000.0),
                    qualifications: vec![Qualification { name: "Pricing".to_string() }],
                },
                SapResource { full_name: "".to_string(), annual_cost: Some(-1.0), ..Default::default() },
            ],
            &ConsultantLevels::default(),
            &mut issues,
        );
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "Ada");
        assert_eq!(rows[0].level, "manager");
        assert_eq!(rows[0].skills, StringList(vec!["Pricing".to_string()]));
        let fields: Vec<_> = issues.iter().map(|i| (i.row, i.field.as_str())).collect();
        assert_eq!(fields, vec![(2, "resource.fullName"), (2, "resource.annualCost")]);
    }

    #[test]
    fn projects_need_ordered_dates() {
        let mut issues = Vec::new();
        let rows = project_rows(
            vec![
                SapProject {
                    project_name: "Alpha".to_string(),
                    customer_name: "Acme".to_string(),
                    start_date: "/Date(1735689600000)/".to_string(),
                    end_date: "2025-06-30".to_string(),
                    project_status: "E0002".to_string(),
                    staffing_plan: Some(StaffingPlan { junior: Some(2.0), manager: None, partner: Some(0.5) }),
                },
                SapProject {
                    project_name: "Beta".to_string(),
                    customer_name: "Acme".to_string(),
                    start_date: "2025-06-30".to_string(),
                    end_date: "2025-01-01".to_string(),
                    ..Default::default()
                },
            ],
            &mut issues,
        );
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, ProjectStatus::Sold);
        assert_eq!(rows[0].chance_to_close, 100);
        assert_eq!(rows[0].team_size, TeamSize { junior: 2.0, manager: 0.0, partner: 0.5 });
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].row, 2);
        assert_eq!(issues[0].field, "project.endDate");
    }
}
