// Batch upload validation.
//
// • CSV, or the first sheet of an Excel/ODS workbook with row 1 as headers.
//   Headers are matched exactly (case-sensitive), cells are trimmed and blank
//   rows skipped.
// • Header presence is checked only when the file has at least one data row; an
//   empty file gets its own message.
// • Row numbers in errors are spreadsheet rows: the header is row 1, so the first
//   data row is 2.
// • Every row is checked and all problems are reported together.

use calamine::{open_workbook_auto_from_rs, Data, DataType, Reader};
use chrono::NaiveDate;
use csv::{ReaderBuilder, Trim};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Cursor;
use std::str::FromStr;
use utoipa::ToSchema;

use crate::entities::organization::ConsultantLevels;
use crate::entities::project::{is_supported_date, ProjectStatus, TeamSize};
use crate::entities::StringList;
use crate::error::{AppError, ValidationIssue};

pub const CONSULTANT_HEADERS: &[&str] = &["name", "level", "skills", "salary"];
pub const PROJECT_HEADERS: &[&str] = &[
    "name",
    "client",
    "requiredSkills",
    "startDate",
    "endDate",
    "teamSize.junior",
    "teamSize.manager",
    "teamSize.partner",
    "status",
    "chanceToClose",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum UploadKind {
    Consultants,
    Projects,
}

impl UploadKind {
    pub fn required_headers(&self) -> &'static [&'static str] {
        match self {
            UploadKind::Consultants => CONSULTANT_HEADERS,
            UploadKind::Projects => PROJECT_HEADERS,
        }
    }
}

impl FromStr for UploadKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "consultants" => Ok(UploadKind::Consultants),
            "projects" => Ok(UploadKind::Projects),
            _ => Err(AppError::InvalidRequest("Invalid type".to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConsultantRow {
    /// Source row or record number, used in validation errors
    pub row: usize,
    pub name: String,
    /// Lower-cased level id
    pub level: String,
    pub skills: StringList,
    pub salary: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRow {
    pub row: usize,
    pub name: String,
    pub client: String,
    pub required_skills: StringList,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub team_size: TeamSize,
    pub status: ProjectStatus,
    pub chance_to_close: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParsedUpload {
    Consultants(Vec<ConsultantRow>),
    Projects(Vec<ProjectRow>),
}

impl ParsedUpload {
    pub fn len(&self) -> usize {
        match self {
            ParsedUpload::Consultants(rows) => rows.len(),
            ParsedUpload::Projects(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One data row keyed by header name.
struct Record<'a> {
    row: usize,
    cells: HashMap<&'a str, &'a str>,
}

impl<'a> Record<'a> {
    fn get(&self, field: &str) -> &'a str {
        self.cells.get(field).copied().unwrap_or("")
    }
}

/// Collects per-field issues for a row.
struct RowErrors<'e> {
    row: usize,
    issues: &'e mut Vec<ValidationIssue>,
}

impl RowErrors<'_> {
    fn push(&mut self, field: &str, message: impl Into<String>) {
        self.issues.push(ValidationIssue {
            row: self.row,
            field: field.to_string(),
            message: message.into(),
        });
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadFormat {
    Csv,
    Spreadsheet,
}

impl UploadFormat {
    /// Picks the reader from the file extension.
    pub fn from_filename(filename: &str) -> Result<Self, AppError> {
        let lower = filename.trim().to_ascii_lowercase();
        match lower.rsplit_once('.').map(|(_, ext)| ext) {
            Some("csv") => Ok(UploadFormat::Csv),
            Some("xlsx" | "xlsm" | "xlsb" | "xls" | "ods") => Ok(UploadFormat::Spreadsheet),
            _ => Err(AppError::InvalidRequestDetails {
                error: "Unsupported file format".to_string(),
                details: format!("Upload a CSV or Excel file, got \"{}\"", filename),
            }),
        }
    }
}

/// Header row and the non-blank data rows under it.
struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

fn invalid_format(details: impl std::fmt::Display) -> AppError {
    AppError::InvalidRequestDetails {
        error: "Invalid file format. Please ensure your file has the correct headers and is a valid CSV or Excel file."
            .to_string(),
        details: details.to_string(),
    }
}

fn is_blank(row: &[String]) -> bool {
    row.iter().all(String::is_empty)
}

fn read_csv(bytes: &[u8]) -> Result<Table, AppError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::All)
        .from_reader(bytes);
    let headers = reader
        .headers()
        .map_err(invalid_format)?
        .iter()
        .map(str::to_string)
        .collect();
    let mut rows = Vec::new();
    for record in reader.records() {
        let row: Vec<String> = record.map_err(invalid_format)?.iter().map(str::to_string).collect();
        if !is_blank(&row) {
            rows.push(row);
        }
    }
    Ok(Table { headers, rows })
}

/// Dates come out as `YYYY-MM-DD`; everything else as displayed, trimmed.
fn cell_text(cell: &Data) -> String {
    match cell {
        Data::DateTime(_) | Data::DateTimeIso(_) => match cell.as_date() {
            Some(date) => date.format("%Y-%m-%d").to_string(),
            None => cell.to_string(),
        },
        other => other.to_string().trim().to_string(),
    }
}

fn read_spreadsheet(bytes: &[u8]) -> Result<Table, AppError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes)).map_err(invalid_format)?;
    let sheet = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| invalid_format("The workbook has no sheets"))?
        .map_err(invalid_format)?;

    let mut rows = sheet.rows().map(|row| row.iter().map(cell_text).collect::<Vec<_>>());
    let headers = rows.next().unwrap_or_default();
    Ok(Table {
        headers,
        rows: rows.filter(|row| !is_blank(row)).collect(),
    })
}

fn check_headers(kind: UploadKind, headers: &[String]) -> Result<(), AppError> {
    let missing: Vec<&str> = kind
        .required_headers()
        .iter()
        .copied()
        .filter(|required| !headers.iter().any(|h| h == *required))
        .collect();
    if missing.is_empty() {
        return Ok(());
    }
    Err(AppError::InvalidRequestDetails {
        error: "Missing required columns".to_string(),
        details: format!(
            "The following column headers are missing (make sure they are lowercase): {}",
            missing.join(", ")
        ),
    })
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
        .filter(|date| is_supported_date(*date))
}

/// Parses and validates an uploaded file.
pub fn parse_upload(
    kind: UploadKind,
    format: UploadFormat,
    bytes: &[u8],
    levels: &ConsultantLevels,
) -> Result<ParsedUpload, AppError> {
    let table = match format {
        UploadFormat::Csv => read_csv(bytes)?,
        UploadFormat::Spreadsheet => read_spreadsheet(bytes)?,
    };

    if table.rows.is_empty() {
        return Err(AppError::InvalidRequest(
            "The file is empty. Please add some data.".to_string(),
        ));
    }
    check_headers(kind, &table.headers)?;

    let records: Vec<Record> = table
        .rows
        .iter()
        .enumerate()
        .map(|(index, row)| Record {
            row: index + 2,
            cells: table
                .headers
                .iter()
                .map(String::as_str)
                .zip(row.iter().map(String::as_str))
                .collect(),
        })
        .collect();

    let mut issues = Vec::new();
    let parsed = match kind {
        UploadKind::Consultants => ParsedUpload::Consultants(
            records
                .iter()
                .filter_map(|r| validate_consultant(r, levels, &mut issues))
                .collect(),
        ),
        UploadKind::Projects => ParsedUpload::Projects(
            records
                .iter()
                .filter_map(|r| validate_project(r, &mut issues))
                .collect(),
        ),
    };

    if issues.is_empty() {
        Ok(parsed)
    } else {
        Err(AppError::ValidationFailed(issues))
    }
}

fn validate_consultant(
    record: &Record,
    levels: &ConsultantLevels,
    issues: &mut Vec<ValidationIssue>,
) -> Option<ConsultantRow> {
    let mut errors = RowErrors { row: record.row, issues };
    let before = errors.issues.len();

    let name = record.get("name");
    if name.is_empty() {
        errors.push("name", "Name is required");
    }

    let level = record.get("level");
    if level.is_empty() || !levels.is_active_id(level) {
        let allowed: Vec<String> = levels.active_sorted().into_iter().map(|l| l.id).collect();
        errors.push("level", format!("Level must be one of: {}", allowed.join(", ")));
    }

    let skills = record.get("skills");
    if skills.is_empty() {
        errors.push("skills", "Skills are required");
    }

    let salary = match record.get("salary").parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 => value,
        _ => {
            errors.push("salary", "Salary must be a non-negative number");
            0.0
        }
    };

    if errors.issues.len() > before {
        return None;
    }
    Some(ConsultantRow {
        row: record.row,
        name: name.to_string(),
        level: level.to_lowercase(),
        skills: StringList::from_comma_separated(skills),
        salary,
    })
}

fn team_size_cell(record: &Record, field: &str, errors: &mut RowErrors) -> f64 {
    let raw = record.get(field);
    if raw.is_empty() {
        return 0.0;
    }
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 => value,
        _ => {
            errors.push(field, "Team size must be a non-negative number");
            0.0
        }
    }
}

fn validate_project(record: &Record, issues: &mut Vec<ValidationIssue>) -> Option<ProjectRow> {
    let mut errors = RowErrors { row: record.row, issues };
    let before = errors.issues.len();

    let name = record.get("name");
    if name.is_empty() {
        errors.push("name", "Name is required");
    }
    let client = record.get("client");
    if client.is_empty() {
        errors.push("client", "Client is required");
    }

    let start_date = parse_date(record.get("startDate"));
    if start_date.is_none() {
        errors.push("startDate", "Invalid start date format");
    }
    let end_date = parse_date(record.get("endDate"));
    if end_date.is_none() {
        errors.push("endDate", "Invalid end date format");
    }
    if let (Some(start), Some(end)) = (start_date, end_date) {
        if end < start {
            errors.push("endDate", "End date must not be before start date");
        }
    }

    let status = ProjectStatus::normalize(record.get("status"));
    if status.is_none() {
        errors.push("status", "Status must be Discussions, Sold, Started, or Completed");
    }

    let team_size = TeamSize {
        junior: team_size_cell(record, "teamSize.junior", &mut errors),
        manager: team_size_cell(record, "teamSize.manager", &mut errors),
        partner: team_size_cell(record, "teamSize.partner", &mut errors),
    };

    let chance_raw = record.get("chanceToClose");
    let chance_to_close = if chance_raw.is_empty() {
        100
    } else {
        match chance_raw.parse::<i32>() {
            Ok(value) if (0..=100).contains(&value) => value,
            _ => {
                errors.push("chanceToClose", "Chance to close must be a whole number between 0 and 100");
                100
            }
        }
    };

    if errors.issues.len() > before {
        return None;
    }
    Some(ProjectRow {
        row: record.row,
        name: name.to_string(),
        client: client.to_string(),
        required_skills: StringList::from_comma_separated(record.get("requiredSkills")),
        start_date: start_date?,
        end_date: end_date?,
        team_size,
        status: status?,
        chance_to_close,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn levels() -> ConsultantLevels {
        ConsultantLevels::default()
    }

    fn issues(result: Result<ParsedUpload, AppError>) -> Vec<ValidationIssue> {
        match result {
            Err(AppError::ValidationFailed(issues)) => issues,
            other => panic!("expected validation failure, got {:?}", other),
        }
    }

    #[test]
    fn format_follows_the_extension() {
        assert_eq!(UploadFormat::from_filename("team.csv").unwrap(), UploadFormat::Csv);
        assert_eq!(UploadFormat::from_filename("TEAM.CSV").unwrap(), UploadFormat::Csv);
        assert_eq!(UploadFormat::from_filename("team.xlsx").unwrap(), UploadFormat::Spreadsheet);
        assert_eq!(UploadFormat::from_filename("legacy.xls").unwrap(), UploadFormat::Spreadsheet);
        for name in ["team.pdf", "team", "csv"] {
            assert!(matches!(
                UploadFormat::from_filename(name),
                Err(AppError::InvalidRequestDetails { ref error, .. }) if error == "Unsupported file format"
            ));
        }
    }

    fn fixture(name: &str) -> Vec<u8> {
        let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name);
        std::fs::read(path).unwrap()
    }

    #[test]
    fn spreadsheet_consultants_match_csv_rules() {
        let bytes = fixture("consultants.xlsx");
        match parse_upload(UploadKind::Consultants, UploadFormat::Spreadsheet, &bytes, &levels()).unwrap() {
            ParsedUpload::Consultants(rows) => {
                assert_eq!(rows.len(), 2);
                assert_eq!(rows[0].name, "Ada");
                assert_eq!(rows[0].level, "junior");
                assert_eq!(rows[0].skills.0, vec!["strategy", "pricing"]);
                assert_eq!(rows[0].salary, 55_000.0);
                // The blank sheet row is skipped, so Bob is the second data row.
                assert_eq!(rows[1].row, 3);
                assert_eq!(rows[1].level, "manager");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn spreadsheet_dates_and_numbers_become_text() {
        let bytes = fixture("projects.xlsx");
        match parse_upload(UploadKind::Projects, UploadFormat::Spreadsheet, &bytes, &levels()).unwrap() {
            ParsedUpload::Projects(rows) => {
                assert_eq!(rows[0].start_date, NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());
                assert_eq!(rows[0].end_date, NaiveDate::from_ymd_opt(2025, 3, 31).unwrap());
                assert_eq!(rows[0].team_size.junior, 2.0);
                assert_eq!(rows[0].status, ProjectStatus::Started);
                assert_eq!(rows[0].chance_to_close, 100);
                assert_eq!(rows[1].chance_to_close, 40);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn spreadsheet_errors_use_sheet_rows() {
        let bytes = fixture("consultants_invalid.xlsx");
        let found = issues(parse_upload(UploadKind::Consultants, UploadFormat::Spreadsheet, &bytes, &levels()));
        let fields: Vec<(usize, &str)> = found.iter().map(|i| (i.row, i.field.as_str())).collect();
        assert_eq!(fields, vec![(3, "level"), (3, "salary")]);

        let bytes = fixture("consultants_missing_salary.xlsx");
        match parse_upload(UploadKind::Consultants, UploadFormat::Spreadsheet, &bytes, &levels()) {
            Err(AppError::InvalidRequestDetails { error, details }) => {
                assert_eq!(error, "Missing required columns");
                assert!(details.ends_with("salary"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn corrupt_spreadsheet_is_a_format_error() {
        match parse_upload(UploadKind::Consultants, UploadFormat::Spreadsheet, b"not a zip", &levels()) {
            Err(AppError::InvalidRequestDetails { error, .. }) => assert!(error.starts_with("Invalid file format")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn upload_kind_parses_known_values() {
        assert_eq!("projects".parse::<UploadKind>().unwrap(), UploadKind::Projects);
        assert!("people".parse::<UploadKind>().is_err());
    }

    #[test]
    fn consultants_parse_and_normalize() {
        let csv = "name,level,skills,salary\nAda,Junior,\"rust, sql\",55000\n\nBo,partner,strategy,120000\n";
        let parsed = parse_upload(UploadKind::Consultants, UploadFormat::Csv, csv.as_bytes(), &levels()).unwrap();
        match parsed {
            ParsedUpload::Consultants(rows) => {
                assert_eq!(rows.len(), 2);
                assert_eq!(rows[0].level, "junior");
                assert_eq!(rows[0].skills.0, vec!["rust", "sql"]);
                assert_eq!(rows[1].salary, 120_000.0);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn missing_salary_column_is_named() {
        let csv = "name,level,skills\nAda,junior,rust\n";
        match parse_upload(UploadKind::Consultants, UploadFormat::Csv, csv.as_bytes(), &levels()) {
            Err(AppError::InvalidRequestDetails { error, details }) => {
                assert_eq!(error, "Missing required columns");
                assert!(details.ends_with("salary"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn headers_only_file_is_empty() {
        let csv = "name,level\n";
        match parse_upload(UploadKind::Consultants, UploadFormat::Csv, csv.as_bytes(), &levels()) {
            Err(AppError::InvalidRequest(msg)) => assert_eq!(msg, "The file is empty. Please add some data."),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn invalid_level_reports_spreadsheet_row() {
        let csv = "name,level,skills,salary\nAda,junior,rust,1\nBo,intern,rust,1\n";
        let found = issues(parse_upload(UploadKind::Consultants, UploadFormat::Csv, csv.as_bytes(), &levels()));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].row, 3);
        assert_eq!(found[0].field, "level");
    }

    #[test]
    fn custom_levels_are_respected() {
        let mut custom = levels();
        custom.0.push(crate::entities::organization::ConsultantLevel {
            id: "principal".into(),
            name: "Principal".into(),
            order: 4,
            is_active: true,
        });
        let csv = "name,level,skills,salary\nAda,Principal,rust,1\n";
        assert!(parse_upload(UploadKind::Consultants, UploadFormat::Csv, csv.as_bytes(), &custom).is_ok());
    }

    #[test]
    fn negative_or_text_salary_is_rejected() {
        let csv = "name,level,skills,salary\nAda,junior,rust,-5\nBo,junior,rust,lots\n";
        let found = issues(parse_upload(UploadKind::Consultants, UploadFormat::Csv, csv.as_bytes(), &levels()));
        let rows: Vec<usize> = found.iter().filter(|i| i.field == "salary").map(|i| i.row).collect();
        assert_eq!(rows, vec![2, 3]);
    }

    const PROJECT_HEADER: &str =
        "name,client,requiredSkills,startDate,endDate,teamSize.junior,teamSize.manager,teamSize.partner,status,chanceToClose";

    #[test]
    fn projects_accept_loose_status_and_date_formats() {
        let csv = format!(
            "{}\nApollo,NASA,\"rust,go\",2025-01-01,03/31/2025,2,1,,\" Started \",\nGemini,ESA,,2025/04/01,2025-06-30,1,1,1,discussions,40\n",
            PROJECT_HEADER
        );
        match parse_upload(UploadKind::Projects, UploadFormat::Csv, csv.as_bytes(), &levels()).unwrap() {
            ParsedUpload::Projects(rows) => {
                assert_eq!(rows[0].status, ProjectStatus::Started);
                assert_eq!(rows[0].end_date, NaiveDate::from_ymd_opt(2025, 3, 31).unwrap());
                assert_eq!(rows[0].team_size.partner, 0.0);
                assert_eq!(rows[0].chance_to_close, 100);
                assert_eq!(rows[1].status, ProjectStatus::Discussions);
                assert_eq!(rows[1].chance_to_close, 40);
                assert!(rows[1].required_skills.0.is_empty());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn project_rows_collect_every_problem() {
        let csv = format!(
            "{}\n,NASA,rust,2025-02-01,2025-01-01,x,1,1,won,150\n",
            PROJECT_HEADER
        );
        let found = issues(parse_upload(UploadKind::Projects, UploadFormat::Csv, csv.as_bytes(), &levels()));
        let fields: Vec<&str> = found.iter().map(|i| i.field.as_str()).collect();
        assert_eq!(fields, vec!["name", "endDate", "status", "teamSize.junior", "chanceToClose"]);
        assert!(found.iter().all(|i| i.row == 2));
    }

    #[test]
    fn ragged_rows_are_a_format_error() {
        let csv = "name,level,skills,salary\nAda,junior\n";
        assert!(matches!(
            parse_upload(UploadKind::Consultants, UploadFormat::Csv, csv.as_bytes(), &levels()),
            Err(AppError::InvalidRequestDetails { .. })
        ));
    }
}
