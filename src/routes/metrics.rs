use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{NaiveDate, Utc};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::config::Config;
use crate::entities::project::{is_supported_date, SUPPORTED_YEARS};
use crate::entities::{consultant, project, Consultant, Project};
use crate::error::AppError;
use crate::metrics::availability::{bench, BenchReport};
use crate::metrics::financial::{financial_metrics, FinancialMetrics};
use crate::metrics::forecast::{forecast, ForecastPoint, DEFAULT_FORECAST_MONTHS, DEFAULT_FORECAST_TARGET};
use crate::metrics::utilization::{
    utilization_metrics, utilization_ranking, LevelUtilization, UtilizationMetrics, DEFAULT_TARGET,
};
use crate::AppState;

const MAX_FORECAST_MONTHS: u32 = 24;
const DEFAULT_BENCH_HORIZON_DAYS: i64 = 30;

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct UtilizationQuery {
    /// Target percentage, default 75
    pub target: Option<f64>,
    /// Evaluate as of this date instead of today
    pub as_of: Option<NaiveDate>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct ForecastQuery {
    /// Months ahead, default 6
    pub months: Option<u32>,
    /// Target percentage, default 85
    pub target: Option<f64>,
    pub as_of: Option<NaiveDate>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct AsOfQuery {
    pub as_of: Option<NaiveDate>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct BenchQuery {
    /// Look-ahead for upcoming availability, default 30
    pub horizon_days: Option<i64>,
    pub as_of: Option<NaiveDate>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RankingResponse {
    pub levels: Vec<LevelUtilization>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ForecastResponse {
    pub points: Vec<ForecastPoint>,
}

/// Calendar date in the business timezone.
pub(crate) fn business_today(config: &Config) -> NaiveDate {
    Utc::now().with_timezone(&config.business_offset()).date_naive()
}

async fn load_workforce(
    db: &DatabaseConnection,
    organization_id: Uuid,
) -> Result<(Vec<consultant::Model>, Vec<project::Model>), AppError> {
    Ok(tokio::try_join!(
        Consultant::find()
            .filter(consultant::Column::OrganizationId.eq(organization_id))
            .all(db),
        Project::find()
            .filter(project::Column::OrganizationId.eq(organization_id))
            .all(db),
    )?)
}

/// The requested as-of date, or today when none is given.
fn resolve_as_of(requested: Option<NaiveDate>, config: &Config) -> Result<NaiveDate, AppError> {
    match requested {
        Some(date) if !is_supported_date(date) => Err(AppError::InvalidRequest(format!(
            "asOf must fall between the years {} and {}",
            SUPPORTED_YEARS.start(),
            SUPPORTED_YEARS.end()
        ))),
        Some(date) => Ok(date),
        None => Ok(business_today(config)),
    }
}

fn check_target(target: f64) -> Result<f64, AppError> {
    if !(0.0..=100.0).contains(&target) {
        return Err(AppError::InvalidRequest("Target must be between 0 and 100".to_string()));
    }
    Ok(target)
}

#[utoipa::path(
    get,
    path = "/api/metrics/utilization",
    params(UtilizationQuery),
    responses((status = 200, description = "Period-to-date utilization against target", body = UtilizationMetrics))
)]
#[tracing::instrument(skip(state, auth), fields(organization_id = %auth.organization.id))]
pub async fn get_utilization(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<UtilizationQuery>,
) -> Result<Json<UtilizationMetrics>, AppError> {
    let target = check_target(query.target.unwrap_or(DEFAULT_TARGET))?;
    let today = resolve_as_of(query.as_of, &state.config)?;
    let (consultants, projects) = load_workforce(&state.db, auth.organization_id()).await?;
    Ok(Json(utilization_metrics(&consultants, &projects, today, target)))
}

#[utoipa::path(
    get,
    path = "/api/metrics/forecast",
    params(ForecastQuery),
    responses((status = 200, description = "Official and expected utilization for the coming months", body = ForecastResponse))
)]
#[tracing::instrument(skip(state, auth), fields(organization_id = %auth.organization.id))]
pub async fn get_forecast(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<ForecastQuery>,
) -> Result<Json<ForecastResponse>, AppError> {
    let target = check_target(query.target.unwrap_or(DEFAULT_FORECAST_TARGET))?;
    let months = query.months.unwrap_or(DEFAULT_FORECAST_MONTHS);
    if months == 0 || months > MAX_FORECAST_MONTHS {
        return Err(AppError::InvalidRequest(format!(
            "Months must be between 1 and {}",
            MAX_FORECAST_MONTHS
        )));
    }
    let today = resolve_as_of(query.as_of, &state.config)?;
    let (consultants, projects) = load_workforce(&state.db, auth.organization_id()).await?;
    Ok(Json(ForecastResponse {
        points: forecast(&consultants, &projects, today, months, target),
    }))
}

#[utoipa::path(
    get,
    path = "/api/metrics/ranking",
    params(AsOfQuery),
    responses((status = 200, description = "Levels ranked by trailing-year utilization", body = RankingResponse))
)]
pub async fn get_ranking(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<AsOfQuery>,
) -> Result<Json<RankingResponse>, AppError> {
    let today = resolve_as_of(query.as_of, &state.config)?;
    let (consultants, projects) = load_workforce(&state.db, auth.organization_id()).await?;
    Ok(Json(RankingResponse {
        levels: utilization_ranking(&consultants, &projects, today),
    }))
}

#[utoipa::path(
    get,
    path = "/api/metrics/financial",
    params(AsOfQuery),
    responses((status = 200, description = "Workforce cost and salary analysis", body = FinancialMetrics))
)]
pub async fn get_financial(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<AsOfQuery>,
) -> Result<Json<FinancialMetrics>, AppError> {
    let today = resolve_as_of(query.as_of, &state.config)?;
    let (consultants, projects) = load_workforce(&state.db, auth.organization_id()).await?;
    Ok(Json(financial_metrics(&consultants, &projects, today)))
}

#[utoipa::path(
    get,
    path = "/api/bench",
    params(BenchQuery),
    responses((status = 200, description = "Consultants free now and within the horizon", body = BenchReport))
)]
#[tracing::instrument(skip(state, auth), fields(organization_id = %auth.organization.id))]
pub async fn get_bench(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<BenchQuery>,
) -> Result<Json<BenchReport>, AppError> {
    let horizon_days = query.horizon_days.unwrap_or(DEFAULT_BENCH_HORIZON_DAYS);
    if !(0..=365).contains(&horizon_days) {
        return Err(AppError::InvalidRequest("horizonDays must be between 0 and 365".to_string()));
    }
    let today = resolve_as_of(query.as_of, &state.config)?;
    let (consultants, projects) = load_workforce(&state.db, auth.organization_id()).await?;
    Ok(Json(bench(&consultants, &projects, today, horizon_days)))
}
