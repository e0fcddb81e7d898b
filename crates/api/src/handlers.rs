use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{Duration, Utc};
use serde::Deserialize;
use tracing::error;

use arcron_errors::ArcronError;

use crate::types::{ErrorResponse, ExecutionResponse, HealthResponse, JobSummary};
use crate::ApiState;

/// 把核心错误映射到HTTP状态码
pub struct ApiError(ArcronError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ArcronError::JobNotFound { .. } => StatusCode::NOT_FOUND,
            ArcronError::DuplicateJob { .. } | ArcronError::JobAlreadyRunning { .. } => {
                StatusCode::CONFLICT
            }
            ArcronError::InvalidJobDefinition(_) | ArcronError::InvalidCron { .. } => {
                StatusCode::BAD_REQUEST
            }
            _ => {
                error!("API内部错误: {}", self.0);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

impl From<ArcronError> for ApiError {
    fn from(err: ArcronError) -> Self {
        Self(err)
    }
}

pub async fn health(State(state): State<ApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.started_at.elapsed().as_secs(),
    })
}

pub async fn scheduler_status(State(state): State<ApiState>) -> impl IntoResponse {
    Json(state.scheduler.status())
}

pub async fn scheduler_job_status(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    match state.scheduler.job_status(&name) {
        Some(detail) => Ok(Json(detail).into_response()),
        None => Err(ArcronError::job_not_found(name).into()),
    }
}

pub async fn list_jobs(State(state): State<ApiState>) -> Json<Vec<JobSummary>> {
    let jobs = state
        .executor
        .list_all()
        .into_iter()
        .map(JobSummary::from)
        .collect();
    Json(jobs)
}

#[derive(Debug, Deserialize)]
pub struct ExecutionsQuery {
    pub limit: Option<i64>,
}

pub async fn job_executions(
    State(state): State<ApiState>,
    Path(name): Path<String>,
    Query(query): Query<ExecutionsQuery>,
) -> Result<Json<Vec<ExecutionResponse>>, ApiError> {
    let limit = query.limit.unwrap_or(20).clamp(1, 500);
    let executions = state.executor.history(&name, limit).await?;
    Ok(Json(
        executions.into_iter().map(ExecutionResponse::from).collect(),
    ))
}

pub async fn job_statistics(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let stats = state.execution_store.get_job_stats(&name).await?;
    Ok(Json(stats))
}

#[derive(Debug, Deserialize)]
pub struct MetricsQuery {
    /// 回看窗口（小时），默认1
    pub hours: Option<i64>,
    pub limit: Option<i64>,
}

pub async fn query_metrics(
    State(state): State<ApiState>,
    Query(query): Query<MetricsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let hours = query.hours.unwrap_or(1).clamp(1, 24 * 30);
    let limit = query.limit.unwrap_or(1000).clamp(1, 10_000);
    let end = Utc::now();
    let start = end - Duration::hours(hours);
    let metrics = state.metrics_store.get_metrics(start, end, limit).await?;
    Ok(Json(metrics))
}

pub async fn realtime_metrics(State(state): State<ApiState>) -> Response {
    match state.monitor.latest() {
        Some(metrics) => Json(metrics).into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse {
                error: "暂无指标快照".to_string(),
            }),
        )
            .into_response(),
    }
}

pub async fn ml_status(State(state): State<ApiState>) -> impl IntoResponse {
    Json(state.engine.status())
}

#[derive(Debug, Deserialize)]
pub struct SeasonalityQuery {
    /// 回看窗口（天），默认7
    pub days: Option<i64>,
}

pub async fn ml_seasonality(
    State(state): State<ApiState>,
    Path(name): Path<String>,
    Query(query): Query<SeasonalityQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let days = query.days.unwrap_or(7).clamp(1, 90);
    let pattern = state.seasonality.detect(&name, days).await?;
    Ok(Json(pattern))
}

pub async fn ml_anomalies(State(state): State<ApiState>) -> Result<Response, ApiError> {
    match state.monitor.latest() {
        Some(metrics) => {
            let anomalies = state.anomaly.detect(&metrics).await?;
            Ok(Json(anomalies).into_response())
        }
        None => Ok((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse {
                error: "暂无指标快照".to_string(),
            }),
        )
            .into_response()),
    }
}

pub async fn ml_forecast(State(state): State<ApiState>) -> Result<impl IntoResponse, ApiError> {
    let forecast = state.forecaster.forecast_next_hour().await?;
    Ok(Json(serde_json::json!({ "next_hour_load": forecast })))
}

pub async fn ml_predict(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    let definition = state
        .executor
        .get_definition(&name)
        .ok_or_else(|| ArcronError::job_not_found(&name))?;

    match state.monitor.latest() {
        Some(metrics) => {
            let advisory = state.engine.predict(&name, &definition.job_type, &metrics);
            Ok(Json(advisory).into_response())
        }
        None => Ok((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse {
                error: "暂无指标快照，无法预测".to_string(),
            }),
        )
            .into_response()),
    }
}
