use arcron_core::{ExecutionStatus, JobExecution};
use arcron_worker::JobView;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// /health 响应
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_seconds: u64,
}

/// 任务目录条目
#[derive(Debug, Serialize)]
pub struct JobSummary {
    pub name: String,
    pub command: String,
    #[serde(rename = "type")]
    pub job_type: String,
    pub schedule: String,
    pub timeout_seconds: u64,
    pub retries: u32,
    pub priority: i32,
    pub status: ExecutionStatus,
}

impl From<JobView> for JobSummary {
    fn from(view: JobView) -> Self {
        Self {
            name: view.definition.name.clone(),
            command: view.definition.command.clone(),
            job_type: view.definition.job_type.as_str().to_string(),
            schedule: view.definition.schedule.clone(),
            timeout_seconds: view.definition.timeout_seconds,
            retries: view.definition.retries,
            priority: view.definition.priority,
            status: view.status,
        }
    }
}

/// 执行记录的线格式
#[derive(Debug, Serialize)]
pub struct ExecutionResponse {
    pub id: String,
    pub job_name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_seconds: f64,
    pub status: ExecutionStatus,
    pub exit_code: Option<i32>,
    pub output: String,
    pub error: Option<String>,
    pub retry_count: u32,
}

impl From<JobExecution> for ExecutionResponse {
    fn from(execution: JobExecution) -> Self {
        Self {
            id: execution.id,
            job_name: execution.job_name,
            start_time: execution.start_time,
            end_time: execution.end_time,
            duration_seconds: execution.duration_seconds,
            status: execution.status,
            exit_code: execution.exit_code,
            output: execution.output,
            error: execution.error,
            retry_count: execution.retry_count,
        }
    }
}

/// 错误响应体
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
