use std::collections::HashMap;
use std::str::FromStr;

use arcron_errors::{ArcronError, ArcronResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 执行记录状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Retrying,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Retrying => "retrying",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionStatus::Completed | ExecutionStatus::Failed)
    }
}

impl FromStr for ExecutionStatus {
    type Err = ArcronError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ExecutionStatus::Pending),
            "running" => Ok(ExecutionStatus::Running),
            "completed" => Ok(ExecutionStatus::Completed),
            "failed" => Ok(ExecutionStatus::Failed),
            "retrying" => Ok(ExecutionStatus::Retrying),
            other => Err(ArcronError::Internal(format!(
                "未知的执行状态: {other}"
            ))),
        }
    }
}

/// 单次任务执行记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobExecution {
    pub id: String,
    pub job_name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    /// 秒，派生自 end_time - start_time
    pub duration_seconds: f64,
    pub status: ExecutionStatus,
    pub exit_code: Option<i32>,
    pub output: String,
    pub error: Option<String>,
    pub retry_count: u32,
    /// JSON 序列化后的环境变量映射
    pub environment: String,
}

impl JobExecution {
    /// 创建一条起始记录，ID 形如 exec_<unix_nanos>
    pub fn started(job_name: &str, environment: &HashMap<String, String>) -> Self {
        Self {
            id: generate_execution_id(),
            job_name: job_name.to_string(),
            start_time: Utc::now(),
            end_time: None,
            duration_seconds: 0.0,
            status: ExecutionStatus::Running,
            exit_code: None,
            output: String::new(),
            error: None,
            retry_count: 0,
            environment: serde_json::to_string(environment).unwrap_or_else(|_| "{}".to_string()),
        }
    }

    /// 写入终态，duration 由时间差派生
    pub fn finish(
        &mut self,
        status: ExecutionStatus,
        exit_code: Option<i32>,
        output: String,
        error: Option<String>,
    ) {
        let end = Utc::now();
        self.end_time = Some(end);
        self.duration_seconds = (end - self.start_time)
            .to_std()
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        self.status = status;
        self.exit_code = exit_code;
        self.output = output;
        self.error = error;
    }
}

pub fn generate_execution_id() -> String {
    format!("exec_{}", Utc::now().timestamp_nanos_opt().unwrap_or_default())
}

/// 单个任务的执行统计
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobStats {
    pub total: i64,
    pub completed: i64,
    pub failed: i64,
    /// 百分比, 0-100
    pub success_rate: f64,
    /// 仅统计 completed 记录
    pub avg_duration_seconds: f64,
}

impl JobStats {
    pub fn compute(total: i64, completed: i64, failed: i64, avg_duration_seconds: f64) -> Self {
        let success_rate = if total > 0 {
            completed as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        Self {
            total,
            completed,
            failed,
            success_rate,
            avg_duration_seconds,
        }
    }
}

pub fn parse_status(s: &str) -> ArcronResult<ExecutionStatus> {
    ExecutionStatus::from_str(s)
}
