use async_trait::async_trait;
use chrono::{DateTime, Utc};

use arcron_errors::ArcronResult;

use crate::models::advisory::Advisory;
use crate::models::execution::{JobExecution, JobStats};
use crate::models::metrics::SystemMetrics;

/// 执行记录仓库
#[async_trait]
pub trait ExecutionRepository: Send + Sync {
    /// 按 id upsert：起始行先落库，终态行覆盖
    async fn store_execution(&self, execution: &JobExecution) -> ArcronResult<()>;
    /// 按 start_time 倒序
    async fn get_executions(&self, job_name: &str, limit: i64) -> ArcronResult<Vec<JobExecution>>;
    async fn get_job_stats(&self, job_name: &str) -> ArcronResult<JobStats>;
}

/// 指标快照仓库，仅追加
#[async_trait]
pub trait MetricsRepository: Send + Sync {
    async fn store_metrics(&self, metrics: &SystemMetrics) -> ArcronResult<()>;
    /// 按 timestamp 倒序
    async fn get_metrics(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: i64,
    ) -> ArcronResult<Vec<SystemMetrics>>;
}

/// 调度建议仓库，仅追加，保留窗口内可查
#[async_trait]
pub trait AdvisoryRepository: Send + Sync {
    async fn store_advisory(&self, advisory: &Advisory) -> ArcronResult<()>;
}
