use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use arcron_core::models::execution::parse_status;
use arcron_core::{ExecutionRepository, JobExecution, JobStats};
use arcron_errors::{ArcronError, ArcronResult};

pub struct SqliteExecutionRepository {
    pool: SqlitePool,
}

impl SqliteExecutionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_execution(row: &sqlx::sqlite::SqliteRow) -> ArcronResult<JobExecution> {
        let status: String = row.try_get("status")?;
        Ok(JobExecution {
            id: row.try_get("id")?,
            job_name: row.try_get("job_name")?,
            start_time: row.try_get("start_time")?,
            end_time: row.try_get("end_time")?,
            duration_seconds: row.try_get("duration_seconds")?,
            status: parse_status(&status)?,
            exit_code: row.try_get("exit_code")?,
            output: row.try_get("output")?,
            error: row.try_get("error")?,
            retry_count: row.try_get::<i64, _>("retry_count")? as u32,
            environment: row.try_get("environment")?,
        })
    }
}

#[async_trait]
impl ExecutionRepository for SqliteExecutionRepository {
    /// 按 id upsert：起始行先写入，终态行覆盖除 start_time 外的列
    async fn store_execution(&self, execution: &JobExecution) -> ArcronResult<()> {
        // created_at/updated_at 由绑定值写入，保证与保留清理的游标格式一致
        let now = chrono::Utc::now();
        sqlx::query(
            r#"
            INSERT INTO job_executions (id, job_name, start_time, end_time, duration_seconds,
                                        status, exit_code, output, error, retry_count, environment,
                                        created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $12)
            ON CONFLICT(id) DO UPDATE SET
                end_time = excluded.end_time,
                duration_seconds = excluded.duration_seconds,
                status = excluded.status,
                exit_code = excluded.exit_code,
                output = excluded.output,
                error = excluded.error,
                retry_count = excluded.retry_count,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&execution.id)
        .bind(&execution.job_name)
        .bind(execution.start_time)
        .bind(execution.end_time)
        .bind(execution.duration_seconds)
        .bind(execution.status.as_str())
        .bind(execution.exit_code)
        .bind(&execution.output)
        .bind(&execution.error)
        .bind(execution.retry_count as i64)
        .bind(&execution.environment)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(ArcronError::Database)?;

        debug!("执行记录已写入: {} ({})", execution.id, execution.status.as_str());
        Ok(())
    }

    async fn get_executions(&self, job_name: &str, limit: i64) -> ArcronResult<Vec<JobExecution>> {
        let rows = sqlx::query(
            r#"
            SELECT id, job_name, start_time, end_time, duration_seconds, status,
                   exit_code, output, error, retry_count, environment
            FROM job_executions
            WHERE job_name = $1
            ORDER BY start_time DESC
            LIMIT $2
            "#,
        )
        .bind(job_name)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(ArcronError::Database)?;

        rows.iter().map(Self::row_to_execution).collect()
    }

    async fn get_job_stats(&self, job_name: &str) -> ArcronResult<JobStats> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS total,
                   COALESCE(SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END), 0) AS completed,
                   COALESCE(SUM(CASE WHEN status = 'failed' THEN 1 ELSE 0 END), 0) AS failed,
                   COALESCE(AVG(CASE WHEN status = 'completed' THEN duration_seconds END), 0.0) AS avg_duration
            FROM job_executions
            WHERE job_name = $1
            "#,
        )
        .bind(job_name)
        .fetch_one(&self.pool)
        .await
        .map_err(ArcronError::Database)?;

        let total: i64 = row.try_get("total")?;
        let completed: i64 = row.try_get("completed")?;
        let failed: i64 = row.try_get("failed")?;
        let avg_duration: f64 = row.try_get("avg_duration")?;

        Ok(JobStats::compute(total, completed, failed, avg_duration))
    }
}
