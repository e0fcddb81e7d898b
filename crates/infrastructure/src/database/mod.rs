pub mod advisory_repository;
pub mod execution_repository;
pub mod metrics_repository;

pub use advisory_repository::SqliteAdvisoryRepository;
pub use execution_repository::SqliteExecutionRepository;
pub use metrics_repository::SqliteMetricsRepository;

use std::str::FromStr;
use std::time::Duration;

use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::{debug, info};

use arcron_config::DatabaseConfig;
use arcron_errors::{ArcronError, ArcronResult};

/// SQLite连接池与表结构管理
pub struct DatabaseManager {
    pool: SqlitePool,
}

impl DatabaseManager {
    pub async fn new(config: &DatabaseConfig) -> ArcronResult<Self> {
        if config.driver != "sqlite" {
            return Err(ArcronError::Configuration(format!(
                "不支持的数据库驱动: {}",
                config.driver
            )));
        }

        let connect_options = SqliteConnectOptions::from_str(&format!("sqlite:{}", config.dsn))
            .map_err(ArcronError::Database)?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_conns)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(connect_options)
            .await?;

        Self::run_migrations(&pool).await?;

        info!("存储初始化完成: {}", config.dsn);
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn run_migrations(pool: &SqlitePool) -> ArcronResult<()> {
        debug!("执行SQLite数据库迁移");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS job_executions (
                id TEXT PRIMARY KEY,
                job_name TEXT NOT NULL,
                start_time DATETIME NOT NULL,
                end_time DATETIME,
                duration_seconds REAL NOT NULL DEFAULT 0,
                status TEXT NOT NULL,
                exit_code INTEGER,
                output TEXT NOT NULL DEFAULT '',
                error TEXT,
                retry_count INTEGER NOT NULL DEFAULT 0,
                environment TEXT NOT NULL DEFAULT '{}',
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS system_metrics (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp DATETIME NOT NULL,
                cpu_usage REAL NOT NULL DEFAULT 0,
                memory_usage REAL NOT NULL DEFAULT 0,
                disk_read_bytes INTEGER NOT NULL DEFAULT 0,
                disk_write_bytes INTEGER NOT NULL DEFAULT 0,
                disk_read_count INTEGER NOT NULL DEFAULT 0,
                disk_write_count INTEGER NOT NULL DEFAULT 0,
                io_util REAL NOT NULL DEFAULT 0,
                net_bytes_sent INTEGER NOT NULL DEFAULT 0,
                net_bytes_recv INTEGER NOT NULL DEFAULT 0,
                net_packets_sent INTEGER NOT NULL DEFAULT 0,
                net_packets_recv INTEGER NOT NULL DEFAULT 0,
                connections INTEGER NOT NULL DEFAULT 0,
                load1 REAL NOT NULL DEFAULT 0,
                load5 REAL NOT NULL DEFAULT 0,
                load15 REAL NOT NULL DEFAULT 0,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ml_advisories (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                job_name TEXT NOT NULL,
                predicted_at DATETIME NOT NULL,
                optimal_time DATETIME NOT NULL,
                confidence REAL NOT NULL DEFAULT 0,
                reasoning TEXT NOT NULL DEFAULT '',
                expected_load REAL NOT NULL DEFAULT 0,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(pool)
        .await?;

        let indexes = [
            "CREATE INDEX IF NOT EXISTS idx_job_executions_job_name ON job_executions(job_name)",
            "CREATE INDEX IF NOT EXISTS idx_job_executions_start_time ON job_executions(start_time)",
            "CREATE INDEX IF NOT EXISTS idx_system_metrics_timestamp ON system_metrics(timestamp)",
            "CREATE INDEX IF NOT EXISTS idx_ml_advisories_predicted_at ON ml_advisories(predicted_at)",
            "CREATE INDEX IF NOT EXISTS idx_ml_advisories_job_name ON ml_advisories(job_name)",
        ];
        for sql in indexes {
            sqlx::query(sql).execute(pool).await?;
        }

        Ok(())
    }

    /// 保留清理：删除三张表中 created_at 早于 now - older_than 的行
    pub async fn retention_sweep(&self, older_than: chrono::Duration) -> ArcronResult<u64> {
        let cutoff = Utc::now() - older_than;
        let mut deleted = 0u64;

        for table in ["job_executions", "system_metrics", "ml_advisories"] {
            let result = sqlx::query(&format!("DELETE FROM {table} WHERE created_at < $1"))
                .bind(cutoff)
                .execute(&self.pool)
                .await?;
            deleted += result.rows_affected();
        }

        if deleted > 0 {
            info!("保留清理删除了 {} 行", deleted);
        }
        Ok(deleted)
    }

    pub async fn health_check(&self) -> ArcronResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
