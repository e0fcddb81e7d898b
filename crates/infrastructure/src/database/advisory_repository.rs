use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

use arcron_core::{Advisory, AdvisoryRepository};
use arcron_errors::{ArcronError, ArcronResult};

pub struct SqliteAdvisoryRepository {
    pool: SqlitePool,
}

impl SqliteAdvisoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AdvisoryRepository for SqliteAdvisoryRepository {
    async fn store_advisory(&self, advisory: &Advisory) -> ArcronResult<()> {
        sqlx::query(
            r#"
            INSERT INTO ml_advisories (job_name, predicted_at, optimal_time,
                                       confidence, reasoning, expected_load, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $2)
            "#,
        )
        .bind(&advisory.job_name)
        .bind(Utc::now())
        .bind(advisory.optimal_time)
        .bind(advisory.confidence)
        .bind(&advisory.reasoning)
        .bind(advisory.expected_load)
        .execute(&self.pool)
        .await
        .map_err(ArcronError::Database)?;

        Ok(())
    }
}
