use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use arcron_core::{DiskIo, LoadAverage, MetricsRepository, NetworkIo, SystemMetrics};
use arcron_errors::{ArcronError, ArcronResult};

pub struct SqliteMetricsRepository {
    pool: SqlitePool,
}

impl SqliteMetricsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_metrics(row: &sqlx::sqlite::SqliteRow) -> ArcronResult<SystemMetrics> {
        Ok(SystemMetrics {
            timestamp: row.try_get("timestamp")?,
            cpu_usage: row.try_get("cpu_usage")?,
            memory_usage: row.try_get("memory_usage")?,
            disk_io: DiskIo {
                read_bytes: row.try_get::<i64, _>("disk_read_bytes")? as u64,
                write_bytes: row.try_get::<i64, _>("disk_write_bytes")? as u64,
                read_count: row.try_get::<i64, _>("disk_read_count")? as u64,
                write_count: row.try_get::<i64, _>("disk_write_count")? as u64,
                io_util: row.try_get("io_util")?,
            },
            network_io: NetworkIo {
                bytes_sent: row.try_get::<i64, _>("net_bytes_sent")? as u64,
                bytes_recv: row.try_get::<i64, _>("net_bytes_recv")? as u64,
                packets_sent: row.try_get::<i64, _>("net_packets_sent")? as u64,
                packets_recv: row.try_get::<i64, _>("net_packets_recv")? as u64,
                connections: row.try_get("connections")?,
            },
            load_avg: LoadAverage {
                load1: row.try_get("load1")?,
                load5: row.try_get("load5")?,
                load15: row.try_get("load15")?,
            },
        })
    }
}

#[async_trait]
impl MetricsRepository for SqliteMetricsRepository {
    async fn store_metrics(&self, metrics: &SystemMetrics) -> ArcronResult<()> {
        sqlx::query(
            r#"
            INSERT INTO system_metrics (timestamp, cpu_usage, memory_usage,
                disk_read_bytes, disk_write_bytes, disk_read_count, disk_write_count, io_util,
                net_bytes_sent, net_bytes_recv, net_packets_sent, net_packets_recv, connections,
                load1, load5, load15, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(metrics.timestamp)
        .bind(metrics.cpu_usage)
        .bind(metrics.memory_usage)
        .bind(metrics.disk_io.read_bytes as i64)
        .bind(metrics.disk_io.write_bytes as i64)
        .bind(metrics.disk_io.read_count as i64)
        .bind(metrics.disk_io.write_count as i64)
        .bind(metrics.disk_io.io_util)
        .bind(metrics.network_io.bytes_sent as i64)
        .bind(metrics.network_io.bytes_recv as i64)
        .bind(metrics.network_io.packets_sent as i64)
        .bind(metrics.network_io.packets_recv as i64)
        .bind(metrics.network_io.connections)
        .bind(metrics.load_avg.load1)
        .bind(metrics.load_avg.load5)
        .bind(metrics.load_avg.load15)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(ArcronError::Database)?;

        Ok(())
    }

    async fn get_metrics(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: i64,
    ) -> ArcronResult<Vec<SystemMetrics>> {
        let rows = sqlx::query(
            r#"
            SELECT timestamp, cpu_usage, memory_usage,
                   disk_read_bytes, disk_write_bytes, disk_read_count, disk_write_count, io_util,
                   net_bytes_sent, net_bytes_recv, net_packets_sent, net_packets_recv, connections,
                   load1, load5, load15
            FROM system_metrics
            WHERE timestamp BETWEEN $1 AND $2
            ORDER BY timestamp DESC
            LIMIT $3
            "#,
        )
        .bind(start)
        .bind(end)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(ArcronError::Database)?;

        rows.iter().map(Self::row_to_metrics).collect()
    }
}
