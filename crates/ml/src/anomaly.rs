use std::sync::Arc;

use chrono::{Duration, Utc};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use arcron_core::{Anomaly, AnomalySeverity, MetricsRepository, SystemMetrics};
use arcron_errors::ArcronResult;

/// 默认判定阈值（σ数）
const DEFAULT_THRESHOLD: f64 = 3.0;
/// 基线窗口：最近7天
const BASELINE_WINDOW_DAYS: i64 = 7;
/// 基线样本下限，不足时不报异常
const MIN_BASELINE_SAMPLES: usize = 10;

#[derive(Debug, Clone, Copy, Default)]
struct Baseline {
    mean: f64,
    std: f64,
    samples: usize,
}

/// 对照7天组合负载基线检测当前快照的异常通道
pub struct AnomalyDetector {
    store: Arc<dyn MetricsRepository>,
    threshold: f64,
    baseline: RwLock<Baseline>,
}

impl AnomalyDetector {
    pub fn new(store: Arc<dyn MetricsRepository>) -> Self {
        Self::with_threshold(store, DEFAULT_THRESHOLD)
    }

    pub fn with_threshold(store: Arc<dyn MetricsRepository>, threshold: f64) -> Self {
        Self {
            store,
            threshold,
            baseline: RwLock::new(Baseline::default()),
        }
    }

    /// 检测当前快照；基线按需刷新，刷新失败沿用旧基线
    pub async fn detect(&self, metrics: &SystemMetrics) -> ArcronResult<Vec<Anomaly>> {
        if let Err(e) = self.refresh_baseline().await {
            warn!("刷新异常基线失败: {e}");
        }

        let baseline = *self.baseline.read().await;
        if baseline.samples < MIN_BASELINE_SAMPLES {
            debug!(
                "异常基线样本不足: {} < {MIN_BASELINE_SAMPLES}",
                baseline.samples
            );
            return Ok(Vec::new());
        }

        let channels = [
            ("cpu", metrics.cpu_usage),
            ("memory", metrics.memory_usage),
            ("disk", metrics.disk_io_mb()),
            ("network", metrics.network_io_mb()),
        ];

        let mut anomalies = Vec::new();
        for (channel, value) in channels {
            if let Some(anomaly) = self.check_channel(channel, value, &baseline) {
                anomalies.push(anomaly);
            }
        }
        Ok(anomalies)
    }

    fn check_channel(&self, channel: &str, value: f64, baseline: &Baseline) -> Option<Anomaly> {
        if baseline.std == 0.0 {
            return None;
        }

        let deviation = (value - baseline.mean) / baseline.std;
        if deviation.abs() < self.threshold {
            return None;
        }

        let description = if deviation > 0.0 {
            format!(
                "{channel} usage is {:.1}% above normal ({:.1} standard deviations)",
                value - baseline.mean,
                deviation
            )
        } else {
            format!(
                "{channel} usage is {:.1}% below normal ({:.1} standard deviations)",
                baseline.mean - value,
                deviation.abs()
            )
        };

        Some(Anomaly {
            channel: channel.to_string(),
            severity: AnomalySeverity::from_deviation(deviation.abs()),
            value,
            expected: baseline.mean,
            deviation,
            timestamp: Utc::now(),
            description,
        })
    }

    /// 由最近7天快照的组合负载重算 mean/σ
    async fn refresh_baseline(&self) -> ArcronResult<()> {
        let end = Utc::now();
        let start = end - Duration::days(BASELINE_WINDOW_DAYS);
        let metrics = self.store.get_metrics(start, end, 10_000).await?;

        if metrics.len() < MIN_BASELINE_SAMPLES {
            // 样本不足时保留既有基线
            return Ok(());
        }

        let loads: Vec<f64> = metrics.iter().map(|m| m.combined_load()).collect();
        let mean = loads.iter().sum::<f64>() / loads.len() as f64;
        let variance = loads.iter().map(|l| (l - mean).powi(2)).sum::<f64>() / loads.len() as f64;

        let mut baseline = self.baseline.write().await;
        *baseline = Baseline {
            mean,
            std: variance.sqrt(),
            samples: loads.len(),
        };
        Ok(())
    }

    /// 测试与离线分析用：直接设定基线
    pub async fn set_baseline(&self, mean: f64, std: f64, samples: usize) {
        *self.baseline.write().await = Baseline { mean, std, samples };
    }
}
