use std::sync::Arc;

use chrono::{Duration, Timelike, Utc};
use tracing::debug;

use arcron_core::{MetricsRepository, SystemMetrics};
use arcron_errors::ArcronResult;

/// 回看窗口：24小时
const WINDOW_HOURS: i64 = 24;
/// 样本不足时的中性负载
const NEUTRAL_LOAD: f64 = 50.0;
const MIN_SAMPLES: usize = 10;

/// 指数加权的短时负载预测器
pub struct LoadForecaster {
    store: Arc<dyn MetricsRepository>,
}

impl LoadForecaster {
    pub fn new(store: Arc<dyn MetricsRepository>) -> Self {
        Self { store }
    }

    /// 预测下一小时的组合负载标量
    pub async fn forecast_next_hour(&self) -> ArcronResult<f64> {
        let end = Utc::now();
        let start = end - Duration::hours(WINDOW_HOURS);
        let metrics = self
            .store
            .get_metrics(start, end, WINDOW_HOURS * 2)
            .await?;

        if metrics.len() < MIN_SAMPLES {
            debug!("预测样本不足 ({})，返回中性负载", metrics.len());
            return Ok(NEUTRAL_LOAD);
        }

        let forecast = weighted_forecast(&metrics) * seasonal_adjustment(Utc::now().hour());
        Ok(forecast)
    }
}

/// 指数加权均值 + 首尾线性趋势
///
/// 入参按 timestamp 倒序（仓库排序），权重 e^(0.1·i) 随时间向最近增长。
fn weighted_forecast(metrics: &[SystemMetrics]) -> f64 {
    let chronological: Vec<f64> = metrics.iter().rev().map(|m| m.combined_load()).collect();

    let mut total_weight = 0.0;
    let mut prediction = 0.0;
    for (i, load) in chronological.iter().enumerate() {
        let weight = (0.1 * i as f64).exp();
        prediction += load * weight;
        total_weight += weight;
    }
    prediction /= total_weight;

    if chronological.len() >= 2 {
        let oldest = chronological[0];
        let recent = chronological[chronological.len() - 1];
        prediction += (recent - oldest) / chronological.len() as f64;
    }

    prediction
}

/// 粗粒度昼夜系数：夜间 ×0.7，工作时段 ×1.2
fn seasonal_adjustment(hour: u32) -> f64 {
    if hour < 6 {
        0.7
    } else if (9..17).contains(&hour) {
        1.2
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    fn sample(ts: DateTime<Utc>, load: f64) -> SystemMetrics {
        let mut m = SystemMetrics::empty_at(ts);
        m.cpu_usage = load;
        m.memory_usage = load;
        m
    }

    fn descending_samples(loads: &[f64]) -> Vec<SystemMetrics> {
        // 仓库语义：最近的在前
        let now = Utc::now();
        loads
            .iter()
            .enumerate()
            .map(|(i, load)| sample(now - Duration::minutes(i as i64 * 30), *load))
            .collect()
    }

    #[test]
    fn test_seasonal_adjustment_bands() {
        assert_eq!(seasonal_adjustment(0), 0.7);
        assert_eq!(seasonal_adjustment(5), 0.7);
        assert_eq!(seasonal_adjustment(6), 1.0);
        assert_eq!(seasonal_adjustment(9), 1.2);
        assert_eq!(seasonal_adjustment(16), 1.2);
        assert_eq!(seasonal_adjustment(17), 1.0);
        assert_eq!(seasonal_adjustment(23), 1.0);
    }

    #[test]
    fn test_recent_samples_dominate() {
        // 最近的负载高，预测应偏向高值
        let rising = descending_samples(&[90.0, 90.0, 90.0, 20.0, 20.0, 20.0, 20.0, 20.0, 20.0, 20.0]);
        let falling = descending_samples(&[20.0, 20.0, 20.0, 90.0, 90.0, 90.0, 90.0, 90.0, 90.0, 90.0]);
        assert!(weighted_forecast(&rising) > weighted_forecast(&falling));
    }

    #[test]
    fn test_uniform_load_forecasts_itself() {
        let flat = descending_samples(&[40.0; 12]);
        let forecast = weighted_forecast(&flat);
        assert!((forecast - 40.0).abs() < 1e-9);
    }

    struct FixedStore(Vec<SystemMetrics>);

    #[async_trait::async_trait]
    impl MetricsRepository for FixedStore {
        async fn store_metrics(&self, _metrics: &SystemMetrics) -> ArcronResult<()> {
            Ok(())
        }
        async fn get_metrics(
            &self,
            _start: DateTime<Utc>,
            _end: DateTime<Utc>,
            limit: i64,
        ) -> ArcronResult<Vec<SystemMetrics>> {
            Ok(self.0.iter().take(limit as usize).cloned().collect())
        }
    }

    #[tokio::test]
    async fn test_insufficient_history_returns_neutral() {
        let forecaster = LoadForecaster::new(Arc::new(FixedStore(descending_samples(&[80.0; 3]))));
        let forecast = forecaster.forecast_next_hour().await.unwrap();
        assert!((forecast - NEUTRAL_LOAD).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_forecast_tracks_history_scale() {
        let forecaster = LoadForecaster::new(Arc::new(FixedStore(descending_samples(&[60.0; 20]))));
        let forecast = forecaster.forecast_next_hour().await.unwrap();
        // 昼夜系数最多 ±30%
        assert!(forecast >= 60.0 * 0.7 - 1e-9 && forecast <= 60.0 * 1.2 + 1e-9);
    }
}
