use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Datelike, Duration, Timelike, Utc};
use tracing::debug;

use arcron_core::{MetricsRepository, SeasonalPattern};
use arcron_errors::ArcronResult;

/// 识别历史负载的日内/周内模式
pub struct SeasonalityDetector {
    store: Arc<dyn MetricsRepository>,
}

/// 分桶均值超过总体均值的倍数视为高峰
const PEAK_RATIO: f64 = 1.2;
/// 低于总体均值的倍数视为低谷
const LOW_RATIO: f64 = 0.8;
/// 最少样本数，不足时不给出结论
const MIN_SAMPLES: usize = 24;

impl SeasonalityDetector {
    pub fn new(store: Arc<dyn MetricsRepository>) -> Self {
        Self { store }
    }

    /// 在最近 window_days 天的快照上检测模式；样本不足返回 None
    pub async fn detect(
        &self,
        job_name: &str,
        window_days: i64,
    ) -> ArcronResult<Option<SeasonalPattern>> {
        let end = Utc::now();
        let start = end - Duration::days(window_days);
        let metrics = self.store.get_metrics(start, end, 10_000).await?;

        if metrics.len() < MIN_SAMPLES {
            debug!(
                "任务 {job_name} 季节性检测样本不足: {} < {MIN_SAMPLES}",
                metrics.len()
            );
            return Ok(None);
        }

        let mut hourly: BTreeMap<u32, Vec<f64>> = BTreeMap::new();
        let mut by_weekday: BTreeMap<u32, Vec<f64>> = BTreeMap::new();
        for m in &metrics {
            let load = m.combined_load();
            hourly.entry(m.timestamp.hour()).or_default().push(load);
            by_weekday
                .entry(m.timestamp.weekday().num_days_from_sunday())
                .or_default()
                .push(load);
        }

        let hourly_avg: BTreeMap<u32, f64> = hourly
            .iter()
            .map(|(h, loads)| (*h, mean(loads)))
            .collect();
        let day_avg: BTreeMap<u32, f64> = by_weekday
            .iter()
            .map(|(d, loads)| (*d, mean(loads)))
            .collect();

        let (peak_hours, low_hours, hour_strength) = classify_bins(&hourly_avg);
        let (peak_days, low_days, day_strength) = classify_bins(&day_avg);

        let mut pattern = SeasonalPattern {
            pattern_type: "daily".to_string(),
            strength: hour_strength,
            peak_hours,
            low_hours,
            peak_days,
            low_days,
        };
        if day_strength > hour_strength {
            pattern.pattern_type = "weekly".to_string();
            pattern.strength = day_strength;
        }

        Ok(Some(pattern))
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// 按 1.2×/0.8× 规则划分高峰/低谷桶；强度为分桶均值的变异系数，截断到 [0,1]
fn classify_bins(bin_avgs: &BTreeMap<u32, f64>) -> (Vec<u32>, Vec<u32>, f64) {
    if bin_avgs.is_empty() {
        return (Vec::new(), Vec::new(), 0.0);
    }

    let overall: f64 = bin_avgs.values().sum::<f64>() / bin_avgs.len() as f64;

    let mut peaks = Vec::new();
    let mut lows = Vec::new();
    for (bin, avg) in bin_avgs {
        if *avg > overall * PEAK_RATIO {
            peaks.push(*bin);
        } else if *avg < overall * LOW_RATIO {
            lows.push(*bin);
        }
    }

    let variance = bin_avgs
        .values()
        .map(|avg| (avg - overall).powi(2))
        .sum::<f64>()
        / bin_avgs.len() as f64;
    let strength = if overall > 0.0 {
        (variance.sqrt() / overall).clamp(0.0, 1.0)
    } else {
        0.0
    };

    (peaks, lows, strength)
}
