use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 针对单个任务的调度建议
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Advisory {
    pub job_name: String,
    pub optimal_time: DateTime<Utc>,
    /// [0,1]
    pub confidence: f64,
    pub reasoning: String,
    pub expected_load: f64,
}

/// 检测到的季节性模式
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeasonalPattern {
    /// "daily" 或 "weekly"
    #[serde(rename = "type")]
    pub pattern_type: String,
    /// [0,1]，分桶均值的变异系数
    pub strength: f64,
    pub peak_hours: Vec<u32>,
    pub low_hours: Vec<u32>,
    /// 周日为 0
    pub peak_days: Vec<u32>,
    pub low_days: Vec<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnomalySeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl AnomalySeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalySeverity::Low => "low",
            AnomalySeverity::Medium => "medium",
            AnomalySeverity::High => "high",
            AnomalySeverity::Critical => "critical",
        }
    }

    /// 按偏离基线的σ数划分严重级别
    pub fn from_deviation(abs_deviation: f64) -> Self {
        if abs_deviation >= 4.0 {
            AnomalySeverity::Critical
        } else if abs_deviation >= 3.5 {
            AnomalySeverity::High
        } else if abs_deviation >= 3.0 {
            AnomalySeverity::Medium
        } else {
            AnomalySeverity::Low
        }
    }
}

/// 单个指标通道上检测到的异常
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anomaly {
    /// "cpu" | "memory" | "disk" | "network"
    pub channel: String,
    pub severity: AnomalySeverity,
    pub value: f64,
    pub expected: f64,
    /// 带符号的σ数
    pub deviation: f64,
    pub timestamp: DateTime<Utc>,
    pub description: String,
}
