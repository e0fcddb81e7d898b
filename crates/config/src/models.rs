use std::collections::HashMap;

use arcron_core::JobDefinition;
use serde::{Deserialize, Serialize};

/// 顶层配置文档
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub jobs: Vec<JobDefinition>,
    #[serde(default)]
    pub ml: MlConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub advanced: AdvancedConfig,
    #[serde(default)]
    pub alerts: AlertsConfig,
    #[serde(default)]
    pub thresholds: ThresholdsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub read_timeout_seconds: u64,
    #[serde(default)]
    pub write_timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8080,
            read_timeout_seconds: 30,
            write_timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub driver: String,
    #[serde(default)]
    pub dsn: String,
    #[serde(default)]
    pub max_conns: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: "sqlite".to_string(),
            dsn: "arcron.db".to_string(),
            max_conns: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MlConfig {
    #[serde(default)]
    pub model_path: String,
    #[serde(default)]
    pub training_data: String,
    #[serde(default)]
    pub update_interval_hours: u64,
    #[serde(default)]
    pub features: Vec<String>,
}

impl Default for MlConfig {
    fn default() -> Self {
        Self {
            model_path: "models/arcron_model".to_string(),
            training_data: "data/metrics.csv".to_string(),
            update_interval_hours: 24,
            features: default_features(),
        }
    }
}

pub(crate) fn default_features() -> Vec<String> {
    vec![
        "cpu_usage".to_string(),
        "memory_usage".to_string(),
        "io_wait".to_string(),
        "network_io".to_string(),
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: String,
    #[serde(default)]
    pub format: String,
    #[serde(default)]
    pub output_file: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "json".to_string(),
            output_file: "logs/arcron.log".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvancedConfig {
    #[serde(default)]
    pub metrics_interval_seconds: u64,
    /// 预留
    #[serde(default)]
    pub adjustment_threshold: u32,
    #[serde(default)]
    pub max_concurrent_jobs: usize,
    #[serde(default)]
    pub job_queue_size: usize,
    #[serde(default)]
    pub cleanup_after_hours: u64,
    #[serde(default)]
    pub enable_dashboard: bool,
    #[serde(default)]
    pub enable_alerts: bool,
    #[serde(default)]
    pub dashboard_auth: DashboardAuthConfig,
    #[serde(default)]
    pub prometheus: PrometheusConfig,
}

impl Default for AdvancedConfig {
    fn default() -> Self {
        Self {
            metrics_interval_seconds: 5,
            adjustment_threshold: 5,
            max_concurrent_jobs: 10,
            job_queue_size: 100,
            cleanup_after_hours: 168,
            enable_dashboard: false,
            enable_alerts: false,
            dashboard_auth: DashboardAuthConfig::default(),
            prometheus: PrometheusConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DashboardAuthConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrometheusConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub port: u16,
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: "/metrics".to_string(),
            port: 9090,
        }
    }
}

/// 告警通道配置，核心仅透传给告警协作方
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub slack: SlackConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmailConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub smtp_host: String,
    #[serde(default)]
    pub smtp_port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlackConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub webhook_url: String,
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub username: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThresholdsConfig {
    #[serde(default)]
    pub cpu: ThresholdLevels,
    #[serde(default)]
    pub memory: ThresholdLevels,
    #[serde(default)]
    pub disk: ThresholdLevels,
    #[serde(default)]
    pub network: ThresholdLevels,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThresholdLevels {
    #[serde(default)]
    pub warning: f64,
    #[serde(default)]
    pub critical: f64,
}
