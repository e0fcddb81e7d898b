//! YAML配置加载
//!
//! 配置文件缺失时写出默认文档后再读取，缺失字段回填默认值。
//! 配置错误在启动期视为致命。

use std::collections::HashMap;
use std::path::Path;

use tracing::info;

use arcron_core::{CronSchedule, JobDefinition, JobType};
use arcron_errors::{ArcronError, ArcronResult};

pub mod models;

pub use models::{
    AdvancedConfig, AlertsConfig, AppConfig, DashboardAuthConfig, DatabaseConfig, EmailConfig,
    LoggingConfig, MlConfig, PrometheusConfig, ServerConfig, SlackConfig, ThresholdLevels,
    ThresholdsConfig, WebhookConfig,
};

impl AppConfig {
    /// 从文件加载配置；文件不存在时先写出默认文档
    pub fn load<P: AsRef<Path>>(path: P) -> ArcronResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!("配置文件 {} 不存在，写出默认配置", path.display());
            Self::write_default(path)?;
        }

        let raw = std::fs::read_to_string(path).map_err(|e| {
            ArcronError::Configuration(format!("读取配置文件 {} 失败: {e}", path.display()))
        })?;
        let mut config: AppConfig = serde_yaml::from_str(&raw)
            .map_err(|e| ArcronError::Configuration(format!("解析YAML失败: {e}")))?;

        config.apply_defaults();
        config.validate()?;
        Ok(config)
    }

    /// 写出默认配置文档（含默认任务目录）
    pub fn write_default<P: AsRef<Path>>(path: P) -> ArcronResult<()> {
        let path = path.as_ref();
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir).map_err(|e| {
                    ArcronError::Configuration(format!("创建配置目录失败: {e}"))
                })?;
            }
        }
        let config = Self::default_document();
        let data = serde_yaml::to_string(&config)
            .map_err(|e| ArcronError::Configuration(format!("序列化默认配置失败: {e}")))?;
        std::fs::write(path, data).map_err(|e| {
            ArcronError::Configuration(format!("写入默认配置 {} 失败: {e}", path.display()))
        })?;
        Ok(())
    }

    /// 默认文档：两个内置任务 backup / logrotate
    pub fn default_document() -> Self {
        let mut config = AppConfig::default();
        config.jobs = vec![
            JobDefinition {
                name: "backup".to_string(),
                command: "rsync -av /data /backup".to_string(),
                job_type: JobType::ResourceIntensive,
                schedule: "0 2 * * *".to_string(),
                timeout_seconds: 3600,
                retries: 3,
                environment: HashMap::new(),
                priority: 1,
            },
            JobDefinition {
                name: "logrotate".to_string(),
                command: "logrotate /etc/logrotate.conf".to_string(),
                job_type: JobType::Light,
                schedule: "0 0 * * *".to_string(),
                timeout_seconds: 300,
                retries: 1,
                environment: HashMap::new(),
                priority: 5,
            },
        ];
        config
    }

    /// 空串与零值回填默认，保持与默认文档读回等价
    fn apply_defaults(&mut self) {
        let server_defaults = ServerConfig::default();
        if self.server.host.is_empty() {
            self.server.host = server_defaults.host;
        }
        if self.server.port == 0 {
            self.server.port = server_defaults.port;
        }
        if self.server.read_timeout_seconds == 0 {
            self.server.read_timeout_seconds = server_defaults.read_timeout_seconds;
        }
        if self.server.write_timeout_seconds == 0 {
            self.server.write_timeout_seconds = server_defaults.write_timeout_seconds;
        }

        let db_defaults = DatabaseConfig::default();
        if self.database.driver.is_empty() {
            self.database.driver = db_defaults.driver;
        }
        if self.database.dsn.is_empty() {
            self.database.dsn = db_defaults.dsn;
        }
        if self.database.max_conns == 0 {
            self.database.max_conns = db_defaults.max_conns;
        }

        if self.ml.update_interval_hours == 0 {
            self.ml.update_interval_hours = 24;
        }
        if self.ml.features.is_empty() {
            self.ml.features = models::default_features();
        }

        if self.logging.level.is_empty() {
            self.logging.level = "info".to_string();
        }
        if self.logging.format.is_empty() {
            self.logging.format = "json".to_string();
        }

        let adv_defaults = AdvancedConfig::default();
        if self.advanced.metrics_interval_seconds == 0 {
            self.advanced.metrics_interval_seconds = adv_defaults.metrics_interval_seconds;
        }
        if self.advanced.adjustment_threshold == 0 {
            self.advanced.adjustment_threshold = adv_defaults.adjustment_threshold;
        }
        if self.advanced.max_concurrent_jobs == 0 {
            self.advanced.max_concurrent_jobs = adv_defaults.max_concurrent_jobs;
        }
        if self.advanced.job_queue_size == 0 {
            self.advanced.job_queue_size = adv_defaults.job_queue_size;
        }
        if self.advanced.cleanup_after_hours == 0 {
            self.advanced.cleanup_after_hours = adv_defaults.cleanup_after_hours;
        }
        if !self.advanced.prometheus.enabled {
            self.advanced.prometheus.path = "/metrics".to_string();
            self.advanced.prometheus.port = 9090;
        }
    }

    /// 启动期校验：数据库驱动、任务定义与CRON表达式
    pub fn validate(&self) -> ArcronResult<()> {
        if self.database.driver != "sqlite" {
            return Err(ArcronError::Configuration(format!(
                "不支持的数据库驱动: {}",
                self.database.driver
            )));
        }

        let mut seen = std::collections::HashSet::new();
        for job in &self.jobs {
            job.validate()?;
            if !seen.insert(job.name.as_str()) {
                return Err(ArcronError::Configuration(format!(
                    "任务名称重复: {}",
                    job.name
                )));
            }
            CronSchedule::validate(&job.schedule)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
