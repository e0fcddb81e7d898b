use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArcronError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),
    #[error("数据库操作错误: {0}")]
    DatabaseOperation(String),
    #[error("配置错误: {0}")]
    Configuration(String),
    #[error("无效的CRON表达式: {expr} - {message}")]
    InvalidCron { expr: String, message: String },
    #[error("任务未找到: {name}")]
    JobNotFound { name: String },
    #[error("任务已存在: {name}")]
    DuplicateJob { name: String },
    #[error("任务正在运行中，拒绝重入: {name}")]
    JobAlreadyRunning { name: String },
    #[error("无效的任务定义: {0}")]
    InvalidJobDefinition(String),
    #[error("任务执行超时: {name} ({timeout_seconds}秒)")]
    ExecutionTimeout { name: String, timeout_seconds: u64 },
    #[error("任务执行错误: {0}")]
    Execution(String),
    #[error("调度错误: {0}")]
    Scheduling(String),
    #[error("组件已在运行: {0}")]
    AlreadyRunning(String),
    #[error("序列化错误: {0}")]
    Serialization(String),
    #[error("内部错误: {0}")]
    Internal(String),
}

pub type ArcronResult<T> = Result<T, ArcronError>;

impl ArcronError {
    pub fn database_error<S: Into<String>>(msg: S) -> Self {
        Self::DatabaseOperation(msg.into())
    }
    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }
    pub fn job_not_found<S: Into<String>>(name: S) -> Self {
        Self::JobNotFound { name: name.into() }
    }
    pub fn execution_error<S: Into<String>>(msg: S) -> Self {
        Self::Execution(msg.into())
    }
    pub fn scheduling_error<S: Into<String>>(msg: S) -> Self {
        Self::Scheduling(msg.into())
    }
    /// 致命错误导致进程退出，仅限启动期的配置与存储初始化失败
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ArcronError::Configuration(_) | ArcronError::InvalidCron { .. }
        )
    }
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ArcronError::Database(_)
                | ArcronError::DatabaseOperation(_)
                | ArcronError::Execution(_)
                | ArcronError::ExecutionTimeout { .. }
        )
    }
}

impl From<serde_json::Error> for ArcronError {
    fn from(err: serde_json::Error) -> Self {
        ArcronError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for ArcronError {
    fn from(err: anyhow::Error) -> Self {
        ArcronError::Internal(err.to_string())
    }
}
