pub mod cron;
pub mod models;
pub mod traits;

pub use cron::CronSchedule;
pub use models::advisory::{Advisory, Anomaly, AnomalySeverity, SeasonalPattern};
pub use models::execution::{ExecutionStatus, JobExecution, JobStats};
pub use models::job::{JobDefinition, JobType};
pub use models::metrics::{DiskIo, LoadAverage, NetworkIo, SystemMetrics};
pub use traits::{AdvisoryRepository, ExecutionRepository, MetricsRepository};
