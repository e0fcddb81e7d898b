pub mod database;
pub mod monitor;

pub use database::{
    DatabaseManager, SqliteAdvisoryRepository, SqliteExecutionRepository, SqliteMetricsRepository,
};
pub use monitor::SystemMonitor;
