pub mod executor;
pub mod manager;

pub use executor::{CommandOutcome, CommandRunner};
pub use manager::{ExecutionManager, ExecutorConfig, JobView};
