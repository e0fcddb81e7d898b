pub mod scheduler;
pub mod wheel;

pub use scheduler::{
    JobDetail, JobState, JobStatusView, PredictiveScheduler, SchedulerConfig, SchedulerStatus,
};
pub use wheel::{CronWheel, EntryId};
