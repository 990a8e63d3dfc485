//! Background job scheduler and job implementations.

mod authman_sync;
mod pool_metrics;
mod scheduler;

pub use authman_sync::AuthmanSyncJob;
pub use pool_metrics::PoolMetricsJob;
pub use scheduler::{Job, JobFrequency, JobScheduler};
