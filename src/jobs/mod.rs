//! Job tracking and a bounded worker pool for running transfers off the
//! caller's thread.

mod pool;
mod tracker;

pub use pool::{JobPool, JobRunner, PoolConfig};
pub use tracker::{JobId, JobReporter, ProgressRecord, ProgressTracker};
