//! Process-wide progress records keyed by job.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::RwLock;
use uuid::Uuid;

use crate::transfer::{ProgressSink, PROGRESS_DONE, PROGRESS_FAILED};

/// Unique job identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobId(Uuid);

impl JobId {
    /// Generate a new random job id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Latest progress of one job.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressRecord {
    /// 0-100, or [`PROGRESS_FAILED`].
    pub progress: i32,
    /// Last status message.
    pub status: String,
    /// When the record was last written.
    pub updated_at: SystemTime,
}

impl ProgressRecord {
    /// Whether the job reported a failure.
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        self.progress == PROGRESS_FAILED
    }

    /// Whether the job finished successfully.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.progress == PROGRESS_DONE
    }

    /// Whether the job has stopped reporting, successfully or not.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.is_failed() || self.is_complete()
    }
}

/// Shared map of job progress, safe to clone into worker threads and pollers.
#[derive(Debug, Clone, Default)]
pub struct ProgressTracker {
    records: Arc<RwLock<HashMap<JobId, ProgressRecord>>>,
}

impl ProgressTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the record for `id`.
    pub fn update(&self, id: JobId, progress: i32, status: &str) {
        let record = ProgressRecord {
            progress,
            status: status.to_string(),
            updated_at: SystemTime::now(),
        };
        self.records.write().insert(id, record);
    }

    /// Latest record for `id`, if the job is known.
    #[must_use]
    pub fn get(&self, id: JobId) -> Option<ProgressRecord> {
        self.records.read().get(&id).cloned()
    }

    /// Forget a job, returning its last record.
    pub fn remove(&self, id: JobId) -> Option<ProgressRecord> {
        self.records.write().remove(&id)
    }

    /// Drop finished records last written at least `max_age` ago.
    ///
    /// Running jobs are never evicted. Returns the number of records removed.
    pub fn evict_finished(&self, max_age: Duration) -> usize {
        let mut records = self.records.write();
        let before = records.len();
        records.retain(|_, record| {
            // A clock that moved backwards leaves the record in place
            let expired = record
                .updated_at
                .elapsed()
                .is_ok_and(|age| age >= max_age);
            !(record.is_finished() && expired)
        });
        before - records.len()
    }

    /// Number of tracked jobs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Whether no jobs are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// A progress sink that writes into this tracker under `id`.
    #[must_use]
    pub fn reporter(&self, id: JobId) -> JobReporter {
        JobReporter {
            tracker: self.clone(),
            id,
        }
    }
}

/// [`ProgressSink`] bound to one job of a [`ProgressTracker`].
#[derive(Debug, Clone)]
pub struct JobReporter {
    tracker: ProgressTracker,
    id: JobId,
}

impl JobReporter {
    /// Job this reporter writes to.
    #[must_use]
    pub const fn id(&self) -> JobId {
        self.id
    }
}

impl ProgressSink for JobReporter {
    fn report(&mut self, progress: i32, status: &str) {
        self.tracker.update(self.id, progress, status);
    }
}
