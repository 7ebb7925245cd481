//! Bounded worker pool for style transfer jobs.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use crate::error::{Error, Result};
use crate::transfer::{ProgressSink, StyleTransfer, TransferRequest, STATUS_STARTED};

use super::tracker::{JobId, ProgressTracker};

/// Executes one job, reporting progress through `sink`.
pub trait JobRunner: Send + Sync + 'static {
    /// Run `request` to completion or failure.
    fn run(&self, request: &TransferRequest, sink: &mut dyn ProgressSink);
}

impl JobRunner for StyleTransfer {
    fn run(&self, request: &TransferRequest, sink: &mut dyn ProgressSink) {
        self.transfer(request, sink);
    }
}

/// Worker and queue limits.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of jobs that run concurrently.
    pub workers: usize,

    /// Number of accepted jobs that may wait for a worker.
    pub queue_depth: usize,

    /// How long finished records stay in the tracker. `None` keeps them
    /// until [`ProgressTracker::remove`] is called.
    pub retention: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            queue_depth: 8,
            retention: Some(Duration::from_secs(60 * 60)),
        }
    }
}

struct Job {
    id: JobId,
    request: TransferRequest,
}

/// Fixed set of worker threads draining a bounded queue.
///
/// Jobs beyond `queue_depth` pending are rejected rather than queued, so the
/// shared device never sees more than `workers` transfers at once.
pub struct JobPool {
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
    tracker: ProgressTracker,
    queue_depth: usize,
    retention: Option<Duration>,
}

impl JobPool {
    /// Start the worker threads.
    ///
    /// # Errors
    ///
    /// Returns an error if `workers` is zero or a thread cannot be spawned.
    pub fn new<R: JobRunner>(runner: R, tracker: ProgressTracker, config: &PoolConfig) -> Result<Self> {
        if config.workers == 0 {
            return Err(Error::invalid("workers", "must be greater than 0"));
        }

        let runner = Arc::new(runner);
        let (sender, receiver) = bounded(config.queue_depth);

        let mut workers = Vec::with_capacity(config.workers);
        for index in 0..config.workers {
            let runner = Arc::clone(&runner);
            let tracker = tracker.clone();
            let receiver = receiver.clone();

            let handle = thread::Builder::new()
                .name(format!("stylize-worker-{index}"))
                .spawn(move || worker_loop(&*runner, &tracker, &receiver))?;
            workers.push(handle);
        }

        tracing::info!(
            "Job pool started with {} workers and queue depth {}",
            config.workers,
            config.queue_depth
        );

        Ok(Self {
            sender: Some(sender),
            workers,
            tracker,
            queue_depth: config.queue_depth,
            retention: config.retention,
        })
    }

    /// Queue a transfer and return its id.
    ///
    /// The job is recorded at 0% before it is queued. Finished records older
    /// than the configured retention are evicted first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::QueueFull`] if the queue is at capacity, or
    /// [`Error::PoolClosed`] if the workers are gone.
    pub fn submit(&self, request: TransferRequest) -> Result<JobId> {
        let sender = self.sender.as_ref().ok_or(Error::PoolClosed)?;
        let id = JobId::new();

        if let Some(retention) = self.retention {
            let evicted = self.tracker.evict_finished(retention);
            if evicted > 0 {
                tracing::debug!("Evicted {evicted} finished job records");
            }
        }

        self.tracker.update(id, 0, STATUS_STARTED);

        match sender.try_send(Job { id, request }) {
            Ok(()) => {
                tracing::info!(job = %id, "Job queued");
                Ok(id)
            }
            Err(err) => {
                self.tracker.remove(id);
                match err {
                    TrySendError::Full(_) => {
                        tracing::warn!(job = %id, "Job rejected, queue is full");
                        Err(Error::QueueFull {
                            capacity: self.queue_depth,
                        })
                    }
                    TrySendError::Disconnected(_) => Err(Error::PoolClosed),
                }
            }
        }
    }

    /// Progress records of every job submitted to this pool.
    #[must_use]
    pub const fn tracker(&self) -> &ProgressTracker {
        &self.tracker
    }

    /// Stop accepting jobs, finish the queued ones, and join the workers.
    pub fn shutdown(self) {
        drop(self);
    }
}

impl Drop for JobPool {
    fn drop(&mut self) {
        // Closing the channel ends each worker's loop once the queue drains
        self.sender.take();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                tracing::error!("Worker thread panicked");
            }
        }
    }
}

fn worker_loop(runner: &dyn JobRunner, tracker: &ProgressTracker, jobs: &Receiver<Job>) {
    for job in jobs {
        tracing::info!(job = %job.id, "Job started");
        let mut reporter = tracker.reporter(job.id);
        runner.run(&job.request, &mut reporter);
        tracing::info!(job = %job.id, "Job finished");
    }
}
