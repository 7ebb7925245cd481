//! Progress reporting contract between the optimization loop and its caller.

/// Progress value reported when a transfer fails.
pub const PROGRESS_FAILED: i32 = -1;

/// Progress value reported when a transfer completes.
pub const PROGRESS_DONE: i32 = 100;

/// Status reported once the inputs are loaded.
pub const STATUS_STARTED: &str = "Starting style transfer";

/// Status reported after the final image is written.
pub const STATUS_COMPLETE: &str = "Style transfer complete!";

/// Receives `(progress, status)` updates, synchronously and in order.
///
/// `progress` is 0-100, or [`PROGRESS_FAILED`]. The optimization loop blocks
/// on each call, so a slow sink slows the transfer.
pub trait ProgressSink {
    /// Deliver one update.
    fn report(&mut self, progress: i32, status: &str);
}

impl<F> ProgressSink for F
where
    F: FnMut(i32, &str),
{
    fn report(&mut self, progress: i32, status: &str) {
        self(progress, status);
    }
}

/// Percentage after `step` (zero-based) of `total`, rounded to nearest.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn step_progress(step: u32, total: u32) -> i32 {
    if total == 0 {
        return PROGRESS_DONE;
    }
    let done = u64::from(step.saturating_add(1).min(total));
    let total = u64::from(total);
    // Safe: bounded by 100
    ((done * 100 + total / 2) / total) as i32
}

pub(crate) fn step_status(step: u32, total: u32, loss: f32) -> String {
    format!("Step {}/{total}, Loss: {loss:.2}", step + 1)
}

pub(crate) fn error_status(err: &crate::Error) -> String {
    format!("Error: {err}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_progress_rounds() {
        assert_eq!(step_progress(0, 2), 50);
        assert_eq!(step_progress(1, 2), 100);
        assert_eq!(step_progress(0, 3), 33);
        assert_eq!(step_progress(1, 3), 67);
        assert_eq!(step_progress(2, 3), 100);
        assert_eq!(step_progress(0, 1000), 0);
        assert_eq!(step_progress(4, 1000), 1);
    }

    #[test]
    fn test_step_progress_is_monotonic() {
        let total = 777;
        let values: Vec<_> = (0..total).map(|s| step_progress(s, total)).collect();

        assert!(values.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(values.last(), Some(&100));
    }

    #[test]
    fn test_status_strings() {
        assert_eq!(step_status(9, 1000, 1234.567), "Step 10/1000, Loss: 1234.57");
        assert_eq!(
            error_status(&crate::Error::PoolClosed),
            "Error: job pool is shut down"
        );
    }

    #[test]
    fn test_closures_are_sinks() {
        let mut seen = Vec::new();
        {
            let mut sink = |progress: i32, status: &str| seen.push((progress, status.to_string()));
            sink.report(0, STATUS_STARTED);
            sink.report(PROGRESS_DONE, STATUS_COMPLETE);
        }

        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1], (100, STATUS_COMPLETE.to_string()));
    }
}
