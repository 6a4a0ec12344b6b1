//! Run counters and the estimated-time-remaining text shown while polling.

use std::time::{Duration, Instant};

/// Format the time left for `remaining` rows at the observed throughput.
///
/// `None` until at least one row has been processed in `elapsed`.
#[must_use]
pub fn estimate_remaining(total: u64, processed: u64, elapsed: Duration) -> Option<String> {
    if processed == 0 || elapsed.is_zero() {
        return None;
    }
    let remaining_rows = total.saturating_sub(processed);
    #[allow(clippy::cast_precision_loss)]
    let per_sec = processed as f64 / elapsed.as_secs_f64();
    #[allow(clippy::cast_precision_loss)]
    let secs = remaining_rows as f64 / per_sec;
    Some(format_eta(secs))
}

/// `~N min` above a minute, otherwise `~N sec`.
#[must_use]
pub fn format_eta(secs: f64) -> String {
    if secs > 60.0 {
        format!("~{:.0} min", (secs / 60.0).round())
    } else {
        format!("~{:.0} sec", secs.max(0.0).ceil())
    }
}

/// Throughput clock for one invocation of a run.
///
/// A resumed run starts a new clock and only measures rows handled since,
/// so a long pause between invocations does not skew the estimate.
#[derive(Debug, Clone, Copy)]
pub struct EtaClock {
    started: Instant,
    baseline: u64,
}

impl EtaClock {
    #[must_use]
    pub fn start(already_processed: u64) -> Self {
        Self {
            started: Instant::now(),
            baseline: already_processed,
        }
    }

    #[must_use]
    pub fn estimate(&self, total: u64, processed: u64) -> Option<String> {
        let done_here = processed.saturating_sub(self.baseline);
        let left = total.saturating_sub(processed);
        estimate_remaining(done_here + left, done_here, self.started.elapsed())
    }
}

/// Persist every `every`th batch, plus the last one.
#[must_use]
pub fn should_persist(batch: u64, total_batches: u64, every: u64) -> bool {
    let every = every.max(1);
    batch % every == 0 || batch >= total_batches
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_estimate_before_first_row() {
        assert_eq!(estimate_remaining(100, 0, Duration::from_secs(5)), None);
        assert_eq!(estimate_remaining(100, 10, Duration::ZERO), None);
    }

    #[test]
    fn short_remainders_are_in_seconds() {
        // 100 rows in 10s leaves 400 rows at 10/s = 40s.
        assert_eq!(
            estimate_remaining(500, 100, Duration::from_secs(10)).as_deref(),
            Some("~40 sec")
        );
    }

    #[test]
    fn long_remainders_are_rounded_minutes() {
        // 100 rows in 60s leaves 900 rows = 540s = 9 min.
        assert_eq!(
            estimate_remaining(1000, 100, Duration::from_secs(60)).as_deref(),
            Some("~9 min")
        );
    }

    #[test]
    fn fractional_seconds_round_up() {
        assert_eq!(format_eta(0.2), "~1 sec");
        assert_eq!(format_eta(60.0), "~60 sec");
        assert_eq!(format_eta(90.0), "~2 min");
    }

    #[test]
    fn finished_run_estimates_zero() {
        assert_eq!(
            estimate_remaining(100, 100, Duration::from_secs(3)).as_deref(),
            Some("~0 sec")
        );
    }

    #[test]
    fn persistence_cadence_includes_last_batch() {
        assert!(should_persist(1, 5, 1));
        assert!(!should_persist(1, 5, 2));
        assert!(should_persist(2, 5, 2));
        assert!(should_persist(5, 5, 2));
        assert!(should_persist(3, 5, 0));
    }
}
