use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Floor for the elapsed time used in speed calculations.
const MIN_ELAPSED: Duration = Duration::from_millis(200);

/// Callback invoked with periodic progress snapshots.
pub type ProgressCallback = Arc<dyn Fn(TransferProgress) + Send + Sync>;

/// Bytes written so far by all range fetchers of one transfer.
///
/// Every increment is a single atomic add, so concurrent fetchers never
/// lose or double-count bytes. Readers see an eventually consistent value
/// without blocking writers.
#[derive(Debug)]
pub struct ProgressCounter {
    transferred: AtomicU64,
    total: u64,
}

impl ProgressCounter {
    pub fn new(total: u64) -> Self {
        Self {
            transferred: AtomicU64::new(0),
            total,
        }
    }

    /// Adds `bytes` and returns the new running total.
    pub fn add(&self, bytes: u64) -> u64 {
        self.transferred.fetch_add(bytes, Ordering::AcqRel) + bytes
    }

    pub fn transferred(&self) -> u64 {
        self.transferred.load(Ordering::Acquire)
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// Builds a snapshot relative to `started`.
    pub fn snapshot(&self, started: Instant) -> TransferProgress {
        TransferProgress::new(self.transferred(), self.total, started.elapsed())
    }
}

/// A point-in-time view of a transfer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransferProgress {
    pub transferred: u64,
    pub total: u64,
    pub elapsed: Duration,
    /// Average speed since the transfer started.
    pub bytes_per_second: f64,
    /// Estimated time remaining; `None` while the speed is zero or the
    /// total is unknown.
    pub eta: Option<Duration>,
}

impl TransferProgress {
    pub fn new(transferred: u64, total: u64, elapsed: Duration) -> Self {
        let secs = elapsed.max(MIN_ELAPSED).as_secs_f64();
        let bytes_per_second = transferred as f64 / secs;
        let eta = if total > 0 && bytes_per_second > f64::EPSILON {
            let remaining = total.saturating_sub(transferred) as f64;
            Some(Duration::from_secs_f64(remaining / bytes_per_second))
        } else {
            None
        };
        Self {
            transferred,
            total,
            elapsed,
            bytes_per_second,
            eta,
        }
    }

    /// Completion in percent, `0.0` when the total is unknown.
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.transferred as f64 * 100.0 / self.total as f64).min(100.0)
    }
}

/// Spawns the periodic reporter.
///
/// The reporter reads the counter once per `interval` regardless of how
/// fast bytes arrive, so the callback rate is bounded by the interval.
/// It exits when `stop` is cancelled.
pub(crate) fn spawn_reporter(
    counter: Arc<ProgressCounter>,
    started: Instant,
    interval: Duration,
    callback: ProgressCallback,
    stop: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                _ = ticker.tick() => callback(counter.snapshot(started)),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn counter_accumulates() {
        let counter = ProgressCounter::new(100);
        assert_eq!(counter.add(30), 30);
        assert_eq!(counter.add(20), 50);
        assert_eq!(counter.transferred(), 50);
        assert_eq!(counter.total(), 100);
    }

    #[test]
    fn counter_concurrent_adds() {
        use std::thread;

        let counter = Arc::new(ProgressCounter::new(10_000));
        let mut handles = vec![];
        for _ in 0..10 {
            let c = Arc::clone(&counter);
            handles.push(thread::spawn(move || {
                for _ in 0..1000 {
                    c.add(1);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(counter.transferred(), 10_000);
    }

    #[test]
    fn progress_speed_and_eta() {
        let p = TransferProgress::new(500, 1000, Duration::from_secs(5));
        assert!((p.bytes_per_second - 100.0).abs() < 1e-9);
        assert_eq!(p.eta, Some(Duration::from_secs(5)));
        assert!((p.percentage() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn progress_zero_speed_has_no_eta() {
        let p = TransferProgress::new(0, 1000, Duration::from_secs(3));
        assert_eq!(p.bytes_per_second, 0.0);
        assert!(p.eta.is_none());
    }

    #[test]
    fn progress_elapsed_floor() {
        // Elapsed below the floor is clamped, so early snapshots don't spike.
        let p = TransferProgress::new(200, 1000, Duration::ZERO);
        assert!((p.bytes_per_second - 1000.0).abs() < 1e-6);
    }

    #[test]
    fn progress_percentage_unknown_total() {
        let p = TransferProgress::new(10, 0, Duration::from_secs(1));
        assert_eq!(p.percentage(), 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn reporter_ticks_at_interval_not_per_byte() {
        let counter = Arc::new(ProgressCounter::new(1_000_000));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        let stop = CancellationToken::new();

        let handle = spawn_reporter(
            Arc::clone(&counter),
            Instant::now(),
            Duration::from_millis(500),
            Arc::new(move |p: TransferProgress| s.lock().unwrap().push(p.transferred)),
            stop.clone(),
        );

        // Thousands of tiny increments within a single interval.
        for _ in 0..5000 {
            counter.add(1);
        }
        tokio::time::sleep(Duration::from_millis(1250)).await;
        stop.cancel();
        handle.await.unwrap();

        let seen = seen.lock().unwrap();
        // Ticks at 0, 500 and 1000 ms.
        assert_eq!(seen.len(), 3);
        assert_eq!(*seen.last().unwrap(), 5000);
    }
}
