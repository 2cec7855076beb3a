//! # Progress — Atomic Sieve Progress Counters
//!
//! Shared between the orchestrator and a background reporter thread. The
//! orchestrator bumps the cursor after every window and the counters after
//! every drain; the reporter logs fraction done, candidate and factor
//! counts, and throughput every 10 seconds. All counters are lock-free
//! atomics; the reporter only ever reads, so relaxed ordering is enough.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::info;

pub struct Progress {
    /// Candidates handed to the batch evaluator so far.
    pub primes: AtomicU64,
    /// Factors written to the results log so far.
    pub factors: AtomicU64,
    /// Current p cursor, for the fraction-done computation.
    cursor: AtomicU64,
    p_min: u64,
    p_max: u64,
    start: Instant,
    shutdown: AtomicBool,
}

impl Progress {
    pub fn new(p_min: u64, p_max: u64) -> Arc<Self> {
        Arc::new(Progress {
            primes: AtomicU64::new(0),
            factors: AtomicU64::new(0),
            cursor: AtomicU64::new(p_min),
            p_min,
            p_max,
            start: Instant::now(),
            shutdown: AtomicBool::new(false),
        })
    }

    pub fn set_cursor(&self, p: u64) {
        self.cursor.store(p, Ordering::Relaxed);
    }

    pub fn fraction_done(&self) -> f64 {
        let span = self.p_max - self.p_min;
        if span == 0 {
            return 1.0;
        }
        let done = self.cursor.load(Ordering::Relaxed).saturating_sub(self.p_min);
        done as f64 / span as f64
    }

    pub fn start_reporter(self: &Arc<Self>) -> thread::JoinHandle<()> {
        let progress = Arc::clone(self);
        thread::spawn(move || 'report: loop {
            // sleep in short slices so shutdown never waits a full period
            for _ in 0..40 {
                thread::sleep(Duration::from_millis(250));
                if progress.shutdown.load(Ordering::Relaxed) {
                    break 'report;
                }
            }
            progress.log_status();
        })
    }

    pub fn log_status(&self) {
        let elapsed = self.start.elapsed().as_secs_f64();
        let cursor = self.cursor.load(Ordering::Relaxed);
        let rate = if elapsed > 0.0 {
            cursor.saturating_sub(self.p_min) as f64 / elapsed
        } else {
            0.0
        };
        info!(
            progress = format_args!("{:.1}%", self.fraction_done() * 100.0),
            p = cursor,
            primes = self.primes.load(Ordering::Relaxed),
            factors = self.factors.load(Ordering::Relaxed),
            rate = format_args!("{:.0} p/s", rate),
            "sieve progress"
        );
    }

    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero() {
        let p = Progress::new(100, 200);
        assert_eq!(p.primes.load(Ordering::Relaxed), 0);
        assert_eq!(p.factors.load(Ordering::Relaxed), 0);
        assert_eq!(p.fraction_done(), 0.0);
    }

    #[test]
    fn fraction_tracks_cursor() {
        let p = Progress::new(1000, 2000);
        p.set_cursor(1500);
        assert!((p.fraction_done() - 0.5).abs() < 1e-9);
        p.set_cursor(2000);
        assert!((p.fraction_done() - 1.0).abs() < 1e-9);
    }

    /// Degenerate zero-width range must not divide by zero.
    #[test]
    fn zero_width_range_is_complete() {
        let p = Progress::new(500, 500);
        assert_eq!(p.fraction_done(), 1.0);
    }

    /// Increments from several threads must all be counted.
    #[test]
    fn concurrent_increments_are_accurate() {
        let p = Progress::new(0, 1);
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let p = Arc::clone(&p);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        p.primes.fetch_add(1, Ordering::Relaxed);
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(p.primes.load(Ordering::Relaxed), 8000);
    }

    #[test]
    fn stop_is_visible_across_threads() {
        let p = Progress::new(0, 1);
        let p2 = Arc::clone(&p);
        let handle = thread::spawn(move || {
            while !p2.shutdown.load(Ordering::Relaxed) {
                thread::sleep(Duration::from_millis(1));
            }
        });
        thread::sleep(Duration::from_millis(5));
        p.stop();
        handle.join().unwrap();
    }

    #[test]
    fn log_status_does_not_panic() {
        let p = Progress::new(100, 200);
        p.set_cursor(150);
        p.primes.fetch_add(10, Ordering::Relaxed);
        p.log_status();
    }
}
