//! Global atomic counters for worker observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (the worker does so after every job).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters.
pub struct Metrics {
    jobs_processed: AtomicU64,
    jobs_failed: AtomicU64,
    hooks_run: AtomicU64,
    hooks_timed_out: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    /// Create a zeroed counter set.
    pub const fn new() -> Self {
        Self {
            jobs_processed: AtomicU64::new(0),
            jobs_failed: AtomicU64::new(0),
            hooks_run: AtomicU64::new(0),
            hooks_timed_out: AtomicU64::new(0),
        }
    }

    /// Increment the jobs-processed counter by one.
    pub fn inc_jobs_processed(&self) {
        self.jobs_processed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "jobs_processed", "counter incremented");
    }

    /// Increment the jobs-failed counter by one.
    pub fn inc_jobs_failed(&self) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "jobs_failed", "counter incremented");
    }

    /// Increment the hooks-run counter by one.
    pub fn inc_hooks_run(&self) {
        self.hooks_run.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "hooks_run", "counter incremented");
    }

    /// Increment the hooks-timed-out counter by one.
    pub fn inc_hooks_timed_out(&self) {
        self.hooks_timed_out.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "hooks_timed_out", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            jobs_processed = self.jobs_processed(),
            jobs_failed = self.jobs_failed(),
            hooks_run = self.hooks_run(),
            hooks_timed_out = self.hooks_timed_out(),
        );
    }

    /// Current jobs-processed count.
    pub fn jobs_processed(&self) -> u64 {
        self.jobs_processed.load(Ordering::Relaxed)
    }

    /// Current jobs-failed count.
    pub fn jobs_failed(&self) -> u64 {
        self.jobs_failed.load(Ordering::Relaxed)
    }

    /// Current hooks-run count.
    pub fn hooks_run(&self) -> u64 {
        self.hooks_run.load(Ordering::Relaxed)
    }

    /// Current hooks-timed-out count.
    pub fn hooks_timed_out(&self) -> u64 {
        self.hooks_timed_out.load(Ordering::Relaxed)
    }
}
