//! Process-wide publish counters.
//!
//! Counters are bumped silently by the coordinator. [`Metrics::flush`]
//! emits the current values as one `tracing::info!` event, which the CLI
//! does once per command.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    cycles_published: AtomicU64,
    cycles_no_change: AtomicU64,
    cycles_failed: AtomicU64,
    prune_failures: AtomicU64,
    bytes_uploaded: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            cycles_published: AtomicU64::new(0),
            cycles_no_change: AtomicU64::new(0),
            cycles_failed: AtomicU64::new(0),
            prune_failures: AtomicU64::new(0),
            bytes_uploaded: AtomicU64::new(0),
        }
    }

    pub fn inc_published(&self) {
        self.cycles_published.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "cycles_published", "counter incremented");
    }

    pub fn inc_no_change(&self) {
        self.cycles_no_change.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "cycles_no_change", "counter incremented");
    }

    pub fn inc_failed(&self) {
        self.cycles_failed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "cycles_failed", "counter incremented");
    }

    pub fn add_prune_failures(&self, n: u64) {
        self.prune_failures.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_bytes_uploaded(&self, n: u64) {
        self.bytes_uploaded.fetch_add(n, Ordering::Relaxed);
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            cycles_published = self.cycles_published(),
            cycles_no_change = self.cycles_no_change(),
            cycles_failed = self.cycles_failed(),
            prune_failures = self.prune_failures(),
            bytes_uploaded = self.bytes_uploaded(),
        );
    }

    pub fn cycles_published(&self) -> u64 {
        self.cycles_published.load(Ordering::Relaxed)
    }

    pub fn cycles_no_change(&self) -> u64 {
        self.cycles_no_change.load(Ordering::Relaxed)
    }

    pub fn cycles_failed(&self) -> u64 {
        self.cycles_failed.load(Ordering::Relaxed)
    }

    pub fn prune_failures(&self) -> u64 {
        self.prune_failures.load(Ordering::Relaxed)
    }

    pub fn bytes_uploaded(&self) -> u64 {
        self.bytes_uploaded.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.cycles_published.store(0, Ordering::Relaxed);
        self.cycles_no_change.store(0, Ordering::Relaxed);
        self.cycles_failed.store(0, Ordering::Relaxed);
        self.prune_failures.store(0, Ordering::Relaxed);
        self.bytes_uploaded.store(0, Ordering::Relaxed);
    }
}
