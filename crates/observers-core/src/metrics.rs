//! Global atomic counters for observers.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. when a CLI invocation ends).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters, no allocations, no locking.
pub struct Metrics {
    observations_created: AtomicU64,
    transitions_applied: AtomicU64,
    observations_cleared: AtomicU64,
    persist_failures: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            observations_created: AtomicU64::new(0),
            transitions_applied: AtomicU64::new(0),
            observations_cleared: AtomicU64::new(0),
            persist_failures: AtomicU64::new(0),
        }
    }

    pub fn inc_created(&self) {
        self.observations_created.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "observations_created", "counter incremented");
    }

    /// Count one acknowledge or resolve call.
    pub fn inc_transitions(&self) {
        self.transitions_applied.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "transitions_applied", "counter incremented");
    }

    pub fn add_cleared(&self, count: u64) {
        self.observations_cleared.fetch_add(count, Ordering::Relaxed);
        tracing::trace!(metric = "observations_cleared", count, "counter incremented");
    }

    pub fn inc_persist_failures(&self) {
        self.persist_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "persist_failures", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            observations_created = self.observations_created(),
            transitions_applied = self.transitions_applied(),
            observations_cleared = self.observations_cleared(),
            persist_failures = self.persist_failures(),
        );
    }

    pub fn observations_created(&self) -> u64 {
        self.observations_created.load(Ordering::Relaxed)
    }

    pub fn transitions_applied(&self) -> u64 {
        self.transitions_applied.load(Ordering::Relaxed)
    }

    pub fn observations_cleared(&self) -> u64 {
        self.observations_cleared.load(Ordering::Relaxed)
    }

    pub fn persist_failures(&self) -> u64 {
        self.persist_failures.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.observations_created.store(0, Ordering::Relaxed);
        self.transitions_applied.store(0, Ordering::Relaxed);
        self.observations_cleared.store(0, Ordering::Relaxed);
        self.persist_failures.store(0, Ordering::Relaxed);
    }
}
