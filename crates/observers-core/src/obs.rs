//! Structured log events for the observation lifecycle.
//!
//! This module provides:
//! - A store-scoped tracing span via the `StoreSpan` RAII guard
//! - Emission functions for create, transition, clear, load, and flush failure
//!
//! Events are emitted at `info!` level unless noted; filter with `RUST_LOG`.

use tracing::{info, warn};

/// RAII guard that enters a span tagged with the store's state key.
///
/// ```ignore
/// let _span = StoreSpan::enter("observations");
/// // tracing calls now carry state_key = "observations"
/// ```
pub struct StoreSpan {
    _span: tracing::span::EnteredSpan,
}

impl StoreSpan {
    pub fn enter(state_key: &str) -> Self {
        let span = tracing::info_span!("observers.store", state_key = %state_key);
        Self {
            _span: span.entered(),
        }
    }
}

pub fn emit_observation_created(id: &str, observer: &str, severity: &str) {
    info!(
        event = "observation.created",
        observation_id = %id,
        observer = %observer,
        severity = %severity,
    );
}

pub fn emit_observation_acknowledged(id: &str) {
    info!(event = "observation.acknowledged", observation_id = %id);
}

pub fn emit_observation_resolved(id: &str, has_note: bool) {
    info!(event = "observation.resolved", observation_id = %id, has_note = has_note);
}

pub fn emit_resolved_cleared(count: usize, remaining: usize) {
    info!(event = "observations.cleared", count = count, remaining = remaining);
}

pub fn emit_state_loaded(state_key: &str, count: usize) {
    info!(event = "state.loaded", state_key = %state_key, count = count);
}

/// Flush failure (warning level). The in-memory change is kept.
pub fn emit_persist_failed(state_key: &str, error: &dyn std::fmt::Display) {
    warn!(event = "state.persist_failed", state_key = %state_key, error = %error);
}

/// Batch stopped at an invalid element after inserting `inserted` entries.
pub fn emit_batch_aborted(state_key: &str, index: usize, inserted: usize, flushed: bool) {
    warn!(
        event = "batch.aborted",
        state_key = %state_key,
        index,
        inserted,
        flushed
    );
}

/// Operation failed at the dispatch boundary (warning level).
pub fn emit_operation_failed(operation: &str, error: &dyn std::fmt::Display) {
    warn!(event = "operation.failed", operation = %operation, error = %error);
}
