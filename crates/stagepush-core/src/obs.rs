//! Structured observability hooks for the publish cycle.
//!
//! This module provides:
//! - A cycle-scoped tracing span, attached with `Instrument`
//! - Emission functions for lifecycle events: start, state change, decision, finish
//!
//! Events are emitted at `info!` level (filter with `RUST_LOG`).
//! For JSON output, pass `--json` to the CLI.

use tracing::{info, warn};

/// Span wrapping one publish cycle; every event inside carries `cycle_id`
/// and `product`.
///
/// # Example
///
/// ```ignore
/// coordinator.run_cycle(..).instrument(cycle_span("6f1c...", "Acme")).await
/// ```
pub fn cycle_span(cycle_id: &str, product: &str) -> tracing::Span {
    tracing::info_span!("stagepush.cycle", cycle_id = %cycle_id, product = %product)
}

/// Emit event: cycle started.
pub fn emit_cycle_started(cycle_id: &str, product: &str) {
    info!(event = "cycle.started", cycle_id = %cycle_id, product = %product);
}

pub fn emit_state_changed(cycle_id: &str, from: &str, to: &str) {
    info!(event = "cycle.state_changed", cycle_id = %cycle_id, from = %from, to = %to);
}

/// Emit event: comparator verdict with the number of changed files.
pub fn emit_decision(cycle_id: &str, reason: &str, changed_files: usize, explanation: &str) {
    info!(
        event = "cycle.decision",
        cycle_id = %cycle_id,
        reason = %reason,
        changed_files = changed_files,
        explanation = %explanation,
    );
}

/// Emit event: installer, manifest, log entry and changelog are all written.
pub fn emit_published(cycle_id: &str, product_version: &str, artifact_key: &str, duration_ms: u64) {
    info!(
        event = "cycle.published",
        cycle_id = %cycle_id,
        product_version = %product_version,
        artifact_key = %artifact_key,
        duration_ms = duration_ms,
    );
}

pub fn emit_no_change(cycle_id: &str, duration_ms: u64) {
    info!(event = "cycle.no_change", cycle_id = %cycle_id, duration_ms = duration_ms);
}

/// Emit event: cycle aborted (warning level).
pub fn emit_cycle_failed(cycle_id: &str, state: &str, error: &dyn std::fmt::Display) {
    warn!(event = "cycle.failed", cycle_id = %cycle_id, state = %state, error = %error);
}

pub fn emit_prune_failed(cycle_id: &str, key: &str, error: &str) {
    warn!(event = "log.prune_failed", cycle_id = %cycle_id, key = %key, error = %error);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_span_create() {
        let _entered = cycle_span("test-cycle-id", "Acme").entered();
        emit_state_changed("test-cycle-id", "idle", "comparing");
    }
}
