//! Router metrics.
//!
//! # Metrics
//! - `waymark_transitions_total` (counter): processed locations by outcome
//! - `waymark_transition_duration_seconds` (histogram): intake to settle
//! - `waymark_hook_failures_total` (counter): hooks that errored or panicked, by kind
//! - `waymark_reverts_total` (counter): location reverts after cancel or redirect, by result
//!
//! # Design Decisions
//! - Recorded through the `metrics` facade; the host installs the exporter
//! - Labels are low-cardinality (outcome, hook kind), never node names

use std::time::Instant;

/// Record a finished transition.
pub fn record_transition(outcome: &'static str, started: Instant) {
    metrics::counter!("waymark_transitions_total", "outcome" => outcome).increment(1);
    metrics::histogram!("waymark_transition_duration_seconds", "outcome" => outcome)
        .record(started.elapsed().as_secs_f64());
}

/// Record a hook that failed and was treated as proceed.
pub fn record_hook_failure(kind: &'static str) {
    metrics::counter!("waymark_hook_failures_total", "kind" => kind).increment(1);
}

/// Record a `replace` issued to undo or redirect a transition.
pub fn record_revert(succeeded: bool) {
    let result = if succeeded { "ok" } else { "failed" };
    metrics::counter!("waymark_reverts_total", "result" => result).increment(1);
}
