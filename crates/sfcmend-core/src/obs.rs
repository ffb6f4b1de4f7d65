//! Lifecycle events for repair sessions and batches.
//!
//! Every event carries an `event = "..."` field so JSON log pipelines can
//! filter on it. Sessions run inside a span tagged with pair and oracle so
//! nested oracle and verifier logs inherit that identity: async code
//! instruments its future with [`session_span`], sync code holds a
//! [`SessionSpan`] guard.

use std::path::Path;

use tracing::{info, warn};

pub fn session_span(pair_id: &str, oracle: &str) -> tracing::Span {
    tracing::info_span!("sfcmend.session", pair = %pair_id, oracle = %oracle)
}

/// RAII guard for a session-scoped span. Not for use across `.await`.
pub struct SessionSpan {
    _span: tracing::span::EnteredSpan,
}

impl SessionSpan {
    pub fn enter(pair_id: &str, oracle: &str) -> Self {
        Self {
            _span: session_span(pair_id, oracle).entered(),
        }
    }
}

pub fn emit_session_started(pair_id: &str, oracle: &str, max_attempts: u32) {
    info!(
        event = "session.started",
        pair = %pair_id,
        oracle = %oracle,
        max_attempts = max_attempts,
    );
}

/// One verification pass finished, with the oracle cost of the iteration.
pub fn emit_attempt(pair_id: &str, iteration: u32, contained: bool, unmatched: usize, tokens_used: u64) {
    info!(
        event = "session.attempt",
        pair = %pair_id,
        iteration = iteration,
        contained = contained,
        unmatched_paths = unmatched,
        tokens_used = tokens_used,
    );
}

pub fn emit_session_finished(
    pair_id: &str,
    oracle: &str,
    status: &str,
    iterations: u32,
    tokens_used: u64,
    duration_ms: u64,
) {
    info!(
        event = "session.finished",
        pair = %pair_id,
        oracle = %oracle,
        status = %status,
        iterations = iterations,
        tokens_used = tokens_used,
        duration_ms = duration_ms,
    );
}

pub fn emit_batch_flushed(oracle: &str, pairs: usize, path: &Path) {
    info!(
        event = "batch.flushed",
        oracle = %oracle,
        pairs = pairs,
        path = %path.display(),
    );
}

/// Best-effort artifact writes that failed (warning level).
pub fn emit_artifact_write_failed(kind: &str, path: &Path, error: &dyn std::fmt::Display) {
    warn!(
        event = "artifact.write_failed",
        kind = %kind,
        path = %path.display(),
        error = %error,
    );
}
