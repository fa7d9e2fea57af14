//! Structured observability hooks for scoring lifecycle events.
//!
//! This module provides:
//! - Operation-scoped tracing spans via `OperationSpan` RAII guard
//! - `ScoringObserver`, the hook every component reports through
//! - `TracingObserver`, which emits the hooks as `tracing` events
//!
//! Components take the observer as a trait object rather than logging to
//! global state directly, so tests can record exactly what happened.
//! Events are emitted at `info!` level (configurable via `PODIUM_LOG`).

use tracing::{info, warn};

/// RAII guard that enters an operation-scoped tracing span.
///
/// # Example
///
/// ```ignore
/// let _span = OperationSpan::enter("event.get_or_create", "t-1/kata");
/// // every tracing call below carries op and key
/// ```
pub struct OperationSpan {
    _span: tracing::span::EnteredSpan,
}

impl OperationSpan {
    /// Create and enter a span tagged with the operation and its key.
    pub fn enter(op: &str, key: &str) -> Self {
        let span = tracing::info_span!("podium.op", op = %op, key = %key);
        Self {
            _span: span.entered(),
        }
    }
}

/// Lifecycle hooks. Every method defaults to a no-op.
pub trait ScoringObserver: Send + Sync {
    /// A retried read came back short and another attempt is scheduled.
    fn retry_attempt(&self, _what: &str, _attempt: u32, _delay_ms: u64) {}

    /// A retried read ran out of attempts.
    fn retry_exhausted(&self, _what: &str, _attempts: u32, _hard: bool) {}

    /// `get_or_create` settled on an event id.
    fn event_resolved(&self, _key: &str, _event_id: &str, _created: bool) {}

    /// An insert lost a race on a unique index.
    fn insert_conflict(&self, _table: &str, _key: &str) {}

    /// More than one event exists for one (tournament, category).
    fn duplicate_state(&self, _key: &str, _count: usize) {}

    /// Ranks and points were recomputed for an event.
    fn ranking_recomputed(&self, _event_id: &str, _field_size: usize, _updated: usize) {}

    /// An unmarked tie sits on the podium and needs a human decision.
    fn podium_tie_detected(&self, _event_id: &str, _base_rank: u32, _members: &[String]) {}

    /// A marked tie group no longer matches the scores and was cleared.
    fn tie_marks_reverted(&self, _event_id: &str, _members: &[String]) {}

    fn tie_resolution_started(&self, _event_id: &str, _base_rank: u32, _members: &[String]) {}

    fn tie_resolved(&self, _event_id: &str, _base_rank: u32, _order: &[String]) {}
}

/// Observer that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ScoringObserver for NoopObserver {}

/// Observer that emits each hook as a structured `tracing` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl ScoringObserver for TracingObserver {
    fn retry_attempt(&self, what: &str, attempt: u32, delay_ms: u64) {
        info!(event = "retry.attempt", what = %what, attempt = attempt, delay_ms = delay_ms);
    }

    fn retry_exhausted(&self, what: &str, attempts: u32, hard: bool) {
        warn!(event = "retry.exhausted", what = %what, attempts = attempts, hard = hard);
    }

    fn event_resolved(&self, key: &str, event_id: &str, created: bool) {
        info!(event = "event.resolved", key = %key, event_id = %event_id, created = created);
    }

    fn insert_conflict(&self, table: &str, key: &str) {
        info!(event = "store.insert_conflict", table = %table, key = %key);
    }

    fn duplicate_state(&self, key: &str, count: usize) {
        warn!(event = "event.duplicate_state", key = %key, count = count);
    }

    fn ranking_recomputed(&self, event_id: &str, field_size: usize, updated: usize) {
        info!(
            event = "ranking.recomputed",
            event_id = %event_id,
            field_size = field_size,
            updated = updated,
        );
    }

    fn podium_tie_detected(&self, event_id: &str, base_rank: u32, members: &[String]) {
        info!(
            event = "tie.detected",
            event_id = %event_id,
            base_rank = base_rank,
            members = ?members,
        );
    }

    fn tie_marks_reverted(&self, event_id: &str, members: &[String]) {
        warn!(event = "tie.reverted", event_id = %event_id, members = ?members);
    }

    fn tie_resolution_started(&self, event_id: &str, base_rank: u32, members: &[String]) {
        info!(
            event = "tie.awaiting_selection",
            event_id = %event_id,
            base_rank = base_rank,
            members = ?members,
        );
    }

    fn tie_resolved(&self, event_id: &str, base_rank: u32, order: &[String]) {
        info!(
            event = "tie.resolved",
            event_id = %event_id,
            base_rank = base_rank,
            order = ?order,
        );
    }
}
