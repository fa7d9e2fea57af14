//! Error taxonomy for the scoring core.
//!
//! Pure computations (ranking, points) never fail. Stateful protocols fail
//! fast with one of the variants below instead of guessing intent.

use podium_state::{StorageError, TieBreakerStatus};

/// Malformed input. Fatal to the current operation, never retried.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("{kind} must not be empty")]
    EmptyId { kind: &'static str },

    #[error("unknown provenance: {0:?}")]
    UnknownProvenance(String),

    #[error("malformed event id: {0:?}")]
    MalformedEventId(String),

    #[error("event id {0} is a known-corrupt sentinel")]
    DeniedEventId(String),

    #[error("judge {judge} score {value} outside {min}..={max}")]
    ScoreOutOfRange {
        judge: char,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("tie-break selection must name {expected} competitor(s), got {actual}")]
    SelectionCount { expected: usize, actual: usize },

    #[error("competitor {0} is not a member of this tie group")]
    ForeignCompetitor(String),

    #[error("competitor {0} selected more than once")]
    DuplicateSelection(String),

    #[error("tie group at rank {rank} is outside the podium")]
    NotPodium { rank: u32 },

    #[error("tie group no longer matches the event's current ranking")]
    StaleGroup,

    #[error("tie group is {actual}, expected {expected}")]
    InvalidTransition {
        expected: TieBreakerStatus,
        actual: TieBreakerStatus,
    },
}

/// Errors surfaced by the scoring core.
#[derive(Debug, thiserror::Error)]
pub enum ScoringError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// More than one event for a (tournament, category) key. The store failed
    /// to enforce its own invariant or a writer bypassed the guard.
    #[error(
        "duplicate state: {count} events for {tournament_id}/{category_type}: {event_ids:?}"
    )]
    DuplicateState {
        tournament_id: String,
        category_type: String,
        count: usize,
        event_ids: Vec<String>,
    },

    #[error("{what} not found after {attempts} attempt(s)")]
    NotFound { what: String, attempts: u32 },

    #[error("persistence error: {0}")]
    Persistence(#[from] StorageError),
}

impl ScoringError {
    pub(crate) fn not_found(what: impl Into<String>, attempts: u32) -> Self {
        ScoringError::NotFound {
            what: what.into(),
            attempts,
        }
    }
}

/// Result type for scoring operations.
pub type Result<T> = std::result::Result<T, ScoringError>;
