//! Podium Core Library
//!
//! Ranking, seasonal points, podium tie-breaks and idempotent event identity
//! for tournament scoring.
//!
//! ## Components
//!
//! - `points`: `(rank, class, field size) -> points`
//! - `ranking`: standard competition ranking and tie groups
//! - `tie_breaker`: manual resolution of podium ties
//! - `retry`: bounded backoff over lagging reads
//! - `identity`: get-or-create of the one event per (tournament, category)
//! - `scoring`: the submit -> recompute -> persist write path and standings

pub mod config;
pub mod domain;
pub mod error;
pub mod identity;
pub mod obs;
pub mod points;
pub mod ranking;
pub mod recompute;
pub mod retry;
pub mod scoring;
pub mod telemetry;
pub mod tie_breaker;

pub use config::{ConfigError, CoreConfig};
pub use domain::{
    CategoryType, Competitor, CompetitorId, Event, EventId, JudgeScores, Provenance, TournamentId,
};
pub use error::{Result, ScoringError, ValidationError};
pub use identity::{EventIdentityGuard, EventValidation};
pub use obs::{NoopObserver, OperationSpan, ScoringObserver, TracingObserver};
pub use points::{points, TournamentClass, PODIUM_MAX_RANK};
pub use ranking::{podium_ties, rank, tie_groups, RankedRecord, ScoreEntry, Scored, TieGroup};
pub use recompute::{reconcile, RecomputeOutcome, Reconciliation};
pub use retry::{retry, Exhaustion, Presence, RetryOutcome, RetryPolicy};
pub use scoring::{ScoringService, Standings, Submission};
pub use telemetry::init_tracing;
pub use tie_breaker::{check_current, validate_selection, TieBreakerResolver};

pub use podium_state::{ScoreRecord, TieBreakerStatus};

/// Podium version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
