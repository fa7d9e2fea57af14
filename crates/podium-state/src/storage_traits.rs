//! Storage trait definitions for Podium
//!
//! These traits define the persistence seams the scoring core runs against:
//! - `EventStore`: one event row per (tournament, category)
//! - `ParticipantStore`: one participant row per (event, competitor)
//! - `ScoreStore`: one score row per (event, competitor)
//! - `TournamentStore`: read access to the owning tournament's class
//!
//! The backing store only promises row-level uniqueness constraints and may
//! lag on read-after-write. There are no transactions across traits.
//! In-memory fakes are provided for testing via the `fakes` module.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// EventStore
// ---------------------------------------------------------------------------

/// An event row as persisted.
///
/// The owning tournament and category are optional because a row read
/// shortly after a write on a lagging replica may not carry them yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub event_id: String,
    pub tournament_id: Option<String>,
    pub category_type: Option<String>,
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for an event. The store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEvent {
    pub tournament_id: String,
    pub category_type: String,
    pub name: String,
}

impl NewEvent {
    pub fn new(
        tournament_id: impl Into<String>,
        category_type: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            tournament_id: tournament_id.into(),
            category_type: category_type.into(),
            name: name.into(),
        }
    }

    /// Human-readable form of the uniqueness key.
    pub fn key(&self) -> String {
        format!("{}/{}", self.tournament_id, self.category_type)
    }
}

/// Outcome of [`EventStore::upsert_event`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventUpsert {
    /// Every row for the key after the upsert.
    pub rows: Vec<EventRecord>,
    /// Whether this call inserted the row.
    pub created: bool,
}

/// Event persistence.
///
/// Guarantees:
/// - `insert_event` fails with `StorageError::UniqueViolation` when a row for
///   the same (tournament, category) already exists, even if that row is not
///   yet visible to `find_events`.
/// - `find_events` may lag behind inserts.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// All events for a (tournament, category) key.
    async fn find_events(
        &self,
        tournament_id: &str,
        category_type: &str,
    ) -> StorageResult<Vec<EventRecord>>;

    /// Fetch a single event by id.
    async fn get_event(&self, event_id: &str) -> StorageResult<Option<EventRecord>>;

    /// Insert a new event row.
    async fn insert_event(&self, event: NewEvent) -> StorageResult<EventRecord>;

    /// Whether `upsert_event` is backed by an atomic server-side operation.
    fn supports_atomic_upsert(&self) -> bool {
        false
    }

    /// Insert the event unless the key exists, then return every row for the
    /// key, in one server-side step.
    async fn upsert_event(&self, event: NewEvent) -> StorageResult<EventUpsert> {
        let _ = event;
        Err(StorageError::Unsupported("upsert_event"))
    }
}

// ---------------------------------------------------------------------------
// ParticipantStore
// ---------------------------------------------------------------------------

/// Links a competitor into an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantRecord {
    pub event_id: String,
    pub competitor_id: String,
    pub created_at: DateTime<Utc>,
}

/// Participant persistence, unique on (event, competitor).
#[async_trait]
pub trait ParticipantStore: Send + Sync {
    async fn find_participant(
        &self,
        event_id: &str,
        competitor_id: &str,
    ) -> StorageResult<Option<ParticipantRecord>>;

    /// Fails with `UniqueViolation` if the competitor is already entered.
    async fn insert_participant(
        &self,
        event_id: &str,
        competitor_id: &str,
    ) -> StorageResult<ParticipantRecord>;
}

// ---------------------------------------------------------------------------
// ScoreStore
// ---------------------------------------------------------------------------

/// Tie-break workflow state carried on each score row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreakerStatus {
    #[default]
    Untouched,
    AwaitingSelection,
    Resolved,
}

impl TieBreakerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TieBreakerStatus::Untouched => "untouched",
            TieBreakerStatus::AwaitingSelection => "awaiting_selection",
            TieBreakerStatus::Resolved => "resolved",
        }
    }
}

impl std::fmt::Display for TieBreakerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One competitor's scores within one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub score_id: String,
    pub event_id: String,
    pub competitor_id: String,
    pub judge_a_score: f64,
    pub judge_b_score: f64,
    pub judge_c_score: f64,
    pub total_score: f64,
    pub final_rank: Option<u32>,
    pub points_earned: Option<u32>,
    #[serde(default)]
    pub tie_breaker_status: TieBreakerStatus,
    /// Total the tie mark was taken against. On an untouched row it is the
    /// total of a group the row has just left; the next ranking pass reverts
    /// that group and clears it.
    #[serde(default)]
    pub tie_group_total: Option<f64>,
    pub updated_at: DateTime<Utc>,
}

impl ScoreRecord {
    /// New unranked score row.
    pub fn new(
        event_id: impl Into<String>,
        competitor_id: impl Into<String>,
        judge_scores: [f64; 3],
    ) -> Self {
        let [a, b, c] = judge_scores;
        Self {
            score_id: uuid::Uuid::new_v4().to_string(),
            event_id: event_id.into(),
            competitor_id: competitor_id.into(),
            judge_a_score: a,
            judge_b_score: b,
            judge_c_score: c,
            total_score: Self::total_of(judge_scores),
            final_rank: None,
            points_earned: None,
            tie_breaker_status: TieBreakerStatus::Untouched,
            tie_group_total: None,
            updated_at: Utc::now(),
        }
    }

    /// Sum of the three judge scores, rounded to two decimals so that the
    /// same three values always produce the same total regardless of order.
    pub fn total_of(judge_scores: [f64; 3]) -> f64 {
        let sum: f64 = judge_scores.iter().sum();
        (sum * 100.0).round() / 100.0
    }

    pub fn judge_scores(&self) -> [f64; 3] {
        [self.judge_a_score, self.judge_b_score, self.judge_c_score]
    }

    /// Replace the judge scores. Returns `true` if the total changed.
    ///
    /// Any change to a judge score drops the row's tie mark but keeps
    /// `tie_group_total`, even when the total comes out the same.
    pub fn set_judge_scores(&mut self, judge_scores: [f64; 3]) -> bool {
        if judge_scores != self.judge_scores() {
            self.tie_breaker_status = TieBreakerStatus::Untouched;
        }
        let [a, b, c] = judge_scores;
        self.judge_a_score = a;
        self.judge_b_score = b;
        self.judge_c_score = c;
        let total = Self::total_of(judge_scores);
        let changed = total != self.total_score;
        self.total_score = total;
        self.updated_at = Utc::now();
        changed
    }

    pub fn clear_tie_mark(&mut self) {
        self.tie_breaker_status = TieBreakerStatus::Untouched;
        self.tie_group_total = None;
    }

    /// Uniqueness key, `event/competitor`.
    pub fn key(&self) -> String {
        format!("{}/{}", self.event_id, self.competitor_id)
    }
}

/// Score persistence, unique on (event, competitor).
#[async_trait]
pub trait ScoreStore: Send + Sync {
    /// All score rows for an event, in no particular order.
    async fn list_scores(&self, event_id: &str) -> StorageResult<Vec<ScoreRecord>>;

    async fn get_score(
        &self,
        event_id: &str,
        competitor_id: &str,
    ) -> StorageResult<Option<ScoreRecord>>;

    /// Fails with `UniqueViolation` if a row for (event, competitor) exists.
    async fn insert_score(&self, record: &ScoreRecord) -> StorageResult<ScoreRecord>;

    /// Overwrite the row for (event, competitor). Fails with `NotFound` if
    /// there is none.
    async fn update_score(&self, record: &ScoreRecord) -> StorageResult<ScoreRecord>;
}

// ---------------------------------------------------------------------------
// TournamentStore
// ---------------------------------------------------------------------------

/// Owning tournament. `class` is kept as stored text; the scoring core
/// decides how to interpret unknown values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TournamentRecord {
    pub tournament_id: String,
    pub name: String,
    pub class: String,
}

#[async_trait]
pub trait TournamentStore: Send + Sync {
    async fn get_tournament(&self, tournament_id: &str)
        -> StorageResult<Option<TournamentRecord>>;

    /// Create or replace a tournament. Used by the roster layer and fixtures.
    async fn put_tournament(&self, record: TournamentRecord) -> StorageResult<()>;
}

/// Everything the scoring core needs from one backend.
pub trait PodiumStore: EventStore + ParticipantStore + ScoreStore + TournamentStore {}

impl<T> PodiumStore for T where T: EventStore + ParticipantStore + ScoreStore + TournamentStore {}
