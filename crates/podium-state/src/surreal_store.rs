//! SurrealDB-backed implementation of the Podium storage traits
//!
//! Uses the `schema` row types for persistence, converting to/from
//! `storage_traits` types at the boundary. Uniqueness is enforced by the
//! indexes defined in `migrations`; a violated index is reported as
//! `StorageError::UniqueViolation`.

use async_trait::async_trait;
use surrealdb::engine::any::Any;
use surrealdb::sql::Datetime as SurrealDatetime;
use surrealdb::Surreal;
use tracing::{debug, instrument};

use crate::connection;
use crate::error::StorageError;
use crate::schema::{EventRow, ParticipantRow, ScoreRow, TournamentRow};
use crate::storage_traits::{
    EventRecord, EventStore, EventUpsert, NewEvent, ParticipantRecord, ParticipantStore,
    ScoreRecord, ScoreStore, StorageResult, TournamentRecord, TournamentStore,
};

/// SurrealDB-backed store for events, participants, scores and tournaments.
#[derive(Clone)]
pub struct SurrealScoreStore {
    db: Surreal<Any>,
}

fn backend(err: surrealdb::Error) -> StorageError {
    StorageError::Backend(err.to_string())
}

/// SurrealDB reports a violated UNIQUE index as
/// "Database index `idx` already contains ...".
fn is_index_violation(err: &surrealdb::Error) -> bool {
    err.to_string().contains("already contains")
}

fn write_error(table: &str, key: String, err: surrealdb::Error) -> StorageError {
    if is_index_violation(&err) {
        StorageError::unique(table, key)
    } else {
        backend(err)
    }
}

impl SurrealScoreStore {
    /// Wrap an already-migrated connection.
    pub fn new(db: Surreal<Any>) -> Self {
        Self { db }
    }

    /// Create an in-memory instance for testing.
    pub async fn in_memory() -> crate::Result<Self> {
        Ok(Self::new(connection::connect_in_memory().await?))
    }

    /// Create from environment variables.
    ///
    /// See [`connection::connect_from_env`] for the lookup chain.
    pub async fn from_env() -> crate::Result<Self> {
        Ok(Self::new(connection::connect_from_env().await?))
    }

    fn score_row_to_record(row: ScoreRow) -> StorageResult<ScoreRecord> {
        row.into_record()
            .map_err(|reason| StorageError::InvalidRecord {
                table: "scores".to_string(),
                reason,
            })
    }
}

#[async_trait]
impl EventStore for SurrealScoreStore {
    #[instrument(skip(self))]
    async fn find_events(
        &self,
        tournament_id: &str,
        category_type: &str,
    ) -> StorageResult<Vec<EventRecord>> {
        let mut res = self
            .db
            .query(
                "SELECT * FROM events WHERE tournament_id = $tid AND category_type = $cat \
                 ORDER BY created_at ASC",
            )
            .bind(("tid", tournament_id.to_string()))
            .bind(("cat", category_type.to_string()))
            .await
            .map_err(backend)?;

        let rows: Vec<EventRow> = res.take(0).map_err(backend)?;
        Ok(rows.into_iter().map(EventRecord::from).collect())
    }

    #[instrument(skip(self))]
    async fn get_event(&self, event_id: &str) -> StorageResult<Option<EventRecord>> {
        let mut res = self
            .db
            .query("SELECT * FROM events WHERE event_id = $eid")
            .bind(("eid", event_id.to_string()))
            .await
            .map_err(backend)?;

        let rows: Vec<EventRow> = res.take(0).map_err(backend)?;
        Ok(rows.into_iter().next().map(EventRecord::from))
    }

    #[instrument(skip(self, event), fields(key = %event.key()))]
    async fn insert_event(&self, event: NewEvent) -> StorageResult<EventRecord> {
        let key = event.key();
        let row = EventRow::new(event);
        debug!(event_id = %row.event_id, "creating event");

        let created: Option<EventRow> = self
            .db
            .create("events")
            .content(row)
            .await
            .map_err(|e| write_error("events", key, e))?;

        created
            .map(EventRecord::from)
            .ok_or_else(|| StorageError::Backend("failed to create event record".to_string()))
    }

    fn supports_atomic_upsert(&self) -> bool {
        true
    }

    /// `INSERT IGNORE` keyed on a record id derived from (tournament,
    /// category), followed by a read of every row for the key in the same
    /// request.
    #[instrument(skip(self, event), fields(key = %event.key()))]
    async fn upsert_event(&self, event: NewEvent) -> StorageResult<EventUpsert> {
        let row = EventRow::new(event);
        let tid = row.tournament_id.clone().unwrap_or_default();
        let cat = row.category_type.clone().unwrap_or_default();
        let proposed = row.event_id.clone();

        let mut res = self
            .db
            .query(
                r#"
                INSERT IGNORE INTO events {
                    id: [$tid, $cat],
                    event_id: $eid,
                    tournament_id: $tid,
                    category_type: $cat,
                    name: $name,
                    created_at: $created_at
                };
                SELECT * FROM events WHERE tournament_id = $tid AND category_type = $cat
                    ORDER BY created_at ASC;
                "#,
            )
            .bind(("tid", tid))
            .bind(("cat", cat))
            .bind(("eid", row.event_id))
            .bind(("name", row.name.unwrap_or_default()))
            .bind(("created_at", SurrealDatetime::from(row.created_at)))
            .await
            .map_err(backend)?;

        // A row created through `insert_event` owns the key under a random
        // record id; the insert then trips the index instead of being ignored.
        let inserted: surrealdb::Result<Vec<EventRow>> = res.take(0);
        if let Err(err) = inserted {
            if !is_index_violation(&err) {
                return Err(backend(err));
            }
        }

        let rows: Vec<EventRow> = res.take(1).map_err(backend)?;
        let rows: Vec<EventRecord> = rows.into_iter().map(EventRecord::from).collect();
        let created = rows.iter().any(|r| r.event_id == proposed);
        Ok(EventUpsert { rows, created })
    }
}

#[async_trait]
impl ParticipantStore for SurrealScoreStore {
    #[instrument(skip(self))]
    async fn find_participant(
        &self,
        event_id: &str,
        competitor_id: &str,
    ) -> StorageResult<Option<ParticipantRecord>> {
        let mut res = self
            .db
            .query("SELECT * FROM participants WHERE event_id = $eid AND competitor_id = $cid")
            .bind(("eid", event_id.to_string()))
            .bind(("cid", competitor_id.to_string()))
            .await
            .map_err(backend)?;

        let rows: Vec<ParticipantRow> = res.take(0).map_err(backend)?;
        Ok(rows.into_iter().next().map(ParticipantRecord::from))
    }

    #[instrument(skip(self))]
    async fn insert_participant(
        &self,
        event_id: &str,
        competitor_id: &str,
    ) -> StorageResult<ParticipantRecord> {
        let row = ParticipantRow::new(event_id, competitor_id);
        let key = format!("{event_id}/{competitor_id}");

        let created: Option<ParticipantRow> = self
            .db
            .create("participants")
            .content(row)
            .await
            .map_err(|e| write_error("participants", key, e))?;

        created
            .map(ParticipantRecord::from)
            .ok_or_else(|| StorageError::Backend("failed to create participant record".to_string()))
    }
}

#[async_trait]
impl ScoreStore for SurrealScoreStore {
    #[instrument(skip(self))]
    async fn list_scores(&self, event_id: &str) -> StorageResult<Vec<ScoreRecord>> {
        let mut res = self
            .db
            .query("SELECT * FROM scores WHERE event_id = $eid")
            .bind(("eid", event_id.to_string()))
            .await
            .map_err(backend)?;

        let rows: Vec<ScoreRow> = res.take(0).map_err(backend)?;
        rows.into_iter().map(Self::score_row_to_record).collect()
    }

    #[instrument(skip(self))]
    async fn get_score(
        &self,
        event_id: &str,
        competitor_id: &str,
    ) -> StorageResult<Option<ScoreRecord>> {
        let mut res = self
            .db
            .query("SELECT * FROM scores WHERE event_id = $eid AND competitor_id = $cid")
            .bind(("eid", event_id.to_string()))
            .bind(("cid", competitor_id.to_string()))
            .await
            .map_err(backend)?;

        let rows: Vec<ScoreRow> = res.take(0).map_err(backend)?;
        rows.into_iter()
            .next()
            .map(Self::score_row_to_record)
            .transpose()
    }

    #[instrument(skip(self, record), fields(key = %record.key()))]
    async fn insert_score(&self, record: &ScoreRecord) -> StorageResult<ScoreRecord> {
        let created: Option<ScoreRow> = self
            .db
            .create("scores")
            .content(ScoreRow::from_record(record))
            .await
            .map_err(|e| write_error("scores", record.key(), e))?;

        created
            .map(Self::score_row_to_record)
            .transpose()?
            .ok_or_else(|| StorageError::Backend("failed to create score record".to_string()))
    }

    #[instrument(skip(self, record), fields(key = %record.key()))]
    async fn update_score(&self, record: &ScoreRecord) -> StorageResult<ScoreRecord> {
        let mut res = self
            .db
            .query("UPDATE scores CONTENT $row WHERE event_id = $eid AND competitor_id = $cid")
            .bind(("row", ScoreRow::from_record(record)))
            .bind(("eid", record.event_id.clone()))
            .bind(("cid", record.competitor_id.clone()))
            .await
            .map_err(backend)?;

        let rows: Vec<ScoreRow> = res.take(0).map_err(backend)?;
        rows.into_iter()
            .next()
            .map(Self::score_row_to_record)
            .transpose()?
            .ok_or_else(|| StorageError::not_found("scores", record.key()))
    }
}

#[async_trait]
impl TournamentStore for SurrealScoreStore {
    #[instrument(skip(self))]
    async fn get_tournament(
        &self,
        tournament_id: &str,
    ) -> StorageResult<Option<TournamentRecord>> {
        let mut res = self
            .db
            .query("SELECT * FROM tournaments WHERE tournament_id = $tid")
            .bind(("tid", tournament_id.to_string()))
            .await
            .map_err(backend)?;

        let rows: Vec<TournamentRow> = res.take(0).map_err(backend)?;
        Ok(rows.into_iter().next().map(TournamentRecord::from))
    }

    #[instrument(skip(self, record), fields(tournament_id = %record.tournament_id))]
    async fn put_tournament(&self, record: TournamentRecord) -> StorageResult<()> {
        let tid = record.tournament_id.clone();
        self.db
            .query("UPSERT type::thing('tournaments', $tid) CONTENT $row")
            .bind(("tid", tid))
            .bind(("row", TournamentRow::from(record)))
            .await
            .and_then(|response| response.check())
            .map_err(backend)?;
        Ok(())
    }
}
