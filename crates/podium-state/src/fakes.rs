//! In-memory fakes for storage traits (testing only)
//!
//! `MemoryStore` implements every storage trait against `HashMap`s behind a
//! `Mutex`. Uniqueness constraints are enforced on write against all rows,
//! while reads can be configured to lag: a row inserted by
//! [`MemoryStore::with_read_lag`] stays invisible to the next `n` reads that
//! would have returned it. That reproduces the read-after-write gap of a
//! replicated store without timing-dependent tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::StorageError;
use crate::storage_traits::*;

#[derive(Debug)]
struct Lagged<T> {
    value: T,
    hidden_reads: u32,
}

impl<T: Clone> Lagged<T> {
    fn new(value: T, hidden_reads: u32) -> Self {
        Self {
            value,
            hidden_reads,
        }
    }

    /// Consume one read. Returns the value if it is visible to this read.
    fn read(&mut self) -> Option<T> {
        if self.hidden_reads > 0 {
            self.hidden_reads -= 1;
            None
        } else {
            Some(self.value.clone())
        }
    }
}

#[derive(Debug, Default)]
struct Tables {
    events: Vec<Lagged<EventRecord>>,
    participants: Vec<Lagged<ParticipantRecord>>,
    scores: Vec<Lagged<ScoreRecord>>,
    tournaments: HashMap<String, TournamentRecord>,
    event_inserts: u32,
    unique_violations: u32,
}

/// In-memory store implementing all Podium storage traits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    read_lag: u32,
    atomic_upsert: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Newly written rows stay hidden from the next `reads` matching reads.
    pub fn with_read_lag(reads: u32) -> Self {
        Self {
            read_lag: reads,
            ..Self::default()
        }
    }

    /// Advertise and implement `upsert_event` as one atomic step.
    pub fn with_atomic_upsert(mut self) -> Self {
        self.atomic_upsert = true;
        self
    }

    /// Insert an event row bypassing the uniqueness constraint, to model a
    /// store that already holds duplicates.
    pub fn seed_event_unchecked(&self, record: EventRecord) {
        let mut tables = self.tables.lock().unwrap();
        tables.events.push(Lagged::new(record, 0));
    }

    /// Insert or replace a score row directly, visible immediately.
    pub fn seed_score(&self, record: ScoreRecord) {
        let mut tables = self.tables.lock().unwrap();
        tables.scores.retain(|s| {
            !(s.value.event_id == record.event_id && s.value.competitor_id == record.competitor_id)
        });
        tables.scores.push(Lagged::new(record, 0));
    }

    /// Hide an existing score row from the next `reads` reads that would
    /// return it, as if a replica had fallen behind.
    pub fn hide_score(&self, event_id: &str, competitor_id: &str, reads: u32) {
        let mut tables = self.tables.lock().unwrap();
        if let Some(row) = tables
            .scores
            .iter_mut()
            .find(|s| s.value.event_id == event_id && s.value.competitor_id == competitor_id)
        {
            row.hidden_reads = reads;
        }
    }

    /// Number of event rows physically stored, visible or not.
    pub fn event_row_count(&self) -> usize {
        self.tables.lock().unwrap().events.len()
    }

    /// Number of successful `insert_event` calls.
    pub fn event_insert_count(&self) -> u32 {
        self.tables.lock().unwrap().event_inserts
    }

    /// Number of writes rejected by a uniqueness constraint.
    pub fn unique_violation_count(&self) -> u32 {
        self.tables.lock().unwrap().unique_violations
    }

    /// Current score row for (event, competitor), ignoring read lag.
    pub fn peek_score(&self, event_id: &str, competitor_id: &str) -> Option<ScoreRecord> {
        let tables = self.tables.lock().unwrap();
        tables
            .scores
            .iter()
            .find(|s| s.value.event_id == event_id && s.value.competitor_id == competitor_id)
            .map(|s| s.value.clone())
    }

    fn insert_event_locked(
        tables: &mut Tables,
        event: NewEvent,
        lag: u32,
    ) -> StorageResult<EventRecord> {
        let exists = tables.events.iter().any(|e| {
            e.value.tournament_id.as_deref() == Some(event.tournament_id.as_str())
                && e.value.category_type.as_deref() == Some(event.category_type.as_str())
        });
        if exists {
            tables.unique_violations += 1;
            return Err(StorageError::unique("events", event.key()));
        }
        let record = EventRecord {
            event_id: uuid::Uuid::new_v4().to_string(),
            tournament_id: Some(event.tournament_id),
            category_type: Some(event.category_type),
            name: Some(event.name),
            created_at: Utc::now(),
        };
        tables.events.push(Lagged::new(record.clone(), lag));
        tables.event_inserts += 1;
        Ok(record)
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn find_events(
        &self,
        tournament_id: &str,
        category_type: &str,
    ) -> StorageResult<Vec<EventRecord>> {
        // Give concurrent callers a chance to interleave between read and write.
        tokio::task::yield_now().await;
        let mut tables = self.tables.lock().unwrap();
        Ok(tables
            .events
            .iter_mut()
            .filter(|e| {
                e.value.tournament_id.as_deref() == Some(tournament_id)
                    && e.value.category_type.as_deref() == Some(category_type)
            })
            .filter_map(Lagged::read)
            .collect())
    }

    async fn get_event(&self, event_id: &str) -> StorageResult<Option<EventRecord>> {
        let mut tables = self.tables.lock().unwrap();
        Ok(tables
            .events
            .iter_mut()
            .filter(|e| e.value.event_id == event_id)
            .find_map(Lagged::read))
    }

    async fn insert_event(&self, event: NewEvent) -> StorageResult<EventRecord> {
        tokio::task::yield_now().await;
        let mut tables = self.tables.lock().unwrap();
        Self::insert_event_locked(&mut tables, event, self.read_lag)
    }

    fn supports_atomic_upsert(&self) -> bool {
        self.atomic_upsert
    }

    async fn upsert_event(&self, event: NewEvent) -> StorageResult<EventUpsert> {
        if !self.atomic_upsert {
            return Err(StorageError::Unsupported("upsert_event"));
        }
        let mut tables = self.tables.lock().unwrap();
        let (tid, cat) = (event.tournament_id.clone(), event.category_type.clone());
        let created = match Self::insert_event_locked(&mut tables, event, 0) {
            Ok(_) => true,
            Err(err) if err.is_unique_violation() => false,
            Err(err) => return Err(err),
        };
        // Server-side upsert reads its own write: no lag applies.
        let rows = tables
            .events
            .iter()
            .filter(|e| {
                e.value.tournament_id.as_deref() == Some(tid.as_str())
                    && e.value.category_type.as_deref() == Some(cat.as_str())
            })
            .map(|e| e.value.clone())
            .collect();
        Ok(EventUpsert { rows, created })
    }
}

#[async_trait]
impl ParticipantStore for MemoryStore {
    async fn find_participant(
        &self,
        event_id: &str,
        competitor_id: &str,
    ) -> StorageResult<Option<ParticipantRecord>> {
        let mut tables = self.tables.lock().unwrap();
        Ok(tables
            .participants
            .iter_mut()
            .filter(|p| p.value.event_id == event_id && p.value.competitor_id == competitor_id)
            .find_map(Lagged::read))
    }

    async fn insert_participant(
        &self,
        event_id: &str,
        competitor_id: &str,
    ) -> StorageResult<ParticipantRecord> {
        let mut tables = self.tables.lock().unwrap();
        if tables
            .participants
            .iter()
            .any(|p| p.value.event_id == event_id && p.value.competitor_id == competitor_id)
        {
            tables.unique_violations += 1;
            return Err(StorageError::unique(
                "participants",
                format!("{event_id}/{competitor_id}"),
            ));
        }
        let record = ParticipantRecord {
            event_id: event_id.to_string(),
            competitor_id: competitor_id.to_string(),
            created_at: Utc::now(),
        };
        tables
            .participants
            .push(Lagged::new(record.clone(), self.read_lag));
        Ok(record)
    }
}

#[async_trait]
impl ScoreStore for MemoryStore {
    async fn list_scores(&self, event_id: &str) -> StorageResult<Vec<ScoreRecord>> {
        let mut tables = self.tables.lock().unwrap();
        Ok(tables
            .scores
            .iter_mut()
            .filter(|s| s.value.event_id == event_id)
            .filter_map(Lagged::read)
            .collect())
    }

    async fn get_score(
        &self,
        event_id: &str,
        competitor_id: &str,
    ) -> StorageResult<Option<ScoreRecord>> {
        let mut tables = self.tables.lock().unwrap();
        Ok(tables
            .scores
            .iter_mut()
            .filter(|s| s.value.event_id == event_id && s.value.competitor_id == competitor_id)
            .find_map(Lagged::read))
    }

    async fn insert_score(&self, record: &ScoreRecord) -> StorageResult<ScoreRecord> {
        let mut tables = self.tables.lock().unwrap();
        if tables.scores.iter().any(|s| {
            s.value.event_id == record.event_id && s.value.competitor_id == record.competitor_id
        }) {
            tables.unique_violations += 1;
            return Err(StorageError::unique("scores", record.key()));
        }
        tables
            .scores
            .push(Lagged::new(record.clone(), self.read_lag));
        Ok(record.clone())
    }

    async fn update_score(&self, record: &ScoreRecord) -> StorageResult<ScoreRecord> {
        let mut tables = self.tables.lock().unwrap();
        let row = tables
            .scores
            .iter_mut()
            .find(|s| {
                s.value.event_id == record.event_id && s.value.competitor_id == record.competitor_id
            })
            .ok_or_else(|| StorageError::not_found("scores", record.key()))?;
        row.value = record.clone();
        Ok(record.clone())
    }
}

#[async_trait]
impl TournamentStore for MemoryStore {
    async fn get_tournament(
        &self,
        tournament_id: &str,
    ) -> StorageResult<Option<TournamentRecord>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.tournaments.get(tournament_id).cloned())
    }

    async fn put_tournament(&self, record: TournamentRecord) -> StorageResult<()> {
        let mut tables = self.tables.lock().unwrap();
        tables
            .tournaments
            .insert(record.tournament_id.clone(), record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lagged_row_becomes_visible_after_n_reads() {
        let store = MemoryStore::with_read_lag(2);
        store
            .insert_event(NewEvent::new("t-1", "kata", "Kata"))
            .await
            .unwrap();

        assert!(store.find_events("t-1", "kata").await.unwrap().is_empty());
        assert!(store.find_events("t-1", "kata").await.unwrap().is_empty());
        assert_eq!(store.find_events("t-1", "kata").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn uniqueness_is_enforced_against_hidden_rows() {
        let store = MemoryStore::with_read_lag(5);
        store
            .insert_event(NewEvent::new("t-1", "kata", "Kata"))
            .await
            .unwrap();

        let err = store
            .insert_event(NewEvent::new("t-1", "kata", "Kata again"))
            .await
            .unwrap_err();
        assert!(err.is_unique_violation());
        assert_eq!(store.unique_violation_count(), 1);
        assert_eq!(store.event_row_count(), 1);
    }

    #[tokio::test]
    async fn upsert_is_unsupported_unless_enabled() {
        let store = MemoryStore::new();
        assert!(!store.supports_atomic_upsert());
        let err = store
            .upsert_event(NewEvent::new("t-1", "kata", "Kata"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Unsupported(_)));
    }
}
