//! Idempotent get-or-create for the event of a (tournament, category).
//!
//! Any number of clients may race to create the same event. None of them
//! can hold a transaction across the read and the insert, so correctness
//! rests on the store's UNIQUE index: exactly one insert wins, the losers
//! get a uniqueness conflict and re-read (with a hard retry, since the
//! winner's row may not be visible yet) to pick up the winner's id.
//!
//! Stores with an atomic server-side upsert skip the read-insert-reread
//! loop entirely.

use std::sync::Arc;

use podium_state::{EventRecord, EventStore, NewEvent};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::config::CoreConfig;
use crate::domain::{CategoryType, Event, EventId, TournamentId};
use crate::error::{Result, ScoringError, ValidationError};
use crate::obs::{ScoringObserver, TracingObserver};
use crate::retry::{retry, Exhaustion, Presence};

/// Result of checking an event id against the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventValidation {
    pub valid: bool,
    /// The row as read, when there was one.
    pub record: Option<EventRecord>,
    pub error: Option<String>,
}

impl EventValidation {
    fn ok(record: EventRecord) -> Self {
        Self {
            valid: true,
            record: Some(record),
            error: None,
        }
    }

    fn invalid(record: Option<EventRecord>, error: impl Into<String>) -> Self {
        Self {
            valid: false,
            record,
            error: Some(error.into()),
        }
    }
}

impl Presence for EventValidation {
    fn presence(&self) -> usize {
        usize::from(self.valid)
    }
}

/// Guards creation and lookup of events.
pub struct EventIdentityGuard<S: ?Sized> {
    store: Arc<S>,
    config: CoreConfig,
    observer: Arc<dyn ScoringObserver>,
}

impl<S: ?Sized> Clone for EventIdentityGuard<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: self.config.clone(),
            observer: Arc::clone(&self.observer),
        }
    }
}

impl<S: EventStore + ?Sized> EventIdentityGuard<S> {
    pub fn new(store: Arc<S>, config: CoreConfig) -> Self {
        Self {
            store,
            config,
            observer: Arc::new(TracingObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ScoringObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Return the id of the one event for (tournament, category), creating
    /// it if none exists.
    ///
    /// # Errors
    ///
    /// - `ScoringError::DuplicateState` if the store holds more than one
    ///   event for the key. Never auto-resolved.
    /// - `ScoringError::NotFound` if a lost insert race is followed by a
    ///   re-read that never sees the winner's row.
    /// - `ScoringError::Validation` if the settled id is malformed or denied.
    #[instrument(skip_all, fields(tournament_id = %tournament_id, category_type = %category_type))]
    pub async fn get_or_create(
        &self,
        tournament_id: &TournamentId,
        category_type: &CategoryType,
    ) -> Result<EventId> {
        let new_event = NewEvent::new(
            tournament_id.as_str(),
            category_type.as_str(),
            category_type.as_str(),
        );
        let key = new_event.key();

        let (record, created) =
            if self.config.prefer_atomic_upsert && self.store.supports_atomic_upsert() {
                debug!("using server-side upsert");
                let upsert = self.store.upsert_event(new_event).await?;
                let record = self.single(&key, tournament_id, category_type, upsert.rows)?;
                (record, upsert.created)
            } else {
                self.read_insert_reread(&key, tournament_id, category_type, new_event)
                    .await?
            };

        let event_id = self.check_event_id(&record.event_id)?;
        self.observer.event_resolved(&key, event_id.as_str(), created);
        Ok(event_id)
    }

    async fn read_insert_reread(
        &self,
        key: &str,
        tournament_id: &TournamentId,
        category_type: &CategoryType,
        new_event: NewEvent,
    ) -> Result<(EventRecord, bool)> {
        let (tid, cat) = (tournament_id.as_str(), category_type.as_str());
        let what = format!("event {key}");

        let existing = retry(
            &what,
            &self.config.read_retry,
            Exhaustion::Soft,
            self.observer.as_ref(),
            || self.store.find_events(tid, cat),
        )
        .await?;
        if !existing.value.is_empty() {
            let record = self.single(key, tournament_id, category_type, existing.value)?;
            return Ok((record, false));
        }

        match self.store.insert_event(new_event).await {
            Ok(record) => Ok((record, true)),
            Err(err) if err.is_unique_violation() => {
                self.observer.insert_conflict("events", key);
                let winner = retry(
                    &what,
                    &self.config.write_retry,
                    Exhaustion::Hard,
                    self.observer.as_ref(),
                    || self.store.find_events(tid, cat),
                )
                .await?;
                let record = self.single(key, tournament_id, category_type, winner.value)?;
                Ok((record, false))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Exactly one row, or a hard error.
    fn single(
        &self,
        key: &str,
        tournament_id: &TournamentId,
        category_type: &CategoryType,
        mut rows: Vec<EventRecord>,
    ) -> Result<EventRecord> {
        match rows.len() {
            0 => Err(ScoringError::not_found(format!("event {key}"), 1)),
            1 => Ok(rows.remove(0)),
            count => {
                self.observer.duplicate_state(key, count);
                Err(ScoringError::DuplicateState {
                    tournament_id: tournament_id.to_string(),
                    category_type: category_type.to_string(),
                    count,
                    event_ids: rows.into_iter().map(|r| r.event_id).collect(),
                })
            }
        }
    }

    /// Well-formed and not a known-corrupt sentinel.
    pub fn check_event_id(&self, raw: &str) -> std::result::Result<EventId, ValidationError> {
        let id = EventId::parse(raw)?;
        if self.config.is_denied(id.as_str()) {
            return Err(ValidationError::DeniedEventId(id.to_string()));
        }
        Ok(id)
    }

    /// Re-read an event and report whether it is usable.
    ///
    /// A malformed or denied id, a missing row, and a row without its owning
    /// tournament or category are all reported as `valid = false`; only
    /// storage failures are errors.
    #[instrument(skip(self))]
    pub async fn validate(&self, event_id: &str) -> Result<EventValidation> {
        match self.check_event_id(event_id) {
            Ok(id) => Ok(self.inspect(&id).await?),
            Err(err) => Ok(EventValidation::invalid(None, err.to_string())),
        }
    }

    /// Like [`validate`](Self::validate), but waits (hard retry) for a row
    /// that is not yet consistent.
    #[instrument(skip_all, fields(event_id = %event_id))]
    pub async fn validate_consistent(&self, event_id: &EventId) -> Result<Event> {
        let id = self.check_event_id(event_id.as_str())?;
        let outcome = retry(
            &format!("event {id}"),
            &self.config.write_retry,
            Exhaustion::Hard,
            self.observer.as_ref(),
            || self.inspect(&id),
        )
        .await?;

        outcome
            .value
            .record
            .as_ref()
            .and_then(Event::from_record)
            .ok_or_else(|| ScoringError::not_found(format!("event {id}"), outcome.attempts))
    }

    async fn inspect(&self, id: &EventId) -> podium_state::StorageResult<EventValidation> {
        let validation = match self.store.get_event(id.as_str()).await? {
            None => EventValidation::invalid(None, format!("event {id} not found")),
            Some(record) if Event::from_record(&record).is_none() => EventValidation::invalid(
                Some(record),
                format!("event {id} is missing its tournament or category"),
            ),
            Some(record) => EventValidation::ok(record),
        };
        Ok(validation)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use podium_state::fakes::MemoryStore;

    use super::*;
    use crate::obs::NoopObserver;

    fn guard(store: MemoryStore) -> EventIdentityGuard<MemoryStore> {
        EventIdentityGuard::new(Arc::new(store), CoreConfig::default())
            .with_observer(Arc::new(NoopObserver))
    }

    fn ids(t: &str, c: &str) -> (TournamentId, CategoryType) {
        (TournamentId::new(t).unwrap(), CategoryType::new(c).unwrap())
    }

    #[tokio::test(start_paused = true)]
    async fn creates_once_then_reuses() {
        let g = guard(MemoryStore::new());
        let (t, c) = ids("t-1", "kata");

        let first = g.get_or_create(&t, &c).await.unwrap();
        let second = g.get_or_create(&t, &c).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(g.store.event_row_count(), 1);
        assert_eq!(g.store.event_insert_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn uses_atomic_upsert_when_offered() {
        let g = guard(MemoryStore::new().with_atomic_upsert());
        let (t, c) = ids("t-1", "kata");

        let first = g.get_or_create(&t, &c).await.unwrap();
        let second = g.get_or_create(&t, &c).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(g.store.unique_violation_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn upsert_can_be_disabled_by_config() {
        let config = CoreConfig {
            prefer_atomic_upsert: false,
            ..CoreConfig::default()
        };
        let store = Arc::new(MemoryStore::new().with_atomic_upsert());
        let g = EventIdentityGuard::new(Arc::clone(&store), config);
        let (t, c) = ids("t-1", "kata");

        g.get_or_create(&t, &c).await.unwrap();
        g.get_or_create(&t, &c).await.unwrap();
        assert_eq!(store.event_insert_count(), 1);
        assert_eq!(store.unique_violation_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn denied_sentinel_id_is_rejected() {
        let store = MemoryStore::new();
        store.seed_event_unchecked(EventRecord {
            event_id: crate::config::NIL_EVENT_ID.into(),
            tournament_id: Some("t-1".into()),
            category_type: Some("kata".into()),
            name: None,
            created_at: Utc::now(),
        });
        let g = guard(store);
        let (t, c) = ids("t-1", "kata");

        let err = g.get_or_create(&t, &c).await.unwrap_err();
        assert!(matches!(
            err,
            ScoringError::Validation(ValidationError::DeniedEventId(_))
        ));
    }

    #[tokio::test]
    async fn validate_reports_without_erroring() {
        let g = guard(MemoryStore::new());

        let v = g.validate("garbage").await.unwrap();
        assert!(!v.valid);
        assert!(v.error.unwrap().contains("malformed"));

        let v = g
            .validate("5b1d8f0c-2d7e-4b8e-9a53-0c1f3d2e4a11")
            .await
            .unwrap();
        assert!(!v.valid);
        assert!(v.record.is_none());

        let v = g.validate(crate::config::MAX_EVENT_ID).await.unwrap();
        assert!(v.error.unwrap().contains("sentinel"));
    }

    #[tokio::test(start_paused = true)]
    async fn validate_flags_row_without_owner() {
        let store = MemoryStore::new();
        let id = "5b1d8f0c-2d7e-4b8e-9a53-0c1f3d2e4a11";
        store.seed_event_unchecked(EventRecord {
            event_id: id.into(),
            tournament_id: None,
            category_type: Some("kata".into()),
            name: None,
            created_at: Utc::now(),
        });
        let g = guard(store);

        let v = g.validate(id).await.unwrap();
        assert!(!v.valid);
        assert!(v.record.is_some());

        let err = g
            .validate_consistent(&EventId::parse(id).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, ScoringError::NotFound { attempts: 6, .. }));
    }
}
