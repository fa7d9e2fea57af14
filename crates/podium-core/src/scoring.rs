//! The score write path and the standings read path.
//!
//! `submit_scores` runs the dependent writes event -> participant -> score
//! in order, each one idempotent on its own, and then recomputes the event.
//! Nothing spans the writes; a client that dies halfway leaves rows that the
//! next submission for the same competitor picks up and completes.

use std::sync::Arc;

use podium_state::{PodiumStore, ScoreRecord};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::config::CoreConfig;
use crate::domain::{
    CategoryType, Competitor, CompetitorId, EventId, JudgeScores, Provenance, TournamentId,
};
use crate::error::{Result, ScoringError};
use crate::identity::EventIdentityGuard;
use crate::obs::{ScoringObserver, TracingObserver};
use crate::recompute::{refresh_event, tournament_class, RecomputeOutcome};
use crate::retry::{retry, Exhaustion};
use crate::tie_breaker::TieBreakerResolver;

/// Result of one score submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub event_id: EventId,
    /// The submitted row after recomputation.
    pub record: ScoreRecord,
    /// Whether the total differs from what was stored before.
    pub total_changed: bool,
    pub recompute: RecomputeOutcome,
}

/// Current standings of an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Standings {
    pub event_id: EventId,
    /// False when the read did not settle or some row has not been ranked
    /// yet; the entries may then be incomplete.
    pub ready: bool,
    pub entries: Vec<ScoreRecord>,
}

pub struct ScoringService<S: ?Sized> {
    store: Arc<S>,
    guard: EventIdentityGuard<S>,
    resolver: TieBreakerResolver<S>,
    config: CoreConfig,
    observer: Arc<dyn ScoringObserver>,
}

impl<S: PodiumStore + ?Sized> ScoringService<S> {
    pub fn new(store: Arc<S>, config: CoreConfig) -> Self {
        Self::with_observer(store, config, Arc::new(TracingObserver))
    }

    pub fn with_observer(
        store: Arc<S>,
        config: CoreConfig,
        observer: Arc<dyn ScoringObserver>,
    ) -> Self {
        let guard = EventIdentityGuard::new(Arc::clone(&store), config.clone())
            .with_observer(Arc::clone(&observer));
        let resolver = TieBreakerResolver::new(Arc::clone(&store), config.clone())
            .with_observer(Arc::clone(&observer));
        Self {
            store,
            guard,
            resolver,
            config,
            observer,
        }
    }

    pub fn guard(&self) -> &EventIdentityGuard<S> {
        &self.guard
    }

    pub fn resolver(&self) -> &TieBreakerResolver<S> {
        &self.resolver
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Record one competitor's judge scores and recompute the event.
    ///
    /// The tournament must exist; it is checked before anything is written.
    #[instrument(
        skip_all,
        fields(
            tournament_id = %tournament_id,
            category_type = %category_type,
            competitor_id = %competitor_id,
        )
    )]
    pub async fn submit_scores(
        &self,
        tournament_id: &TournamentId,
        category_type: &CategoryType,
        competitor_id: &CompetitorId,
        judge_scores: JudgeScores,
    ) -> Result<Submission> {
        let class = tournament_class(self.store.as_ref(), tournament_id).await?;
        let event_id = self.guard.get_or_create(tournament_id, category_type).await?;

        self.ensure_participant(&event_id, competitor_id).await?;
        let (record, total_changed) = self
            .write_score(&event_id, competitor_id, judge_scores)
            .await?;

        let recompute = refresh_event(
            self.store.as_ref(),
            &self.config.read_retry,
            self.observer.as_ref(),
            &event_id,
            class,
            std::slice::from_ref(&record),
        )
        .await?;
        let record = recompute
            .records
            .iter()
            .find(|r| r.competitor_id == record.competitor_id)
            .cloned()
            .unwrap_or(record);

        Ok(Submission {
            event_id,
            record,
            total_changed,
            recompute,
        })
    }

    /// [`submit_scores`](Self::submit_scores) for a roster entry. The entry's
    /// name and provenance only tag the trace; the id is what gets scored.
    #[instrument(
        skip_all,
        fields(
            competitor_id = %entry.id,
            display_name = %entry.display_name,
            provenance = %entry.provenance,
        )
    )]
    pub async fn submit_entry(
        &self,
        tournament_id: &TournamentId,
        category_type: &CategoryType,
        entry: &Competitor,
        judge_scores: JudgeScores,
    ) -> Result<Submission> {
        if entry.provenance == Provenance::WalkIn {
            debug!("scoring a walk-in entry");
        }
        self.submit_scores(tournament_id, category_type, &entry.id, judge_scores)
            .await
    }

    async fn ensure_participant(
        &self,
        event_id: &EventId,
        competitor_id: &CompetitorId,
    ) -> Result<()> {
        let (eid, cid) = (event_id.as_str(), competitor_id.as_str());
        if self.store.find_participant(eid, cid).await?.is_some() {
            return Ok(());
        }
        match self.store.insert_participant(eid, cid).await {
            Ok(_) => Ok(()),
            Err(err) if err.is_unique_violation() => {
                let key = format!("{eid}/{cid}");
                self.observer.insert_conflict("participants", &key);
                retry(
                    &format!("participant {key}"),
                    &self.config.write_retry,
                    Exhaustion::Hard,
                    self.observer.as_ref(),
                    || self.store.find_participant(eid, cid),
                )
                .await?;
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Insert or update the competitor's row. Returns the row as written and
    /// whether its total changed.
    async fn write_score(
        &self,
        event_id: &EventId,
        competitor_id: &CompetitorId,
        judge_scores: JudgeScores,
    ) -> Result<(ScoreRecord, bool)> {
        let (eid, cid) = (event_id.as_str(), competitor_id.as_str());

        let existing = match self.store.get_score(eid, cid).await? {
            Some(existing) => existing,
            None => {
                let fresh = ScoreRecord::new(eid, cid, judge_scores.as_array());
                match self.store.insert_score(&fresh).await {
                    Ok(written) => return Ok((written, true)),
                    Err(err) if err.is_unique_violation() => {
                        self.observer.insert_conflict("scores", &fresh.key());
                        retry(
                            &format!("score {}", fresh.key()),
                            &self.config.write_retry,
                            Exhaustion::Hard,
                            self.observer.as_ref(),
                            || self.store.get_score(eid, cid),
                        )
                        .await?
                        .value
                        .ok_or_else(|| {
                            ScoringError::not_found(format!("score {}", fresh.key()), 1)
                        })?
                    }
                    Err(err) => return Err(err.into()),
                }
            }
        };

        let mut record = existing;
        let was = record.tie_breaker_status;
        let total_changed = record.set_judge_scores(judge_scores.as_array());
        if record.tie_breaker_status != was {
            debug!(total = record.total_score, from = %was, "rescored, tie mark cleared");
        }
        let written = self.store.update_score(&record).await?;
        Ok((written, total_changed))
    }

    /// Recompute ranks and points for an event and persist what changed.
    #[instrument(skip_all, fields(event_id = %event_id))]
    pub async fn recompute_event(&self, event_id: &EventId) -> Result<RecomputeOutcome> {
        let event = self.guard.validate_consistent(event_id).await?;
        let class = tournament_class(self.store.as_ref(), &event.tournament_id).await?;
        refresh_event(
            self.store.as_ref(),
            &self.config.read_retry,
            self.observer.as_ref(),
            event_id,
            class,
            &[],
        )
        .await
    }

    /// Current standings, ordered by rank then competitor id. Unranked rows
    /// sort last.
    #[instrument(skip_all, fields(event_id = %event_id))]
    pub async fn standings(&self, event_id: &EventId) -> Result<Standings> {
        let outcome = retry(
            &format!("scores for event {event_id}"),
            &self.config.read_retry,
            Exhaustion::Soft,
            self.observer.as_ref(),
            || self.store.list_scores(event_id.as_str()),
        )
        .await?;

        let mut entries = outcome.value;
        entries.sort_by(|a, b| {
            a.final_rank
                .unwrap_or(u32::MAX)
                .cmp(&b.final_rank.unwrap_or(u32::MAX))
                .then_with(|| a.competitor_id.cmp(&b.competitor_id))
        });
        let ready = outcome.satisfied && entries.iter().all(|e| e.final_rank.is_some());

        Ok(Standings {
            event_id: event_id.clone(),
            ready,
            entries,
        })
    }
}
