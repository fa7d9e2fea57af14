//! Manual tie-break workflow for podium ties.
//!
//! Per group: `Untouched -> AwaitingSelection -> Resolved`. Non-podium ties
//! never enter. Every input is checked before anything is written, so a
//! rejected call leaves the event exactly as it was.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use podium_state::{PodiumStore, ScoreRecord, TieBreakerStatus};
use tracing::instrument;

use crate::config::CoreConfig;
use crate::domain::{EventId, TournamentId};
use crate::error::{Result, ScoringError, ValidationError};
use crate::obs::{ScoringObserver, TracingObserver};
use crate::points::{points, TournamentClass, PODIUM_MAX_RANK};
use crate::ranking::{rank, tie_groups, TieGroup};
use crate::recompute::{refresh_event, tournament_class};
use crate::retry::{retry, Exhaustion};

/// Check a selection against its group and return the full finishing order.
///
/// `ordered_winner_ids` names every member but one, best first; the member
/// left out finishes last.
pub fn validate_selection(
    group: &TieGroup,
    ordered_winner_ids: &[String],
) -> std::result::Result<Vec<String>, ValidationError> {
    let expected = group.size().saturating_sub(1);
    if group.size() < 2 || ordered_winner_ids.len() != expected {
        return Err(ValidationError::SelectionCount {
            expected,
            actual: ordered_winner_ids.len(),
        });
    }

    let mut seen = HashSet::new();
    for id in ordered_winner_ids {
        if !group.contains(id) {
            return Err(ValidationError::ForeignCompetitor(id.clone()));
        }
        if !seen.insert(id.as_str()) {
            return Err(ValidationError::DuplicateSelection(id.clone()));
        }
    }

    let mut order = ordered_winner_ids.to_vec();
    order.extend(group.members.iter().filter(|m| !seen.contains(m.as_str())).cloned());
    Ok(order)
}

/// Confirm `group` is a podium tie in the event's current ranking.
pub fn check_current(
    records: &[ScoreRecord],
    group: &TieGroup,
) -> std::result::Result<(), ValidationError> {
    if !group.is_podium() {
        return Err(ValidationError::NotPodium {
            rank: group.base_rank,
        });
    }

    let mut wanted: Vec<&str> = group.members.iter().map(String::as_str).collect();
    wanted.sort_unstable();

    let current = tie_groups(&rank(records.iter()));
    let matches = current.iter().any(|g| {
        let mut members: Vec<&str> = g.members.iter().map(String::as_str).collect();
        members.sort_unstable();
        g.base_rank == group.base_rank && g.total_score == group.total_score && members == wanted
    });
    if matches {
        Ok(())
    } else {
        Err(ValidationError::StaleGroup)
    }
}

/// Which statuses occur among a group's rows.
#[derive(Debug, Default, Clone, Copy)]
struct GroupMarks {
    untouched: bool,
    awaiting: bool,
    resolved: bool,
}

impl GroupMarks {
    fn of(members: &[&ScoreRecord]) -> Self {
        let mut marks = Self::default();
        for member in members {
            match member.tie_breaker_status {
                TieBreakerStatus::Untouched => marks.untouched = true,
                TieBreakerStatus::AwaitingSelection => marks.awaiting = true,
                TieBreakerStatus::Resolved => marks.resolved = true,
            }
        }
        marks
    }

    /// The most advanced status present.
    fn furthest(self) -> TieBreakerStatus {
        if self.resolved {
            TieBreakerStatus::Resolved
        } else if self.awaiting {
            TieBreakerStatus::AwaitingSelection
        } else {
            TieBreakerStatus::Untouched
        }
    }
}

/// Drives the tie-break workflow against the store.
pub struct TieBreakerResolver<S: ?Sized> {
    store: Arc<S>,
    config: CoreConfig,
    observer: Arc<dyn ScoringObserver>,
}

impl<S: ?Sized> Clone for TieBreakerResolver<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: self.config.clone(),
            observer: Arc::clone(&self.observer),
        }
    }
}

impl<S: PodiumStore + ?Sized> TieBreakerResolver<S> {
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

    /// Read every score row of the event, waiting for at least `min` rows.
    async fn load(&self, event_id: &EventId, min: usize) -> Result<Vec<ScoreRecord>> {
        let policy = self.config.read_retry.clone().with_min_acceptable(min);
        let outcome = retry(
            &format!("scores for event {event_id}"),
            &policy,
            Exhaustion::Soft,
            self.observer.as_ref(),
            || self.store.list_scores(event_id.as_str()),
        )
        .await?;
        Ok(outcome.value)
    }

    /// The tie group currently sharing `base_rank`, whatever its status.
    #[instrument(skip_all, fields(event_id = %event_id, base_rank = base_rank))]
    pub async fn current_group(&self, event_id: &EventId, base_rank: u32) -> Result<TieGroup> {
        if base_rank == 0 || base_rank > PODIUM_MAX_RANK {
            return Err(ValidationError::NotPodium { rank: base_rank }.into());
        }
        let records = self.load(event_id, 1).await?;
        tie_groups(&rank(records.iter()))
            .into_iter()
            .find(|g| g.base_rank == base_rank)
            .ok_or_else(|| {
                ScoringError::not_found(format!("tie at rank {base_rank} in event {event_id}"), 1)
            })
    }

    /// Move a podium tie to `AwaitingSelection` and return its members.
    ///
    /// Calling it again while the group awaits selection, or while a
    /// resolution is partly written, returns the members unchanged.
    #[instrument(skip_all, fields(event_id = %event_id, base_rank = group.base_rank))]
    pub async fn begin_resolution(
        &self,
        event_id: &EventId,
        group: &TieGroup,
    ) -> Result<Vec<ScoreRecord>> {
        if !group.is_podium() {
            return Err(ValidationError::NotPodium {
                rank: group.base_rank,
            }
            .into());
        }
        let records = self.load(event_id, group.size()).await?;
        check_current(&records, group)?;

        let members = members_of(&records, group);
        let marks = GroupMarks::of(&members);
        if marks.resolved && (marks.untouched || !marks.awaiting) {
            return Err(ValidationError::InvalidTransition {
                expected: TieBreakerStatus::Untouched,
                actual: TieBreakerStatus::Resolved,
            }
            .into());
        }
        // Already open, or a resolution is being written.
        if !marks.untouched {
            return Ok(members.into_iter().cloned().collect());
        }

        // Rows an interrupted call already opened are left as they are.
        let now = Utc::now();
        let mut updated = Vec::with_capacity(members.len());
        for member in members {
            let mut rec = member.clone();
            if rec.tie_breaker_status == TieBreakerStatus::Untouched {
                rec.tie_breaker_status = TieBreakerStatus::AwaitingSelection;
                rec.tie_group_total = Some(group.total_score);
                rec.updated_at = now;
                self.store.update_score(&rec).await?;
            }
            updated.push(rec);
        }

        self.observer
            .tie_resolution_started(event_id.as_str(), group.base_rank, &group.members);
        Ok(updated)
    }

    /// Apply a human-chosen order to a group awaiting selection.
    ///
    /// Members get sequential ranks from the group's base rank in the chosen
    /// order and status `Resolved`, then the event is recomputed so their
    /// points reflect the whole field. A group left half resolved by an
    /// interrupted call can be resolved again. Returns the members in
    /// finishing order.
    #[instrument(skip_all, fields(event_id = %event_id, base_rank = group.base_rank))]
    pub async fn resolve(
        &self,
        event_id: &EventId,
        group: &TieGroup,
        ordered_winner_ids: &[String],
    ) -> Result<Vec<ScoreRecord>> {
        if !group.is_podium() {
            return Err(ValidationError::NotPodium {
                rank: group.base_rank,
            }
            .into());
        }
        let order = validate_selection(group, ordered_winner_ids)?;

        let records = self.load(event_id, group.size()).await?;
        check_current(&records, group)?;

        let members = members_of(&records, group);
        let marks = GroupMarks::of(&members);
        if marks.untouched || !marks.awaiting {
            return Err(ValidationError::InvalidTransition {
                expected: TieBreakerStatus::AwaitingSelection,
                actual: if marks.untouched {
                    TieBreakerStatus::Untouched
                } else {
                    marks.furthest()
                },
            }
            .into());
        }

        let class = self.event_class(event_id).await?;
        let field_size = records.len();
        let now = Utc::now();

        // Build every row first so nothing is written unless all members
        // are present.
        let mut updated = Vec::with_capacity(order.len());
        for (offset, competitor_id) in order.iter().enumerate() {
            let member = members
                .iter()
                .find(|r| &r.competitor_id == competitor_id)
                .ok_or(ValidationError::StaleGroup)?;
            let final_rank = group.base_rank + offset as u32;
            let mut rec = (*member).clone();
            rec.final_rank = Some(final_rank);
            rec.points_earned = Some(points(final_rank, class, field_size));
            rec.tie_breaker_status = TieBreakerStatus::Resolved;
            rec.tie_group_total = Some(group.total_score);
            rec.updated_at = now;
            updated.push(rec);
        }

        for rec in &updated {
            self.store.update_score(rec).await?;
        }
        self.observer.tie_resolved(event_id.as_str(), group.base_rank, &order);

        // The listing above only had to show the group; recompute over one
        // at least as full so points match the whole field.
        let policy = self.config.read_retry.clone().with_min_acceptable(field_size);
        let outcome = refresh_event(
            self.store.as_ref(),
            &policy,
            self.observer.as_ref(),
            event_id,
            class,
            &updated,
        )
        .await?;
        Ok(outcome
            .records
            .into_iter()
            .filter(|r| group.contains(&r.competitor_id))
            .collect())
    }

    async fn event_class(&self, event_id: &EventId) -> Result<TournamentClass> {
        let event = retry(
            &format!("event {event_id}"),
            &self.config.read_retry,
            Exhaustion::Hard,
            self.observer.as_ref(),
            || self.store.get_event(event_id.as_str()),
        )
        .await?
        .value
        .ok_or_else(|| ScoringError::not_found(format!("event {event_id}"), 1))?;
        let tournament_id = event
            .tournament_id
            .as_deref()
            .map(TournamentId::new)
            .transpose()?
            .ok_or_else(|| ScoringError::not_found(format!("tournament of event {event_id}"), 1))?;
        tournament_class(self.store.as_ref(), &tournament_id).await
    }
}

fn members_of<'a>(records: &'a [ScoreRecord], group: &TieGroup) -> Vec<&'a ScoreRecord> {
    records
        .iter()
        .filter(|r| group.contains(&r.competitor_id))
        .collect()
}
