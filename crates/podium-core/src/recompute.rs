//! Full recomputation of ranks and points for one event.
//!
//! [`reconcile`] is pure: it takes every score row of an event as read and
//! returns the rows as they should be persisted. Ranking itself only looks
//! at totals; this pass layers the tie-break marks on top:
//!
//! - A marked group stays marked only while the set of rows holding its
//!   total is exactly the set that was marked and no member has left it.
//!   Anything else (a member was rescored, a newcomer joined the total)
//!   reverts every marked member to `Untouched`.
//! - The tie-break writes one row at a time, so a pass can land halfway
//!   through one. Rows awaiting selection next to resolved rows are a
//!   resolution being written: the resolved rows keep the rank and points
//!   they were given. Rows awaiting selection next to unmarked rows that
//!   still share the group's rank are a selection being opened.
//! - An `AwaitingSelection` group that has dropped off the podium is
//!   reverted too; it no longer needs a decision.
//! - A `Resolved` group keeps its relative order (by previous final rank)
//!   and is re-based onto its current shared rank.
//!
//! Points are recomputed for every row on every pass.

use std::collections::{HashMap, HashSet};

use podium_state::{ScoreRecord, ScoreStore, TieBreakerStatus, TournamentStore};
use serde::{Deserialize, Serialize};

use crate::domain::{EventId, TournamentId};
use crate::error::{Result, ScoringError};
use crate::obs::ScoringObserver;
use crate::points::{points, TournamentClass, PODIUM_MAX_RANK};
use crate::ranking::{effective_total, rank, Scored, TieGroup};
use crate::retry::{retry, Exhaustion, RetryPolicy};

/// Outcome of [`reconcile`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reconciliation {
    /// Every row, ordered by final rank then competitor id.
    pub records: Vec<ScoreRecord>,
    /// Competitors whose rank, points or tie mark changed.
    pub changed: Vec<String>,
    /// Unmarked podium ties waiting for someone to start a tie-break.
    pub pending_ties: Vec<TieGroup>,
    /// Members of each marked group that was cleared on this pass.
    pub reverted: Vec<Vec<String>>,
    pub field_size: usize,
}

impl Reconciliation {
    pub fn changed_records(&self) -> impl Iterator<Item = &ScoreRecord> {
        self.records
            .iter()
            .filter(|r| self.changed.iter().any(|c| c == &r.competitor_id))
    }
}

struct Slot<'a> {
    index: usize,
    record: &'a ScoreRecord,
}

impl Scored for Slot<'_> {
    fn competitor_id(&self) -> &str {
        &self.record.competitor_id
    }

    fn total_score(&self) -> Option<f64> {
        Some(self.record.total_score)
    }
}

/// One group of equal totals from the ranking.
struct RankGroup {
    total: f64,
    base_rank: u32,
    /// Row indices, in ranking order.
    members: Vec<usize>,
}

fn total_key(total: f64) -> u64 {
    total.to_bits()
}

fn rank_groups(records: &[ScoreRecord]) -> Vec<RankGroup> {
    let slots = records
        .iter()
        .enumerate()
        .map(|(index, record)| Slot { index, record });

    let mut groups: Vec<RankGroup> = Vec::new();
    for ranked in rank(slots) {
        if let Some(group) = groups.last_mut().filter(|g| g.base_rank == ranked.rank) {
            group.members.push(ranked.record.index);
            continue;
        }
        groups.push(RankGroup {
            total: effective_total(&ranked.record),
            base_rank: ranked.rank,
            members: vec![ranked.record.index],
        });
    }
    groups
}

/// Whether the marks on `marked` (sorted row indices) still describe the
/// rows holding `group`'s total.
fn marks_hold(records: &[ScoreRecord], group: &RankGroup, marked: &[usize]) -> bool {
    if group.members.len() < 2 {
        return false;
    }
    let awaiting = marked
        .iter()
        .any(|&i| records[i].tie_breaker_status == TieBreakerStatus::AwaitingSelection);
    if awaiting && group.base_rank > PODIUM_MAX_RANK {
        return false;
    }

    let mut held = group.members.clone();
    held.sort_unstable();
    if held == marked {
        return true;
    }

    // Opening a selection: only some holders are marked yet, all of them
    // awaiting, and the rest are the unmarked rows it was opened on.
    let all_awaiting = marked
        .iter()
        .all(|&i| records[i].tie_breaker_status == TieBreakerStatus::AwaitingSelection);
    all_awaiting
        && marked.iter().all(|i| held.binary_search(i).is_ok())
        && held.iter().all(|&i| {
            marked.binary_search(&i).is_ok()
                || (records[i].tie_breaker_status == TieBreakerStatus::Untouched
                    && records[i].final_rank == Some(group.base_rank))
        })
}

/// Clear every mark that no longer describes a live tie. Returns the
/// competitor ids of each cleared group.
fn clear_stale_marks(records: &mut [ScoreRecord], groups: &[RankGroup]) -> Vec<Vec<String>> {
    let holders: HashMap<u64, &RankGroup> =
        groups.iter().map(|g| (total_key(g.total), g)).collect();

    // Marked rows keyed by the total their mark was taken against; a mark
    // without a total can never be valid. Untouched rows still carrying a
    // total have left that group since it was marked.
    let mut marked: HashMap<Option<u64>, Vec<usize>> = HashMap::new();
    let mut departed: HashSet<u64> = HashSet::new();
    for (i, rec) in records.iter_mut().enumerate() {
        if rec.tie_breaker_status != TieBreakerStatus::Untouched {
            marked
                .entry(rec.tie_group_total.map(total_key))
                .or_default()
                .push(i);
        } else if let Some(total) = rec.tie_group_total.take() {
            departed.insert(total_key(total));
        }
    }

    let mut reverted = Vec::new();
    for (key, mut members) in marked {
        members.sort_unstable();
        let valid = key
            .filter(|k| !departed.contains(k))
            .and_then(|k| holders.get(&k))
            .is_some_and(|group| marks_hold(records, group, &members));
        if valid {
            continue;
        }
        let mut ids: Vec<String> = members
            .iter()
            .map(|&i| {
                records[i].clear_tie_mark();
                records[i].competitor_id.clone()
            })
            .collect();
        ids.sort();
        reverted.push(ids);
    }
    reverted.sort();
    reverted
}

fn frozen_order(records: &[ScoreRecord], members: &[usize]) -> Vec<usize> {
    let mut order = members.to_vec();
    order.sort_by(|&a, &b| {
        let (ra, rb) = (&records[a], &records[b]);
        ra.final_rank
            .unwrap_or(u32::MAX)
            .cmp(&rb.final_rank.unwrap_or(u32::MAX))
            .then_with(|| ra.competitor_id.cmp(&rb.competitor_id))
    });
    order
}

fn mark_of(rec: &ScoreRecord) -> (Option<u32>, Option<u32>, TieBreakerStatus, Option<f64>) {
    (
        rec.final_rank,
        rec.points_earned,
        rec.tie_breaker_status,
        rec.tie_group_total,
    )
}

/// Recompute ranks, points and tie marks for every row of one event.
pub fn reconcile(records: Vec<ScoreRecord>, class: TournamentClass) -> Reconciliation {
    let field_size = records.len();
    let before: Vec<_> = records.iter().map(mark_of).collect();
    let mut records = records;

    let groups = rank_groups(&records);
    let reverted = clear_stale_marks(&mut records, &groups);
    let mut pending_ties = Vec::new();

    for group in &groups {
        let frozen = group.members.len() > 1
            && group
                .members
                .iter()
                .all(|&i| records[i].tie_breaker_status == TieBreakerStatus::Resolved);

        if frozen {
            for (offset, i) in frozen_order(&records, &group.members).into_iter().enumerate() {
                let final_rank = group.base_rank + offset as u32;
                records[i].final_rank = Some(final_rank);
                records[i].points_earned = Some(points(final_rank, class, field_size));
            }
            continue;
        }

        for &i in &group.members {
            // Placed by a resolution still being written.
            if records[i].tie_breaker_status == TieBreakerStatus::Resolved {
                continue;
            }
            records[i].final_rank = Some(group.base_rank);
            records[i].points_earned = Some(points(group.base_rank, class, field_size));
        }

        let untouched = group
            .members
            .iter()
            .all(|&i| records[i].tie_breaker_status == TieBreakerStatus::Untouched);
        if group.members.len() > 1 && group.base_rank <= PODIUM_MAX_RANK && untouched {
            pending_ties.push(TieGroup {
                total_score: group.total,
                base_rank: group.base_rank,
                members: group
                    .members
                    .iter()
                    .map(|&i| records[i].competitor_id.clone())
                    .collect(),
            });
        }
    }

    let changed: Vec<String> = records
        .iter()
        .zip(&before)
        .filter(|(rec, was)| mark_of(rec) != **was)
        .map(|(rec, _)| rec.competitor_id.clone())
        .collect();

    records.sort_by(|a, b| {
        a.final_rank
            .cmp(&b.final_rank)
            .then_with(|| a.competitor_id.cmp(&b.competitor_id))
    });

    Reconciliation {
        records,
        changed,
        pending_ties,
        reverted,
        field_size,
    }
}

/// Class of the tournament that owns `tournament_id`.
///
/// A missing tournament is `NotFound`; unrecognised class text falls back
/// to class A.
pub async fn tournament_class<S>(
    store: &S,
    tournament_id: &TournamentId,
) -> Result<TournamentClass>
where
    S: TournamentStore + ?Sized,
{
    let tournament = store
        .get_tournament(tournament_id.as_str())
        .await?
        .ok_or_else(|| ScoringError::not_found(format!("tournament {tournament_id}"), 1))?;
    Ok(TournamentClass::parse_lenient(&tournament.class))
}

/// Keep only the newest view of each competitor, preferring `fresh`.
pub(crate) fn merge_fresh(mut listed: Vec<ScoreRecord>, fresh: &[ScoreRecord]) -> Vec<ScoreRecord> {
    listed.retain(|r| !fresh.iter().any(|f| f.competitor_id == r.competitor_id));
    listed.extend(fresh.iter().cloned());
    listed
}

/// Result of recomputing one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecomputeOutcome {
    pub event_id: EventId,
    pub class: TournamentClass,
    pub field_size: usize,
    /// Rows written back.
    pub updated: usize,
    pub pending_ties: Vec<TieGroup>,
    pub reverted: Vec<Vec<String>>,
    /// Every row, ordered by final rank then competitor id.
    pub records: Vec<ScoreRecord>,
}

/// List the event's rows, reconcile them and write back every changed row.
///
/// `fresh` holds rows the caller has just written; they stand in for
/// whatever the listing shows for the same competitors.
pub(crate) async fn refresh_event<S>(
    store: &S,
    policy: &RetryPolicy,
    observer: &dyn ScoringObserver,
    event_id: &EventId,
    class: TournamentClass,
    fresh: &[ScoreRecord],
) -> Result<RecomputeOutcome>
where
    S: ScoreStore + ?Sized,
{
    let listed = retry(
        &format!("scores for event {event_id}"),
        policy,
        Exhaustion::Soft,
        observer,
        || store.list_scores(event_id.as_str()),
    )
    .await?;

    let outcome = reconcile(merge_fresh(listed.value, fresh), class);
    let mut updated = 0;
    for record in outcome.changed_records() {
        store.update_score(record).await?;
        updated += 1;
    }

    for members in &outcome.reverted {
        observer.tie_marks_reverted(event_id.as_str(), members);
    }
    for tie in &outcome.pending_ties {
        observer.podium_tie_detected(event_id.as_str(), tie.base_rank, &tie.members);
    }
    observer.ranking_recomputed(event_id.as_str(), outcome.field_size, updated);

    Ok(RecomputeOutcome {
        event_id: event_id.clone(),
        class,
        field_size: outcome.field_size,
        updated,
        pending_ties: outcome.pending_ties,
        reverted: outcome.reverted,
        records: outcome.records,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(id: &str, total: f64) -> ScoreRecord {
        let third = total / 3.0;
        let mut r = ScoreRecord::new("evt", id, [third, third, third]);
        r.total_score = total;
        r
    }

    fn marked(
        id: &str,
        total: f64,
        status: TieBreakerStatus,
        final_rank: Option<u32>,
    ) -> ScoreRecord {
        let mut r = rec(id, total);
        r.tie_breaker_status = status;
        r.tie_group_total = Some(total);
        r.final_rank = final_rank;
        r
    }

    fn ranks(out: &Reconciliation) -> Vec<(&str, u32, u32)> {
        out.records
            .iter()
            .map(|r| {
                (
                    r.competitor_id.as_str(),
                    r.final_rank.unwrap_or(0),
                    r.points_earned.unwrap_or(0),
                )
            })
            .collect()
    }

    #[test]
    fn class_a_shared_rank_payout() {
        let out = reconcile(
            vec![rec("alice", 27.0), rec("bob", 27.0), rec("carol", 24.0)],
            TournamentClass::A,
        );
        assert_eq!(
            ranks(&out),
            vec![("alice", 1, 8), ("bob", 1, 8), ("carol", 3, 2)]
        );
        assert_eq!(out.pending_ties.len(), 1);
        assert_eq!(out.pending_ties[0].members, vec!["alice", "bob"]);
        assert_eq!(out.changed.len(), 3);
    }

    #[test]
    fn empty_event() {
        let out = reconcile(Vec::new(), TournamentClass::AAA);
        assert!(out.records.is_empty());
        assert_eq!(out.field_size, 0);
    }

    #[test]
    fn second_pass_changes_nothing() {
        let first = reconcile(
            vec![rec("a", 20.0), rec("b", 18.0), rec("c", 18.0)],
            TournamentClass::B,
        );
        let second = reconcile(first.records.clone(), TournamentClass::B);
        assert!(second.changed.is_empty());
        assert_eq!(second.records, first.records);
    }

    #[test]
    fn resolved_group_keeps_order_and_rebases() {
        // zed was placed ahead of amy by tie-break; a newcomer then outscores both.
        let rows = vec![
            marked("amy", 25.0, TieBreakerStatus::Resolved, Some(2)),
            marked("zed", 25.0, TieBreakerStatus::Resolved, Some(1)),
            rec("top", 29.0),
        ];
        let out = reconcile(rows, TournamentClass::AA);
        assert_eq!(
            ranks(&out),
            vec![("top", 1, 15), ("zed", 2, 10), ("amy", 3, 8)]
        );
        assert!(out.reverted.is_empty());
        assert!(out.pending_ties.is_empty());
    }

    #[test]
    fn newcomer_joining_total_reverts_group() {
        let rows = vec![
            marked("amy", 25.0, TieBreakerStatus::Resolved, Some(2)),
            marked("zed", 25.0, TieBreakerStatus::Resolved, Some(1)),
            rec("new", 25.0),
        ];
        let out = reconcile(rows, TournamentClass::A);
        assert_eq!(out.reverted, vec![vec!["amy".to_string(), "zed".to_string()]]);
        assert!(out
            .records
            .iter()
            .all(|r| r.final_rank == Some(1)
                && r.tie_breaker_status == TieBreakerStatus::Untouched));
        assert_eq!(out.pending_ties[0].size(), 3);
    }

    #[test]
    fn member_score_change_reverts_group() {
        // zed's total moved off 25 and the mark was dropped on write; amy
        // still carries the old mark alone.
        let mut zed = rec("zed", 25.0);
        zed.final_rank = Some(1);
        zed.tie_group_total = Some(25.0);
        zed.set_judge_scores([9.0, 9.0, 8.0]);
        let rows = vec![marked("amy", 25.0, TieBreakerStatus::Resolved, Some(2)), zed];
        let out = reconcile(rows, TournamentClass::A);
        assert_eq!(out.reverted, vec![vec!["amy".to_string()]]);
        assert_eq!(ranks(&out), vec![("zed", 1, 8), ("amy", 2, 5)]);
        assert!(out.records.iter().all(|r| r.tie_group_total.is_none()));
    }

    #[test]
    fn departure_reverts_the_members_left_behind() {
        // A three-way group loses one member; the other two still share the
        // total but the order chosen for three no longer applies.
        let mut ann = rec("ann", 26.0);
        ann.tie_group_total = Some(26.0);
        ann.set_judge_scores([9.0, 8.0, 8.0]);
        let rows = vec![
            ann,
            marked("ben", 26.0, TieBreakerStatus::Resolved, Some(2)),
            marked("cat", 26.0, TieBreakerStatus::Resolved, Some(1)),
        ];
        let out = reconcile(rows, TournamentClass::A);
        assert_eq!(out.reverted, vec![vec!["ben".to_string(), "cat".to_string()]]);
        assert_eq!(
            ranks(&out),
            vec![("ben", 1, 8), ("cat", 1, 8), ("ann", 3, 2)]
        );
        assert_eq!(out.pending_ties.len(), 1);
        assert_eq!(out.changed.len(), 3);
    }

    #[test]
    fn awaiting_group_off_podium_is_cleared() {
        let rows = vec![
            rec("p1", 30.0),
            rec("p2", 29.0),
            rec("p3", 28.0),
            marked("x", 20.0, TieBreakerStatus::AwaitingSelection, Some(3)),
            marked("y", 20.0, TieBreakerStatus::AwaitingSelection, Some(3)),
        ];
        let out = reconcile(rows, TournamentClass::AAA);
        assert_eq!(out.reverted.len(), 1);
        assert!(out.pending_ties.is_empty());
        assert_eq!(ranks(&out)[3], ("x", 4, 0));
    }

    #[test]
    fn awaiting_group_keeps_shared_rank_and_is_not_pending() {
        let rows = vec![
            marked("dan", 15.0, TieBreakerStatus::AwaitingSelection, None),
            marked("eve", 15.0, TieBreakerStatus::AwaitingSelection, None),
            rec("fay", 12.0),
        ];
        let out = reconcile(rows, TournamentClass::C);
        assert_eq!(
            ranks(&out),
            vec![("dan", 1, 1), ("eve", 1, 1), ("fay", 3, 0)]
        );
        assert!(out.pending_ties.is_empty());
        assert!(out.reverted.is_empty());
    }

    fn status_of(out: &Reconciliation, id: &str) -> TieBreakerStatus {
        out.records
            .iter()
            .find(|r| r.competitor_id == id)
            .map(|r| r.tie_breaker_status)
            .unwrap()
    }

    #[test]
    fn resolution_written_halfway_is_kept() {
        // The tie-break has written cat in second place and not yet ann or ben.
        let mut cat = marked("cat", 26.0, TieBreakerStatus::Resolved, Some(2));
        cat.points_earned = Some(15);
        let rows = vec![
            marked("ann", 26.0, TieBreakerStatus::AwaitingSelection, Some(1)),
            marked("ben", 26.0, TieBreakerStatus::AwaitingSelection, Some(1)),
            cat,
            rec("dee", 20.0),
        ];
        let out = reconcile(rows, TournamentClass::AAA);
        assert!(out.reverted.is_empty());
        assert!(out.pending_ties.is_empty());
        assert_eq!(
            ranks(&out),
            vec![("ann", 1, 20), ("ben", 1, 20), ("cat", 2, 15), ("dee", 4, 0)]
        );
        assert_eq!(status_of(&out, "cat"), TieBreakerStatus::Resolved);

        // The remaining writes land; the chosen order survives the next pass.
        let rows = out
            .records
            .into_iter()
            .map(|mut r| {
                let place = match r.competitor_id.as_str() {
                    "ben" => Some(1),
                    "ann" => Some(3),
                    _ => None,
                };
                if let Some(rank) = place {
                    r.final_rank = Some(rank);
                    r.tie_breaker_status = TieBreakerStatus::Resolved;
                }
                r
            })
            .collect();
        let out = reconcile(rows, TournamentClass::AAA);
        assert!(out.reverted.is_empty());
        assert_eq!(
            ranks(&out),
            vec![("ben", 1, 20), ("cat", 2, 15), ("ann", 3, 10), ("dee", 4, 0)]
        );
    }

    #[test]
    fn selection_opened_halfway_is_kept() {
        let mut ben = rec("ben", 26.0);
        ben.final_rank = Some(1);
        let rows = vec![
            marked("ann", 26.0, TieBreakerStatus::AwaitingSelection, Some(1)),
            ben,
            rec("dee", 20.0),
        ];
        let out = reconcile(rows, TournamentClass::A);
        assert!(out.reverted.is_empty());
        assert!(out.pending_ties.is_empty());
        assert_eq!(status_of(&out, "ann"), TieBreakerStatus::AwaitingSelection);
        assert_eq!(ranks(&out), vec![("ann", 1, 8), ("ben", 1, 8), ("dee", 3, 2)]);
    }

    #[test]
    fn newcomer_beside_an_awaiting_group_reverts_it() {
        let mut ben = rec("ben", 26.0);
        ben.final_rank = Some(1);
        let rows = vec![
            marked("ann", 26.0, TieBreakerStatus::AwaitingSelection, Some(1)),
            ben,
            rec("new", 26.0),
        ];
        let out = reconcile(rows, TournamentClass::A);
        assert_eq!(out.reverted, vec![vec!["ann".to_string()]]);
        assert_eq!(out.pending_ties[0].size(), 3);
    }

    #[test]
    fn resolved_row_beside_unmarked_rows_reverts() {
        let mut b = rec("b", 10.0);
        b.final_rank = Some(1);
        let rows = vec![marked("a", 10.0, TieBreakerStatus::Resolved, Some(2)), b];
        let out = reconcile(rows, TournamentClass::A);
        assert_eq!(out.reverted, vec![vec!["a".to_string()]]);
        assert_eq!(out.pending_ties.len(), 1);
    }

    #[test]
    fn merge_fresh_replaces_stale_view() {
        let stale = rec("a", 10.0);
        let fresh = rec("a", 12.0);
        let merged = merge_fresh(vec![stale, rec("b", 9.0)], &[fresh]);
        assert_eq!(merged.len(), 2);
        assert!(merged
            .iter()
            .any(|r| r.competitor_id == "a" && r.total_score == 12.0));
    }
}
