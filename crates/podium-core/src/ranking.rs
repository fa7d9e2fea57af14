//! Standard competition ranking ("1224") over score totals.
//!
//! Pure and order-independent: records are sorted by total descending, then
//! by competitor id ascending, so the same set of records always produces the
//! same output regardless of how it was read from the store. The ranking
//! never looks at tie-break state; overriding a podium tie is the job of
//! [`crate::tie_breaker`].

use std::cmp::Ordering;

use podium_state::ScoreRecord;
use serde::{Deserialize, Serialize};

use crate::points::PODIUM_MAX_RANK;

/// Anything that can be ranked.
pub trait Scored {
    fn competitor_id(&self) -> &str;

    /// `None` is treated as a total of 0.
    fn total_score(&self) -> Option<f64>;
}

impl Scored for ScoreRecord {
    fn competitor_id(&self) -> &str {
        &self.competitor_id
    }

    fn total_score(&self) -> Option<f64> {
        Some(self.total_score)
    }
}

impl<T: Scored + ?Sized> Scored for &T {
    fn competitor_id(&self) -> &str {
        (**self).competitor_id()
    }

    fn total_score(&self) -> Option<f64> {
        (**self).total_score()
    }
}

/// Minimal rankable input, for callers that only have totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreEntry {
    pub competitor_id: String,
    pub total_score: Option<f64>,
}

impl ScoreEntry {
    pub fn new(competitor_id: impl Into<String>, total_score: Option<f64>) -> Self {
        Self {
            competitor_id: competitor_id.into(),
            total_score,
        }
    }
}

impl Scored for ScoreEntry {
    fn competitor_id(&self) -> &str {
        &self.competitor_id
    }

    fn total_score(&self) -> Option<f64> {
        self.total_score
    }
}

/// A record annotated with its competition rank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedRecord<T> {
    pub record: T,
    pub rank: u32,
    /// True when at least one other record shares this total.
    pub is_tied: bool,
}

/// Total used for ordering. Missing and non-finite totals rank as 0, and
/// `-0.0` is folded into `0.0` so it groups with it.
pub(crate) fn effective_total<T: Scored>(record: &T) -> f64 {
    match record.total_score() {
        Some(t) if t.is_finite() && t != 0.0 => t,
        _ => 0.0,
    }
}

fn ranking_order<T: Scored>(a: &T, b: &T) -> Ordering {
    effective_total(b)
        .total_cmp(&effective_total(a))
        .then_with(|| a.competitor_id().cmp(b.competitor_id()))
}

/// Rank records. Empty input yields empty output.
pub fn rank<T, I>(records: I) -> Vec<RankedRecord<T>>
where
    T: Scored,
    I: IntoIterator<Item = T>,
{
    let mut sorted: Vec<T> = records.into_iter().collect();
    sorted.sort_by(ranking_order);

    let totals: Vec<f64> = sorted.iter().map(effective_total).collect();
    let mut ranked = Vec::with_capacity(sorted.len());
    let mut group_start = 0usize;

    for (i, record) in sorted.into_iter().enumerate() {
        if totals[i] != totals[group_start] {
            group_start = i;
        }
        let tied_before = i > group_start;
        let tied_after = totals.get(i + 1) == Some(&totals[i]);
        ranked.push(RankedRecord {
            record,
            rank: group_start as u32 + 1,
            is_tied: tied_before || tied_after,
        });
    }
    ranked
}

/// A maximal set of records sharing one total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TieGroup {
    pub total_score: f64,
    /// Shared rank of every member before any tie-break.
    pub base_rank: u32,
    /// Competitor ids in secondary-key order.
    pub members: Vec<String>,
}

impl TieGroup {
    pub fn size(&self) -> usize {
        self.members.len()
    }

    pub fn is_podium(&self) -> bool {
        self.base_rank >= 1 && self.base_rank <= PODIUM_MAX_RANK
    }

    pub fn contains(&self, competitor_id: &str) -> bool {
        self.members.iter().any(|m| m == competitor_id)
    }
}

/// Tie groups (size > 1) in rank order.
pub fn tie_groups<T: Scored>(ranked: &[RankedRecord<T>]) -> Vec<TieGroup> {
    let mut groups: Vec<TieGroup> = Vec::new();
    for entry in ranked.iter().filter(|r| r.is_tied) {
        let member = entry.record.competitor_id().to_string();
        if let Some(group) = groups.last_mut().filter(|g| g.base_rank == entry.rank) {
            group.members.push(member);
            continue;
        }
        groups.push(TieGroup {
            total_score: effective_total(&entry.record),
            base_rank: entry.rank,
            members: vec![member],
        });
    }
    groups
}

/// Tie groups whose shared rank is on the podium.
pub fn podium_ties<T: Scored>(ranked: &[RankedRecord<T>]) -> Vec<TieGroup> {
    tie_groups(ranked)
        .into_iter()
        .filter(TieGroup::is_podium)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(rows: &[(&str, f64)]) -> Vec<ScoreEntry> {
        rows.iter()
            .map(|(id, total)| ScoreEntry::new(*id, Some(*total)))
            .collect()
    }

    fn summary(ranked: &[RankedRecord<ScoreEntry>]) -> Vec<(String, u32, bool)> {
        ranked
            .iter()
            .map(|r| (r.record.competitor_id.clone(), r.rank, r.is_tied))
            .collect()
    }

    #[test]
    fn empty_input() {
        let ranked = rank(Vec::<ScoreEntry>::new());
        assert!(ranked.is_empty());
        assert!(tie_groups(&ranked).is_empty());
    }

    #[test]
    fn standard_competition_ranking() {
        let ranked = rank(entries(&[
            ("alice", 27.0),
            ("bob", 27.0),
            ("carol", 24.0),
            ("dave", 20.0),
        ]));
        assert_eq!(
            summary(&ranked),
            vec![
                ("alice".into(), 1, true),
                ("bob".into(), 1, true),
                ("carol".into(), 3, false),
                ("dave".into(), 4, false),
            ]
        );
    }

    #[test]
    fn group_of_k_at_rank_r_is_followed_by_r_plus_k() {
        let ranked = rank(entries(&[
            ("a", 30.0),
            ("b", 28.0),
            ("c", 28.0),
            ("d", 28.0),
            ("e", 25.0),
        ]));
        let ranks: Vec<u32> = ranked.iter().map(|r| r.rank).collect();
        assert_eq!(ranks, vec![1, 2, 2, 2, 5]);
    }

    #[test]
    fn ranks_never_decrease_as_totals_decrease() {
        let ranked = rank(entries(&[
            ("q", 3.0),
            ("w", 9.5),
            ("e", 9.5),
            ("r", 0.0),
            ("t", 12.25),
            ("y", 3.0),
            ("u", 3.0),
        ]));
        for pair in ranked.windows(2) {
            let (hi, lo) = (&pair[0], &pair[1]);
            assert!(hi.record.total_score >= lo.record.total_score);
            assert!(hi.rank <= lo.rank);
            if hi.record.total_score == lo.record.total_score {
                assert_eq!(hi.rank, lo.rank);
            }
        }
    }

    #[test]
    fn output_is_independent_of_input_order() {
        let rows = [("m", 10.0), ("z", 12.0), ("a", 10.0), ("k", 8.0)];
        let forward = summary(&rank(entries(&rows)));
        let mut reversed_rows = rows;
        reversed_rows.reverse();
        let backward = summary(&rank(entries(&reversed_rows)));
        assert_eq!(forward, backward);
        assert_eq!(forward[1].0, "a");
        assert_eq!(forward[2].0, "m");
    }

    #[test]
    fn missing_and_non_finite_totals_rank_as_zero() {
        let ranked = rank(vec![
            ScoreEntry::new("b", None),
            ScoreEntry::new("a", Some(f64::NAN)),
            ScoreEntry::new("c", Some(-0.0)),
            ScoreEntry::new("d", Some(1.0)),
        ]);
        assert_eq!(
            summary(&ranked),
            vec![
                ("d".into(), 1, false),
                ("a".into(), 2, true),
                ("b".into(), 2, true),
                ("c".into(), 2, true),
            ]
        );
    }

    #[test]
    fn tie_groups_and_podium_filter() {
        let ranked = rank(entries(&[
            ("a", 9.0),
            ("b", 9.0),
            ("c", 8.0),
            ("d", 7.0),
            ("e", 7.0),
            ("f", 7.0),
        ]));
        let groups = tie_groups(&ranked);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].base_rank, 1);
        assert_eq!(groups[0].members, vec!["a", "b"]);
        assert_eq!(groups[1].base_rank, 4);
        assert_eq!(groups[1].size(), 3);
        assert!(groups[1].contains("e"));

        let podium = podium_ties(&ranked);
        assert_eq!(podium, vec![groups[0].clone()]);
    }

    #[test]
    fn ranks_score_records_by_reference() {
        let records = vec![
            ScoreRecord::new("evt", "c-2", [9.0, 9.0, 9.0]),
            ScoreRecord::new("evt", "c-1", [9.0, 9.0, 9.0]),
        ];
        let ranked = rank(records.iter());
        assert_eq!(ranked[0].record.competitor_id, "c-1");
        assert!(ranked.iter().all(|r| r.rank == 1 && r.is_tied));
    }
}
