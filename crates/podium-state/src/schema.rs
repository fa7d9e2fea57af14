//! Schema definitions for Podium SurrealDB tables
//!
//! Tables:
//! - events: one row per (tournament, category)
//! - participants: one row per (event, competitor)
//! - scores: one row per (event, competitor)
//! - tournaments: owning tournament and its class
//!
//! Rows carry the SurrealDB record id; conversion to the backend-agnostic
//! `storage_traits` types happens at the boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage_traits::{
    EventRecord, NewEvent, ParticipantRecord, ScoreRecord, TieBreakerStatus, TournamentRecord,
};

/// Module for serializing chrono DateTime to SurrealDB datetime format
mod surreal_datetime {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let sd = SurrealDatetime::from(*date);
        serde::Serialize::serialize(&sd, serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = SurrealDatetime::deserialize(deserializer)?;
        Ok(DateTime::from(sd))
    }
}

/// Event row stored in SurrealDB
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRow {
    /// SurrealDB record ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    /// Event id (UUID string, asserted by the schema)
    pub event_id: String,
    /// Owning tournament
    pub tournament_id: Option<String>,
    /// Category within the tournament
    pub category_type: Option<String>,
    /// Display name
    pub name: Option<String>,
    /// Created timestamp
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
}

impl EventRow {
    /// Build a fresh row with a new v4 event id.
    pub fn new(event: NewEvent) -> Self {
        EventRow {
            id: None,
            event_id: uuid::Uuid::new_v4().to_string(),
            tournament_id: Some(event.tournament_id),
            category_type: Some(event.category_type),
            name: Some(event.name),
            created_at: Utc::now(),
        }
    }
}

impl From<EventRow> for EventRecord {
    fn from(row: EventRow) -> Self {
        EventRecord {
            event_id: row.event_id,
            tournament_id: row.tournament_id,
            category_type: row.category_type,
            name: row.name,
            created_at: row.created_at,
        }
    }
}

/// Participant row stored in SurrealDB
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub event_id: String,
    pub competitor_id: String,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
}

impl ParticipantRow {
    pub fn new(event_id: &str, competitor_id: &str) -> Self {
        ParticipantRow {
            id: None,
            event_id: event_id.to_string(),
            competitor_id: competitor_id.to_string(),
            created_at: Utc::now(),
        }
    }
}

impl From<ParticipantRow> for ParticipantRecord {
    fn from(row: ParticipantRow) -> Self {
        ParticipantRecord {
            event_id: row.event_id,
            competitor_id: row.competitor_id,
            created_at: row.created_at,
        }
    }
}

/// Score row stored in SurrealDB
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub score_id: String,
    pub event_id: String,
    pub competitor_id: String,
    pub judge_a_score: f64,
    pub judge_b_score: f64,
    pub judge_c_score: f64,
    pub total_score: f64,
    pub final_rank: Option<u32>,
    pub points_earned: Option<u32>,
    /// "untouched" | "awaiting_selection" | "resolved"
    pub tie_breaker_status: String,
    pub tie_group_total: Option<f64>,
    #[serde(with = "surreal_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl ScoreRow {
    pub fn from_record(record: &ScoreRecord) -> Self {
        ScoreRow {
            id: None,
            score_id: record.score_id.clone(),
            event_id: record.event_id.clone(),
            competitor_id: record.competitor_id.clone(),
            judge_a_score: record.judge_a_score,
            judge_b_score: record.judge_b_score,
            judge_c_score: record.judge_c_score,
            total_score: record.total_score,
            final_rank: record.final_rank,
            points_earned: record.points_earned,
            tie_breaker_status: record.tie_breaker_status.as_str().to_string(),
            tie_group_total: record.tie_group_total,
            updated_at: record.updated_at,
        }
    }

    /// Convert to the trait-level record. Unknown status text is an error
    /// rather than a silent reset.
    pub fn into_record(self) -> Result<ScoreRecord, String> {
        let status = match self.tie_breaker_status.as_str() {
            "untouched" => TieBreakerStatus::Untouched,
            "awaiting_selection" => TieBreakerStatus::AwaitingSelection,
            "resolved" => TieBreakerStatus::Resolved,
            other => return Err(format!("unknown tie breaker status: {other}")),
        };
        Ok(ScoreRecord {
            score_id: self.score_id,
            event_id: self.event_id,
            competitor_id: self.competitor_id,
            judge_a_score: self.judge_a_score,
            judge_b_score: self.judge_b_score,
            judge_c_score: self.judge_c_score,
            total_score: self.total_score,
            final_rank: self.final_rank,
            points_earned: self.points_earned,
            tie_breaker_status: status,
            tie_group_total: self.tie_group_total,
            updated_at: self.updated_at,
        })
    }
}

/// Tournament row stored in SurrealDB
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TournamentRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub tournament_id: String,
    pub name: String,
    pub class: String,
}

impl From<TournamentRecord> for TournamentRow {
    fn from(record: TournamentRecord) -> Self {
        TournamentRow {
            id: None,
            tournament_id: record.tournament_id,
            name: record.name,
            class: record.class,
        }
    }
}

impl From<TournamentRow> for TournamentRecord {
    fn from(row: TournamentRow) -> Self {
        TournamentRecord {
            tournament_id: row.tournament_id,
            name: row.name,
            class: row.class,
        }
    }
}
