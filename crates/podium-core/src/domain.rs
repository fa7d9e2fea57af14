//! Validated identifiers and value types shared by the scoring core.
//!
//! Raw strings from callers are checked once at the edge; everything past
//! this module works with the newtypes below.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use podium_state::EventRecord;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

pub const MIN_JUDGE_SCORE: f64 = 0.0;
pub const MAX_JUDGE_SCORE: f64 = 10.0;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl TryFrom<String> for $name {
            type Error = ValidationError;

            fn try_from(raw: String) -> Result<Self, Self::Error> {
                Self::new(raw)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> String {
                id.0
            }
        }

        impl $name {
            /// Trims surrounding whitespace; rejects empty input.
            pub fn new(raw: impl AsRef<str>) -> Result<Self, ValidationError> {
                let trimmed = raw.as_ref().trim();
                if trimmed.is_empty() {
                    return Err(ValidationError::EmptyId { kind: $kind });
                }
                Ok(Self(trimmed.to_string()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Owning tournament of an event.
    TournamentId,
    "tournament id"
);
string_id!(
    /// Competition category inside a tournament, e.g. `kata` or `weapons`.
    CategoryType,
    "category type"
);
string_id!(
    /// Tournament-scoped competitor identity. Also the secondary ranking key.
    CompetitorId,
    "competitor id"
);

/// How a competitor entered the roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Registered,
    WalkIn,
    Imported,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::Registered => "registered",
            Provenance::WalkIn => "walk_in",
            Provenance::Imported => "imported",
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provenance {
    type Err = ValidationError;

    /// Case-insensitive; `walk-in`, `walk_in` and `walkin` all name a walk-in.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "registered" => Ok(Provenance::Registered),
            "walk_in" | "walkin" => Ok(Provenance::WalkIn),
            "imported" => Ok(Provenance::Imported),
            _ => Err(ValidationError::UnknownProvenance(s.to_string())),
        }
    }
}

/// A roster entry. Owned by the roster layer; the core only reads the id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Competitor {
    pub id: CompetitorId,
    pub display_name: String,
    pub provenance: Provenance,
}

/// Canonical (lower-case, hyphenated) UUID identifying an event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    /// Accepts only the 36-character hyphenated UUID form.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let raw = raw.trim();
        if raw.len() != 36 {
            return Err(ValidationError::MalformedEventId(raw.to_string()));
        }
        uuid::Uuid::try_parse(raw)
            .map(|u| Self(u.hyphenated().to_string()))
            .map_err(|_| ValidationError::MalformedEventId(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Three judge scores, each finite and within the judging scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JudgeScores {
    a: f64,
    b: f64,
    c: f64,
}

impl JudgeScores {
    pub fn new(a: f64, b: f64, c: f64) -> Result<Self, ValidationError> {
        for (judge, value) in [('A', a), ('B', b), ('C', c)] {
            if !value.is_finite() || !(MIN_JUDGE_SCORE..=MAX_JUDGE_SCORE).contains(&value) {
                return Err(ValidationError::ScoreOutOfRange {
                    judge,
                    value,
                    min: MIN_JUDGE_SCORE,
                    max: MAX_JUDGE_SCORE,
                });
            }
        }
        Ok(Self { a, b, c })
    }

    pub fn as_array(&self) -> [f64; 3] {
        [self.a, self.b, self.c]
    }

    pub fn total(&self) -> f64 {
        podium_state::ScoreRecord::total_of(self.as_array())
    }
}

/// A fully consistent event: id validated, owner and category present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub tournament_id: TournamentId,
    pub category_type: CategoryType,
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Event {
    /// `None` when the row has not settled (missing owner or category) or
    /// carries a malformed id.
    pub fn from_record(record: &EventRecord) -> Option<Self> {
        let id = EventId::parse(&record.event_id).ok()?;
        let tournament_id = TournamentId::new(record.tournament_id.as_deref()?).ok()?;
        let category_type = CategoryType::new(record.category_type.as_deref()?).ok()?;
        Some(Self {
            id,
            tournament_id,
            category_type,
            name: record.name.clone(),
            created_at: record.created_at,
        })
    }
}
