//! Seasonal points lookup.
//!
//! Pure: `(rank, class, field size) -> points`. Only the podium pays.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Highest rank that earns points.
pub const PODIUM_MAX_RANK: u32 = 3;

/// Tournament sanctioning class. Decides the payout table.
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TournamentClass {
    AAA,
    AA,
    A,
    B,
    C,
}

impl TournamentClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            TournamentClass::AAA => "AAA",
            TournamentClass::AA => "AA",
            TournamentClass::A => "A",
            TournamentClass::B => "B",
            TournamentClass::C => "C",
        }
    }

    /// Parse stored class text, falling back to class A for anything
    /// unrecognised.
    pub fn parse_lenient(raw: &str) -> Self {
        raw.parse().unwrap_or_else(|_| {
            warn!(event = "points.unknown_class", class = %raw, fallback = "A");
            TournamentClass::A
        })
    }

    /// Payouts for ranks 1..=3 given the number of competitors.
    fn payouts(&self, field_size: usize) -> [u32; 3] {
        match self {
            TournamentClass::AAA => [20, 15, 10],
            TournamentClass::AA => [15, 10, 8],
            TournamentClass::A => [8, 5, 2],
            TournamentClass::B => [5, 3, 1],
            TournamentClass::C => match field_size {
                0..=2 => [0, 0, 0],
                3 => [1, 0, 0],
                _ => [2, 1, 0],
            },
        }
    }
}

impl fmt::Display for TournamentClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown tournament class: {0:?}")]
pub struct UnknownClass(pub String);

impl FromStr for TournamentClass {
    type Err = UnknownClass;

    /// Case-insensitive, surrounding whitespace ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "AAA" => Ok(TournamentClass::AAA),
            "AA" => Ok(TournamentClass::AA),
            "A" => Ok(TournamentClass::A),
            "B" => Ok(TournamentClass::B),
            "C" => Ok(TournamentClass::C),
            _ => Err(UnknownClass(s.to_string())),
        }
    }
}

/// Points for a final rank.
///
/// Rank 0 or an empty field earns nothing, as does any rank past the podium.
/// Tied competitors each pass their shared rank here, so every member of a
/// tie group is paid that rank's payout.
pub fn points(rank: u32, class: TournamentClass, field_size: usize) -> u32 {
    if rank == 0 || field_size == 0 || rank > PODIUM_MAX_RANK {
        return 0;
    }
    class.payouts(field_size)[(rank - 1) as usize]
}
