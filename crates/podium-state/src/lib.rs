//! Podium-State: SurrealDB Backend for Podium
//!
//! This crate provides the persistence layer for the tournament scoring core.
//! It handles all I/O with SurrealDB behind backend-agnostic storage traits.
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: row-level uniqueness and nothing more. The store offers no
//! transactions spanning event, participant and score writes, and reads may
//! lag behind writes; the scoring core is written against exactly that.
//!
//! ## Key Components
//!
//! - `EventStore` / `ParticipantStore` / `ScoreStore` / `TournamentStore`
//! - `SurrealScoreStore`: SurrealDB implementation with UNIQUE indexes
//! - `fakes::MemoryStore`: in-memory implementation with simulated read lag

pub mod connection;
mod error;
pub mod fakes;
pub mod migrations;
mod schema;
pub mod storage_traits;
pub mod surreal_store;

pub use connection::StoreConfig;
pub use error::{StateError, StorageError};
pub use schema::{EventRow, ParticipantRow, ScoreRow, TournamentRow};
pub use storage_traits::{
    EventRecord, EventStore, EventUpsert, NewEvent, ParticipantRecord, ParticipantStore,
    PodiumStore, ScoreRecord, ScoreStore, StorageResult, TieBreakerStatus, TournamentRecord,
    TournamentStore,
};
pub use surreal_store::SurrealScoreStore;

/// Result type for podium-state setup operations
pub type Result<T> = std::result::Result<T, StateError>;
