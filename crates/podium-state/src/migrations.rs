//! SurrealDB schema migrations and initialization
//!
//! Every uniqueness rule the scoring core depends on lives here as a UNIQUE
//! index; identifiers are asserted to be UUIDs at the field level so that
//! malformed ids cannot be persisted in the first place.

use crate::Result;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

/// Initialize all Podium tables in SurrealDB
///
/// Safe to call multiple times (idempotent).
pub async fn init_schema(db: &Surreal<Any>) -> Result<()> {
    info!("Initializing Podium SurrealDB schema");

    init_events_table(db).await?;
    init_participants_table(db).await?;
    init_scores_table(db).await?;
    init_tournaments_table(db).await?;

    info!("Podium schema initialization complete");
    Ok(())
}

async fn run(db: &Surreal<Any>, sql: &str) -> Result<()> {
    db.query(sql)
        .await
        .and_then(|response| response.check())
        .map_err(|e| crate::StateError::SchemaSetup(e.to_string()))?;
    Ok(())
}

/// Initialize `events` table
///
/// Schema:
/// ```text
/// TABLE events {
///   event_id:       STRING (uuid, unique)
///   tournament_id:  STRING? (part of identity key)
///   category_type:  STRING? (part of identity key)
///   name:           STRING?
///   created_at:     DATETIME
/// }
/// ```
///
/// Constraints:
/// - `(tournament_id, category_type)` is unique: this index decides which
///   concurrent creator wins
/// - `event_id` must be a UUID
async fn init_events_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing events table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS events SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR read FULL
                FOR update FULL
                FOR delete NONE;

        DEFINE FIELD IF NOT EXISTS event_id ON TABLE events TYPE string
            ASSERT string::is::uuid($value);

        DEFINE INDEX IF NOT EXISTS idx_event_id ON TABLE events COLUMNS event_id UNIQUE;

        -- Event identity: exactly one event per (tournament, category)
        DEFINE INDEX IF NOT EXISTS idx_event_identity ON TABLE events
            COLUMNS tournament_id, category_type UNIQUE;
    "#;

    run(db, sql).await?;
    info!("✓ events table initialized");
    Ok(())
}

/// Initialize `participants` table
///
/// Constraints:
/// - `(event_id, competitor_id)` is unique
async fn init_participants_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing participants table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS participants SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR read FULL
                FOR update NONE
                FOR delete NONE;

        DEFINE FIELD IF NOT EXISTS event_id ON TABLE participants TYPE string
            ASSERT string::is::uuid($value);

        DEFINE INDEX IF NOT EXISTS idx_participant_identity ON TABLE participants
            COLUMNS event_id, competitor_id UNIQUE;
    "#;

    run(db, sql).await?;
    info!("✓ participants table initialized");
    Ok(())
}

/// Initialize `scores` table
///
/// Schema:
/// ```text
/// TABLE scores {
///   score_id:            STRING (unique)
///   event_id:            STRING (uuid)
///   competitor_id:       STRING
///   judge_{a,b,c}_score: FLOAT
///   total_score:         FLOAT
///   final_rank:          INT?
///   points_earned:       INT?
///   tie_breaker_status:  STRING (untouched | awaiting_selection | resolved)
///   tie_group_total:     FLOAT?
///   updated_at:          DATETIME
/// }
/// ```
async fn init_scores_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing scores table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS scores SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR read FULL
                FOR update FULL
                FOR delete NONE;

        DEFINE FIELD IF NOT EXISTS event_id ON TABLE scores TYPE string
            ASSERT string::is::uuid($value);

        DEFINE FIELD IF NOT EXISTS tie_breaker_status ON TABLE scores TYPE string
            ASSERT $value IN ["untouched", "awaiting_selection", "resolved"];

        DEFINE INDEX IF NOT EXISTS idx_score_identity ON TABLE scores
            COLUMNS event_id, competitor_id UNIQUE;

        DEFINE INDEX IF NOT EXISTS idx_score_event ON TABLE scores COLUMNS event_id;
    "#;

    run(db, sql).await?;
    info!("✓ scores table initialized");
    Ok(())
}

/// Initialize `tournaments` table
async fn init_tournaments_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing tournaments table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS tournaments SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR read FULL
                FOR update FULL
                FOR delete NONE;

        DEFINE INDEX IF NOT EXISTS idx_tournament_id ON TABLE tournaments
            COLUMNS tournament_id UNIQUE;
    "#;

    run(db, sql).await?;
    info!("✓ tournaments table initialized");
    Ok(())
}
