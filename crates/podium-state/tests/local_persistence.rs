//! File-backed (`surrealkv://`) persistence, and re-running the migrations
//! against a populated database is harmless.

use podium_state::connection::connect_url;
use podium_state::migrations::init_schema;
use podium_state::{EventStore, NewEvent, SurrealScoreStore};

#[tokio::test]
async fn migrations_rerun_on_populated_file_database() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("surrealkv://{}", dir.path().join("db").display());

    let db = connect_url(&url).await.unwrap();
    let store = SurrealScoreStore::new(db.clone());

    let created = store
        .insert_event(NewEvent::new("t-1", "kata", "Kata"))
        .await
        .unwrap();

    init_schema(&db).await.unwrap();

    let found = store.find_events("t-1", "kata").await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].event_id, created.event_id);

    // The identity index is still in force after the second migration run.
    let err = store
        .insert_event(NewEvent::new("t-1", "kata", "Kata"))
        .await
        .unwrap_err();
    assert!(err.is_unique_violation());
}
