//! The UNIQUE (tournament_id, category_type) index is the single source of
//! truth for event identity. These tests pin its behavior in SurrealDB.

use podium_state::{EventStore, NewEvent, SurrealScoreStore};

#[tokio::test]
async fn test_duplicate_event_insert_fails() {
    let store = SurrealScoreStore::in_memory().await.unwrap();

    store
        .insert_event(NewEvent::new("t-1", "kata", "First"))
        .await
        .unwrap();

    let result = store
        .insert_event(NewEvent::new("t-1", "kata", "Second"))
        .await;

    assert!(
        matches!(&result, Err(e) if e.is_unique_violation()),
        "Second insert for the same key should fail on the UNIQUE index. Got: {:?}",
        result
    );
}

#[tokio::test]
async fn test_upsert_is_idempotent() {
    let store = SurrealScoreStore::in_memory().await.unwrap();
    assert!(store.supports_atomic_upsert());

    let first = store
        .upsert_event(NewEvent::new("t-1", "kata", "Kata"))
        .await
        .unwrap();
    let second = store
        .upsert_event(NewEvent::new("t-1", "kata", "Kata"))
        .await
        .unwrap();

    assert!(first.created);
    assert!(!second.created);
    assert_eq!(first.rows.len(), 1);
    assert_eq!(second.rows.len(), 1);
    assert_eq!(first.rows[0].event_id, second.rows[0].event_id);
}

#[tokio::test]
async fn test_upsert_sees_row_created_by_plain_insert() {
    let store = SurrealScoreStore::in_memory().await.unwrap();

    let created = store
        .insert_event(NewEvent::new("t-1", "kata", "Kata"))
        .await
        .unwrap();
    let upsert = store
        .upsert_event(NewEvent::new("t-1", "kata", "Kata"))
        .await
        .unwrap();

    assert!(!upsert.created);
    assert_eq!(upsert.rows.len(), 1);
    assert_eq!(upsert.rows[0].event_id, created.event_id);
}

#[tokio::test]
async fn test_concurrent_upserts_leave_one_row() {
    let store = SurrealScoreStore::in_memory().await.unwrap();

    let calls = (0..8).map(|_| {
        let store = store.clone();
        async move {
            store
                .upsert_event(NewEvent::new("t-9", "sparring", "Sparring"))
                .await
        }
    });
    let results = futures::future::join_all(calls).await;

    let upserts: Vec<_> = results.into_iter().map(|r| r.unwrap()).collect();
    assert_eq!(upserts.iter().filter(|u| u.created).count(), 1);
    let ids: Vec<String> = upserts
        .iter()
        .map(|u| {
            assert_eq!(u.rows.len(), 1);
            u.rows[0].event_id.clone()
        })
        .collect();
    assert!(ids.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(store.find_events("t-9", "sparring").await.unwrap().len(), 1);
}
