//! Shared fixtures for podium-core integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use podium_core::{
    CategoryType, CompetitorId, CoreConfig, JudgeScores, ScoringObserver, ScoringService,
    TournamentId,
};
use podium_state::fakes::MemoryStore;
use podium_state::{TournamentRecord, TournamentStore};

/// Observer that keeps every hook call as a short string.
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<String>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.events()
            .iter()
            .filter(|e| e.starts_with(prefix))
            .count()
    }

    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

impl ScoringObserver for RecordingObserver {
    fn retry_attempt(&self, what: &str, attempt: u32, _delay_ms: u64) {
        self.push(format!("retry_attempt:{what}:{attempt}"));
    }

    fn retry_exhausted(&self, what: &str, attempts: u32, hard: bool) {
        self.push(format!("retry_exhausted:{what}:{attempts}:{hard}"));
    }

    fn event_resolved(&self, key: &str, event_id: &str, created: bool) {
        self.push(format!("event_resolved:{key}:{event_id}:{created}"));
    }

    fn insert_conflict(&self, table: &str, key: &str) {
        self.push(format!("insert_conflict:{table}:{key}"));
    }

    fn duplicate_state(&self, key: &str, count: usize) {
        self.push(format!("duplicate_state:{key}:{count}"));
    }

    fn podium_tie_detected(&self, _event_id: &str, base_rank: u32, members: &[String]) {
        self.push(format!("podium_tie:{base_rank}:{}", members.join(",")));
    }

    fn tie_marks_reverted(&self, _event_id: &str, members: &[String]) {
        self.push(format!("tie_reverted:{}", members.join(",")));
    }

    fn tie_resolution_started(&self, _event_id: &str, base_rank: u32, members: &[String]) {
        self.push(format!("tie_awaiting:{base_rank}:{}", members.join(",")));
    }

    fn tie_resolved(&self, _event_id: &str, base_rank: u32, order: &[String]) {
        self.push(format!("tie_resolved:{base_rank}:{}", order.join(",")));
    }
}

pub fn tid(raw: &str) -> TournamentId {
    TournamentId::new(raw).unwrap()
}

pub fn cat(raw: &str) -> CategoryType {
    CategoryType::new(raw).unwrap()
}

pub fn comp(raw: &str) -> CompetitorId {
    CompetitorId::new(raw).unwrap()
}

/// Three equal judge scores summing to `total`.
pub fn scores(total: f64) -> JudgeScores {
    let each = total / 3.0;
    JudgeScores::new(each, each, each).unwrap()
}

pub async fn seed_tournament(store: &MemoryStore, id: &str, class: &str) {
    store
        .put_tournament(TournamentRecord {
            tournament_id: id.into(),
            name: format!("{id} open"),
            class: class.into(),
        })
        .await
        .unwrap();
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub observer: Arc<RecordingObserver>,
    pub service: ScoringService<MemoryStore>,
}

pub async fn harness(store: MemoryStore, class: &str) -> Harness {
    seed_tournament(&store, "t-1", class).await;
    let store = Arc::new(store);
    let observer = Arc::new(RecordingObserver::default());
    let service =
        ScoringService::with_observer(Arc::clone(&store), CoreConfig::default(), observer.clone());
    Harness {
        store,
        observer,
        service,
    }
}
