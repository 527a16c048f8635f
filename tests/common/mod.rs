//! Shared test utilities for all integration test suites.
//!
//! Import via `#[path = "../common/mod.rs"] mod common;` from any test's main.rs.

#![allow(dead_code)]
#![allow(unused_imports)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub use docstore::{
    CommitOutcome, ConflictReason, DocStoreError, DocumentBackend, DocumentId, DocumentStore,
    Payload, RecordChange, Scenario, ScenarioReport, ScenarioRunner, Session, ShardedStore,
    StoreConfig, Version, WorkerOutcome,
};
use serde_json::json;
use tempfile::TempDir;

/// Runs per race scenario; the exclusivity check must hold on every one.
pub const RACE_ITERATIONS: usize = 100;

/// Barrier bound used by tests so a stuck worker fails instead of hanging.
pub const TEST_BARRIER_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Stores
// ============================================================================

/// In-memory config with the test barrier bound.
pub fn memory_config() -> StoreConfig {
    StoreConfig::in_memory().with_barrier_timeout(Some(TEST_BARRIER_TIMEOUT))
}

/// In-memory store holding one document; returns both.
pub fn seeded_store() -> (DocumentStore, DocumentId) {
    let store = DocumentStore::in_memory();
    let id = store
        .insert(json!({"name": "demo"}))
        .expect("seed document");
    (store, id)
}

/// Backend holding one document; returns both.
pub fn seeded_backend() -> (Arc<ShardedStore>, DocumentId) {
    let store = Arc::new(ShardedStore::new());
    let id = DocumentId::new();
    store.insert(id, json!({"name": "demo"})).expect("seed document");
    (store, id)
}

// ============================================================================
// TestDir - persistent store fixture
// ============================================================================

/// Temporary directory for a persistent store.
pub struct TestDir {
    pub dir: TempDir,
}

impl TestDir {
    pub fn new() -> Self {
        TestDir {
            dir: tempfile::tempdir().expect("Failed to create temp dir"),
        }
    }

    /// Directory the store writes its commit log into.
    pub fn data_path(&self) -> PathBuf {
        self.dir.path().join("data")
    }

    /// Commit log location.
    pub fn log_path(&self) -> PathBuf {
        self.data_path().join("commits.log")
    }

    /// Persistent config rooted in this directory.
    pub fn config(&self) -> StoreConfig {
        StoreConfig::persistent(self.data_path()).with_barrier_timeout(Some(TEST_BARRIER_TIMEOUT))
    }

    /// Open (or reopen) the store.
    pub fn open(&self) -> DocumentStore {
        DocumentStore::open(self.config()).expect("Failed to open persistent store")
    }
}

// ============================================================================
// Assertions
// ============================================================================

/// Assert exactly one winner and that every other worker lost with a conflict.
pub fn assert_single_winner(report: &ScenarioReport) {
    if let Err(violation) = report.check_exclusivity() {
        panic!(
            "{}: {} (outcomes: {:?})",
            report.scenario, violation, report.outcomes
        );
    }
    assert_eq!(report.winners(), 1);
    assert_eq!(report.losers(), report.outcomes.len() - 1);
}

/// Run `scenario` `RACE_ITERATIONS` times with `runner`, checking every run.
pub fn race_repeatedly(runner: &ScenarioRunner, scenario: Scenario) {
    for iteration in 0..RACE_ITERATIONS {
        let report = runner
            .run(scenario)
            .unwrap_or_else(|e| panic!("{} iteration {}: {}", scenario, iteration, e));
        assert_single_winner(&report);
    }
}
