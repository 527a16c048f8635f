//! OCC Invariant Tests
//!
//! Tests the core optimistic concurrency guarantees:
//! - Exclusivity: of two sessions racing to delete one document, exactly one commits
//! - Read-before-write: delete/update without a prior load is a precondition error
//! - Failure isolation: a losing commit never mutates the store

use crate::common::*;
use docstore::{ConcurrencyBarrier, RecordChange};
use proptest::prelude::*;
use serde_json::json;
use std::sync::Arc;
use std::thread;

// ============================================================================
// Exclusivity
// ============================================================================

fn race_once(workers: usize) -> Vec<docstore::Result<CommitOutcome>> {
    let (store, id) = seeded_store();
    let loaded = Arc::new(ConcurrencyBarrier::named("loaded", workers));
    let deleted = Arc::new(ConcurrencyBarrier::named("deleted", workers));

    let handles: Vec<_> = (0..workers)
        .map(|_| {
            let store = store.clone();
            let loaded = Arc::clone(&loaded);
            let deleted = Arc::clone(&deleted);
            thread::spawn(move || {
                let mut session = store.open_session();
                session.load(&id)?;
                loaded.signal_and_wait_timeout(TEST_BARRIER_TIMEOUT)?;
                session.delete(&id)?;
                deleted.signal_and_wait_timeout(TEST_BARRIER_TIMEOUT)?;
                session.commit()
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(!store.storage().contains(&id));
    results
}

#[test]
fn two_racing_deletes_exactly_one_commits() {
    for _ in 0..RACE_ITERATIONS {
        let results = race_once(2);
        let committed = results.iter().filter(|r| r.is_ok()).count();
        let conflicts = results
            .iter()
            .filter(|r| matches!(r, Err(e) if e.is_conflict()))
            .count();
        assert_eq!(committed, 1, "results: {:?}", results);
        assert_eq!(conflicts, 1, "results: {:?}", results);
    }
}

#[test]
fn many_racing_deletes_exactly_one_commits() {
    for _ in 0..20 {
        let results = race_once(6);
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(DocStoreError::is_conflict));
    }
}

// ============================================================================
// Failure Isolation
// ============================================================================

#[test]
fn losing_commit_leaves_winner_state() {
    let (store, id) = seeded_store();
    let mut winner = store.open_session();
    let mut loser = store.open_session();
    winner.load(&id).unwrap();
    loser.load(&id).unwrap();
    winner.delete(&id).unwrap();
    loser.delete(&id).unwrap();

    let version = winner.commit().unwrap().version_of(&id).unwrap();
    let err = loser.commit().unwrap_err();

    match err {
        DocStoreError::Conflict {
            expected, actual, ..
        } => {
            assert!(expected < version);
            assert_eq!(actual, version);
        }
        other => panic!("expected conflict, got {other:?}"),
    }

    let record = store.storage().record(&id).unwrap();
    assert!(record.is_tombstone());
    assert_eq!(record.version, version);
    assert_eq!(store.storage().current_version(), version);
}

#[test]
fn delete_of_deleted_document_is_not_found_on_load() {
    let (store, id) = seeded_store();
    let mut first = store.open_session();
    first.load(&id).unwrap();
    first.delete(&id).unwrap();
    first.commit().unwrap();

    let mut late = store.open_session();
    assert!(late.load(&id).unwrap_err().is_not_found());
}

#[test]
fn stale_cas_against_tombstone_conflicts() {
    let (backend, id) = seeded_backend();
    let seeded = backend.get(&id).unwrap().version;
    backend
        .compare_and_swap(&id, seeded, RecordChange::Delete)
        .unwrap();

    let err = backend
        .compare_and_swap(&id, seeded, RecordChange::Delete)
        .unwrap_err();
    assert!(err.is_conflict());
}

#[test]
fn unrelated_documents_do_not_conflict() {
    let store = DocumentStore::in_memory();
    let a = store.insert(json!("a")).unwrap();
    let b = store.insert(json!("b")).unwrap();

    let mut first = store.open_session();
    let mut second = store.open_session();
    first.load(&a).unwrap();
    second.load(&b).unwrap();
    first.delete(&a).unwrap();
    second.delete(&b).unwrap();

    first.commit().unwrap();
    second.commit().unwrap();
    assert!(store.storage().is_empty());
}

// ============================================================================
// Read-before-write
// ============================================================================

proptest! {
    #[test]
    fn delete_without_load_always_precondition(loaded_others in 0usize..5) {
        let store = DocumentStore::in_memory();
        let target = store.insert(json!("target")).unwrap();
        let others: Vec<_> = (0..loaded_others)
            .map(|i| store.insert(json!(i)).unwrap())
            .collect();

        let mut session = store.open_session();
        for id in &others {
            session.load(id).unwrap();
        }

        let err = session.delete(&target).unwrap_err();
        let is_precondition = matches!(err, DocStoreError::Precondition { .. });
        prop_assert!(is_precondition);
        prop_assert!(session.status().is_open());
        prop_assert!(store.storage().contains(&target));
    }

    #[test]
    fn update_without_load_always_precondition(value in any::<i64>()) {
        let (store, id) = seeded_store();
        let mut session = store.open_session();
        let err = session.update(&id, json!(value)).unwrap_err();
        let is_precondition = matches!(err, DocStoreError::Precondition { .. });
        prop_assert!(is_precondition);
    }
}
