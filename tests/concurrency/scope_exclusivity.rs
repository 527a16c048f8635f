//! Transaction Scope Tests
//!
//! Wrapping each session in its own scope must not change the race
//! outcome: prepares validate the captured version and a reservation
//! keeps a competing scope from preparing the same document.

use crate::common::*;
use docstore::{ConcurrencyBarrier, ScopeStatus};
use std::sync::Arc;
use std::thread;

fn scoped_race(store: &DocumentStore, id: DocumentId) -> Vec<docstore::Result<Version>> {
    let loaded = Arc::new(ConcurrencyBarrier::named("loaded", 2));
    let deleted = Arc::new(ConcurrencyBarrier::named("deleted", 2));

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let store = store.clone();
            let loaded = Arc::clone(&loaded);
            let deleted = Arc::clone(&deleted);
            thread::spawn(move || -> docstore::Result<Version> {
                let scope = store.begin_scope();
                let mut session = store.open_session_in(&scope)?;
                session.load(&id)?;
                loaded.signal_and_wait_timeout(TEST_BARRIER_TIMEOUT)?;
                session.delete(&id)?;
                deleted.signal_and_wait_timeout(TEST_BARRIER_TIMEOUT)?;
                session.commit()?;
                let versions = scope.complete()?;
                assert_eq!(scope.status(), ScopeStatus::Completed);
                Ok(versions[0].1)
            })
        })
        .collect();

    handles.into_iter().map(|h| h.join().unwrap()).collect()
}

#[test]
fn scoped_race_exactly_one_commits() {
    for _ in 0..RACE_ITERATIONS {
        let (store, id) = seeded_store();
        let results = scoped_race(&store, id);

        let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
        assert_eq!(winners.len(), 1, "results: {:?}", results);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(DocStoreError::is_conflict));

        let record = store.storage().record(&id).unwrap();
        assert!(record.is_tombstone());
        assert_eq!(record.version, *winners[0]);
        assert!(!store.storage().is_reserved(&id));
    }
}

#[test]
fn reservation_reason_reported_while_other_scope_pending() {
    let (store, id) = seeded_store();
    let first = store.begin_scope();
    let second = store.begin_scope();

    let mut a = store.open_session_in(&first).unwrap();
    let mut b = store.open_session_in(&second).unwrap();
    a.load(&id).unwrap();
    b.load(&id).unwrap();
    a.delete(&id).unwrap();
    b.delete(&id).unwrap();
    a.commit().unwrap();

    match b.commit().unwrap_err() {
        DocStoreError::Conflict { reason, .. } => assert_eq!(reason, ConflictReason::Reserved),
        other => panic!("expected conflict, got {other:?}"),
    }

    // The first scope rolling back frees the document again
    drop(a);
    first.rollback();
    assert!(store.storage().contains(&id));
    assert!(!store.storage().is_reserved(&id));

    let mut c = store.open_session();
    c.load(&id).unwrap();
    c.delete(&id).unwrap();
    c.commit().unwrap();
}
