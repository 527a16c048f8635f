//! Version Counter Tests
//!
//! - Every successful mutation stamps a new, strictly larger version
//! - Concurrent writers to different documents never share a version
//! - Reopening a persistent store continues the sequence

use crate::common::*;
use docstore::RecordChange;
use proptest::prelude::*;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

// ============================================================================
// Monotonic Increment
// ============================================================================

proptest! {
    #[test]
    fn versions_strictly_increase_per_document(updates in 1usize..40) {
        let (store, id) = seeded_store();
        let mut seen = vec![store.storage().record(&id).unwrap().version];

        for i in 0..updates {
            let mut session = store.open_session();
            session.load(&id).unwrap();
            session.update(&id, json!(i)).unwrap();
            let version = session.commit().unwrap().version_of(&id).unwrap();
            seen.push(version);
        }

        for pair in seen.windows(2) {
            prop_assert!(pair[0] < pair[1]);
        }
    }
}

#[test]
fn delete_bumps_version() {
    let (backend, id) = seeded_backend();
    let before = backend.get(&id).unwrap().version;
    let after = backend
        .compare_and_swap(&id, before, RecordChange::Delete)
        .unwrap();
    assert!(after > before);
    assert_eq!(backend.record(&id).unwrap().version, after);
}

// ============================================================================
// Concurrent Uniqueness
// ============================================================================

#[test]
fn concurrent_writers_get_unique_versions() {
    let store = Arc::new(ShardedStore::new());
    let threads = 8;
    let per_thread = 200;

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                (0..per_thread)
                    .map(|i| store.insert(DocumentId::new(), json!(i)).unwrap())
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut all = HashSet::new();
    for handle in handles {
        for version in handle.join().unwrap() {
            assert!(all.insert(version), "duplicate version {}", version);
        }
    }
    assert_eq!(all.len(), threads * per_thread);
    assert_eq!(store.current_version(), Version::new((threads * per_thread) as u64));
}

// ============================================================================
// Restoration
// ============================================================================

#[test]
fn reopened_store_continues_sequence() {
    let dir = TestDir::new();
    let last = {
        let store = dir.open();
        store.insert(json!(1)).unwrap();
        store.insert(json!(2)).unwrap();
        store.storage().current_version()
    };

    let store = dir.open();
    assert_eq!(store.storage().current_version(), last);
    let id = store.insert(json!(3)).unwrap();
    assert!(store.storage().record(&id).unwrap().version > last);
}
