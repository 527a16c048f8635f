//! Commit log persistence across store handles.

use crate::common::*;
use serde_json::json;
use std::fs::OpenOptions;
use std::io::Write;

#[test]
fn documents_and_tombstones_survive_reopen() {
    let dir = TestDir::new();
    let (live, gone) = {
        let store = dir.open();
        let live = store.insert(json!({"keep": true})).unwrap();
        let gone = store.insert(json!({"keep": false})).unwrap();
        let mut session = store.open_session();
        session.load(&gone).unwrap();
        session.delete(&gone).unwrap();
        session.commit().unwrap();
        store.flush().unwrap();
        (live, gone)
    };

    let store = dir.open();
    assert_eq!(store.storage().len(), 1);
    assert!(store.storage().contains(&live));
    assert!(store.storage().record(&gone).unwrap().is_tombstone());
}

#[test]
fn stale_session_conflicts_after_reopen() {
    let dir = TestDir::new();
    let (id, stale, current) = {
        let store = dir.open();
        let id = store.insert(json!(1)).unwrap();
        let stale = store.storage().record(&id).unwrap().version;
        let mut session = store.open_session();
        session.load(&id).unwrap();
        session.update(&id, json!(2)).unwrap();
        session.commit().unwrap();
        (id, stale, store.storage().record(&id).unwrap().version)
    };
    assert!(current > stale);

    let store = dir.open();
    assert_eq!(store.storage().record(&id).unwrap().version, current);
    assert_eq!(store.storage().get(&id).unwrap().payload, json!(2));

    let err = store
        .storage()
        .compare_and_swap(&id, stale, RecordChange::Delete)
        .unwrap_err();
    match err {
        DocStoreError::Conflict { expected, actual, .. } => {
            assert_eq!(expected, stale);
            assert_eq!(actual, current);
        }
        other => panic!("expected conflict, got {other:?}"),
    }
    assert!(store.storage().contains(&id));
}

#[test]
fn persistent_race_scenarios_hold() {
    let dir = TestDir::new();
    let runner = ScenarioRunner::new(dir.config());
    for scenario in [Scenario::ConcurrentDeletes, Scenario::ConcurrentDeletesInScope] {
        for _ in 0..10 {
            let report = runner.run(scenario).unwrap();
            assert_single_winner(&report);
            assert_eq!(report.seeded_version, Version::new(1));
        }
    }

    // Each run logs to its own directory and removes it afterwards
    let leftover = std::fs::read_dir(dir.data_path()).unwrap().count();
    assert_eq!(leftover, 0);
}

#[test]
fn partial_append_does_not_block_reopen() {
    let dir = TestDir::new();
    let (first, second) = {
        let store = dir.open();
        let first = store.insert(json!("first")).unwrap();

        // Bytes left behind by an append that failed partway
        let mut file = OpenOptions::new().append(true).open(dir.log_path()).unwrap();
        file.write_all(&[0x40, 0x00, 0x00, 0x00, 0x01, 0x02]).unwrap();
        drop(file);

        let second = store.insert(json!("second")).unwrap();
        store.flush().unwrap();
        (first, second)
    };

    let store = DocumentStore::open(dir.config()).unwrap();
    assert!(store.storage().contains(&first));
    assert!(store.storage().contains(&second));
}

#[test]
fn torn_tail_is_discarded_on_open() {
    let dir = TestDir::new();
    let id = {
        let store = dir.open();
        let id = store.insert(json!("kept")).unwrap();
        store.flush().unwrap();
        id
    };

    let mut file = OpenOptions::new().append(true).open(dir.log_path()).unwrap();
    file.write_all(&[0x40, 0x00, 0x00, 0x00, 0x01, 0x02]).unwrap();
    drop(file);

    let store = dir.open();
    assert!(store.storage().contains(&id));
    store.insert(json!("after")).unwrap();
    drop(store);

    let store = dir.open();
    assert_eq!(store.storage().len(), 2);
}

#[test]
fn corrupt_record_in_the_middle_is_rejected() {
    let dir = TestDir::new();
    {
        let store = dir.open();
        store.insert(json!("first")).unwrap();
        store.insert(json!("second")).unwrap();
        store.flush().unwrap();
    }

    let mut bytes = std::fs::read(dir.log_path()).unwrap();
    bytes[8] ^= 0xFF;
    std::fs::write(dir.log_path(), bytes).unwrap();

    let err = DocumentStore::open(dir.config()).unwrap_err();
    assert!(matches!(err, DocStoreError::Corruption(_)));
}
