//! Barrier Ordering Tests
//!
//! The two checkpoints must force every load before any delete and every
//! delete before any commit, whatever the thread schedule.

use crate::common::*;
use docstore::ConcurrencyBarrier;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[test]
fn no_participant_passes_before_quota() {
    for _ in 0..RACE_ITERATIONS {
        let barrier = Arc::new(ConcurrencyBarrier::new(2));
        let before = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let barrier = Arc::clone(&barrier);
                let before = Arc::clone(&before);
                thread::spawn(move || {
                    before.fetch_add(1, Ordering::SeqCst);
                    barrier.signal_and_wait_timeout(TEST_BARRIER_TIMEOUT).unwrap();
                    // Both arrivals must be visible once released
                    before.load(Ordering::SeqCst)
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), 2);
        }
    }
}

#[test]
fn phases_are_totally_ordered() {
    let workers = 4;
    let loaded = Arc::new(ConcurrencyBarrier::named("loaded", workers));
    let deleted = Arc::new(ConcurrencyBarrier::named("deleted", workers));
    let loads = Arc::new(AtomicUsize::new(0));
    let deletes = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..workers)
        .map(|_| {
            let (loaded, deleted) = (Arc::clone(&loaded), Arc::clone(&deleted));
            let (loads, deletes) = (Arc::clone(&loads), Arc::clone(&deletes));
            thread::spawn(move || {
                loads.fetch_add(1, Ordering::SeqCst);
                loaded.signal_and_wait_timeout(TEST_BARRIER_TIMEOUT).unwrap();
                assert_eq!(loads.load(Ordering::SeqCst), workers);

                deletes.fetch_add(1, Ordering::SeqCst);
                deleted.signal_and_wait_timeout(TEST_BARRIER_TIMEOUT).unwrap();
                assert_eq!(deletes.load(Ordering::SeqCst), workers);
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn missing_participant_times_out_instead_of_hanging() {
    let barrier = Arc::new(ConcurrencyBarrier::new(3));
    let handles: Vec<_> = (0..2)
        .map(|_| {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || barrier.signal_and_wait_timeout(Duration::from_millis(50)))
        })
        .collect();

    for handle in handles {
        let err = handle.join().unwrap().unwrap_err();
        assert!(err.is_timeout());
    }
    assert_eq!(barrier.arrived(), 0);
}

#[test]
fn extra_arrival_is_overrun() {
    let barrier = ConcurrencyBarrier::new(1);
    barrier.signal_and_wait().unwrap();
    assert!(matches!(
        barrier.signal_and_wait().unwrap_err(),
        DocStoreError::BarrierOverrun { required: 1 }
    ));
}
