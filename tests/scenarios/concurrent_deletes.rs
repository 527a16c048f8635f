//! Blocking workers, plain sessions.

use crate::common::*;

#[test]
fn concurrent_deletes_one_winner() {
    let runner = ScenarioRunner::new(memory_config());
    race_repeatedly(&runner, Scenario::ConcurrentDeletes);
}

#[test]
fn concurrent_deletes_without_jitter() {
    let runner = ScenarioRunner::new(memory_config()).with_jitter(false);
    race_repeatedly(&runner, Scenario::ConcurrentDeletes);
}

#[test]
fn concurrent_deletes_many_workers() {
    let runner = ScenarioRunner::new(memory_config()).with_workers(8);
    for _ in 0..20 {
        let report = runner.run(Scenario::ConcurrentDeletes).unwrap();
        assert_eq!(report.outcomes.len(), 8);
        assert_single_winner(&report);
    }
}

#[test]
fn single_worker_always_commits() {
    let runner = ScenarioRunner::new(memory_config()).with_workers(1);
    let report = runner.run(Scenario::ConcurrentDeletes).unwrap();
    let version = report.winning_version().unwrap();
    assert_eq!(report.outcomes, vec![WorkerOutcome::Committed(version)]);
}

#[test]
fn winning_version_follows_seed() {
    let runner = ScenarioRunner::new(memory_config());
    let report = runner.run(Scenario::ConcurrentDeletes).unwrap();
    assert!(report.winning_version().unwrap() > report.seeded_version);
}

#[test]
fn run_repeated_returns_every_report() {
    let runner = ScenarioRunner::new(memory_config());
    let reports = runner.run_repeated(Scenario::ConcurrentDeletes, 5).unwrap();
    assert_eq!(reports.len(), 5);
    // Fresh store per run: every run races on its own document
    let mut documents: Vec<_> = reports.iter().map(|r| r.document).collect();
    documents.dedup();
    assert_eq!(documents.len(), 5);
}
