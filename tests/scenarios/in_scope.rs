//! Blocking workers, each session enlisted in its own transaction scope.

use crate::common::*;

#[test]
fn concurrent_deletes_in_scope_one_winner() {
    let runner = ScenarioRunner::new(memory_config());
    race_repeatedly(&runner, Scenario::ConcurrentDeletesInScope);
}

#[test]
fn concurrent_deletes_in_scope_many_workers() {
    let runner = ScenarioRunner::new(memory_config()).with_workers(5);
    for _ in 0..20 {
        assert_single_winner(&runner.run(Scenario::ConcurrentDeletesInScope).unwrap());
    }
}

#[test]
fn scoped_and_unscoped_agree() {
    let runner = ScenarioRunner::new(memory_config());
    for scenario in [Scenario::ConcurrentDeletes, Scenario::ConcurrentDeletesInScope] {
        let report = runner.run(scenario).unwrap();
        assert_eq!((report.winners(), report.losers()), (1, 1), "{}", scenario);
    }
}
