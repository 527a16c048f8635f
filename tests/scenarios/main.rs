//! Scenario Integration Tests
//!
//! Every race scenario, run repeatedly through `ScenarioRunner`, must end
//! with exactly one committed delete and a conflict for every other worker.

#[path = "../common/mod.rs"]
mod common;

mod concurrent_deletes;
mod in_scope;
