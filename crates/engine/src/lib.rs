//! Document store engine
//!
//! This crate ties the lower layers together:
//! - Database: `DocumentStore` handle built from a `StoreConfig`
//! - Workflow: the load → delete → commit race, written once over `StepDriver`
//! - Scenario: named race configurations and the runner that checks them
//!
//! The engine is the only component that knows about:
//! - Configuration files
//! - How workers are scheduled (threads vs tasks)
//! - The exclusivity check applied after a race

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod database;
pub mod scenario;
pub mod workflow;

pub use database::{DocumentStore, PersistenceMode, StoreConfig, CONFIG_FILE_NAME};
pub use scenario::{ExclusivityViolation, Scenario, ScenarioReport, ScenarioRunner, UnknownScenario};
pub use workflow::{
    BlockingDriver, Checkpoints, DeleteWorkflow, StepDriver, SuspendingDriver, WorkerOutcome,
};
