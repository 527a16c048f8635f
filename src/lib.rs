//! docstore - embedded document store with optimistic concurrency control
//!
//! Documents carry a version stamped by the store on every mutation.
//! Sessions capture that version on load, buffer their writes, and at
//! commit the store applies each write only if the captured version is
//! still current. Two sessions racing to delete the same document
//! therefore cannot both succeed: one commits, the other gets a conflict.
//!
//! # Quick Start
//!
//! ```ignore
//! use docstore::{DocumentStore, Payload};
//!
//! let store = DocumentStore::in_memory();
//! let id = store.insert(serde_json::json!({"name": "demo"}))?;
//!
//! let mut session = store.open_session();
//! session.load(&id)?;
//! session.delete(&id)?;
//! session.commit()?;
//! ```
//!
//! # Architecture
//!
//! - `docstore-core`: records, versions, errors, the backend contract
//! - `docstore-storage`: sharded per-identity CAS store and commit log
//! - `docstore-concurrency`: sessions, transaction scopes, barriers
//! - `docstore-engine`: store handle, config, race workflow and scenarios

pub use docstore_concurrency::{
    BarrierWaitResult, CommitOutcome, ConcurrencyBarrier, PendingOperation, ScopeStatus, Session,
    SessionStatus, TransactionScope,
};
pub use docstore_core::{
    ConflictReason, DocStoreError, DocumentBackend, DocumentId, Payload, PreparedWrite,
    RecordChange, Result, Version, VersionedRecord,
};
pub use docstore_engine::{
    BlockingDriver, Checkpoints, DeleteWorkflow, DocumentStore, ExclusivityViolation,
    PersistenceMode, Scenario, ScenarioReport, ScenarioRunner, StepDriver, StoreConfig,
    SuspendingDriver, UnknownScenario, WorkerOutcome, CONFIG_FILE_NAME,
};
pub use docstore_storage::ShardedStore;
