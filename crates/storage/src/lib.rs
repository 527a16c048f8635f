//! Storage layer for the document store
//!
//! This crate implements the backend sessions commit through:
//! - ShardedStore: DashMap of per-identity slots, each behind its own mutex
//! - Compare-and-swap writes validated under the slot lock
//! - Prepared (reserved) writes for enclosing transaction scopes
//! - CommitLog: append-only framed log used when the store is persistent
//!
//! Unrelated documents never contend: the map is only touched to locate a
//! slot, and every check-and-apply runs under that slot's lock alone.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod commit_log;
pub mod sharded;

pub use commit_log::{CommitLog, COMMIT_LOG_FILE_NAME};
pub use sharded::ShardedStore;
