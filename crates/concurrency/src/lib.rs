//! Concurrency layer for the document store
//!
//! This crate implements optimistic concurrency control (OCC) with:
//! - Session: read capture, buffered writes, compare-and-swap on commit
//! - TransactionScope: explicit two-phase commit wrapping one or more sessions
//! - ConcurrencyBarrier: counting rendezvous used to force interleavings

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod barrier;
pub mod scope;
pub mod session;

pub use barrier::{BarrierWaitResult, ConcurrencyBarrier};
pub use scope::{ScopeStatus, TransactionScope};
pub use session::{CommitOutcome, PendingOperation, Session, SessionStatus};
