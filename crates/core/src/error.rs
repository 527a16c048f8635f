//! Error types for the document store
//!
//! This module defines all error types used throughout the system.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! Only [`DocStoreError::Conflict`] is an expected outcome: it means the
//! caller lost an optimistic-concurrency race. Every other variant signals
//! misuse or an environmental failure and should be propagated.

use std::fmt;
use std::io;
use std::time::Duration;
use thiserror::Error;

use crate::types::DocumentId;
use crate::version::Version;

/// Result type alias for document store operations
pub type Result<T> = std::result::Result<T, DocStoreError>;

/// Why a compare-and-swap was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictReason {
    /// The record's version differs from the captured one
    VersionMismatch,
    /// The record is absent or already a tombstone
    Missing,
    /// Another writer holds a prepared, uncompleted change on the record
    Reserved,
}

impl fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictReason::VersionMismatch => write!(f, "version mismatch"),
            ConflictReason::Missing => write!(f, "document missing"),
            ConflictReason::Reserved => write!(f, "document reserved by a pending commit"),
        }
    }
}

/// Error types for the document store
#[derive(Debug, Error)]
pub enum DocStoreError {
    /// Load of an identity that does not exist or was deleted
    #[error("Document not found: {id}")]
    NotFound {
        /// Identity that was requested
        id: DocumentId,
    },

    /// Captured version does not match the store's current version
    #[error("Concurrency conflict on {id}: {reason} (expected {expected}, found {actual})")]
    Conflict {
        /// Identity the commit targeted
        id: DocumentId,
        /// Version captured when the session loaded the document
        expected: Version,
        /// Version currently held by the store (`v0` if never written)
        actual: Version,
        /// What made the check fail
        reason: ConflictReason,
    },

    /// Write attempted without the read it depends on
    #[error("Precondition failed for {id}: {reason}")]
    Precondition {
        /// Identity the write targeted
        id: DocumentId,
        /// Human-readable explanation
        reason: String,
    },

    /// Operation on a session or scope that has already terminated
    #[error("Invalid lifecycle state: {state}")]
    Lifecycle {
        /// Description of the terminal state
        state: String,
    },

    /// A barrier participant never arrived within the bounded wait
    #[error("Barrier timed out after {waited:?}: {arrived} of {required} participants arrived")]
    BarrierTimeout {
        /// Arrivals observed when the wait gave up
        arrived: usize,
        /// Quota the barrier was created with
        required: usize,
        /// How long the caller waited
        waited: Duration,
    },

    /// More participants arrived than the barrier was created for
    #[error("Barrier overrun: already released after {required} arrivals")]
    BarrierOverrun {
        /// Quota the barrier was created with
        required: usize,
    },

    /// Configuration rejected during validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O error (commit log, config file)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Data corruption detected while replaying the commit log
    #[error("Data corruption: {0}")]
    Corruption(String),
}

impl DocStoreError {
    /// Build a version-mismatch conflict
    pub fn conflict(id: DocumentId, expected: Version, actual: Version) -> Self {
        DocStoreError::Conflict {
            id,
            expected,
            actual,
            reason: ConflictReason::VersionMismatch,
        }
    }

    /// Build a lifecycle error
    pub fn lifecycle(state: impl Into<String>) -> Self {
        DocStoreError::Lifecycle {
            state: state.into(),
        }
    }

    /// Build a precondition error
    pub fn precondition(id: DocumentId, reason: impl Into<String>) -> Self {
        DocStoreError::Precondition {
            id,
            reason: reason.into(),
        }
    }

    /// True if this error means "lost the race"
    pub fn is_conflict(&self) -> bool {
        matches!(self, DocStoreError::Conflict { .. })
    }

    /// True for missing documents
    pub fn is_not_found(&self) -> bool {
        matches!(self, DocStoreError::NotFound { .. })
    }

    /// True for operations on terminated sessions or scopes
    pub fn is_lifecycle(&self) -> bool {
        matches!(self, DocStoreError::Lifecycle { .. })
    }

    /// True for barrier timeouts
    pub fn is_timeout(&self) -> bool {
        matches!(self, DocStoreError::BarrierTimeout { .. })
    }
}
