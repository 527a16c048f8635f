//! Core types and traits for the document store
//!
//! This crate defines the foundational types used throughout the system:
//! - DocumentId: Immutable identity of a document
//! - Version: Opaque version token stamped by the store on every mutation
//! - VersionedRecord: A document plus its version token (live or tombstone)
//! - RecordChange: A proposed mutation (put or delete)
//! - DocStoreError: Error taxonomy shared by every layer
//! - DocumentBackend: The compare-and-swap contract sessions commit through

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod record;
pub mod traits;
pub mod types;
pub mod version;

pub use error::{ConflictReason, DocStoreError, Result};
pub use record::{Payload, PreparedWrite, RecordChange, VersionedRecord};
pub use traits::DocumentBackend;
pub use types::DocumentId;
pub use version::Version;
