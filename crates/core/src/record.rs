//! Stored records and proposed changes
//!
//! `VersionedRecord` is the unit the store keeps per identity. A deleted
//! document is not removed from the map: it becomes a tombstone that keeps
//! its identity and a fresh version, so stale deletes still conflict.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::DocumentId;
use crate::version::Version;

/// Document content
///
/// The store does not interpret payloads.
pub type Payload = serde_json::Value;

/// A document plus its version token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionedRecord {
    /// Identity, fixed at creation
    pub id: DocumentId,
    /// Version stamped by the store on the last successful mutation
    pub version: Version,
    /// Document content (`Null` for tombstones)
    pub payload: Payload,
    /// `false` once the document has been deleted
    pub exists: bool,
    /// Wall-clock time of the last mutation
    pub modified_at: DateTime<Utc>,
}

impl VersionedRecord {
    /// Create a live record
    pub fn live(id: DocumentId, version: Version, payload: Payload) -> Self {
        VersionedRecord {
            id,
            version,
            payload,
            exists: true,
            modified_at: Utc::now(),
        }
    }

    /// Create a tombstone
    pub fn tombstone(id: DocumentId, version: Version) -> Self {
        VersionedRecord {
            id,
            version,
            payload: Payload::Null,
            exists: false,
            modified_at: Utc::now(),
        }
    }

    /// Check whether this record is a tombstone
    #[inline]
    pub fn is_tombstone(&self) -> bool {
        !self.exists
    }
}

/// A proposed mutation of one document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RecordChange {
    /// Replace the payload (creates the document if it never existed)
    Put(Payload),
    /// Turn the document into a tombstone
    Delete,
}

impl RecordChange {
    /// Short name used in log lines
    pub fn kind(&self) -> &'static str {
        match self {
            RecordChange::Put(_) => "put",
            RecordChange::Delete => "delete",
        }
    }

    /// Check whether this change is a delete
    pub fn is_delete(&self) -> bool {
        matches!(self, RecordChange::Delete)
    }
}

/// Handle for a change that passed validation but has not been applied
///
/// Returned by [`DocumentBackend::prepare`](crate::DocumentBackend::prepare).
/// While it is outstanding the identity is reserved: every other writer
/// conflicts until the handle is completed or released.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PreparedWrite {
    /// Reserved identity
    pub id: DocumentId,
    /// Version the change was validated against
    pub expected: Version,
    /// Store-unique reservation number
    pub reservation: u64,
}
