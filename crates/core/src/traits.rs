//! Backend contract
//!
//! Sessions never mutate records directly. Everything they do goes through
//! [`DocumentBackend`], whose write operations are compare-and-swap checks
//! scoped to one identity.

use crate::error::Result;
use crate::record::{PreparedWrite, RecordChange, VersionedRecord};
use crate::types::DocumentId;
use crate::version::Version;

/// Storage abstraction with per-identity compare-and-swap
///
/// Thread safety: All methods must be safe to call concurrently from
/// multiple threads (requires Send + Sync). Two concurrent writes to the same
/// identity must be strictly serialized so that exactly one observes a
/// version match.
pub trait DocumentBackend: Send + Sync {
    /// Get the current live record
    ///
    /// # Errors
    ///
    /// `NotFound` if the identity was never written or is a tombstone.
    fn get(&self, id: &DocumentId) -> Result<VersionedRecord>;

    /// Apply `change` if the record's version equals `expected`
    ///
    /// `expected == Version::ZERO` means "the identity must never have been
    /// written". Deletes additionally require a live record.
    ///
    /// Returns the newly assigned version.
    ///
    /// # Errors
    ///
    /// `Conflict` on any mismatch; the store is left unchanged.
    fn compare_and_swap(
        &self,
        id: &DocumentId,
        expected: Version,
        change: RecordChange,
    ) -> Result<Version>;

    /// Validate `change` against `expected` and reserve the identity
    ///
    /// Nothing becomes visible until [`complete_prepared`](Self::complete_prepared).
    ///
    /// # Errors
    ///
    /// `Conflict` under the same rules as `compare_and_swap`, or if another
    /// prepared change already holds the identity.
    fn prepare(
        &self,
        id: &DocumentId,
        expected: Version,
        change: RecordChange,
    ) -> Result<PreparedWrite>;

    /// Apply a prepared change and release its reservation
    fn complete_prepared(&self, prepared: &PreparedWrite) -> Result<Version>;

    /// Drop a prepared change without applying it
    ///
    /// Releasing an unknown or already-finished reservation is a no-op.
    fn release_prepared(&self, prepared: &PreparedWrite);
}
