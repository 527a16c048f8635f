//! Sharded document storage
//!
//! # Design
//!
//! - DashMap: locates the slot for an identity, sharded internally
//! - Slot: one `parking_lot::Mutex` per identity holding the record and an
//!   optional reservation
//! - Version counter: a single AtomicU64, bumped under the slot lock
//!
//! Every write is a check-then-apply executed while holding the slot lock,
//! so two concurrent writers of one identity are strictly serialized and
//! exactly one of them can observe a version match. No lock is ever held
//! across calls: a reservation made by `prepare` is a marker inside the
//! slot, not a held guard.
//!
//! # Tombstones
//!
//! Deleting a document keeps its slot with `exists = false` and a fresh
//! version. A second delete carrying the pre-delete version therefore
//! fails with a version mismatch instead of silently succeeding.

use dashmap::DashMap;
use docstore_core::error::ConflictReason;
use docstore_core::{
    DocStoreError, DocumentBackend, DocumentId, PreparedWrite, RecordChange, Result, Version,
    VersionedRecord,
};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use crate::commit_log::CommitLog;

/// A change that passed validation and is waiting for its scope
#[derive(Debug, Clone)]
struct Reservation {
    number: u64,
    expected: Version,
    change: RecordChange,
}

/// Per-identity state guarded by the slot mutex
#[derive(Debug, Default)]
struct Slot {
    record: Option<VersionedRecord>,
    reservation: Option<Reservation>,
}

impl Slot {
    fn current_version(&self) -> Version {
        self.record
            .as_ref()
            .map(|r| r.version)
            .unwrap_or(Version::ZERO)
    }

    fn is_live(&self) -> bool {
        self.record.as_ref().map(|r| r.exists).unwrap_or(false)
    }

    /// Check whether `change` may be applied on top of `expected`
    fn validate(&self, id: &DocumentId, expected: Version, change: &RecordChange) -> Result<()> {
        let actual = self.current_version();

        if self.reservation.is_some() {
            return Err(DocStoreError::Conflict {
                id: *id,
                expected,
                actual,
                reason: ConflictReason::Reserved,
            });
        }

        if actual != expected {
            return Err(DocStoreError::conflict(*id, expected, actual));
        }

        if change.is_delete() && !self.is_live() {
            return Err(DocStoreError::Conflict {
                id: *id,
                expected,
                actual,
                reason: ConflictReason::Missing,
            });
        }

        Ok(())
    }
}

/// In-process document store with per-identity compare-and-swap
///
/// # Thread Safety
///
/// All operations are thread-safe:
/// - get(): locks only the target slot
/// - compare_and_swap(): locks only the target slot
/// - Different identities never contend beyond the DashMap shard lookup
///
/// # Example
///
/// ```ignore
/// use docstore_storage::ShardedStore;
/// use std::sync::Arc;
///
/// let store = Arc::new(ShardedStore::new());
/// let version = store.insert(id, json!({"name": "demo"}))?;
/// ```
pub struct ShardedStore {
    /// Identity -> slot
    slots: DashMap<DocumentId, Arc<Mutex<Slot>>>,
    /// Last version handed out
    version: AtomicU64,
    /// Reservation numbers for prepared writes
    next_reservation: AtomicU64,
    /// Present only for persistent stores
    log: Option<CommitLog>,
}

impl ShardedStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
            version: AtomicU64::new(0),
            next_reservation: AtomicU64::new(1),
            log: None,
        }
    }

    /// Open a persistent store rooted at `dir`
    ///
    /// Creates the directory if needed and replays the commit log found
    /// there, restoring live records, tombstones and the version counter.
    ///
    /// # Errors
    ///
    /// I/O failures, or `Corruption` if a damaged record sits in the middle
    /// of the log.
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let (log, records) = CommitLog::open(dir)?;

        let replayed = records.len();
        let slots = DashMap::with_capacity(replayed);
        let mut max_version = 0;
        for record in records {
            max_version = max_version.max(record.version.as_u64());
            slots.insert(
                record.id,
                Arc::new(Mutex::new(Slot {
                    record: Some(record),
                    reservation: None,
                })),
            );
        }

        info!(
            target: "docstore::store",
            path = %dir.display(),
            replayed,
            version = max_version,
            "Opened persistent store"
        );

        Ok(Self {
            slots,
            version: AtomicU64::new(max_version),
            next_reservation: AtomicU64::new(1),
            log: Some(log),
        })
    }

    /// Whether mutations are written to a commit log
    pub fn is_persistent(&self) -> bool {
        self.log.is_some()
    }

    /// Push buffered commit log writes to the OS
    pub fn flush(&self) -> Result<()> {
        if let Some(log) = &self.log {
            log.flush()?;
        }
        Ok(())
    }

    /// Last version handed out by this store
    #[inline]
    pub fn current_version(&self) -> Version {
        Version::new(self.version.load(Ordering::Acquire))
    }

    #[inline]
    fn next_version(&self) -> Version {
        Version::new(self.version.fetch_add(1, Ordering::AcqRel) + 1)
    }

    /// Number of live (non-tombstone) documents
    pub fn len(&self) -> usize {
        self.slots
            .iter()
            .filter(|entry| entry.value().lock().is_live())
            .count()
    }

    /// Check if the store holds no live documents
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check if a live document exists
    pub fn contains(&self, id: &DocumentId) -> bool {
        self.slot(id).map(|s| s.lock().is_live()).unwrap_or(false)
    }

    /// Raw record for an identity, tombstones included
    ///
    /// Inspection only. Decisions must go through `compare_and_swap`.
    pub fn record(&self, id: &DocumentId) -> Option<VersionedRecord> {
        self.slot(id).and_then(|s| s.lock().record.clone())
    }

    /// Whether a prepared write currently holds the identity
    pub fn is_reserved(&self, id: &DocumentId) -> bool {
        self.slot(id)
            .map(|s| s.lock().reservation.is_some())
            .unwrap_or(false)
    }

    /// Create a document that must not exist yet
    pub fn insert(&self, id: DocumentId, payload: docstore_core::Payload) -> Result<Version> {
        self.compare_and_swap(&id, Version::ZERO, RecordChange::Put(payload))
    }

    fn slot(&self, id: &DocumentId) -> Option<Arc<Mutex<Slot>>> {
        self.slots.get(id).map(|entry| Arc::clone(entry.value()))
    }

    fn slot_or_create(&self, id: &DocumentId) -> Arc<Mutex<Slot>> {
        Arc::clone(self.slots.entry(*id).or_default().value())
    }

    /// Slot lookup for a write; only creates a slot for a put that expects
    /// the identity to be new
    fn slot_for_write(
        &self,
        id: &DocumentId,
        expected: Version,
        change: &RecordChange,
    ) -> Result<Arc<Mutex<Slot>>> {
        if expected.is_zero() && !change.is_delete() {
            return Ok(self.slot_or_create(id));
        }
        self.slot(id).ok_or(DocStoreError::Conflict {
            id: *id,
            expected,
            actual: Version::ZERO,
            reason: ConflictReason::Missing,
        })
    }

    /// Stamp a new version, log it, and install it into the slot
    ///
    /// Must be called with the slot lock held.
    fn apply_locked(&self, slot: &mut Slot, id: &DocumentId, change: RecordChange) -> Result<Version> {
        let version = self.next_version();
        let record = match change {
            RecordChange::Put(payload) => VersionedRecord::live(*id, version, payload),
            RecordChange::Delete => VersionedRecord::tombstone(*id, version),
        };

        if let Some(log) = &self.log {
            log.append(&record)?;
        }

        slot.record = Some(record);
        Ok(version)
    }
}

impl Default for ShardedStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentBackend for ShardedStore {
    fn get(&self, id: &DocumentId) -> Result<VersionedRecord> {
        self.slot(id)
            .and_then(|slot| {
                let slot = slot.lock();
                slot.record.as_ref().filter(|r| r.exists).cloned()
            })
            .ok_or(DocStoreError::NotFound { id: *id })
    }

    fn compare_and_swap(
        &self,
        id: &DocumentId,
        expected: Version,
        change: RecordChange,
    ) -> Result<Version> {
        let slot = self.slot_for_write(id, expected, &change)?;
        let mut slot = slot.lock();

        if let Err(e) = slot.validate(id, expected, &change) {
            debug!(target: "docstore::store", %id, %expected, kind = change.kind(), error = %e, "CAS rejected");
            return Err(e);
        }

        let kind = change.kind();
        let version = self.apply_locked(&mut slot, id, change)?;
        debug!(target: "docstore::store", %id, %expected, %version, kind, "CAS applied");
        Ok(version)
    }

    fn prepare(
        &self,
        id: &DocumentId,
        expected: Version,
        change: RecordChange,
    ) -> Result<PreparedWrite> {
        let slot = self.slot_for_write(id, expected, &change)?;
        let mut slot = slot.lock();

        slot.validate(id, expected, &change)?;

        let number = self.next_reservation.fetch_add(1, Ordering::Relaxed);
        debug!(target: "docstore::store", %id, %expected, reservation = number, kind = change.kind(), "Write prepared");
        slot.reservation = Some(Reservation {
            number,
            expected,
            change,
        });

        Ok(PreparedWrite {
            id: *id,
            expected,
            reservation: number,
        })
    }

    fn complete_prepared(&self, prepared: &PreparedWrite) -> Result<Version> {
        let slot = self
            .slot(&prepared.id)
            .ok_or_else(|| DocStoreError::lifecycle("prepared write no longer reserved"))?;
        let mut slot = slot.lock();

        let reservation = match slot.reservation.take() {
            Some(r) if r.number == prepared.reservation => r,
            other => {
                slot.reservation = other;
                return Err(DocStoreError::lifecycle("prepared write no longer reserved"));
            }
        };
        debug_assert_eq!(reservation.expected, slot.current_version());

        match self.apply_locked(&mut slot, &prepared.id, reservation.change.clone()) {
            Ok(version) => {
                debug!(
                    target: "docstore::store",
                    id = %prepared.id,
                    reservation = prepared.reservation,
                    %version,
                    "Prepared write completed"
                );
                Ok(version)
            }
            Err(e) => {
                // Keep the identity reserved so the caller can still release it.
                slot.reservation = Some(reservation);
                Err(e)
            }
        }
    }

    fn release_prepared(&self, prepared: &PreparedWrite) {
        if let Some(slot) = self.slot(&prepared.id) {
            let mut slot = slot.lock();
            let held = slot
                .reservation
                .as_ref()
                .map(|r| r.number == prepared.reservation)
                .unwrap_or(false);
            if held {
                slot.reservation = None;
                debug!(
                    target: "docstore::store",
                    id = %prepared.id,
                    reservation = prepared.reservation,
                    "Prepared write released"
                );
            }
        }
    }
}
