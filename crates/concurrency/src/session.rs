//! Sessions: read capture, buffered writes, validated commit
//!
//! A session is a short-lived unit of work. Every `load` records the
//! version it observed. Writes are only buffered. At `commit` each buffered
//! write is handed to the backend together with the version captured when
//! its document was loaded, and the backend applies it only if that
//! version is still current.
//!
//! # Lifecycle
//!
//! ```text
//! Open ──commit ok──► Committed
//!   │
//!   ├──commit err───► Aborted
//!   └──abort────────► Aborted
//! ```
//!
//! Terminal states are final. Any operation on a terminated session fails
//! with `Lifecycle`. Dropping an open session discards its buffered writes.
//!
//! # Read-before-write
//!
//! `delete` and `update` need a version to validate against, so they
//! require a prior `load` of the same document in the same session.
//! Creating a brand-new document expects `Version::ZERO` instead.

use docstore_core::{
    DocStoreError, DocumentBackend, DocumentId, Payload, PreparedWrite, RecordChange, Result,
    Version,
};
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::scope::TransactionScope;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Status of a session in its lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    /// Accepting loads and writes
    Open,
    /// Commit succeeded (or, when enlisted, writes were prepared)
    Committed,
    /// Commit failed or the caller aborted
    Aborted {
        /// Human-readable reason for abort
        reason: String,
    },
}

impl SessionStatus {
    /// Check whether the session can still be used
    pub fn is_open(&self) -> bool {
        matches!(self, SessionStatus::Open)
    }
}

/// A buffered write waiting for commit
#[derive(Debug, Clone, PartialEq)]
pub struct PendingOperation {
    /// Target document
    pub id: DocumentId,
    /// Version the write is validated against
    pub expected: Version,
    /// Proposed change
    pub change: RecordChange,
}

/// Result of a successful commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Writes are visible; new version per document in commit order
    Applied {
        /// `(document, new version)` pairs
        versions: Vec<(DocumentId, Version)>,
    },
    /// Writes were validated and reserved; the enclosing scope applies them
    Prepared {
        /// Number of prepared writes handed to the scope
        operations: usize,
    },
}

impl CommitOutcome {
    /// Version assigned to `id`, if this commit applied a write to it
    pub fn version_of(&self, id: &DocumentId) -> Option<Version> {
        match self {
            CommitOutcome::Applied { versions } => versions
                .iter()
                .find(|(doc, _)| doc == id)
                .map(|(_, v)| *v),
            CommitOutcome::Prepared { .. } => None,
        }
    }
}

/// What a session remembers about a loaded document
#[derive(Debug, Clone)]
struct LoadedDocument {
    version: Version,
    payload: Payload,
}

/// Unit of work against a document backend
pub struct Session {
    id: u64,
    backend: Arc<dyn DocumentBackend>,
    scope: Option<Arc<TransactionScope>>,
    /// Documents read in this session, with the version observed
    loaded: FxHashMap<DocumentId, LoadedDocument>,
    /// Buffered writes in the order they were first proposed
    pending: Vec<PendingOperation>,
    status: SessionStatus,
}

impl Session {
    /// Open a session that applies its writes directly on commit
    pub fn open(backend: Arc<dyn DocumentBackend>) -> Self {
        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        debug!(target: "docstore::session", session = id, "Session opened");
        Session {
            id,
            backend,
            scope: None,
            loaded: FxHashMap::default(),
            pending: Vec::new(),
            status: SessionStatus::Open,
        }
    }

    /// Open a session whose commit only prepares writes for `scope`
    ///
    /// # Errors
    ///
    /// `Lifecycle` if the scope has already completed or rolled back.
    pub fn enlisted(backend: Arc<dyn DocumentBackend>, scope: Arc<TransactionScope>) -> Result<Self> {
        scope.ensure_active()?;
        let mut session = Self::open(backend);
        debug!(target: "docstore::session", session = session.id, scope = scope.id(), "Session enlisted");
        session.scope = Some(scope);
        Ok(session)
    }

    /// Session identifier, unique within the process
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Current lifecycle status
    pub fn status(&self) -> &SessionStatus {
        &self.status
    }

    /// Buffered writes, in proposal order
    pub fn pending_operations(&self) -> &[PendingOperation] {
        &self.pending
    }

    /// Version captured when `id` was loaded in this session
    pub fn read_version(&self, id: &DocumentId) -> Option<Version> {
        self.loaded.get(id).map(|doc| doc.version)
    }

    fn ensure_open(&self) -> Result<()> {
        match &self.status {
            SessionStatus::Open => Ok(()),
            SessionStatus::Committed => Err(DocStoreError::lifecycle(format!(
                "session {} already committed",
                self.id
            ))),
            SessionStatus::Aborted { reason } => Err(DocStoreError::lifecycle(format!(
                "session {} aborted: {}",
                self.id, reason
            ))),
        }
    }

    fn pending_index(&self, id: &DocumentId) -> Option<usize> {
        self.pending.iter().position(|op| op.id == *id)
    }

    /// Add or replace the buffered write for `op.id`
    fn propose(&mut self, op: PendingOperation) {
        match self.pending_index(&op.id) {
            Some(index) => self.pending[index] = op,
            None => self.pending.push(op),
        }
    }

    /// Load a document and capture its version
    ///
    /// A document loaded earlier in this session is served from the session
    /// without another backend read, and keeps the version captured first.
    /// Buffered writes are visible to later loads.
    ///
    /// # Errors
    ///
    /// `NotFound` if the document does not exist, was deleted, or is
    /// pending deletion in this session.
    pub fn load(&mut self, id: &DocumentId) -> Result<Payload> {
        self.ensure_open()?;

        if let Some(op) = self.pending.iter().find(|op| op.id == *id) {
            return match &op.change {
                RecordChange::Put(payload) => Ok(payload.clone()),
                RecordChange::Delete => Err(DocStoreError::NotFound { id: *id }),
            };
        }

        if let Some(doc) = self.loaded.get(id) {
            return Ok(doc.payload.clone());
        }

        let record = self.backend.get(id)?;
        debug!(target: "docstore::session", session = self.id, %id, version = %record.version, "Document loaded");
        self.loaded.insert(
            *id,
            LoadedDocument {
                version: record.version,
                payload: record.payload.clone(),
            },
        );
        Ok(record.payload)
    }

    /// Buffer a delete of a previously loaded document
    ///
    /// Deleting a document created earlier in this session cancels the
    /// creation instead.
    ///
    /// # Errors
    ///
    /// `Precondition` if the document was not loaded in this session or is
    /// already pending deletion.
    pub fn delete(&mut self, id: &DocumentId) -> Result<()> {
        self.ensure_open()?;

        if let Some(index) = self.pending_index(id) {
            let op = &self.pending[index];
            if op.change.is_delete() {
                return Err(DocStoreError::precondition(*id, "already pending deletion"));
            }
            if op.expected.is_zero() && !self.loaded.contains_key(id) {
                self.pending.remove(index);
                debug!(target: "docstore::session", session = self.id, %id, "Pending creation cancelled");
                return Ok(());
            }
        }

        let expected = self
            .read_version(id)
            .ok_or_else(|| DocStoreError::precondition(*id, "document must be loaded before it can be deleted"))?;

        self.propose(PendingOperation {
            id: *id,
            expected,
            change: RecordChange::Delete,
        });
        debug!(target: "docstore::session", session = self.id, %id, %expected, "Delete buffered");
        Ok(())
    }

    /// Buffer a replacement payload for a previously loaded document
    ///
    /// # Errors
    ///
    /// `Precondition` if the document was not loaded in this session or is
    /// pending deletion.
    pub fn update(&mut self, id: &DocumentId, payload: Payload) -> Result<()> {
        self.ensure_open()?;

        if let Some(index) = self.pending_index(id) {
            if self.pending[index].change.is_delete() {
                return Err(DocStoreError::precondition(*id, "document is pending deletion"));
            }
        }

        let expected = self
            .read_version(id)
            .ok_or_else(|| DocStoreError::precondition(*id, "document must be loaded before it can be updated"))?;

        self.propose(PendingOperation {
            id: *id,
            expected,
            change: RecordChange::Put(payload),
        });
        Ok(())
    }

    /// Buffer a new document under a fresh identity
    pub fn store(&mut self, payload: Payload) -> Result<DocumentId> {
        let id = DocumentId::new();
        self.store_with_id(id, payload)?;
        Ok(id)
    }

    /// Buffer a document under a caller-chosen identity
    ///
    /// If `id` was loaded in this session this behaves like [`update`](Self::update);
    /// otherwise the commit requires that `id` has never been written.
    pub fn store_with_id(&mut self, id: DocumentId, payload: Payload) -> Result<()> {
        self.ensure_open()?;

        if self.loaded.contains_key(&id) {
            return self.update(&id, payload);
        }

        self.propose(PendingOperation {
            id,
            expected: Version::ZERO,
            change: RecordChange::Put(payload),
        });
        debug!(target: "docstore::session", session = self.id, %id, "New document buffered");
        Ok(())
    }

    /// Validate and apply (or prepare) every buffered write
    ///
    /// Writes are checked in proposal order. The first conflict aborts the
    /// session and is returned; writes to other documents that were
    /// already applied stay applied.
    ///
    /// # Errors
    ///
    /// `Conflict` if another writer changed a document since it was loaded,
    /// `Lifecycle` if the session (or its scope) has terminated.
    pub fn commit(&mut self) -> Result<CommitOutcome> {
        self.ensure_open()?;
        let operations = std::mem::take(&mut self.pending);

        let result = match self.scope.clone() {
            Some(scope) => self.prepare_into(&scope, &operations),
            None => self.apply(&operations),
        };

        match result {
            Ok(outcome) => {
                self.status = SessionStatus::Committed;
                debug!(
                    target: "docstore::session",
                    session = self.id,
                    operations = operations.len(),
                    enlisted = self.scope.is_some(),
                    "Session committed"
                );
                Ok(outcome)
            }
            Err(e) => {
                if let DocStoreError::Conflict {
                    id,
                    expected,
                    actual,
                    reason,
                } = &e
                {
                    warn!(
                        target: "docstore::session",
                        session = self.id,
                        %id,
                        %expected,
                        %actual,
                        %reason,
                        "Commit lost optimistic concurrency check"
                    );
                }
                self.status = SessionStatus::Aborted {
                    reason: e.to_string(),
                };
                Err(e)
            }
        }
    }

    fn apply(&self, operations: &[PendingOperation]) -> Result<CommitOutcome> {
        let mut versions = Vec::with_capacity(operations.len());
        for op in operations {
            let version = self
                .backend
                .compare_and_swap(&op.id, op.expected, op.change.clone())?;
            versions.push((op.id, version));
        }
        Ok(CommitOutcome::Applied { versions })
    }

    fn prepare_into(
        &self,
        scope: &TransactionScope,
        operations: &[PendingOperation],
    ) -> Result<CommitOutcome> {
        let mut prepared: Vec<PreparedWrite> = Vec::with_capacity(operations.len());
        for op in operations {
            match self.backend.prepare(&op.id, op.expected, op.change.clone()) {
                Ok(write) => prepared.push(write),
                Err(e) => {
                    for write in &prepared {
                        self.backend.release_prepared(write);
                    }
                    return Err(e);
                }
            }
        }

        let count = prepared.len();
        scope.enlist(prepared)?;
        Ok(CommitOutcome::Prepared { operations: count })
    }

    /// Discard buffered writes and terminate the session
    pub fn abort(&mut self) -> Result<()> {
        self.ensure_open()?;
        let discarded = self.pending.len();
        self.pending.clear();
        self.status = SessionStatus::Aborted {
            reason: "aborted by caller".to_string(),
        };
        debug!(target: "docstore::session", session = self.id, discarded, "Session aborted");
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.status.is_open() && !self.pending.is_empty() {
            debug!(
                target: "docstore::session",
                session = self.id,
                discarded = self.pending.len(),
                "Open session dropped; buffered writes discarded"
            );
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("status", &self.status)
            .field("enlisted", &self.scope.is_some())
            .field("loaded", &self.loaded.len())
            .field("pending", &self.pending.len())
            .finish()
    }
}
