//! Transaction scopes: one outcome for several sessions
//!
//! An enlisted session's `commit` validates its writes and reserves the
//! affected documents in the backend without applying anything. The
//! scope collects these prepared writes. `complete` applies them in
//! enlistment order; dropping or rolling back the scope releases them.
//!
//! Validation happens at prepare time and a reservation blocks competing
//! writers until the scope resolves, so two scopes racing on the same
//! document cannot both succeed.

use docstore_core::{DocStoreError, DocumentBackend, DocumentId, PreparedWrite, Result, Version};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

static NEXT_SCOPE_ID: AtomicU64 = AtomicU64::new(1);

/// Status of a transaction scope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeStatus {
    /// Accepting enlisted commits
    Active,
    /// Prepared writes were applied
    Completed,
    /// Prepared writes were released without applying
    RolledBack,
}

#[derive(Debug)]
struct ScopeState {
    status: ScopeStatus,
    prepared: Vec<PreparedWrite>,
}

/// Ambient unit of work spanning enlisted sessions
pub struct TransactionScope {
    id: u64,
    backend: Arc<dyn DocumentBackend>,
    state: Mutex<ScopeState>,
}

impl TransactionScope {
    /// Begin a new active scope
    pub fn new(backend: Arc<dyn DocumentBackend>) -> Self {
        let id = NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed);
        debug!(target: "docstore::scope", scope = id, "Scope started");
        TransactionScope {
            id,
            backend,
            state: Mutex::new(ScopeState {
                status: ScopeStatus::Active,
                prepared: Vec::new(),
            }),
        }
    }

    /// Scope identifier, unique within the process
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Current status
    pub fn status(&self) -> ScopeStatus {
        self.state.lock().status
    }

    /// Number of prepared writes awaiting completion
    pub fn prepared_count(&self) -> usize {
        self.state.lock().prepared.len()
    }

    pub(crate) fn ensure_active(&self) -> Result<()> {
        match self.status() {
            ScopeStatus::Active => Ok(()),
            other => Err(DocStoreError::lifecycle(format!(
                "scope {} is {:?}",
                self.id, other
            ))),
        }
    }

    /// Hand prepared writes to the scope
    ///
    /// If the scope is no longer active the writes are released and
    /// `Lifecycle` is returned.
    pub(crate) fn enlist(&self, writes: Vec<PreparedWrite>) -> Result<()> {
        let mut state = self.state.lock();
        if state.status != ScopeStatus::Active {
            let status = state.status;
            drop(state);
            for write in &writes {
                self.backend.release_prepared(write);
            }
            return Err(DocStoreError::lifecycle(format!(
                "scope {} is {:?}",
                self.id, status
            )));
        }

        debug!(target: "docstore::scope", scope = self.id, writes = writes.len(), "Writes enlisted");
        state.prepared.extend(writes);
        Ok(())
    }

    /// Apply every prepared write and end the scope
    ///
    /// Returns the new version of each written document, in enlistment
    /// order.
    ///
    /// # Errors
    ///
    /// `Lifecycle` if the scope already completed or rolled back. A backend
    /// failure while applying leaves the scope rolled back; writes applied
    /// before the failure stay applied and the rest are released.
    pub fn complete(&self) -> Result<Vec<(DocumentId, Version)>> {
        let mut state = self.state.lock();
        if state.status != ScopeStatus::Active {
            return Err(DocStoreError::lifecycle(format!(
                "scope {} is {:?}",
                self.id, state.status
            )));
        }

        let prepared = std::mem::take(&mut state.prepared);
        let mut versions = Vec::with_capacity(prepared.len());
        for (index, write) in prepared.iter().enumerate() {
            match self.backend.complete_prepared(write) {
                Ok(version) => versions.push((write.id, version)),
                Err(e) => {
                    for rest in &prepared[index..] {
                        self.backend.release_prepared(rest);
                    }
                    state.status = ScopeStatus::RolledBack;
                    return Err(e);
                }
            }
        }

        state.status = ScopeStatus::Completed;
        info!(target: "docstore::scope", scope = self.id, writes = versions.len(), "Scope completed");
        Ok(versions)
    }

    /// Release every prepared write and end the scope
    ///
    /// Rolling back a scope that already ended has no effect.
    pub fn rollback(&self) {
        let mut state = self.state.lock();
        if state.status != ScopeStatus::Active {
            return;
        }
        let prepared = std::mem::take(&mut state.prepared);
        for write in &prepared {
            self.backend.release_prepared(write);
        }
        state.status = ScopeStatus::RolledBack;
        debug!(target: "docstore::scope", scope = self.id, released = prepared.len(), "Scope rolled back");
    }
}

impl Drop for TransactionScope {
    fn drop(&mut self) {
        self.rollback();
    }
}

impl std::fmt::Debug for TransactionScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("TransactionScope")
            .field("id", &self.id)
            .field("status", &state.status)
            .field("prepared", &state.prepared.len())
            .finish()
    }
}
