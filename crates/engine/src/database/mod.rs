//! Store handle and session factory
//!
//! [`DocumentStore`] is the explicit, per-scenario replacement for a
//! process-wide store instance. It owns one [`ShardedStore`] built from a
//! [`StoreConfig`] and hands out sessions and transaction scopes bound to
//! it. Cloning the handle shares the underlying store.
//!
//! ## Example
//!
//! ```text
//! let store = DocumentStore::in_memory();
//! let id = store.insert(json!({"name": "demo"}))?;
//!
//! let mut session = store.open_session();
//! session.load(&id)?;
//! session.delete(&id)?;
//! session.commit()?;
//! ```

pub mod config;

pub use config::{StoreConfig, CONFIG_FILE_NAME, DEFAULT_BARRIER_TIMEOUT_MS};

use docstore_concurrency::{Session, TransactionScope};
use docstore_core::{DocumentBackend, DocumentId, Payload, Result};
use docstore_storage::ShardedStore;
use std::sync::Arc;
use tracing::info;

// ============================================================================
// Persistence Mode
// ============================================================================

/// Where records live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistenceMode {
    /// Nothing written to disk; data lost when the last handle drops
    Ephemeral,
    /// Commit log on disk, replayed on open
    CommitLog,
}

// ============================================================================
// DocumentStore
// ============================================================================

/// Handle to one document store instance
#[derive(Clone)]
pub struct DocumentStore {
    config: StoreConfig,
    backend: Arc<ShardedStore>,
}

impl DocumentStore {
    /// Open a store described by `config`
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if the config fails validation; I/O or `Corruption`
    /// errors while replaying a persistent store's commit log.
    pub fn open(config: StoreConfig) -> Result<Self> {
        config.validate()?;

        let backend = match (&config.storage_path, config.persistent) {
            (Some(path), true) => ShardedStore::open(path)?,
            _ => ShardedStore::new(),
        };

        info!(
            target: "docstore::store",
            persistent = config.persistent,
            documents = backend.len(),
            "Document store opened"
        );

        Ok(DocumentStore {
            config,
            backend: Arc::new(backend),
        })
    }

    /// Fresh ephemeral store with default settings
    pub fn in_memory() -> Self {
        DocumentStore {
            config: StoreConfig::in_memory(),
            backend: Arc::new(ShardedStore::new()),
        }
    }

    /// Configuration this store was opened with
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Persistence mode in effect
    pub fn persistence_mode(&self) -> PersistenceMode {
        if self.backend.is_persistent() {
            PersistenceMode::CommitLog
        } else {
            PersistenceMode::Ephemeral
        }
    }

    /// Concrete storage, for inspection
    pub fn storage(&self) -> &Arc<ShardedStore> {
        &self.backend
    }

    /// Storage behind the backend contract
    pub fn backend(&self) -> Arc<dyn DocumentBackend> {
        self.backend.clone()
    }

    /// Open a session that applies writes on commit
    pub fn open_session(&self) -> Session {
        Session::open(self.backend())
    }

    /// Begin a transaction scope on this store
    pub fn begin_scope(&self) -> Arc<TransactionScope> {
        Arc::new(TransactionScope::new(self.backend()))
    }

    /// Open a session whose commit prepares writes for `scope`
    ///
    /// # Errors
    ///
    /// `Lifecycle` if the scope already completed or rolled back.
    pub fn open_session_in(&self, scope: &Arc<TransactionScope>) -> Result<Session> {
        Session::enlisted(self.backend(), Arc::clone(scope))
    }

    /// Store a new document in its own session and return its identity
    pub fn insert(&self, payload: Payload) -> Result<DocumentId> {
        let mut session = self.open_session();
        let id = session.store(payload)?;
        session.commit()?;
        Ok(id)
    }

    /// Flush the commit log, if any
    pub fn flush(&self) -> Result<()> {
        self.backend.flush()
    }
}

impl std::fmt::Debug for DocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentStore")
            .field("persistence", &self.persistence_mode())
            .field("documents", &self.backend.len())
            .field("version", &self.backend.current_version())
            .finish()
    }
}
