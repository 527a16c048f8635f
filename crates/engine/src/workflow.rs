//! The concurrent-delete workflow and the drivers that execute it
//!
//! The workflow is written once, as an `async fn`, against [`StepDriver`].
//! A driver decides how each step runs:
//!
//! - [`BlockingDriver`]: steps run inline and barrier waits park the
//!   thread. Each worker gets its own OS thread and a current-thread
//!   runtime to drive the (never actually pending) future.
//! - [`SuspendingDriver`]: each step is preceded by a yield to the
//!   scheduler and barrier waits suspend the task. Workers are tokio tasks
//!   on a multi-thread runtime.
//!
//! ## Steps
//!
//! ```text
//! open session (in a scope, if scoped)
//! load ── rendezvous(loaded) ── delete ── rendezvous(deleted) ── commit ── [complete scope]
//! ```
//!
//! A conflict at commit is the expected outcome for the losing worker and
//! is recovered here as [`WorkerOutcome::LostRace`]. Every other error
//! propagates.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use docstore_concurrency::ConcurrencyBarrier;
use docstore_core::{DocStoreError, DocumentId, Result, Version};
use tracing::{debug, info};

use crate::database::DocumentStore;

// ============================================================================
// Drivers
// ============================================================================

/// Execution capability the workflow is generic over
pub trait StepDriver: Send + Sync {
    /// Label used in log lines
    fn name(&self) -> &'static str;

    /// Run one store call
    fn step<T, F>(&self, f: F) -> impl Future<Output = Result<T>> + Send
    where
        F: FnOnce() -> Result<T> + Send,
        T: Send;

    /// Arrive at `barrier` and wait for the other participants
    fn rendezvous(&self, barrier: &ConcurrencyBarrier) -> impl Future<Output = Result<()>> + Send;
}

/// Thread-per-worker execution with blocking barrier waits
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockingDriver {
    barrier_timeout: Option<Duration>,
}

impl BlockingDriver {
    /// Create a driver whose barrier waits give up after `barrier_timeout`
    pub fn new(barrier_timeout: Option<Duration>) -> Self {
        BlockingDriver { barrier_timeout }
    }
}

impl StepDriver for BlockingDriver {
    fn name(&self) -> &'static str {
        "blocking"
    }

    fn step<T, F>(&self, f: F) -> impl Future<Output = Result<T>> + Send
    where
        F: FnOnce() -> Result<T> + Send,
        T: Send,
    {
        std::future::ready(f())
    }

    fn rendezvous(&self, barrier: &ConcurrencyBarrier) -> impl Future<Output = Result<()>> + Send {
        let waited = match self.barrier_timeout {
            Some(timeout) => barrier.signal_and_wait_timeout(timeout),
            None => barrier.signal_and_wait(),
        };
        std::future::ready(waited.map(|_| ()))
    }
}

/// Task-per-worker execution with a suspension point before every step
#[derive(Debug, Clone, Copy, Default)]
pub struct SuspendingDriver {
    barrier_timeout: Option<Duration>,
}

impl SuspendingDriver {
    /// Create a driver whose barrier waits give up after `barrier_timeout`
    pub fn new(barrier_timeout: Option<Duration>) -> Self {
        SuspendingDriver { barrier_timeout }
    }
}

impl StepDriver for SuspendingDriver {
    fn name(&self) -> &'static str {
        "suspending"
    }

    fn step<T, F>(&self, f: F) -> impl Future<Output = Result<T>> + Send
    where
        F: FnOnce() -> Result<T> + Send,
        T: Send,
    {
        async move {
            tokio::task::yield_now().await;
            f()
        }
    }

    fn rendezvous(&self, barrier: &ConcurrencyBarrier) -> impl Future<Output = Result<()>> + Send {
        let timeout = self.barrier_timeout;
        async move {
            barrier.signal_and_wait_async(timeout).await?;
            Ok(())
        }
    }
}

// ============================================================================
// Workflow
// ============================================================================

/// How one worker's race ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerOutcome {
    /// The worker's delete was applied with this version
    Committed(Version),
    /// The worker's commit was rejected with a conflict
    LostRace,
}

impl WorkerOutcome {
    /// Whether this worker's delete became visible
    pub fn is_committed(&self) -> bool {
        matches!(self, WorkerOutcome::Committed(_))
    }
}

/// Shared checkpoints for one race
#[derive(Debug, Clone)]
pub struct Checkpoints {
    /// Every worker has loaded the document
    pub loaded: Arc<ConcurrencyBarrier>,
    /// Every worker has buffered its delete
    pub deleted: Arc<ConcurrencyBarrier>,
}

impl Checkpoints {
    /// Fresh pair of barriers for `workers` participants
    pub fn new(workers: usize) -> Self {
        Checkpoints {
            loaded: Arc::new(ConcurrencyBarrier::named("loaded", workers)),
            deleted: Arc::new(ConcurrencyBarrier::named("deleted", workers)),
        }
    }
}

/// One worker's load, delete, commit sequence against a shared document
#[derive(Debug, Clone)]
pub struct DeleteWorkflow {
    /// Worker index, for logs
    pub worker: usize,
    /// Store every worker races on
    pub store: DocumentStore,
    /// Document every worker tries to delete
    pub document: DocumentId,
    /// Barriers shared by all workers of the race
    pub checkpoints: Checkpoints,
    /// Wrap the session in its own transaction scope
    pub scoped: bool,
}

impl DeleteWorkflow {
    /// Run the workflow with `driver`
    ///
    /// # Errors
    ///
    /// Anything other than a commit conflict: a missing document, a barrier
    /// timeout, or a lifecycle error.
    pub async fn run<D: StepDriver>(&self, driver: &D) -> Result<WorkerOutcome> {
        let id = self.document;
        let scope = if self.scoped {
            Some(self.store.begin_scope())
        } else {
            None
        };
        let mut session = match &scope {
            Some(scope) => self.store.open_session_in(scope)?,
            None => self.store.open_session(),
        };

        debug!(
            target: "docstore::scenario",
            worker = self.worker,
            driver = driver.name(),
            scoped = self.scoped,
            %id,
            "Worker started"
        );

        driver.step(|| session.load(&id).map(|_| ())).await?;
        driver.rendezvous(&self.checkpoints.loaded).await?;

        driver.step(|| session.delete(&id)).await?;
        driver.rendezvous(&self.checkpoints.deleted).await?;

        let committed = match driver.step(|| session.commit()).await {
            Ok(outcome) => outcome,
            Err(e) if e.is_conflict() => {
                info!(target: "docstore::scenario", worker = self.worker, %id, "Worker lost the race");
                return Ok(WorkerOutcome::LostRace);
            }
            Err(e) => return Err(e),
        };

        let version = match scope {
            Some(scope) => {
                let versions = driver.step(|| scope.complete()).await?;
                versions
                    .into_iter()
                    .find(|(doc, _)| *doc == id)
                    .map(|(_, version)| version)
            }
            None => committed.version_of(&id),
        };

        let version = version.ok_or_else(|| {
            DocStoreError::lifecycle(format!("commit for {} reported no version", id))
        })?;
        info!(target: "docstore::scenario", worker = self.worker, %id, %version, "Worker committed delete");
        Ok(WorkerOutcome::Committed(version))
    }
}
