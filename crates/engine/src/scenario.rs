//! Race scenarios and the runner that executes them
//!
//! A run seeds one document in a fresh store, starts `workers` concurrent
//! [`DeleteWorkflow`]s against it, and collects what each worker observed.
//! [`ScenarioReport::check_exclusivity`] then verifies the optimistic
//! concurrency outcome: exactly one worker committed, every other worker
//! lost with a conflict, and the store holds a tombstone stamped with the
//! winner's version.
//!
//! | Scenario | Driver | Transaction scope |
//! |----------|--------|-------------------|
//! | `concurrent-deletes` | blocking | no |
//! | `concurrent-deletes-in-scope` | blocking | yes |
//! | `concurrent-deletes-async` | suspending | no |
//! | `concurrent-deletes-in-scope-async` | suspending | yes (experimental) |

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use docstore_core::{DocStoreError, DocumentId, Result, Version, VersionedRecord};
use rand::Rng;
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};

use crate::database::{DocumentStore, StoreConfig};
use crate::workflow::{BlockingDriver, Checkpoints, DeleteWorkflow, SuspendingDriver, WorkerOutcome};

/// Upper bound for the random delay applied before each worker starts
const MAX_START_JITTER: Duration = Duration::from_micros(200);

static NEXT_RUN: AtomicU64 = AtomicU64::new(1);

// ============================================================================
// Scenario
// ============================================================================

/// Named race configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scenario {
    /// Blocking workers, plain sessions
    ConcurrentDeletes,
    /// Blocking workers, each session enlisted in its own scope
    ConcurrentDeletesInScope,
    /// Suspending workers, plain sessions
    ConcurrentDeletesAsync,
    /// Suspending workers inside scopes
    ///
    /// Deferred commits combined with suspending execution are only
    /// validated against the in-memory backend.
    ConcurrentDeletesInScopeAsync,
}

impl Scenario {
    /// Every scenario, in a stable order
    pub fn all() -> &'static [Scenario] {
        &[
            Scenario::ConcurrentDeletes,
            Scenario::ConcurrentDeletesInScope,
            Scenario::ConcurrentDeletesAsync,
            Scenario::ConcurrentDeletesInScopeAsync,
        ]
    }

    /// Stable kebab-case name
    pub fn name(&self) -> &'static str {
        match self {
            Scenario::ConcurrentDeletes => "concurrent-deletes",
            Scenario::ConcurrentDeletesInScope => "concurrent-deletes-in-scope",
            Scenario::ConcurrentDeletesAsync => "concurrent-deletes-async",
            Scenario::ConcurrentDeletesInScopeAsync => "concurrent-deletes-in-scope-async",
        }
    }

    /// Workers are tokio tasks rather than threads
    pub fn is_suspending(&self) -> bool {
        matches!(
            self,
            Scenario::ConcurrentDeletesAsync | Scenario::ConcurrentDeletesInScopeAsync
        )
    }

    /// Each worker wraps its session in a transaction scope
    pub fn is_scoped(&self) -> bool {
        matches!(
            self,
            Scenario::ConcurrentDeletesInScope | Scenario::ConcurrentDeletesInScopeAsync
        )
    }

    /// Needs backend-specific validation before it can be relied on
    pub fn is_experimental(&self) -> bool {
        matches!(self, Scenario::ConcurrentDeletesInScopeAsync)
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Scenario name that matched nothing
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown scenario '{0}'")]
pub struct UnknownScenario(pub String);

impl FromStr for Scenario {
    type Err = UnknownScenario;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('_', "-");
        Scenario::all()
            .iter()
            .copied()
            .find(|scenario| scenario.name() == wanted)
            .ok_or_else(|| UnknownScenario(s.to_string()))
    }
}

// ============================================================================
// Report
// ============================================================================

/// Ways a finished race can break the optimistic concurrency guarantee
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExclusivityViolation {
    /// Every worker lost
    #[error("no worker committed the delete")]
    NoWinner,
    /// More than one delete was applied
    #[error("{0} workers committed the same delete")]
    MultipleWinners(usize),
    /// The document is still live after a reported commit
    #[error("document still live after the winning commit")]
    DocumentSurvived,
    /// The stored tombstone does not carry the winner's version
    #[error("tombstone version {found:?} does not match winning version {expected}")]
    VersionMismatch {
        /// Version the winner reported
        expected: Version,
        /// Version found in the store
        found: Option<Version>,
    },
}

/// What one run observed
#[derive(Debug, Clone)]
pub struct ScenarioReport {
    /// Scenario that ran
    pub scenario: Scenario,
    /// Document the workers raced on
    pub document: DocumentId,
    /// Version the document had before the race
    pub seeded_version: Version,
    /// Per-worker outcome, indexed by worker
    pub outcomes: Vec<WorkerOutcome>,
    /// Stored record after every worker finished
    pub final_record: Option<VersionedRecord>,
    /// Wall time of the race, seeding excluded
    pub elapsed: Duration,
}

impl ScenarioReport {
    /// Number of workers whose delete was applied
    pub fn winners(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_committed()).count()
    }

    /// Number of workers that lost with a conflict
    pub fn losers(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, WorkerOutcome::LostRace))
            .count()
    }

    /// Version assigned by the winning delete, if exactly one worker won
    pub fn winning_version(&self) -> Option<Version> {
        let mut committed = self.outcomes.iter().filter_map(|o| match o {
            WorkerOutcome::Committed(v) => Some(*v),
            WorkerOutcome::LostRace => None,
        });
        match (committed.next(), committed.next()) {
            (Some(v), None) => Some(v),
            _ => None,
        }
    }

    /// Verify that exactly one worker won and the store agrees with it
    pub fn check_exclusivity(&self) -> std::result::Result<(), ExclusivityViolation> {
        let winners = self.winners();
        if winners == 0 {
            return Err(ExclusivityViolation::NoWinner);
        }
        if winners > 1 {
            return Err(ExclusivityViolation::MultipleWinners(winners));
        }

        let expected = self
            .winning_version()
            .ok_or(ExclusivityViolation::MultipleWinners(winners))?;
        match &self.final_record {
            Some(record) if record.exists => Err(ExclusivityViolation::DocumentSurvived),
            Some(record) if record.version == expected => Ok(()),
            other => Err(ExclusivityViolation::VersionMismatch {
                expected,
                found: other.as_ref().map(|r| r.version),
            }),
        }
    }
}

// ============================================================================
// Runner
// ============================================================================

/// Executes scenarios against fresh stores
///
/// With a persistent config every run writes its commit log to a private
/// directory under `storage_path`, deleted once the run's report is built.
#[derive(Debug, Clone)]
pub struct ScenarioRunner {
    config: StoreConfig,
    workers: usize,
    jitter: bool,
}

impl ScenarioRunner {
    /// Runner with two workers and start jitter enabled
    pub fn new(config: StoreConfig) -> Self {
        ScenarioRunner {
            config,
            workers: 2,
            jitter: true,
        }
    }

    /// Set the number of racing workers
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Enable or disable the random delay before each worker starts
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Store configuration used for every run
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Number of racing workers
    pub fn workers(&self) -> usize {
        self.workers
    }

    fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(DocStoreError::InvalidConfig(
                "scenario needs at least one worker".to_string(),
            ));
        }
        self.config.validate()
    }

    /// Open a store, seed the race target, and build each worker's workflow
    ///
    /// Persistent runs get their own commit log directory under
    /// `storage_path`, removed when the returned [`RunDirectory`] drops.
    fn setup(
        &self,
        scenario: Scenario,
    ) -> Result<(Option<RunDirectory>, DocumentStore, Vec<DeleteWorkflow>)> {
        self.validate()?;
        let mut config = self.config.clone();
        let run_dir = match (&config.storage_path, config.persistent) {
            (Some(base), true) => Some(RunDirectory::under(base)),
            _ => None,
        };
        if let Some(dir) = &run_dir {
            config.storage_path = Some(dir.path().to_path_buf());
        }

        let store = DocumentStore::open(config)?;
        let document = store.insert(json!({"name": "race target", "scenario": scenario.name()}))?;

        let checkpoints = Checkpoints::new(self.workers);
        let workflows = (0..self.workers)
            .map(|worker| DeleteWorkflow {
                worker,
                store: store.clone(),
                document,
                checkpoints: checkpoints.clone(),
                scoped: scenario.is_scoped(),
            })
            .collect();
        Ok((run_dir, store, workflows))
    }

    fn start_delay(&self) -> Option<Duration> {
        if !self.jitter {
            return None;
        }
        let micros = rand::thread_rng().gen_range(0..=MAX_START_JITTER.as_micros() as u64);
        Some(Duration::from_micros(micros))
    }

    /// Run `scenario` once from synchronous code
    ///
    /// Suspending scenarios build their own multi-thread runtime; do not
    /// call this from inside a tokio runtime (use [`run_async`](Self::run_async)).
    ///
    /// # Errors
    ///
    /// Store setup failures and any worker error other than a conflict.
    pub fn run(&self, scenario: Scenario) -> Result<ScenarioReport> {
        if scenario.is_suspending() {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(self.workers.max(2))
                .enable_all()
                .build()?;
            runtime.block_on(self.run_suspending(scenario))
        } else {
            self.run_blocking(scenario)
        }
    }

    /// Run `scenario` once from inside a tokio runtime
    ///
    /// Blocking scenarios are moved onto the blocking thread pool.
    pub async fn run_async(&self, scenario: Scenario) -> Result<ScenarioReport> {
        if scenario.is_suspending() {
            self.run_suspending(scenario).await
        } else {
            let runner = self.clone();
            match tokio::task::spawn_blocking(move || runner.run_blocking(scenario)).await {
                Ok(report) => report,
                Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                Err(e) => Err(DocStoreError::lifecycle(format!("scenario task cancelled: {}", e))),
            }
        }
    }

    /// Run `scenario` `iterations` times, stopping at the first error
    pub fn run_repeated(&self, scenario: Scenario, iterations: usize) -> Result<Vec<ScenarioReport>> {
        (0..iterations).map(|_| self.run(scenario)).collect()
    }

    fn run_blocking(&self, scenario: Scenario) -> Result<ScenarioReport> {
        let (_run_dir, store, workflows) = self.setup(scenario)?;
        let document = workflows[0].document;
        let seeded_version = store.storage().current_version();
        let driver = BlockingDriver::new(self.config.barrier_timeout());
        let start = Instant::now();

        let handles: Vec<_> = workflows
            .into_iter()
            .map(|workflow| {
                let delay = self.start_delay();
                thread::spawn(move || -> Result<WorkerOutcome> {
                    if let Some(delay) = delay {
                        thread::sleep(delay);
                    }
                    let runtime = tokio::runtime::Builder::new_current_thread().build()?;
                    runtime.block_on(workflow.run(&driver))
                })
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.join() {
                Ok(result) => results.push(result),
                Err(panic) => std::panic::resume_unwind(panic),
            }
        }

        self.finish(scenario, &store, document, seeded_version, results, start.elapsed())
    }

    async fn run_suspending(&self, scenario: Scenario) -> Result<ScenarioReport> {
        let (_run_dir, store, workflows) = self.setup(scenario)?;
        let document = workflows[0].document;
        let seeded_version = store.storage().current_version();
        let driver = SuspendingDriver::new(self.config.barrier_timeout());
        let start = Instant::now();

        let tasks: Vec<_> = workflows
            .into_iter()
            .map(|workflow| {
                let delay = self.start_delay();
                tokio::spawn(async move {
                    if let Some(delay) = delay {
                        tokio::time::sleep(delay).await;
                    }
                    workflow.run(&driver).await
                })
            })
            .collect();

        let mut results = Vec::with_capacity(tasks.len());
        for task in tasks {
            match task.await {
                Ok(result) => results.push(result),
                Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                Err(e) => {
                    results.push(Err(DocStoreError::lifecycle(format!("worker task cancelled: {}", e))))
                }
            }
        }

        self.finish(scenario, &store, document, seeded_version, results, start.elapsed())
    }

    fn finish(
        &self,
        scenario: Scenario,
        store: &DocumentStore,
        document: DocumentId,
        seeded_version: Version,
        results: Vec<Result<WorkerOutcome>>,
        elapsed: Duration,
    ) -> Result<ScenarioReport> {
        let outcomes = results.into_iter().collect::<Result<Vec<_>>>()?;
        store.flush()?;

        let report = ScenarioReport {
            scenario,
            document,
            seeded_version,
            outcomes,
            final_record: store.storage().record(&document),
            elapsed,
        };

        match report.check_exclusivity() {
            Ok(()) => info!(
                target: "docstore::scenario",
                scenario = scenario.name(),
                winners = report.winners(),
                losers = report.losers(),
                elapsed_us = report.elapsed.as_micros() as u64,
                "Scenario finished"
            ),
            Err(violation) => warn!(
                target: "docstore::scenario",
                scenario = scenario.name(),
                winners = report.winners(),
                losers = report.losers(),
                %violation,
                "Scenario violated exclusivity"
            ),
        }
        Ok(report)
    }
}

/// Scratch commit log directory for one persistent run
#[derive(Debug)]
struct RunDirectory {
    path: PathBuf,
}

impl RunDirectory {
    fn under(base: &Path) -> Self {
        let name = format!("run-{}-{}", process::id(), NEXT_RUN.fetch_add(1, Ordering::Relaxed));
        RunDirectory {
            path: base.join(name),
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunDirectory {
    fn drop(&mut self) {
        match fs::remove_dir_all(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                target: "docstore::scenario",
                path = %self.path.display(),
                error = %e,
                "Failed to remove run directory"
            ),
        }
    }
}
