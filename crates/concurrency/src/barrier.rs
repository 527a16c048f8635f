//! Counting rendezvous for deterministic interleavings
//!
//! A `ConcurrencyBarrier` holds every participant until the configured
//! number of them has arrived, then releases all of them at once. Test
//! workflows place one barrier after "loaded" and another after "deleted",
//! which forces every load to happen before any delete and every delete
//! before any commit.
//!
//! The barrier is one-shot: after release, further arrivals fail with
//! `BarrierOverrun` until [`ConcurrencyBarrier::reset`] re-arms it.
//!
//! Blocking waiters park on a `parking_lot::Condvar`; suspending waiters
//! park on a `tokio::sync::Notify`. Both are woken by the same release, so
//! threads and tasks can meet at one barrier.

use docstore_core::{DocStoreError, Result};
use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::{debug, warn};

/// Returned to every participant once the barrier releases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarrierWaitResult {
    is_leader: bool,
}

impl BarrierWaitResult {
    /// True for exactly one participant: the one whose arrival released the rest
    pub fn is_leader(&self) -> bool {
        self.is_leader
    }
}

#[derive(Debug, Default)]
struct BarrierState {
    arrived: usize,
    released: bool,
    /// Bumped on every release; waiters leave once it moves past their arrival
    generation: u64,
}

/// Outcome of registering an arrival
enum Arrival {
    Leader,
    Waiting { generation: u64 },
}

/// Rendezvous that releases all participants once `required` have arrived
#[derive(Debug)]
pub struct ConcurrencyBarrier {
    name: String,
    required: usize,
    state: Mutex<BarrierState>,
    condvar: Condvar,
    notify: Notify,
}

impl ConcurrencyBarrier {
    /// Create a barrier requiring `required` arrivals
    ///
    /// A quota of zero is treated as one.
    pub fn new(required: usize) -> Self {
        Self::named("barrier", required)
    }

    /// Create a barrier with a name used in log lines and errors
    pub fn named(name: impl Into<String>, required: usize) -> Self {
        ConcurrencyBarrier {
            name: name.into(),
            required: required.max(1),
            state: Mutex::new(BarrierState::default()),
            condvar: Condvar::new(),
            notify: Notify::new(),
        }
    }

    /// Checkpoint name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Quota fixed at creation
    pub fn required(&self) -> usize {
        self.required
    }

    /// Participants currently counted toward the quota
    pub fn arrived(&self) -> usize {
        self.state.lock().arrived
    }

    /// Whether the barrier has released and not been reset since
    pub fn is_released(&self) -> bool {
        self.state.lock().released
    }

    /// Re-arm a released barrier
    ///
    /// Only call this when no participant is waiting.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.arrived = 0;
        state.released = false;
        debug!(target: "docstore::barrier", barrier = %self.name, "Barrier reset");
    }

    /// Arrive and block until every participant has arrived
    ///
    /// Waits without bound. Prefer [`signal_and_wait_timeout`](Self::signal_and_wait_timeout)
    /// outside closed test environments.
    pub fn signal_and_wait(&self) -> Result<BarrierWaitResult> {
        self.wait_blocking(None)
    }

    /// Arrive and block until release or until `timeout` elapses
    ///
    /// On timeout the caller's arrival is withdrawn, so the count reflects
    /// only participants still waiting.
    pub fn signal_and_wait_timeout(&self, timeout: Duration) -> Result<BarrierWaitResult> {
        self.wait_blocking(Some(timeout))
    }

    /// Arrive and suspend the current task until release
    ///
    /// Same semantics as the blocking variants, without parking the thread.
    /// Dropping the future before release withdraws the arrival.
    pub async fn signal_and_wait_async(
        &self,
        timeout: Option<Duration>,
    ) -> Result<BarrierWaitResult> {
        let start = Instant::now();
        let generation = match self.arrive()? {
            Arrival::Leader => return Ok(BarrierWaitResult { is_leader: true }),
            Arrival::Waiting { generation } => generation,
        };
        let mut pending = PendingArrival {
            barrier: self,
            generation,
            armed: true,
        };

        let released = async {
            loop {
                let notified = self.notify.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();

                let done = self.state.lock().generation != generation;
                if done {
                    return;
                }
                notified.await;
            }
        };

        let outcome = match timeout {
            None => {
                released.await;
                Ok(BarrierWaitResult { is_leader: false })
            }
            Some(limit) => match tokio::time::timeout(limit, released).await {
                Ok(()) => Ok(BarrierWaitResult { is_leader: false }),
                Err(_) => self.withdraw(generation, start.elapsed()),
            },
        };
        pending.armed = false;
        outcome
    }

    fn arrive(&self) -> Result<Arrival> {
        let mut state = self.state.lock();
        if state.released {
            warn!(target: "docstore::barrier", barrier = %self.name, required = self.required, "Arrival after release");
            return Err(DocStoreError::BarrierOverrun {
                required: self.required,
            });
        }

        state.arrived += 1;
        if state.arrived >= self.required {
            state.released = true;
            state.generation += 1;
            self.condvar.notify_all();
            self.notify.notify_waiters();
            debug!(target: "docstore::barrier", barrier = %self.name, required = self.required, "Barrier released");
            return Ok(Arrival::Leader);
        }

        debug!(
            target: "docstore::barrier",
            barrier = %self.name,
            arrived = state.arrived,
            required = self.required,
            "Waiting at barrier"
        );
        Ok(Arrival::Waiting {
            generation: state.generation,
        })
    }

    fn wait_blocking(&self, timeout: Option<Duration>) -> Result<BarrierWaitResult> {
        let start = Instant::now();
        let generation = match self.arrive()? {
            Arrival::Leader => return Ok(BarrierWaitResult { is_leader: true }),
            Arrival::Waiting { generation } => generation,
        };

        let deadline = timeout.map(|t| start + t);
        let mut state = self.state.lock();
        while state.generation == generation {
            match deadline {
                None => self.condvar.wait(&mut state),
                Some(deadline) => {
                    let timed_out = self.condvar.wait_until(&mut state, deadline).timed_out();
                    if timed_out && state.generation == generation {
                        drop(state);
                        return self.withdraw(generation, start.elapsed());
                    }
                }
            }
        }

        Ok(BarrierWaitResult { is_leader: false })
    }

    /// Remove one arrival if the barrier has not released since it was made
    ///
    /// Returns the arrival count before removal.
    fn take_back(&self, generation: u64) -> Option<usize> {
        let mut state = self.state.lock();
        if state.generation != generation {
            return None;
        }
        let arrived = state.arrived;
        state.arrived = arrived.saturating_sub(1);
        Some(arrived)
    }

    /// Take back an arrival after a timeout, unless release won the race
    fn withdraw(&self, generation: u64, waited: Duration) -> Result<BarrierWaitResult> {
        let Some(arrived) = self.take_back(generation) else {
            return Ok(BarrierWaitResult { is_leader: false });
        };

        warn!(
            target: "docstore::barrier",
            barrier = %self.name,
            arrived,
            required = self.required,
            waited_ms = waited.as_millis() as u64,
            "Barrier wait timed out"
        );
        Err(DocStoreError::BarrierTimeout {
            arrived,
            required: self.required,
            waited,
        })
    }
}

/// Arrival of a suspended waiter; withdrawn if the wait future is dropped
struct PendingArrival<'a> {
    barrier: &'a ConcurrencyBarrier,
    generation: u64,
    armed: bool,
}

impl Drop for PendingArrival<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Some(arrived) = self.barrier.take_back(self.generation) {
            debug!(
                target: "docstore::barrier",
                barrier = %self.barrier.name,
                arrived,
                required = self.barrier.required,
                "Cancelled wait withdrawn"
            );
        }
    }
}
