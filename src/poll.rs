//! Convergence polling
//!
//! Re-observes provider state until a predicate holds or a timeout elapses.
//!
//! # Example
//!
//! ```ignore
//! use nulecule_harness::poll::{converge, PollPolicy};
//! use std::time::Duration;
//!
//! let policy = PollPolicy::new(Duration::from_secs(360));
//! let result = converge(ObjectKind::Pod, &policy,
//!     || adapter::lookup(adapter, ObjectKind::Pod, "wordpress"),
//!     |pods| pods.contains("wordpress"),
//! ).await?;
//! assert!(result.satisfied);
//! ```
//!
//! The first observation always happens, even with a zero timeout. The pause
//! before the last observation is shortened so it lands exactly on the
//! timeout; an observation at elapsed == timeout is the last one allowed.

use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, trace};

use crate::adapter::AdapterError;
use crate::record::{ObjectKind, Snapshot};

/// How long to keep polling and how long to pause between observations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub timeout: Duration,
    /// Pause between observations. Zero means back-to-back observations.
    pub interval: Duration,
}

impl PollPolicy {
    /// Policy with the given timeout and a one second interval
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            interval: Duration::from_secs(1),
        }
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Pause before the next observation, clipped so it lands on the deadline
    fn pause(&self, elapsed: Duration) -> Duration {
        self.interval.min(self.timeout.saturating_sub(elapsed))
    }
}

/// Outcome of a polling run
#[derive(Debug, Clone)]
pub struct PollResult<T> {
    pub satisfied: bool,
    pub attempts: u32,
    pub elapsed: Duration,
    /// Last observation, `None` only if nothing was observed
    pub last: Option<T>,
}

/// Observe with `fetch` until `predicate` holds or the policy times out
///
/// Errors from `fetch` end the run immediately: only the predicate is
/// retried, never a failed observation.
pub async fn poll_until<T, E, F, Fut, P>(
    policy: &PollPolicy,
    mut fetch: F,
    predicate: P,
) -> Result<PollResult<T>, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&T) -> bool,
{
    let start = Instant::now();
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        let observed = fetch().await?;
        let satisfied = predicate(&observed);
        let elapsed = start.elapsed();
        trace!(attempts, ?elapsed, satisfied, "poll tick");

        if satisfied || elapsed >= policy.timeout {
            return Ok(PollResult {
                satisfied,
                attempts,
                elapsed,
                last: Some(observed),
            });
        }

        let pause = policy.pause(elapsed);
        if !pause.is_zero() {
            sleep(pause).await;
        }
    }
}

/// Poll a snapshot of `kind` until `predicate` holds
///
/// A "not found" failure from `fetch` is an observation of absence: it is
/// turned into an empty snapshot and handed to the predicate. Every other
/// adapter error ends the run.
pub async fn converge<F, Fut, P>(
    kind: ObjectKind,
    policy: &PollPolicy,
    mut fetch: F,
    predicate: P,
) -> Result<PollResult<Snapshot>, AdapterError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Snapshot, AdapterError>>,
    P: Fn(&Snapshot) -> bool,
{
    let result = poll_until(
        policy,
        || {
            let observation = fetch();
            async move {
                match observation.await {
                    Err(AdapterError::NotFound { .. }) => Ok(Snapshot::empty(kind)),
                    other => other,
                }
            }
        },
        predicate,
    )
    .await?;

    debug!(
        %kind,
        satisfied = result.satisfied,
        attempts = result.attempts,
        elapsed = ?result.elapsed,
        "convergence finished"
    );
    Ok(result)
}
