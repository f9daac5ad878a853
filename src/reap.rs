//! Teardown of objects created during a test
//!
//! After a test, every tracked kind is listed again and compared with the
//! [`Baseline`]. Objects present now but absent from the baseline were
//! created by the test: each is deleted, then the harness waits until every
//! deleted object is gone from the provider's listing.
//!
//! Deletion failures are fatal. Leaving orphaned objects behind would
//! corrupt the baseline of every following test.

use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info, instrument, warn};

use crate::adapter::{snapshot, AdapterError, ProviderAdapter};
use crate::assertions::{AssertionError, Expectation};
use crate::baseline::Baseline;
use crate::poll::{converge, PollPolicy};
use crate::record::{ObjectKind, Snapshot};

/// Error type for reaping
#[derive(Debug, thiserror::Error)]
pub enum ReapError {
    /// A delete command failed
    #[error("failed to delete {kind} {key}: {source}")]
    CleanupFailure {
        kind: ObjectKind,
        key: String,
        #[source]
        source: AdapterError,
    },

    /// The post-test listing could not be taken
    #[error(transparent)]
    Snapshot(#[from] AdapterError),

    /// A deleted object did not disappear in time
    #[error(transparent)]
    Convergence(#[from] AssertionError),
}

/// Keys present in `current` that were absent from `baseline`
pub fn reap_delta(current: &Snapshot, baseline: &Snapshot) -> Vec<String> {
    current.delta(baseline)
}

/// List `kind`, diff against `baseline` and delete every new object
///
/// Returns the deleted keys. Stops at the first failed delete.
#[instrument(skip(adapter, baseline), fields(provider = adapter.name()))]
pub async fn reap(
    adapter: &dyn ProviderAdapter,
    kind: ObjectKind,
    baseline: &Snapshot,
) -> Result<Vec<String>, ReapError> {
    let current = snapshot(adapter, kind).await?;
    let delta = reap_delta(&current, baseline);
    debug!(%kind, current = current.len(), new = delta.len(), "computed reap delta");

    for key in &delta {
        adapter
            .delete(kind, key)
            .await
            .map_err(|source| ReapError::CleanupFailure {
                kind,
                key: key.clone(),
                source,
            })?;
    }

    Ok(delta)
}

/// Keys deleted by a reap, per kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReapReport {
    deleted: BTreeMap<ObjectKind, Vec<String>>,
}

impl ReapReport {
    pub fn deleted(&self, kind: ObjectKind) -> &[String] {
        self.deleted.get(&kind).map(Vec::as_slice).unwrap_or_default()
    }

    /// Every deleted object in teardown order
    pub fn iter(&self) -> impl Iterator<Item = (ObjectKind, &str)> {
        self.deleted
            .iter()
            .flat_map(|(kind, keys)| keys.iter().map(move |key| (*kind, key.as_str())))
    }

    pub fn total(&self) -> usize {
        self.deleted.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Reaps every tracked kind of one provider
pub struct Reaper<'a> {
    adapter: &'a dyn ProviderAdapter,
    policy: PollPolicy,
}

impl<'a> Reaper<'a> {
    /// `policy` bounds how long each deleted object may take to disappear
    pub fn new(adapter: &'a dyn ProviderAdapter, policy: PollPolicy) -> Self {
        Self { adapter, policy }
    }

    /// Delete everything created since `baseline`, then confirm absence
    ///
    /// All deletes are issued (pods, then services, then controllers)
    /// before any absence is confirmed. An empty delta is a no-op.
    #[instrument(skip(self, baseline), fields(provider = self.adapter.name()))]
    pub async fn reap(&self, baseline: &Baseline) -> Result<ReapReport, ReapError> {
        let mut report = ReapReport::default();

        for &kind in self.adapter.tracked_kinds() {
            let deleted = reap(self.adapter, kind, &baseline.snapshot(kind)).await?;
            if !deleted.is_empty() {
                info!("Reaped {} {}(s): {}", deleted.len(), kind, deleted.join(", "));
                report.deleted.insert(kind, deleted);
            }
        }

        for (kind, key) in report.iter() {
            self.confirm_absent(kind, key).await?;
        }

        Ok(report)
    }

    /// Poll the full listing of `kind` until `key` is gone
    async fn confirm_absent(&self, kind: ObjectKind, key: &str) -> Result<(), ReapError> {
        let result = converge(
            kind,
            &self.policy,
            || snapshot(self.adapter, kind),
            |current| !current.contains(key),
        )
        .await?;

        if result.satisfied {
            debug!(%kind, key, attempts = result.attempts, "confirmed absent");
            return Ok(());
        }

        warn!(%kind, key, "still present after {:?}", self.policy.timeout);
        let last_state = match result.last.as_ref().and_then(|s| s.get(key)) {
            Some(record) => match record.status() {
                Some(status) => format!("present, status {status}"),
                None => "present".to_string(),
            },
            None => "absent".to_string(),
        };
        Err(AssertionError::ConvergenceTimeout {
            kind,
            name: key.to_string(),
            expectation: Expectation::Absent,
            attempts: result.attempts,
            elapsed: result.elapsed,
            last_state,
        }
        .into())
    }
}
