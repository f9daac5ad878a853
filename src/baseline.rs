//! Pre-test baseline
//!
//! Before a test deploys anything, the harness records every object the
//! provider already runs. Whatever appears on top of that baseline was
//! created by the test and is reaped afterwards.

use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, instrument};

use crate::adapter::{snapshot, AdapterError, ProviderAdapter};
use crate::record::{ObjectKind, Snapshot};

/// Snapshots of every tracked kind, taken before a test
#[derive(Debug, Clone, Default, Serialize)]
pub struct Baseline {
    snapshots: BTreeMap<ObjectKind, Snapshot>,
}

impl Baseline {
    /// Snapshot every kind the adapter tracks
    ///
    /// Fails if any kind cannot be listed: reaping against a partial
    /// baseline would delete objects the test never created.
    #[instrument(skip(adapter), fields(provider = adapter.name()))]
    pub async fn capture(adapter: &dyn ProviderAdapter) -> Result<Self, AdapterError> {
        let mut baseline = Self::default();
        for &kind in adapter.tracked_kinds() {
            let snapshot = snapshot(adapter, kind).await?;
            debug!(%kind, count = snapshot.len(), "baseline captured");
            baseline.snapshots.insert(kind, snapshot);
        }
        Ok(baseline)
    }

    /// Baseline snapshot of `kind`; empty if the kind was not tracked
    pub fn snapshot(&self, kind: ObjectKind) -> Snapshot {
        self.snapshots
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| Snapshot::empty(kind))
    }

    pub fn get(&self, kind: ObjectKind) -> Option<&Snapshot> {
        self.snapshots.get(&kind)
    }

    /// Tracked kinds, in teardown order
    pub fn kinds(&self) -> impl Iterator<Item = ObjectKind> + '_ {
        self.snapshots.keys().copied()
    }

    /// Total number of objects across all kinds
    pub fn len(&self) -> usize {
        self.snapshots.values().map(Snapshot::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
