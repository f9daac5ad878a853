//! Failure diagnostics for test debugging
//!
//! Shows, per tracked kind, what the provider ran before the test, what it
//! runs now and what the test left behind.

use serde::Serialize;
use std::fmt;
use tracing::warn;

use crate::adapter::{snapshot, ProviderAdapter};
use crate::baseline::Baseline;
use crate::record::{ObjectKind, Snapshot};

const LINE_WIDTH: usize = 80;
const HEAVY_LINE: &str = "━";
const LIGHT_LINE: &str = "─";

/// Baseline, current and delta keys of one kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KindReport {
    pub kind: ObjectKind,
    pub baseline: Vec<String>,
    /// `None` if the current listing could not be taken
    pub current: Option<Vec<String>>,
    pub delta: Vec<String>,
    /// Status of every current object that has one
    pub statuses: Vec<(String, String)>,
}

impl KindReport {
    pub fn new(baseline: &Snapshot, current: Option<&Snapshot>) -> Self {
        let keys = |s: &Snapshot| s.keys().map(str::to_string).collect::<Vec<_>>();
        Self {
            kind: baseline.kind(),
            baseline: keys(baseline),
            current: current.map(keys),
            delta: current.map(|c| c.delta(baseline)).unwrap_or_default(),
            statuses: current
                .map(|c| {
                    c.records()
                        .filter_map(|r| r.status().map(|s| (r.key().to_string(), s.to_string())))
                        .collect()
                })
                .unwrap_or_default(),
        }
    }
}

/// Collected diagnostic information from a failed test
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostics {
    pub provider: String,
    /// Local time the diagnostics were collected
    pub captured_at: String,
    pub kinds: Vec<KindReport>,
    /// Failure that triggered the report, if any
    pub failure: Option<String>,
}

impl Diagnostics {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            captured_at: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            kinds: Vec::new(),
            failure: None,
        }
    }

    /// Re-list every tracked kind and compare with `baseline`
    ///
    /// Listing failures are recorded, not returned: diagnostics are taken
    /// when something already went wrong.
    pub async fn collect(adapter: &dyn ProviderAdapter, baseline: &Baseline) -> Self {
        let mut diagnostics = Self::new(adapter.name());
        for &kind in adapter.tracked_kinds() {
            let current = match snapshot(adapter, kind).await {
                Ok(current) => Some(current),
                Err(e) => {
                    warn!(%kind, error = %e, "listing failed while collecting diagnostics");
                    None
                }
            };
            diagnostics
                .kinds
                .push(KindReport::new(&baseline.snapshot(kind), current.as_ref()));
        }
        diagnostics
    }

    pub fn failure(mut self, failure: impl fmt::Display) -> Self {
        self.failure = Some(failure.to_string());
        self
    }

    /// Objects the test created that still exist
    pub fn leftovers(&self) -> impl Iterator<Item = (ObjectKind, &str)> {
        self.kinds
            .iter()
            .flat_map(|k| k.delta.iter().map(move |key| (k.kind, key.as_str())))
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    fn heavy_line() -> String {
        HEAVY_LINE.repeat(LINE_WIDTH)
    }

    fn section_header(title: &str) -> String {
        let title_with_spaces = format!(" {} ", title);
        let remaining = LINE_WIDTH.saturating_sub(title_with_spaces.chars().count() + 3);
        format!(
            "{}{}{}",
            LIGHT_LINE.repeat(3),
            title_with_spaces,
            LIGHT_LINE.repeat(remaining)
        )
    }
}

fn key_list(keys: &[String]) -> String {
    if keys.is_empty() {
        "(none)".to_string()
    } else {
        keys.join(", ")
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f)?;
        writeln!(f, "{}", Self::heavy_line())?;
        writeln!(f, "  NULECULE TEST FAILED")?;
        writeln!(f, "{}", Self::heavy_line())?;
        writeln!(f)?;
        writeln!(f, "  Provider: {} ({})", self.provider, self.captured_at)?;
        if let Some(ref failure) = self.failure {
            writeln!(f, "  Failure:  {}", failure)?;
        }

        for report in &self.kinds {
            writeln!(f)?;
            writeln!(f, "{}", Self::section_header(report.kind.label()))?;
            writeln!(f)?;
            writeln!(f, "  baseline: {}", key_list(&report.baseline))?;
            match report.current {
                Some(ref current) => writeln!(f, "  current:  {}", key_list(current))?,
                None => writeln!(f, "  current:  (listing failed)")?,
            }
            writeln!(f, "  new:      {}", key_list(&report.delta))?;
            for (key, status) in &report.statuses {
                writeln!(f, "  • {:24}  {}", key, status)?;
            }
        }

        writeln!(f)?;
        writeln!(f, "{}", Self::heavy_line())?;

        Ok(())
    }
}
