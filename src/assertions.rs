//! Convergence assertions on provider objects
//!
//! Each assertion polls the provider until the object reaches the expected
//! state or the timeout elapses.
//!
//! # Example
//!
//! ```ignore
//! let assertions = Assertions::new(&adapter, Duration::from_secs(1));
//!
//! assertions.assert_status(ObjectKind::Pod, "wordpress", "Running", secs(360)).await?;
//! assertions.assert_exists(ObjectKind::Service, "wordpress", secs(360)).await?;
//! assertions.assert_absent(ObjectKind::Pod, "wordpress", secs(360)).await?;
//! ```

use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

use crate::adapter::{lookup, AdapterError, ProviderAdapter};
use crate::poll::{converge, PollPolicy, PollResult};
use crate::record::{ObjectKind, ObjectRecord, Snapshot};

/// Error type for assertion failures
#[derive(Debug, thiserror::Error)]
pub enum AssertionError {
    /// The object never reached the expected state
    #[error("{}", convergence_message(*kind, name, expectation))]
    ConvergenceTimeout {
        kind: ObjectKind,
        name: String,
        expectation: Expectation,
        attempts: u32,
        elapsed: Duration,
        /// Description of the last observation
        last_state: String,
    },

    #[error(transparent)]
    Adapter(#[from] AdapterError),
}

/// Message in the form `Pod: wordpress does not exist with status: Running`
fn convergence_message(kind: ObjectKind, name: &str, expectation: &Expectation) -> String {
    let label = kind.label();
    match expectation {
        Expectation::Exists => format!("{label}: {name} does not exist"),
        Expectation::Status(status) => {
            format!("{label}: {name} does not exist with status: {status}")
        }
        Expectation::Absent => format!("{label}: {name} exists."),
        Expectation::Running => format!("{label}: {name} not running."),
        Expectation::NotRunning => format!("{label}: {name} is running"),
    }
}

/// State an object is expected to converge to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expectation {
    /// Present, in any state
    Exists,
    /// Present with exactly this status (case-sensitive)
    Status(String),
    /// Not present
    Absent,
    /// Present and running (containers: status starts with `Up`)
    Running,
    /// Absent, or present but not running
    NotRunning,
}

impl Expectation {
    /// Whether `snapshot` shows the object called `name` in this state
    pub fn is_met(&self, snapshot: &Snapshot, name: &str) -> bool {
        let record = snapshot.find(name);
        match self {
            Self::Exists => record.is_some(),
            Self::Status(status) => record.and_then(ObjectRecord::status) == Some(status.as_str()),
            Self::Absent => record.is_none(),
            Self::Running => record.is_some_and(is_running),
            Self::NotRunning => !record.is_some_and(is_running),
        }
    }
}

fn is_running(record: &ObjectRecord) -> bool {
    match record {
        ObjectRecord::Container(container) => container.is_running(),
        other => other.status() == Some("Running"),
    }
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exists => f.write_str("exists"),
            Self::Status(status) => write!(f, "status {status}"),
            Self::Absent => f.write_str("absent"),
            Self::Running => f.write_str("running"),
            Self::NotRunning => f.write_str("not running"),
        }
    }
}

/// Describe what the last observation showed for `name`
fn describe(last: Option<&Snapshot>, name: &str) -> String {
    match last.map(|snapshot| snapshot.find(name)) {
        None => "never observed".to_string(),
        Some(None) => "absent".to_string(),
        Some(Some(record)) => match record.status() {
            Some(status) => format!("present, status {status}"),
            None => "present".to_string(),
        },
    }
}

/// Convergence assertions against one provider
pub struct Assertions<'a> {
    adapter: &'a dyn ProviderAdapter,
    interval: Duration,
}

impl<'a> Assertions<'a> {
    pub fn new(adapter: &'a dyn ProviderAdapter, interval: Duration) -> Self {
        Self { adapter, interval }
    }

    /// Poll until `name` meets `expectation`, failing with
    /// [`AssertionError::ConvergenceTimeout`] after `timeout`
    pub async fn expect(
        &self,
        kind: ObjectKind,
        name: &str,
        expectation: Expectation,
        timeout: Duration,
    ) -> Result<PollResult<Snapshot>, AssertionError> {
        let policy = PollPolicy::new(timeout).interval(self.interval);
        let result = converge(
            kind,
            &policy,
            || lookup(self.adapter, kind, name),
            |snapshot| expectation.is_met(snapshot, name),
        )
        .await?;

        if result.satisfied {
            debug!(%kind, name, %expectation, attempts = result.attempts, "converged");
            return Ok(result);
        }

        let last_state = describe(result.last.as_ref(), name);
        warn!(%kind, name, %expectation, %last_state, "did not converge within {:?}", timeout);
        Err(AssertionError::ConvergenceTimeout {
            kind,
            name: name.to_string(),
            expectation,
            attempts: result.attempts,
            elapsed: result.elapsed,
            last_state,
        })
    }

    pub async fn assert_exists(
        &self,
        kind: ObjectKind,
        name: &str,
        timeout: Duration,
    ) -> Result<(), AssertionError> {
        self.expect(kind, name, Expectation::Exists, timeout)
            .await
            .map(drop)
    }

    pub async fn assert_status(
        &self,
        kind: ObjectKind,
        name: &str,
        status: &str,
        timeout: Duration,
    ) -> Result<(), AssertionError> {
        self.expect(kind, name, Expectation::Status(status.to_string()), timeout)
            .await
            .map(drop)
    }

    pub async fn assert_absent(
        &self,
        kind: ObjectKind,
        name: &str,
        timeout: Duration,
    ) -> Result<(), AssertionError> {
        self.expect(kind, name, Expectation::Absent, timeout)
            .await
            .map(drop)
    }

    /// Pod presence and optional status, mirroring `assertPod`
    pub async fn assert_pod(
        &self,
        name: &str,
        status: Option<&str>,
        timeout: Duration,
    ) -> Result<(), AssertionError> {
        match status {
            Some(status) => self.assert_status(ObjectKind::Pod, name, status, timeout).await,
            None => self.assert_exists(ObjectKind::Pod, name, timeout).await,
        }
    }

    pub async fn assert_container_running(
        &self,
        name: &str,
        timeout: Duration,
    ) -> Result<(), AssertionError> {
        self.expect(ObjectKind::Container, name, Expectation::Running, timeout)
            .await
            .map(drop)
    }

    pub async fn assert_container_not_running(
        &self,
        name: &str,
        timeout: Duration,
    ) -> Result<(), AssertionError> {
        self.expect(ObjectKind::Container, name, Expectation::NotRunning, timeout)
            .await
            .map(drop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{DockerAdapter, KubernetesAdapter};
    use crate::fixtures::FakeProvider;
    use std::sync::Arc;

    const SECS_360: Duration = Duration::from_secs(360);

    fn k8s(fake: &Arc<FakeProvider>) -> KubernetesAdapter {
        KubernetesAdapter::new(fake.clone())
    }

    #[tokio::test(start_paused = true)]
    async fn test_assert_status_succeeds_on_first_observation() {
        let fake = Arc::new(FakeProvider::new().with_pod("wordpress", "Running"));
        let adapter = k8s(&fake);
        let assertions = Assertions::new(&adapter, Duration::from_secs(1));

        let result = assertions
            .expect(
                ObjectKind::Pod,
                "wordpress",
                Expectation::Status("Running".to_string()),
                SECS_360,
            )
            .await
            .unwrap();

        assert_eq!(result.attempts, 1);
        assert_eq!(fake.commands(), vec!["kubectl get pod wordpress"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_assert_status_waits_for_transition() {
        let fake = Arc::new(
            FakeProvider::new()
                .with_pod("mariadb", "Pending")
                .status_after("mariadb", "Running", 3),
        );
        let adapter = k8s(&fake);
        let assertions = Assertions::new(&adapter, Duration::from_secs(1));

        assertions
            .assert_status(ObjectKind::Pod, "mariadb", "Running", SECS_360)
            .await
            .unwrap();

        assert_eq!(fake.commands().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_match_is_exact() {
        let fake = Arc::new(FakeProvider::new().with_pod("wordpress", "running"));
        let adapter = k8s(&fake);
        let assertions = Assertions::new(&adapter, Duration::from_secs(1));

        let err = assertions
            .assert_status(ObjectKind::Pod, "wordpress", "Running", Duration::from_secs(2))
            .await
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "Pod: wordpress does not exist with status: Running"
        );
        match err {
            AssertionError::ConvergenceTimeout { last_state, attempts, .. } => {
                assert_eq!(last_state, "present, status running");
                assert_eq!(attempts, 3);
            }
            other => panic!("expected ConvergenceTimeout, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_assert_exists_tolerates_not_found() {
        let fake = Arc::new(FakeProvider::new().appear_after(ObjectKind::Service, "wordpress", 2));
        let adapter = k8s(&fake);
        let assertions = Assertions::new(&adapter, Duration::from_secs(1));

        assertions
            .assert_exists(ObjectKind::Service, "wordpress", SECS_360)
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_assert_exists_timeout_message() {
        let fake = Arc::new(FakeProvider::new());
        let adapter = k8s(&fake);
        let assertions = Assertions::new(&adapter, Duration::from_secs(1));

        let err = assertions
            .assert_exists(ObjectKind::Controller, "wordpress", Duration::from_secs(1))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "RC: wordpress does not exist");
    }

    #[tokio::test(start_paused = true)]
    async fn test_assert_absent_on_missing_object_with_zero_timeout() {
        let fake = Arc::new(FakeProvider::new());
        let adapter = k8s(&fake);
        let assertions = Assertions::new(&adapter, Duration::from_secs(1));

        assertions
            .assert_absent(ObjectKind::Service, "wordpress", Duration::ZERO)
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_assert_absent_fails_while_present() {
        let fake = Arc::new(FakeProvider::new().with_pod("wordpress", "Running"));
        let adapter = k8s(&fake);
        let assertions = Assertions::new(&adapter, Duration::from_secs(1));

        let err = assertions
            .assert_absent(ObjectKind::Pod, "wordpress", Duration::from_secs(3))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Pod: wordpress exists.");
    }

    #[tokio::test(start_paused = true)]
    async fn test_command_failure_is_not_retried() {
        let fake = Arc::new(FakeProvider::new().fail_on("kubectl get pod", "Unable to connect to the server"));
        let adapter = k8s(&fake);
        let assertions = Assertions::new(&adapter, Duration::from_secs(1));

        let err = assertions
            .assert_pod("wordpress", None, SECS_360)
            .await
            .unwrap_err();

        assert!(matches!(err, AssertionError::Adapter(AdapterError::CommandFailed { .. })));
        assert_eq!(fake.commands().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_container_running_assertions() {
        let fake = Arc::new(
            FakeProvider::new()
                .with_container("a1b2c3d4e5f6", "helloapache", "Up 3 minutes")
                .with_container("f6e5d4c3b2a1", "old_job", "Exited (0) 1 hour ago"),
        );
        let adapter = DockerAdapter::new(fake.clone());
        let assertions = Assertions::new(&adapter, Duration::from_secs(1));

        assertions
            .assert_container_running("helloapache", Duration::ZERO)
            .await
            .unwrap();
        assertions
            .assert_container_not_running("old_job", Duration::ZERO)
            .await
            .unwrap();
        assertions
            .assert_container_not_running("never_created", Duration::ZERO)
            .await
            .unwrap();

        let err = assertions
            .assert_container_running("old_job", Duration::ZERO)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Container: old_job not running.");
    }

    #[test]
    fn test_expectation_predicates() {
        let snapshot = crate::parsing::parse_listing(
            ObjectKind::Pod,
            "NAME READY STATUS RESTARTS AGE\nweb 1/1 Running 0 1m\n",
        )
        .unwrap();

        assert!(Expectation::Exists.is_met(&snapshot, "web"));
        assert!(Expectation::Status("Running".to_string()).is_met(&snapshot, "web"));
        assert!(!Expectation::Status("Run".to_string()).is_met(&snapshot, "web"));
        assert!(!Expectation::Absent.is_met(&snapshot, "web"));
        assert!(Expectation::Absent.is_met(&snapshot, "db"));
        assert!(!Expectation::Status("Running".to_string()).is_met(&snapshot, "db"));
    }
}
