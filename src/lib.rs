//! Nulecule Harness - functional tests for packaged container applications
//!
//! Deploys an application through its packaging tool (`atomicapp`) onto
//! Docker, Kubernetes or OpenShift, polls the provider until the expected
//! pods, services, replication controllers or containers converge, then
//! undeploys and reaps everything the test created.
//!
//! # Example (Rust)
//!
//! ```no_run
//! use nulecule_harness::{HarnessConfig, ObjectKind, Session};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut session = Session::from_config(HarnessConfig::kubernetes());
//!     session.bootstrap().await?;
//!
//!     let case = session.begin().await?;
//!     let workdir = case.deploy_app("wordpress-centos7-atomicapp").await?;
//!     case.assert_pod("wordpress", Some("Running"), Duration::from_secs(360)).await?;
//!     case.undeploy(&workdir).await?;
//!     case.assert_absent(ObjectKind::Pod, "wordpress", Duration::from_secs(360)).await?;
//!     case.finish().await?;
//!
//!     session.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Test macro
//!
//! ```ignore
//! #[nulecule_harness::test]
//! async fn test_helloapache(case: TestCase) {
//!     case.deploy_app("helloapache").await.unwrap();
//!     case.assert_container_running("helloapache").await.unwrap();
//! }
//! ```

pub mod adapter;
pub mod answers;
pub mod assertions;
pub mod baseline;
pub mod config;
pub mod diagnostics;
pub mod driver;
pub mod fixtures;
pub mod parsing;
pub mod poll;
pub mod reap;
pub mod record;
pub mod runner;
pub mod session;
pub mod telemetry;

// Re-export commonly used types
pub use adapter::{
    AdapterError, ClusterBootstrap, DockerAdapter, KubernetesAdapter, OpenShiftAdapter,
    ProviderAdapter,
};
pub use answers::Answers;
pub use assertions::{AssertionError, Assertions, Expectation};
pub use baseline::Baseline;
pub use config::{HarnessConfig, ProviderType};
pub use diagnostics::Diagnostics;
pub use driver::{AtomicAppDriver, Driver, DriverError};
pub use parsing::MalformedOutputError;
pub use poll::{converge, poll_until, PollPolicy, PollResult};
pub use reap::{reap, ReapError, ReapReport, Reaper};
pub use record::{ObjectKind, ObjectRecord, Snapshot};
pub use runner::{CommandExecutor, Invocation, RemoteExec, RunResult, RunnerError, SystemExecutor};
pub use session::{HarnessError, Session, TestCase};

// Re-export the test macro
pub use nulecule_harness_macros::test;

/// Items used by code the test macro expands to
#[doc(hidden)]
pub mod __private {
    pub use futures::FutureExt;
}
