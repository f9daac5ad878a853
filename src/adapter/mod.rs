//! Provider adapters
//!
//! The harness supports three providers behind one interface:
//! - Docker: plain containers on the local daemon
//! - Kubernetes: pods, services and replication controllers via `kubectl`
//! - OpenShift: the same objects via `oc`, run inside the origin container
//!
//! Adapters only know how to run provider commands. Snapshots, polling and
//! reaping are built on top of [`ProviderAdapter`] and are shared by all
//! providers.

use async_trait::async_trait;
use std::sync::Arc;

use crate::answers::Answers;
use crate::config::{HarnessConfig, ProviderType};
use crate::parsing::{parse_listing, MalformedOutputError};
use crate::poll::PollPolicy;
use crate::record::{ObjectKind, Snapshot};
use crate::runner::{CommandExecutor, Invocation, RunResult, RunnerError};

mod cluster;
mod docker;
mod kubernetes;
mod openshift;

pub use cluster::ClusterBootstrap;
pub use docker::DockerAdapter;
pub use kubernetes::KubernetesAdapter;
pub use openshift::OpenShiftAdapter;

/// Prefix Docker prints when the container named on the command line is missing
const DOCKER_NO_SUCH_CONTAINER: &str = "No such container: ";

/// Status kubectl and oc print when the API server has no such object
const KUBE_NOT_FOUND: &str = "Error from server (NotFound)";

/// Error type for adapter operations
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("{command}: object not found: {stderr}")]
    NotFound { command: String, stderr: String },

    #[error("{command} exited with {exit_code}: {stderr}")]
    CommandFailed {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("{provider} does not manage {kind} objects")]
    Unsupported {
        provider: &'static str,
        kind: ObjectKind,
    },

    #[error("provider bootstrap failed: {0}")]
    Bootstrap(String),

    #[error(transparent)]
    Malformed(#[from] MalformedOutputError),

    #[error(transparent)]
    Runner(#[from] RunnerError),
}

impl AdapterError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Interface every provider implements
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Provider name for display
    fn name(&self) -> &'static str;

    /// Kinds snapshotted for the baseline, in teardown order
    fn tracked_kinds(&self) -> &'static [ObjectKind];

    /// Raw listing of every object of `kind`
    async fn list(&self, kind: ObjectKind) -> Result<String, AdapterError>;

    /// Raw listing restricted to the object called `name`
    async fn get(&self, kind: ObjectKind, name: &str) -> Result<String, AdapterError>;

    /// Delete one object by key
    async fn delete(&self, kind: ObjectKind, key: &str) -> Result<(), AdapterError>;

    /// Bring up the provider
    async fn start(&self) -> Result<(), AdapterError>;

    /// Tear down the provider
    async fn stop(&self) -> Result<(), AdapterError>;

    /// Block until the provider answers requests
    async fn wait(&self, policy: &PollPolicy) -> Result<(), AdapterError>;

    /// Answers every deployment on this provider starts from
    fn default_answers(&self) -> Answers;

    /// Per-test preparation, run before the baseline is captured
    async fn prepare(&self, _answers: &Answers) -> Result<(), AdapterError> {
        Ok(())
    }
}

/// Build the adapter for the configured provider
pub fn for_config(
    config: &HarnessConfig,
    executor: Arc<dyn CommandExecutor>,
) -> Box<dyn ProviderAdapter> {
    match config.provider {
        ProviderType::Docker => Box::new(DockerAdapter::new(executor)),
        ProviderType::Kubernetes => Box::new(
            KubernetesAdapter::new(executor)
                .namespace(config.namespace.clone())
                .bootstrap(config.bootstrap.clone()),
        ),
        ProviderType::OpenShift => Box::new(
            OpenShiftAdapter::new(config.origin_container.clone(), executor)
                .namespace(config.namespace.clone()),
        ),
    }
}

/// Capture every object of `kind`
///
/// An empty listing is an empty snapshot. Any failure, or a malformed
/// listing, is an error: a provider that cannot be asked is never read as
/// holding no objects.
pub async fn snapshot(
    adapter: &dyn ProviderAdapter,
    kind: ObjectKind,
) -> Result<Snapshot, AdapterError> {
    let output = adapter.list(kind).await?;
    Ok(parse_listing(kind, &output)?)
}

/// Capture the object called `name`, as a snapshot of at most a few rows
///
/// Unlike [`snapshot`], "not found" is returned as an error so callers can
/// tell it apart; [`crate::poll::converge`] turns it into absence.
pub async fn lookup(
    adapter: &dyn ProviderAdapter,
    kind: ObjectKind,
    name: &str,
) -> Result<Snapshot, AdapterError> {
    let output = adapter.get(kind, name).await?;
    Ok(parse_listing(kind, &output)?)
}

/// Run an invocation and turn a non-zero exit into
/// [`AdapterError::CommandFailed`]
pub(crate) async fn run_checked(
    executor: &dyn CommandExecutor,
    invocation: &Invocation,
) -> Result<RunResult, AdapterError> {
    let result = executor.execute(invocation).await?;
    check(invocation, None, result)
}

/// Run an invocation that addresses the single object `target`
///
/// The failure is [`AdapterError::NotFound`] only when the provider reports
/// that `target` itself is missing.
pub(crate) async fn run_on_object(
    executor: &dyn CommandExecutor,
    invocation: &Invocation,
    target: &str,
) -> Result<RunResult, AdapterError> {
    let result = executor.execute(invocation).await?;
    check(invocation, Some(target), result)
}

/// Whether `stderr` is the provider's own "no such object" answer for `target`
///
/// Classified by the program that was asked. For commands wrapped by
/// [`crate::runner::RemoteExec`] that is the inner program, so a missing
/// host container is not mistaken for a missing object.
fn reports_missing(program: &str, target: &str, stderr: &str) -> bool {
    match program {
        "kubectl" | "oc" => stderr.lines().any(|line| {
            line.starts_with(KUBE_NOT_FOUND) && line.contains(&format!("\"{target}\""))
        }),
        "docker" => stderr.lines().any(|line| {
            line.find(DOCKER_NO_SUCH_CONTAINER).is_some_and(|at| {
                line[at + DOCKER_NO_SUCH_CONTAINER.len()..].trim() == target
            })
        }),
        _ => false,
    }
}

fn check(
    invocation: &Invocation,
    target: Option<&str>,
    result: RunResult,
) -> Result<RunResult, AdapterError> {
    if result.passed() {
        return Ok(result);
    }

    let command = invocation.to_string();
    if target.is_some_and(|target| reports_missing(&invocation.program, target, &result.stderr)) {
        Err(AdapterError::NotFound {
            command,
            stderr: result.stderr.trim().to_string(),
        })
    } else {
        Err(AdapterError::CommandFailed {
            command,
            exit_code: result.exit_code,
            stderr: result.stderr.trim().to_string(),
        })
    }
}

/// Probe until `invocation` succeeds, within `policy`
pub(crate) async fn wait_until_ready(
    executor: &dyn CommandExecutor,
    invocation: &Invocation,
    policy: &PollPolicy,
) -> Result<(), AdapterError> {
    let result = crate::poll::poll_until(
        policy,
        || async { executor.execute(invocation).await.map(|r| r.passed()) },
        |ready| *ready,
    )
    .await?;

    if result.satisfied {
        Ok(())
    } else {
        Err(AdapterError::Bootstrap(format!(
            "`{invocation}` did not succeed within {:?}",
            policy.timeout
        )))
    }
}
