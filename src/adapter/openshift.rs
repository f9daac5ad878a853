//! OpenShift provider
//!
//! OpenShift runs as an all-in-one `origin` container. Its `oc` client only
//! exists inside that container, so every listing and delete is a
//! Kubernetes-shaped command wrapped in `docker exec` by [`RemoteExec`].
//! Starting and stopping the provider manages the container itself from the
//! host.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use super::{
    run_checked, run_on_object, wait_until_ready, AdapterError, KubernetesAdapter, ProviderAdapter,
};
use crate::answers::Answers;
use crate::poll::PollPolicy;
use crate::record::ObjectKind;
use crate::runner::{CommandExecutor, Invocation, RemoteExec};

const ORIGIN_IMAGE: &str = "openshift/origin";

/// OpenShift provider running inside an origin container
pub struct OpenShiftAdapter {
    container: String,
    namespace: Option<String>,
    /// `oc` commands, executed inside the container
    cluster: KubernetesAdapter,
    /// Host-side executor for the container lifecycle
    host: Arc<dyn CommandExecutor>,
}

impl OpenShiftAdapter {
    pub fn new(container: impl Into<String>, host: Arc<dyn CommandExecutor>) -> Self {
        let container = container.into();
        let remote = Arc::new(RemoteExec::new(container.clone(), host.clone()));
        Self {
            container,
            namespace: None,
            cluster: KubernetesAdapter::with_cli("oc", remote),
            host,
        }
    }

    /// Project used by default answers and selected before each test
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }
}

#[async_trait]
impl ProviderAdapter for OpenShiftAdapter {
    fn name(&self) -> &'static str {
        "openshift"
    }

    fn tracked_kinds(&self) -> &'static [ObjectKind] {
        self.cluster.tracked_kinds()
    }

    async fn list(&self, kind: ObjectKind) -> Result<String, AdapterError> {
        self.cluster.list(kind).await
    }

    async fn get(&self, kind: ObjectKind, name: &str) -> Result<String, AdapterError> {
        self.cluster.get(kind, name).await
    }

    async fn delete(&self, kind: ObjectKind, key: &str) -> Result<(), AdapterError> {
        self.cluster.delete(kind, key).await
    }

    #[instrument(skip(self), fields(container = %self.container))]
    async fn start(&self) -> Result<(), AdapterError> {
        info!("Starting OpenShift origin container");
        let invocation = Invocation::new("docker").args([
            "run",
            "-d",
            "--name",
            self.container.as_str(),
            "--privileged",
            "--pid=host",
            "--net=host",
            "-v",
            "/var/run:/var/run:rw",
            "-v",
            "/sys:/sys",
            "-v",
            "/var/lib/docker:/var/lib/docker:rw",
            ORIGIN_IMAGE,
            "start",
        ]);
        run_checked(self.host.as_ref(), &invocation)
            .await
            .map_err(|e| AdapterError::Bootstrap(format!("starting {}: {e}", self.container)))?;
        Ok(())
    }

    #[instrument(skip(self), fields(container = %self.container))]
    async fn stop(&self) -> Result<(), AdapterError> {
        info!("Removing OpenShift origin container");
        let invocation = Invocation::new("docker").args(["rm", "-f", self.container.as_str()]);
        match run_on_object(self.host.as_ref(), &invocation, &self.container).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => {
                debug!("No origin container to remove");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self, policy), fields(timeout = ?policy.timeout))]
    async fn wait(&self, policy: &PollPolicy) -> Result<(), AdapterError> {
        debug!("Waiting for the OpenShift API");
        wait_until_ready(
            self.cluster.executor(),
            &Invocation::new("oc").arg("whoami"),
            policy,
        )
        .await
    }

    fn default_answers(&self) -> Answers {
        let mut answers = Answers::new();
        answers.set("general", "provider", "openshift");
        answers.set(
            "general",
            "namespace",
            self.namespace.as_deref().unwrap_or("default"),
        );
        answers
    }

    /// Switch `oc` to the project named in `general.namespace`
    async fn prepare(&self, answers: &Answers) -> Result<(), AdapterError> {
        let Some(project) = answers.get("general", "namespace") else {
            return Ok(());
        };
        debug!(project, "Selecting OpenShift project");
        run_checked(
            self.cluster.executor(),
            &Invocation::new("oc").args(["project", project]),
        )
        .await?;
        Ok(())
    }
}
