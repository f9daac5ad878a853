//! Kubernetes provider
//!
//! Lists and deletes pods, services and replication controllers with
//! `kubectl`. The same adapter drives `oc` for OpenShift.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use super::{
    run_checked, run_on_object, wait_until_ready, AdapterError, ClusterBootstrap, ProviderAdapter,
};
use crate::answers::Answers;
use crate::poll::PollPolicy;
use crate::record::ObjectKind;
use crate::runner::{CommandExecutor, Invocation};

/// Kubernetes provider driven through a kubectl-compatible CLI
pub struct KubernetesAdapter {
    cli: &'static str,
    namespace: Option<String>,
    bootstrap: ClusterBootstrap,
    executor: Arc<dyn CommandExecutor>,
}

impl KubernetesAdapter {
    /// Adapter using `kubectl` against an existing cluster
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self::with_cli("kubectl", executor)
    }

    /// Adapter using another kubectl-compatible client (e.g. `oc`)
    pub fn with_cli(cli: &'static str, executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            cli,
            namespace: None,
            bootstrap: ClusterBootstrap::Existing,
            executor,
        }
    }

    /// Restrict every command to one namespace
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Set how the cluster is brought up and torn down
    pub fn bootstrap(mut self, bootstrap: ClusterBootstrap) -> Self {
        self.bootstrap = bootstrap;
        self
    }

    pub(crate) fn executor(&self) -> &dyn CommandExecutor {
        self.executor.as_ref()
    }

    /// `<cli> <verb> <resource> [name] [--namespace ns]`
    pub(crate) fn command(&self, verb: &str, resource: &str, name: Option<&str>) -> Invocation {
        let mut invocation = Invocation::new(self.cli).args([verb, resource]);
        if let Some(name) = name {
            invocation = invocation.arg(name);
        }
        if let Some(ref namespace) = self.namespace {
            invocation = invocation.args(["--namespace", namespace.as_str()]);
        }
        invocation
    }

    fn check_kind(&self, kind: ObjectKind) -> Result<(), AdapterError> {
        if kind == ObjectKind::Container {
            return Err(AdapterError::Unsupported {
                provider: self.cli,
                kind,
            });
        }
        Ok(())
    }
}

/// Resource names as the CLI spells them: (single object, listing)
fn resource(kind: ObjectKind) -> (&'static str, &'static str) {
    match kind {
        ObjectKind::Pod => ("pod", "pods"),
        ObjectKind::Service => ("service", "services"),
        ObjectKind::Controller | ObjectKind::Container => ("rc", "rc"),
    }
}

#[async_trait]
impl ProviderAdapter for KubernetesAdapter {
    fn name(&self) -> &'static str {
        "kubernetes"
    }

    fn tracked_kinds(&self) -> &'static [ObjectKind] {
        &ObjectKind::CLUSTER
    }

    #[instrument(skip(self), fields(provider = self.cli))]
    async fn list(&self, kind: ObjectKind) -> Result<String, AdapterError> {
        self.check_kind(kind)?;
        let (_, plural) = resource(kind);
        let output = run_checked(self.executor(), &self.command("get", plural, None)).await?;
        Ok(output.stdout)
    }

    #[instrument(skip(self), fields(provider = self.cli))]
    async fn get(&self, kind: ObjectKind, name: &str) -> Result<String, AdapterError> {
        self.check_kind(kind)?;
        let (single, _) = resource(kind);
        let invocation = self.command("get", single, Some(name));
        let output = run_on_object(self.executor(), &invocation, name).await?;
        Ok(output.stdout)
    }

    #[instrument(skip(self), fields(provider = self.cli))]
    async fn delete(&self, kind: ObjectKind, key: &str) -> Result<(), AdapterError> {
        self.check_kind(kind)?;
        let (single, _) = resource(kind);
        info!("Deleting {} {}", single, key);
        run_on_object(self.executor(), &self.command("delete", single, Some(key)), key).await?;
        Ok(())
    }

    async fn start(&self) -> Result<(), AdapterError> {
        self.bootstrap.start(self.executor()).await
    }

    async fn stop(&self) -> Result<(), AdapterError> {
        self.bootstrap.stop(self.executor()).await
    }

    #[instrument(skip(self, policy), fields(timeout = ?policy.timeout))]
    async fn wait(&self, policy: &PollPolicy) -> Result<(), AdapterError> {
        debug!("Waiting for the API server");
        wait_until_ready(
            self.executor(),
            &Invocation::new(self.cli).arg("cluster-info"),
            policy,
        )
        .await
    }

    fn default_answers(&self) -> Answers {
        let mut answers = Answers::new();
        answers.set("general", "provider", "kubernetes");
        answers.set(
            "general",
            "namespace",
            self.namespace.as_deref().unwrap_or("default"),
        );
        answers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{lookup, snapshot};
    use crate::fixtures::FakeProvider;
    use std::time::Duration;

    fn adapter(fake: &Arc<FakeProvider>) -> KubernetesAdapter {
        KubernetesAdapter::new(fake.clone())
    }

    #[tokio::test]
    async fn test_snapshot_lists_each_kind() {
        let fake = Arc::new(
            FakeProvider::new()
                .with_pod("wordpress", "Running")
                .with_service("wordpress")
                .with_controller("wordpress"),
        );
        let k8s = adapter(&fake);

        let pods = snapshot(&k8s, ObjectKind::Pod).await.unwrap();
        let services = snapshot(&k8s, ObjectKind::Service).await.unwrap();
        let rcs = snapshot(&k8s, ObjectKind::Controller).await.unwrap();

        assert!(pods.contains("wordpress"));
        assert!(services.contains("wordpress"));
        assert!(rcs.contains("wordpress"));
        assert_eq!(
            fake.commands(),
            vec!["kubectl get pods", "kubectl get services", "kubectl get rc"]
        );
    }

    #[tokio::test]
    async fn test_namespace_is_appended() {
        let fake = Arc::new(FakeProvider::new());
        let k8s = adapter(&fake).namespace("test");

        snapshot(&k8s, ObjectKind::Pod).await.unwrap();

        assert_eq!(fake.commands(), vec!["kubectl get pods --namespace test"]);
    }

    #[tokio::test]
    async fn test_lookup_missing_pod_is_not_found() {
        let fake = Arc::new(FakeProvider::new());
        let err = lookup(&adapter(&fake), ObjectKind::Pod, "ghost")
            .await
            .unwrap_err();

        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_delete_removes_object() {
        let fake = Arc::new(FakeProvider::new().with_service("mariadb"));
        let k8s = adapter(&fake);

        k8s.delete(ObjectKind::Service, "mariadb").await.unwrap();

        assert!(!fake.contains(ObjectKind::Service, "mariadb"));
        assert_eq!(fake.commands(), vec!["kubectl delete service mariadb"]);
    }

    #[tokio::test]
    async fn test_delete_missing_object_fails() {
        let fake = Arc::new(FakeProvider::new());
        let err = adapter(&fake)
            .delete(ObjectKind::Controller, "ghost")
            .await
            .unwrap_err();

        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_containers_are_unsupported() {
        let fake = Arc::new(FakeProvider::new());
        let err = adapter(&fake).list(ObjectKind::Container).await.unwrap_err();

        assert!(matches!(err, AdapterError::Unsupported { .. }));
        assert!(fake.commands().is_empty());
    }

    #[tokio::test]
    async fn test_listing_failure_propagates() {
        let fake = Arc::new(
            FakeProvider::new().fail_on("kubectl get pods", "The connection to the server was refused"),
        );
        let err = snapshot(&adapter(&fake), ObjectKind::Pod).await.unwrap_err();

        assert!(matches!(err, AdapterError::CommandFailed { .. }));
    }

    #[tokio::test]
    async fn test_missing_context_is_not_an_empty_cluster() {
        let fake = Arc::new(
            FakeProvider::new()
                .with_pod("wordpress", "Running")
                .fail_on("kubectl", "error: context \"kind-harness\" not found"),
        );
        let k8s = adapter(&fake);

        let listed = snapshot(&k8s, ObjectKind::Pod).await.unwrap_err();
        assert!(matches!(listed, AdapterError::CommandFailed { .. }));

        let looked_up = lookup(&k8s, ObjectKind::Pod, "wordpress").await.unwrap_err();
        assert!(!looked_up.is_not_found());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_polls_cluster_info() {
        let fake = Arc::new(FakeProvider::new().unready_for(2));
        let policy = PollPolicy::new(Duration::from_secs(10));

        adapter(&fake).wait(&policy).await.unwrap();

        assert_eq!(fake.commands(), vec!["kubectl cluster-info"; 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_times_out() {
        let fake = Arc::new(FakeProvider::new().unready_for(u32::MAX));
        let policy = PollPolicy::new(Duration::from_secs(2));

        let err = adapter(&fake).wait(&policy).await.unwrap_err();
        assert!(matches!(err, AdapterError::Bootstrap(_)));
    }

    #[test]
    fn test_default_answers() {
        let k8s = KubernetesAdapter::new(Arc::new(FakeProvider::new())).namespace("apps");
        let answers = k8s.default_answers();

        assert_eq!(answers.get("general", "provider"), Some("kubernetes"));
        assert_eq!(answers.get("general", "namespace"), Some("apps"));
    }
}
