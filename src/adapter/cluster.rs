//! Kubernetes cluster lifecycle
//!
//! Either a Kind (Kubernetes in Docker) cluster the harness creates and
//! deletes, or an existing cluster it never touches.

use tracing::{debug, info, instrument};

use super::{run_checked, AdapterError};
use crate::runner::{CommandExecutor, Invocation};

/// How the harness gets a Kubernetes cluster to test against
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ClusterBootstrap {
    /// Create and delete a Kind cluster with this name
    Kind { name: String },
    /// Use whatever cluster kubectl points at (no lifecycle management)
    #[default]
    Existing,
}

impl ClusterBootstrap {
    pub fn kind(name: impl Into<String>) -> Self {
        Self::Kind { name: name.into() }
    }

    #[instrument(skip(executor))]
    pub(crate) async fn start(&self, executor: &dyn CommandExecutor) -> Result<(), AdapterError> {
        let Self::Kind { name } = self else {
            debug!("Using existing cluster");
            return Ok(());
        };

        if kind_cluster_exists(executor, name).await? {
            debug!("Cluster {} already exists, reusing", name);
            return Ok(());
        }

        info!("Creating Kind cluster: {}", name);
        run_checked(
            executor,
            &Invocation::new("kind").args(["create", "cluster", "--name", name.as_str()]),
        )
        .await
        .map_err(|e| AdapterError::Bootstrap(format!("kind create cluster {name}: {e}")))?;

        info!("Cluster {} created successfully", name);
        Ok(())
    }

    #[instrument(skip(executor))]
    pub(crate) async fn stop(&self, executor: &dyn CommandExecutor) -> Result<(), AdapterError> {
        let Self::Kind { name } = self else {
            debug!("Skipping delete for existing cluster (not managed by the harness)");
            return Ok(());
        };

        info!("Deleting Kind cluster: {}", name);
        run_checked(
            executor,
            &Invocation::new("kind").args(["delete", "cluster", "--name", name.as_str()]),
        )
        .await?;

        debug!("Cluster {} deleted", name);
        Ok(())
    }
}

async fn kind_cluster_exists(
    executor: &dyn CommandExecutor,
    name: &str,
) -> Result<bool, AdapterError> {
    let output = run_checked(executor, &Invocation::new("kind").args(["get", "clusters"])).await?;
    Ok(output.stdout.lines().any(|line| line.trim() == name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::FakeProvider;

    #[tokio::test]
    async fn test_existing_cluster_runs_nothing() {
        let fake = FakeProvider::new();

        ClusterBootstrap::Existing.start(&fake).await.unwrap();
        ClusterBootstrap::Existing.stop(&fake).await.unwrap();

        assert!(fake.commands().is_empty());
    }

    #[tokio::test]
    async fn test_kind_cluster_created_when_missing() {
        let fake = FakeProvider::new();
        let bootstrap = ClusterBootstrap::kind("harness");

        bootstrap.start(&fake).await.unwrap();

        assert_eq!(
            fake.commands(),
            vec![
                "kind get clusters".to_string(),
                "kind create cluster --name harness".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_kind_cluster_reused_when_present() {
        let fake = FakeProvider::new();
        let bootstrap = ClusterBootstrap::kind("harness");

        bootstrap.start(&fake).await.unwrap();
        bootstrap.start(&fake).await.unwrap();

        let creates = fake
            .commands()
            .iter()
            .filter(|c| c.starts_with("kind create"))
            .count();
        assert_eq!(creates, 1);
    }

    #[tokio::test]
    async fn test_kind_cluster_deleted_on_stop() {
        let fake = FakeProvider::new();
        let bootstrap = ClusterBootstrap::kind("harness");

        bootstrap.start(&fake).await.unwrap();
        bootstrap.stop(&fake).await.unwrap();

        assert!(fake
            .commands()
            .contains(&"kind delete cluster --name harness".to_string()));
        assert!(fake.kind_clusters().is_empty());
    }
}
