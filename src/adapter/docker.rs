//! Docker provider
//!
//! Tracks plain containers on the local daemon. There is no cluster to
//! bring up; readiness means the daemon answers `docker info`.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use super::{run_checked, run_on_object, wait_until_ready, AdapterError, ProviderAdapter};
use crate::answers::Answers;
use crate::poll::PollPolicy;
use crate::record::ObjectKind;
use crate::runner::{CommandExecutor, Invocation};

/// Docker provider
pub struct DockerAdapter {
    executor: Arc<dyn CommandExecutor>,
}

impl DockerAdapter {
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self { executor }
    }

    fn check_kind(kind: ObjectKind) -> Result<(), AdapterError> {
        if kind != ObjectKind::Container {
            return Err(AdapterError::Unsupported {
                provider: "docker",
                kind,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ProviderAdapter for DockerAdapter {
    fn name(&self) -> &'static str {
        "docker"
    }

    fn tracked_kinds(&self) -> &'static [ObjectKind] {
        &ObjectKind::DOCKER
    }

    /// `docker ps -a`: running and stopped containers
    #[instrument(skip(self))]
    async fn list(&self, kind: ObjectKind) -> Result<String, AdapterError> {
        Self::check_kind(kind)?;
        let output = run_checked(
            self.executor.as_ref(),
            &Invocation::new("docker").args(["ps", "-a"]),
        )
        .await?;
        Ok(output.stdout)
    }

    /// The full `docker ps -a` listing
    ///
    /// Docker filters match either names or ids, never both, so the
    /// container is picked out of the listing by name or id afterwards.
    #[instrument(skip(self))]
    async fn get(&self, kind: ObjectKind, name: &str) -> Result<String, AdapterError> {
        debug!(name, "Looking up container");
        self.list(kind).await
    }

    #[instrument(skip(self))]
    async fn delete(&self, kind: ObjectKind, key: &str) -> Result<(), AdapterError> {
        Self::check_kind(kind)?;
        info!("Removing container {}", key);
        run_on_object(
            self.executor.as_ref(),
            &Invocation::new("docker").args(["rm", "-f", key]),
            key,
        )
        .await?;
        Ok(())
    }

    async fn start(&self) -> Result<(), AdapterError> {
        debug!("Docker daemon is not managed by the harness");
        Ok(())
    }

    async fn stop(&self) -> Result<(), AdapterError> {
        Ok(())
    }

    async fn wait(&self, policy: &PollPolicy) -> Result<(), AdapterError> {
        wait_until_ready(
            self.executor.as_ref(),
            &Invocation::new("docker").arg("info"),
            policy,
        )
        .await
    }

    fn default_answers(&self) -> Answers {
        let mut answers = Answers::new();
        answers.set("general", "provider", "docker");
        answers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{lookup, snapshot};
    use crate::assertions::Assertions;
    use crate::fixtures::FakeProvider;
    use std::time::Duration;

    #[tokio::test]
    async fn test_snapshot_includes_stopped_containers() {
        let fake = Arc::new(
            FakeProvider::new()
                .with_container("a1b2c3d4e5f6", "helloapache", "Up 3 minutes")
                .with_container("f6e5d4c3b2a1", "old_job", "Exited (0) 1 hour ago"),
        );
        let docker = DockerAdapter::new(fake.clone());

        let containers = snapshot(&docker, ObjectKind::Container).await.unwrap();

        assert_eq!(containers.len(), 2);
        assert!(containers.find("old_job").is_some());
        assert_eq!(fake.commands(), vec!["docker ps -a"]);
    }

    #[tokio::test]
    async fn test_lookup_finds_by_name() {
        let fake = Arc::new(
            FakeProvider::new()
                .with_container("a1b2c3d4e5f6", "helloapache", "Up 3 minutes")
                .with_container("f6e5d4c3b2a1", "old_job", "Exited (0) 1 hour ago"),
        );
        let docker = DockerAdapter::new(fake.clone());

        let found = lookup(&docker, ObjectKind::Container, "helloapache")
            .await
            .unwrap();

        assert_eq!(found.find("helloapache").map(|r| r.key()), Some("a1b2c3d4e5f6"));
        assert_eq!(fake.commands(), vec!["docker ps -a"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_container_assertions_accept_ids() {
        let fake = Arc::new(
            FakeProvider::new()
                .with_container("a1b2c3d4e5f6", "helloapache", "Up 3 minutes")
                .with_container("f6e5d4c3b2a1", "old_job", "Exited (0) 1 hour ago"),
        );
        let docker = DockerAdapter::new(fake.clone());
        let assertions = Assertions::new(&docker, Duration::from_secs(1));

        assertions
            .assert_container_running("a1b2c3d4e5f6", Duration::from_secs(1))
            .await
            .unwrap();
        assertions
            .assert_container_not_running("f6e5d4c3b2a1", Duration::from_secs(1))
            .await
            .unwrap();
        assertions
            .assert_exists(ObjectKind::Container, "f6e5d4c3b2a1", Duration::ZERO)
            .await
            .unwrap();

        docker
            .delete(ObjectKind::Container, "a1b2c3d4e5f6")
            .await
            .unwrap();
        assertions
            .assert_absent(ObjectKind::Container, "a1b2c3d4e5f6", Duration::ZERO)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_delete_forces_removal() {
        let fake = Arc::new(FakeProvider::new().with_container(
            "a1b2c3d4e5f6",
            "helloapache",
            "Up 3 minutes",
        ));
        let docker = DockerAdapter::new(fake.clone());

        docker
            .delete(ObjectKind::Container, "a1b2c3d4e5f6")
            .await
            .unwrap();

        assert!(!fake.contains(ObjectKind::Container, "a1b2c3d4e5f6"));
        assert_eq!(fake.commands(), vec!["docker rm -f a1b2c3d4e5f6"]);
    }

    #[tokio::test]
    async fn test_pods_are_unsupported() {
        let docker = DockerAdapter::new(Arc::new(FakeProvider::new()));
        let err = docker.list(ObjectKind::Pod).await.unwrap_err();
        assert!(matches!(err, AdapterError::Unsupported { provider: "docker", .. }));
    }
}
