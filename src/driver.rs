//! Deploy and undeploy through the packaging tool
//!
//! The harness never talks to the packaging tool's internals. It writes the
//! answers to a temporary ini file, runs the tool and keeps the deployment
//! directory the tool fills in, which is what `undeploy` needs later.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::answers::{Answers, AnswersError};
use crate::config::ProviderType;
use crate::runner::{CommandExecutor, Invocation, RunnerError};

/// Error type for driver operations
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("failed to prepare answers: {0}")]
    Answers(#[from] AnswersError),

    #[error("failed to create deployment directory: {0}")]
    Workdir(#[from] std::io::Error),

    #[error("`{command}` exited with {exit_code}: {stderr}")]
    ToolFailed {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    #[error(transparent)]
    Runner(#[from] RunnerError),
}

/// Materializes and removes application instances
#[async_trait]
pub trait Driver: Send + Sync {
    /// Deploy `app_spec` (an image name or an application directory)
    ///
    /// Returns the working directory to hand to [`Driver::undeploy`].
    async fn deploy(&self, app_spec: &str, answers: &Answers) -> Result<PathBuf, DriverError>;

    async fn undeploy(&self, workdir: &Path) -> Result<(), DriverError>;
}

/// Driver for the `atomicapp` command-line tool
pub struct AtomicAppDriver {
    tool: String,
    provider: ProviderType,
    executor: Arc<dyn CommandExecutor>,
}

impl AtomicAppDriver {
    pub fn new(provider: ProviderType, executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            tool: "atomicapp".to_string(),
            provider,
            executor,
        }
    }

    /// Use another binary name or path for the tool
    pub fn tool(mut self, tool: impl Into<String>) -> Self {
        self.tool = tool.into();
        self
    }

    /// `<tool> run --answers=<file> --provider=<p> --destination=<dir> <app_spec>`
    pub fn run_command(&self, answers_file: &Path, destination: &Path, app_spec: &str) -> Invocation {
        Invocation::new(self.tool.as_str())
            .arg("run")
            .arg(format!("--answers={}", answers_file.display()))
            .arg(format!("--provider={}", self.provider))
            .arg(format!("--destination={}", destination.display()))
            .arg(app_spec)
    }

    pub fn stop_command(&self, workdir: &Path) -> Invocation {
        Invocation::new(self.tool.as_str())
            .arg("stop")
            .arg(workdir.display().to_string())
    }

    async fn run_tool(&self, invocation: &Invocation) -> Result<String, DriverError> {
        let result = self.executor.execute(invocation).await?;
        if !result.passed() {
            return Err(DriverError::ToolFailed {
                command: invocation.to_string(),
                exit_code: result.exit_code,
                stderr: result.stderr.trim().to_string(),
            });
        }
        Ok(result.stdout)
    }
}

#[async_trait]
impl Driver for AtomicAppDriver {
    #[instrument(skip(self, answers), fields(provider = %self.provider))]
    async fn deploy(&self, app_spec: &str, answers: &Answers) -> Result<PathBuf, DriverError> {
        let answers_file = answers.write_temp()?;
        let destination = tempfile::Builder::new()
            .prefix("nulecule-")
            .tempdir()?
            .keep();
        debug!(answers = %answers_file.display(), destination = %destination.display(), "Prepared deployment");

        info!("Deploying {}", app_spec);
        let output = self
            .run_tool(&self.run_command(&answers_file, &destination, app_spec))
            .await;
        if let Err(e) = answers_file.close() {
            warn!(error = %e, "Could not remove answers file");
        }
        let output = output?;
        debug!(output = output.trim(), "Deploy finished");

        Ok(destination)
    }

    #[instrument(skip(self), fields(provider = %self.provider))]
    async fn undeploy(&self, workdir: &Path) -> Result<(), DriverError> {
        info!("Undeploying {}", workdir.display());
        self.run_tool(&self.stop_command(workdir)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::FakeProvider;

    #[tokio::test]
    async fn test_deploy_runs_tool_with_answers() {
        let fake = Arc::new(FakeProvider::new().deploys_pod("wordpress", "Running"));
        let driver = AtomicAppDriver::new(ProviderType::Kubernetes, fake.clone());
        let answers = Answers::new()
            .with("general", "namespace", "default")
            .with("wordpress", "db_user", "foo");

        let workdir = driver.deploy("/lib/wordpress-centos7-atomicapp", &answers).await.unwrap();

        assert!(workdir.is_dir());
        let invocations = fake.invocations();
        let invocation = &invocations[0];
        assert_eq!(invocation.program, "atomicapp");
        assert_eq!(invocation.args[0], "run");
        assert!(invocation.args[1].starts_with("--answers="));
        assert!(invocation.args[1].ends_with(".conf"));
        assert_eq!(invocation.args[2], "--provider=kubernetes");
        assert_eq!(invocation.args[3], format!("--destination={}", workdir.display()));
        assert_eq!(invocation.args[4], "/lib/wordpress-centos7-atomicapp");

        assert_eq!(fake.deployed_answers(), vec![answers]);
        let answers_file = invocation.args[1].trim_start_matches("--answers=");
        assert!(!Path::new(answers_file).exists());
        assert!(fake.contains(crate::record::ObjectKind::Pod, "wordpress"));

        std::fs::remove_dir(workdir).unwrap();
    }

    #[tokio::test]
    async fn test_undeploy_stops_workdir() {
        let fake = Arc::new(FakeProvider::new());
        let driver = AtomicAppDriver::new(ProviderType::Docker, fake.clone());

        driver.undeploy(Path::new("/tmp/nulecule-abc")).await.unwrap();

        assert_eq!(fake.commands(), vec!["atomicapp stop /tmp/nulecule-abc"]);
    }

    #[tokio::test]
    async fn test_tool_failure_is_reported() {
        let fake = Arc::new(FakeProvider::new().fail_on("atomicapp stop", "no such deployment"));
        let driver = AtomicAppDriver::new(ProviderType::OpenShift, fake);

        let err = driver.undeploy(Path::new("/tmp/gone")).await.unwrap_err();

        match err {
            DriverError::ToolFailed { command, exit_code, stderr } => {
                assert_eq!(command, "atomicapp stop /tmp/gone");
                assert_eq!(exit_code, 1);
                assert_eq!(stderr, "no such deployment");
            }
            other => panic!("expected ToolFailed, got {other:?}"),
        }
    }

    #[test]
    fn test_custom_tool() {
        let driver = AtomicAppDriver::new(ProviderType::Docker, Arc::new(FakeProvider::new()))
            .tool("/opt/bin/atomicapp");
        let invocation = driver.run_command(Path::new("/a.conf"), Path::new("/d"), "app");

        assert_eq!(
            invocation.to_string(),
            "/opt/bin/atomicapp run --answers=/a.conf --provider=docker --destination=/d app"
        );
    }
}
