//! Provider sessions and per-test lifecycle
//!
//! A [`Session`] owns one live provider for a whole suite: it brings the
//! provider up once and tears it down at the end. Each test runs as a
//! [`TestCase`] borrowed from the session:
//!
//! 1. [`Session::begin`] prepares the provider and captures the baseline
//! 2. the test deploys, asserts and undeploys
//! 3. [`TestCase::finish`] reaps whatever the test left behind
//!
//! Tests sharing a session must run one at a time: the baseline diff
//! cannot tell two concurrent tests apart.
//!
//! # Example
//!
//! ```ignore
//! let mut session = Session::from_config(HarnessConfig::kubernetes());
//! session.bootstrap().await?;
//!
//! let mut case = session.begin().await?;
//! case.answers_mut().set("wordpress", "db_user", "foo");
//! let workdir = case.deploy_app("wordpress-centos7-atomicapp").await?;
//! case.assert_pod("wordpress", Some("Running"), secs(360)).await?;
//! case.undeploy(&workdir).await?;
//! case.assert_absent(ObjectKind::Pod, "wordpress", secs(360)).await?;
//! case.finish().await?;
//!
//! session.shutdown().await?;
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, instrument};

use crate::adapter::{for_config, AdapterError, ProviderAdapter};
use crate::answers::Answers;
use crate::assertions::{AssertionError, Assertions};
use crate::baseline::Baseline;
use crate::config::{ConfigError, HarnessConfig};
use crate::diagnostics::Diagnostics;
use crate::driver::{AtomicAppDriver, Driver, DriverError};
use crate::reap::{ReapError, ReapReport, Reaper};
use crate::record::ObjectKind;
use crate::runner::{CommandExecutor, SystemExecutor};

/// Umbrella error for harness operations
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Adapter(#[from] AdapterError),

    #[error(transparent)]
    Assertion(#[from] AssertionError),

    #[error("teardown failed: {0}")]
    Reap(#[from] ReapError),

    #[error("deploy driver failed: {0}")]
    Driver(#[from] DriverError),
}

/// One live provider shared by a suite of tests
pub struct Session {
    config: HarnessConfig,
    adapter: Box<dyn ProviderAdapter>,
    driver: Box<dyn Driver>,
    answers: Answers,
}

impl Session {
    /// Session over an explicit adapter and driver
    pub fn new(
        config: HarnessConfig,
        adapter: Box<dyn ProviderAdapter>,
        driver: Box<dyn Driver>,
    ) -> Self {
        let answers = adapter.default_answers();
        Self {
            config,
            adapter,
            driver,
            answers,
        }
    }

    /// Session running provider commands through `executor`
    pub fn with_executor(config: HarnessConfig, executor: Arc<dyn CommandExecutor>) -> Self {
        let adapter = for_config(&config, executor.clone());
        let driver = AtomicAppDriver::new(config.provider, executor)
            .tool(config.packaging_tool.clone());
        Self::new(config, adapter, Box::new(driver))
    }

    /// Session running provider commands as local subprocesses
    pub fn from_config(config: HarnessConfig) -> Self {
        Self::with_executor(config, Arc::new(SystemExecutor))
    }

    /// Session configured from environment variables
    pub fn from_env() -> Result<Self, HarnessError> {
        Ok(Self::from_config(HarnessConfig::from_env()?))
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn adapter(&self) -> &dyn ProviderAdapter {
        self.adapter.as_ref()
    }

    /// Answers every test in the session starts from
    pub fn answers(&self) -> &Answers {
        &self.answers
    }

    /// Restart the provider from scratch and wait until it answers
    ///
    /// Stops any leftover instance, starts a fresh one, lets it settle,
    /// waits for readiness and reloads the provider's default answers.
    #[instrument(skip(self), fields(provider = self.adapter.name()))]
    pub async fn bootstrap(&mut self) -> Result<(), HarnessError> {
        debug!("Stopping existing {} instance, if any", self.adapter.name());
        self.adapter.stop().await?;

        info!("Starting {} instance", self.adapter.name());
        self.adapter.start().await?;
        settle(self.config.settle_delay).await;

        self.adapter
            .wait(&self.config.policy(self.config.cleanup_timeout))
            .await?;
        self.answers = self.adapter.default_answers();
        info!("{} is ready", self.adapter.name());
        Ok(())
    }

    /// Stop the provider
    #[instrument(skip(self), fields(provider = self.adapter.name()))]
    pub async fn shutdown(&self) -> Result<(), HarnessError> {
        self.adapter.stop().await?;
        Ok(())
    }

    /// Start a test: prepare the provider, then record the baseline
    #[instrument(skip(self), fields(provider = self.adapter.name()))]
    pub async fn begin(&self) -> Result<TestCase<'_>, HarnessError> {
        let answers = self.answers.clone();
        self.adapter.prepare(&answers).await?;
        let baseline = Baseline::capture(self.adapter()).await?;
        debug!(objects = baseline.len(), "Test baseline recorded");

        Ok(TestCase {
            session: self,
            baseline,
            answers,
        })
    }
}

async fn settle(delay: Duration) {
    if !delay.is_zero() {
        debug!("Settling for {:?}", delay);
        sleep(delay).await;
    }
}

/// One test against a session's provider
pub struct TestCase<'s> {
    session: &'s Session,
    baseline: Baseline,
    answers: Answers,
}

impl<'s> TestCase<'s> {
    pub fn baseline(&self) -> &Baseline {
        &self.baseline
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.session.config
    }

    pub fn adapter(&self) -> &dyn ProviderAdapter {
        self.session.adapter()
    }

    /// Answers used by [`TestCase::deploy`]
    pub fn answers(&self) -> &Answers {
        &self.answers
    }

    pub fn answers_mut(&mut self) -> &mut Answers {
        &mut self.answers
    }

    /// Overlay answer sections, replacing same-named sections
    pub fn merge_answers(&mut self, answers: Answers) {
        self.answers.merge(answers);
    }

    pub fn assertions(&self) -> Assertions<'_> {
        Assertions::new(self.adapter(), self.config().poll_interval)
    }

    /// Deploy `app_spec` (image name or application path) with this test's answers
    pub async fn deploy(&self, app_spec: &str) -> Result<PathBuf, HarnessError> {
        Ok(self.session.driver.deploy(app_spec, &self.answers).await?)
    }

    /// Deploy an application from the configured library directory
    pub async fn deploy_app(&self, app_dir: &str) -> Result<PathBuf, HarnessError> {
        let path = self.config().app_path(app_dir);
        self.deploy(&path.display().to_string()).await
    }

    pub async fn undeploy(&self, workdir: &Path) -> Result<(), HarnessError> {
        Ok(self.session.driver.undeploy(workdir).await?)
    }

    pub async fn assert_exists(
        &self,
        kind: ObjectKind,
        name: &str,
        timeout: Duration,
    ) -> Result<(), HarnessError> {
        Ok(self.assertions().assert_exists(kind, name, timeout).await?)
    }

    pub async fn assert_status(
        &self,
        kind: ObjectKind,
        name: &str,
        status: &str,
        timeout: Duration,
    ) -> Result<(), HarnessError> {
        Ok(self
            .assertions()
            .assert_status(kind, name, status, timeout)
            .await?)
    }

    pub async fn assert_absent(
        &self,
        kind: ObjectKind,
        name: &str,
        timeout: Duration,
    ) -> Result<(), HarnessError> {
        Ok(self.assertions().assert_absent(kind, name, timeout).await?)
    }

    /// Pod exists, with `status` if given
    pub async fn assert_pod(
        &self,
        name: &str,
        status: Option<&str>,
        timeout: Duration,
    ) -> Result<(), HarnessError> {
        Ok(self.assertions().assert_pod(name, status, timeout).await?)
    }

    pub async fn assert_service(&self, name: &str, timeout: Duration) -> Result<(), HarnessError> {
        self.assert_exists(ObjectKind::Service, name, timeout).await
    }

    pub async fn assert_rc(&self, name: &str, timeout: Duration) -> Result<(), HarnessError> {
        self.assert_exists(ObjectKind::Controller, name, timeout).await
    }

    /// Container is running, checked within the default timeout
    pub async fn assert_container_running(&self, name: &str) -> Result<(), HarnessError> {
        Ok(self
            .assertions()
            .assert_container_running(name, self.config().default_timeout)
            .await?)
    }

    /// Container is stopped or gone, checked within the default timeout
    pub async fn assert_container_not_running(&self, name: &str) -> Result<(), HarnessError> {
        Ok(self
            .assertions()
            .assert_container_not_running(name, self.config().default_timeout)
            .await?)
    }

    /// Baseline vs current state of every tracked kind
    pub async fn diagnostics(&self) -> Diagnostics {
        Diagnostics::collect(self.adapter(), &self.baseline).await
    }

    /// End the test: reap new objects, wait for the provider, settle
    #[instrument(skip(self), fields(provider = self.adapter().name()))]
    pub async fn finish(self) -> Result<ReapReport, HarnessError> {
        let config = self.config();
        let cleanup = config.policy(config.cleanup_timeout);

        let report = Reaper::new(self.adapter(), cleanup)
            .reap(&self.baseline)
            .await?;
        info!(reaped = report.total(), "Teardown complete");

        self.adapter().wait(&cleanup).await?;
        settle(config.settle_delay).await;
        Ok(report)
    }
}
