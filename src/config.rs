//! Configuration types for the harness
//!
//! Build them programmatically, or read the handful of supported environment
//! variables with [`HarnessConfig::from_env`]. No config files needed.
//!
//! # Example
//!
//! ```
//! use nulecule_harness::config::HarnessConfig;
//! use std::time::Duration;
//!
//! let config = HarnessConfig::kubernetes()
//!     .namespace("apps")
//!     .poll_interval(Duration::from_millis(500))
//!     .settle_delay(Duration::ZERO);
//! ```

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::adapter::ClusterBootstrap;
use crate::poll::PollPolicy;

/// Selects the provider (`docker`, `kubernetes` or `openshift`)
pub const ENV_PROVIDER: &str = "HARNESS_PROVIDER";
/// Pause between poll observations, in milliseconds
pub const ENV_POLL_INTERVAL_MS: &str = "HARNESS_POLL_INTERVAL_MS";
/// Namespace (Kubernetes) or project (OpenShift) to deploy into
pub const ENV_NAMESPACE: &str = "HARNESS_NAMESPACE";
/// Directory holding the application library
pub const ENV_NULECULE_LIB: &str = "NULECULE_LIB";

/// Errors building a configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown provider {0:?} (expected docker, kubernetes or openshift)")]
    UnknownProvider(String),

    #[error("invalid value {value:?} for {var}: {reason}")]
    InvalidVar {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Provider the application is deployed to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProviderType {
    Docker,
    #[default]
    Kubernetes,
    OpenShift,
}

impl ProviderType {
    /// Name understood by the packaging tool's `--provider` flag
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Docker => "docker",
            Self::Kubernetes => "kubernetes",
            Self::OpenShift => "openshift",
        }
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "docker" => Ok(Self::Docker),
            "kubernetes" | "k8s" => Ok(Self::Kubernetes),
            "openshift" => Ok(Self::OpenShift),
            other => Err(ConfigError::UnknownProvider(other.to_string())),
        }
    }
}

/// Harness configuration
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Provider under test
    pub provider: ProviderType,

    /// Pause between poll observations (zero polls back-to-back)
    pub poll_interval: Duration,

    /// Timeout for assertions that don't name one
    pub default_timeout: Duration,

    /// Timeout for each reaped object to disappear
    pub cleanup_timeout: Duration,

    /// Pause after starting the provider and after each teardown
    pub settle_delay: Duration,

    /// Namespace (Kubernetes) or project (OpenShift)
    pub namespace: String,

    /// Kubernetes cluster lifecycle
    pub bootstrap: ClusterBootstrap,

    /// Name of the OpenShift origin container
    pub origin_container: String,

    /// Packaging tool binary
    pub packaging_tool: String,

    /// Directory holding the application library
    pub nulecule_lib: PathBuf,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            provider: ProviderType::default(),
            poll_interval: Duration::from_secs(1),
            default_timeout: Duration::from_secs(1),
            cleanup_timeout: Duration::from_secs(360),
            settle_delay: Duration::from_secs(10),
            namespace: "default".to_string(),
            bootstrap: ClusterBootstrap::Existing,
            origin_container: "origin".to_string(),
            packaging_tool: "atomicapp".to_string(),
            nulecule_lib: PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../nulecule-library"),
        }
    }
}

impl HarnessConfig {
    pub fn new(provider: ProviderType) -> Self {
        Self {
            provider,
            ..Self::default()
        }
    }

    pub fn docker() -> Self {
        Self::new(ProviderType::Docker)
    }

    pub fn kubernetes() -> Self {
        Self::new(ProviderType::Kubernetes)
    }

    pub fn openshift() -> Self {
        Self::new(ProviderType::OpenShift)
    }

    /// Start from defaults and apply the supported environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Like [`HarnessConfig::from_env`] with an explicit variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(provider) = lookup(ENV_PROVIDER) {
            config.provider = provider.parse()?;
        }

        if let Some(raw) = lookup(ENV_POLL_INTERVAL_MS) {
            let millis = raw.trim().parse::<u64>().map_err(|e| ConfigError::InvalidVar {
                var: ENV_POLL_INTERVAL_MS,
                value: raw.clone(),
                reason: e.to_string(),
            })?;
            config.poll_interval = Duration::from_millis(millis);
        }

        if let Some(namespace) = lookup(ENV_NAMESPACE) {
            config.namespace = namespace;
        }

        if let Some(lib) = lookup(ENV_NULECULE_LIB) {
            config.nulecule_lib = PathBuf::from(lib);
        }

        Ok(config)
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn cleanup_timeout(mut self, timeout: Duration) -> Self {
        self.cleanup_timeout = timeout;
        self
    }

    pub fn settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn bootstrap(mut self, bootstrap: ClusterBootstrap) -> Self {
        self.bootstrap = bootstrap;
        self
    }

    pub fn origin_container(mut self, name: impl Into<String>) -> Self {
        self.origin_container = name.into();
        self
    }

    pub fn packaging_tool(mut self, tool: impl Into<String>) -> Self {
        self.packaging_tool = tool.into();
        self
    }

    pub fn nulecule_lib(mut self, path: impl Into<PathBuf>) -> Self {
        self.nulecule_lib = path.into();
        self
    }

    /// Poll policy with the configured interval
    pub fn policy(&self, timeout: Duration) -> PollPolicy {
        PollPolicy::new(timeout).interval(self.poll_interval)
    }

    /// Path of an application inside the library
    pub fn app_path(&self, app_dir: &str) -> PathBuf {
        self.nulecule_lib.join(app_dir)
    }
}
