//! Startup policy: required ports, fixed binds, container layout and timings.
//!
//! Loaded from TOML; every field has a default, so an empty or missing file
//! yields [`StartupPolicy::default`].
//! Default location: /etc/clusterup/clusterup.toml

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::error::{StartupError, StartupResult};
use crate::dial::DialPolicy;

/// Default policy file location.
pub const DEFAULT_POLICY_PATH: &str = "/etc/clusterup/clusterup.toml";

/// Host ports the control plane binds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortPolicy {
    /// Ports that must not be listening before startup
    #[serde(default = "default_required_ports")]
    pub required: Vec<u16>,

    /// Secure API port dialed and polled after launch
    #[serde(default = "default_api_port")]
    pub api_port: u16,
}

/// Container image, mounts and in-container paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerPolicy {
    /// Image repository; component images are `<image>-${component}`
    #[serde(default = "default_image")]
    pub image: String,

    /// Name of the long-running control plane container
    #[serde(default = "default_container_name")]
    pub container_name: String,

    /// Binds applied to every control plane container
    #[serde(default = "default_binds")]
    pub binds: Vec<String>,

    /// Configuration root inside the container
    #[serde(default = "default_config_root")]
    pub config_root: String,

    /// etcd data directory inside the container
    #[serde(default = "default_data_root")]
    pub data_root: String,

    /// Stop and remove the container when a later stage fails
    #[serde(default)]
    pub teardown_on_failure: bool,
}

/// Routing defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingPolicy {
    /// Suffix appended to the server IP when no routing suffix is given
    #[serde(default = "default_wildcard_dns_suffix")]
    pub wildcard_dns_suffix: String,
}

/// Waits and retry budgets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingPolicy {
    /// Grace period before the first container state check
    #[serde(default = "default_initial_status_check_ms")]
    pub initial_status_check_ms: u64,

    /// Per-attempt TCP connect timeout
    #[serde(default = "default_dial_timeout_ms")]
    pub dial_timeout_ms: u64,

    /// Delay between TCP connect attempts
    #[serde(default = "default_dial_interval_ms")]
    pub dial_interval_ms: u64,

    /// Connect attempts while waiting for the API server to listen
    #[serde(default = "default_server_up_attempts")]
    pub server_up_attempts: u32,

    /// Connect attempts when testing host reachability
    #[serde(default = "default_test_ip_attempts")]
    pub test_ip_attempts: u32,

    /// Delay between readiness polls
    #[serde(default = "default_readiness_interval_ms")]
    pub readiness_interval_ms: u64,

    /// Overall readiness deadline in seconds; 0 waits without bound
    #[serde(default = "default_readiness_deadline_secs")]
    pub readiness_deadline_secs: u64,
}

/// Complete startup policy
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartupPolicy {
    #[serde(default)]
    pub ports: PortPolicy,

    #[serde(default)]
    pub container: ContainerPolicy,

    #[serde(default)]
    pub routing: RoutingPolicy,

    #[serde(default)]
    pub timing: TimingPolicy,
}

// Default functions
fn default_required_ports() -> Vec<u16> {
    vec![53, 80, 443, 4001, 7001, 8443, 10250]
}

fn default_api_port() -> u16 {
    8443
}

fn default_image() -> String {
    "openshift/origin".to_string()
}

fn default_container_name() -> String {
    "origin".to_string()
}

fn default_binds() -> Vec<String> {
    vec![
        "/:/rootfs:ro".to_string(),
        "/var/run:/var/run:rw".to_string(),
        "/sys:/sys:ro".to_string(),
        "/var/lib/docker:/var/lib/docker".to_string(),
    ]
}

fn default_config_root() -> String {
    "/var/lib/origin/openshift.local.config".to_string()
}

fn default_data_root() -> String {
    "/var/lib/origin/openshift.local.etcd".to_string()
}

fn default_wildcard_dns_suffix() -> String {
    crate::patcher::DEFAULT_WILDCARD_DNS_SUFFIX.to_string()
}

fn default_initial_status_check_ms() -> u64 {
    4000
}

fn default_dial_timeout_ms() -> u64 {
    200
}

fn default_dial_interval_ms() -> u64 {
    1000
}

fn default_server_up_attempts() -> u32 {
    35
}

fn default_test_ip_attempts() -> u32 {
    10
}

fn default_readiness_interval_ms() -> u64 {
    500
}

fn default_readiness_deadline_secs() -> u64 {
    300
}

// Default implementations
impl Default for PortPolicy {
    fn default() -> Self {
        Self {
            required: default_required_ports(),
            api_port: default_api_port(),
        }
    }
}

impl Default for ContainerPolicy {
    fn default() -> Self {
        Self {
            image: default_image(),
            container_name: default_container_name(),
            binds: default_binds(),
            config_root: default_config_root(),
            data_root: default_data_root(),
            teardown_on_failure: false,
        }
    }
}

impl Default for RoutingPolicy {
    fn default() -> Self {
        Self {
            wildcard_dns_suffix: default_wildcard_dns_suffix(),
        }
    }
}

impl Default for TimingPolicy {
    fn default() -> Self {
        Self {
            initial_status_check_ms: default_initial_status_check_ms(),
            dial_timeout_ms: default_dial_timeout_ms(),
            dial_interval_ms: default_dial_interval_ms(),
            server_up_attempts: default_server_up_attempts(),
            test_ip_attempts: default_test_ip_attempts(),
            readiness_interval_ms: default_readiness_interval_ms(),
            readiness_deadline_secs: default_readiness_deadline_secs(),
        }
    }
}

impl StartupPolicy {
    /// Load policy from file, falling back to defaults if file not found
    pub fn load_or_default(path: impl AsRef<Path>) -> StartupResult<Self> {
        let path = path.as_ref();

        let policy: Self = match fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| StartupError::Policy {
                path: path.to_path_buf(),
                message: format!("parse failed: {}", e),
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "Policy file not found, using defaults");
                Self::default()
            }
            Err(e) => {
                return Err(StartupError::Policy {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })
            }
        };
        policy.validate(path)?;
        Ok(policy)
    }

    /// Load from default location or defaults
    pub fn load() -> StartupResult<Self> {
        Self::load_or_default(DEFAULT_POLICY_PATH)
    }

    /// Image reference for the given tag.
    pub fn image_ref(&self, tag: &str) -> String {
        format!("{}:{}", self.container.image, tag)
    }

    /// Per-component image template handed to `--images`.
    pub fn component_images(&self, tag: &str) -> String {
        format!("{}-${{component}}:{}", self.container.image, tag)
    }

    pub fn initial_status_check(&self) -> Duration {
        Duration::from_millis(self.timing.initial_status_check_ms)
    }

    /// Dial policy while waiting for the API server to listen.
    pub fn server_up_dial(&self) -> DialPolicy {
        DialPolicy::new(
            Duration::from_millis(self.timing.dial_timeout_ms),
            Duration::from_millis(self.timing.dial_interval_ms),
            self.timing.server_up_attempts,
        )
    }

    /// Dial policy when testing host reachability.
    pub fn test_ip_dial(&self) -> DialPolicy {
        DialPolicy::new(
            Duration::from_millis(self.timing.dial_timeout_ms),
            Duration::from_millis(self.timing.dial_interval_ms),
            self.timing.test_ip_attempts,
        )
    }

    pub fn readiness_interval(&self) -> Duration {
        Duration::from_millis(self.timing.readiness_interval_ms)
    }

    pub fn readiness_deadline(&self) -> Option<Duration> {
        match self.timing.readiness_deadline_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn config_root(&self) -> PathBuf {
        PathBuf::from(&self.container.config_root)
    }

    /// Validate policy
    pub fn validate(&self, path: &Path) -> StartupResult<()> {
        let invalid = |message: &str| StartupError::Policy {
            path: path.to_path_buf(),
            message: message.to_string(),
        };
        if self.ports.api_port == 0 {
            return Err(invalid("api_port must be > 0"));
        }
        if self.timing.server_up_attempts == 0 || self.timing.test_ip_attempts == 0 {
            return Err(invalid("dial attempts must be > 0"));
        }
        if self.container.container_name.is_empty() {
            return Err(invalid("container_name must not be empty"));
        }
        if !self.container.config_root.starts_with('/') || !self.container.data_root.starts_with('/') {
            return Err(invalid("container paths must be absolute"));
        }
        Ok(())
    }
}
