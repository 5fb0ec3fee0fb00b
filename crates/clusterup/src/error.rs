//! Error types for the startup sequence.
//!
//! Every stage wraps the underlying [`RuntimeError`] in a stage-specific
//! variant carrying the container name, address or path it was working on.
//! Callers can tell "the daemon never ran" ([`StartupError::FailedToStart`])
//! from "it ran but never became reachable"
//! ([`StartupError::TimedOutWaitingForStart`]) without inspecting causes.

use std::path::PathBuf;
use std::time::Duration;

use clusterup_common::RuntimeError;
use thiserror::Error;

use crate::observer::Stage;

/// Result type alias for startup operations.
pub type StartupResult<T> = Result<T, StartupError>;

/// Why the readiness endpoint was declared failed.
#[derive(Debug, Error)]
pub enum ReadinessCause {
    /// No HTTP response was obtained.
    #[error("{0}")]
    Transport(#[source] RuntimeError),

    /// The server answered with a status that is neither ready nor transient.
    #[error("server is not ready. Response ({status}): {body}")]
    Status { status: u16, body: String },
}

/// Errors decoding or encoding `master-config.yaml`.
#[derive(Debug, Error)]
pub enum MasterConfigError {
    #[error("invalid YAML: {0}")]
    Parse(#[source] serde_yaml::Error),

    #[error("expected a mapping at the document root, found a {found}")]
    NotMapping { found: &'static str },

    #[error("could not serialize: {0}")]
    Serialize(#[source] serde_yaml::Error),
}

/// Errors that can occur while bringing up the control plane.
#[derive(Debug, Error)]
pub enum StartupError {
    /// The connection table could not be read from the host.
    #[error("Cannot get TCP port information from the container host: {source}")]
    PortScan {
        #[source]
        source: RuntimeError,
    },

    /// Required ports are already listening on the host.
    #[error("TCP port conflict: the following required ports are in use: {ports:?}")]
    PortConflict { ports: Vec<u16> },

    /// The first-run configuration could not be written.
    #[error("Could not create control plane configuration in {}: {source}", host_dir.display())]
    ConfigGeneration {
        host_dir: PathBuf,
        #[source]
        source: RuntimeError,
    },

    /// The configuration tree could not be copied to a local directory.
    #[error("Could not copy configuration from host directory {}: {source}", host_dir.display())]
    StageFailure {
        host_dir: PathBuf,
        #[source]
        source: RuntimeError,
    },

    /// The master configuration could not be patched or written back.
    #[error("Could not update configuration {}: {message}", path.display())]
    ConfigUpdate {
        path: PathBuf,
        message: String,
        #[source]
        source: Option<RuntimeError>,
    },

    /// The in-container configuration paths could not be computed.
    #[error("Could not get configuration file paths: {source}")]
    ConfigPaths {
        #[source]
        source: RuntimeError,
    },

    /// The long-running container could not be launched.
    #[error("Cannot start control plane daemon in container '{container}': {source}")]
    DaemonStart {
        container: String,
        #[source]
        source: RuntimeError,
    },

    /// The container state could not be queried.
    #[error("Cannot get state of container '{container}': {source}")]
    StateQuery {
        container: String,
        #[source]
        source: RuntimeError,
    },

    /// The container exited during the grace period.
    #[error("Control plane container '{container}' failed to start; check its logs with `docker logs {container}`")]
    FailedToStart { container: String },

    /// The container ran but its API port never accepted connections.
    #[error("Timed out waiting for control plane in container '{container}' to listen on {addr}")]
    TimedOutWaitingForStart { container: String, addr: String },

    /// The readiness HTTP client could not be built.
    #[error("Cannot build readiness client from {}: {source}", ca_cert.display())]
    ClientSetup {
        ca_cert: PathBuf,
        #[source]
        source: RuntimeError,
    },

    /// The readiness endpoint reported a fatal condition.
    #[error("Cannot access master readiness URL {url}: {cause}")]
    ReadinessFailed {
        url: String,
        #[source]
        cause: ReadinessCause,
    },

    /// The readiness endpoint did not report ready before the deadline.
    #[error("Master readiness URL {url} not ready after {waited:?}")]
    ReadinessTimeout { url: String, waited: Duration },

    /// A dial loop exhausted its attempts.
    #[error("Could not connect to {addr} after {attempts} attempts")]
    Timeout { addr: String, attempts: u32 },

    /// The caller cancelled the operation.
    #[error("Cancelled while {during}")]
    Cancelled { during: String },

    /// The throwaway listener used to test host reachability did not start.
    #[error("Cannot start test server on container host: {source}")]
    TestServer {
        #[source]
        source: RuntimeError,
    },

    /// A host diagnostic query failed.
    #[error("Cannot determine {what} of container host: {source}")]
    HostQuery {
        what: String,
        #[source]
        source: RuntimeError,
    },

    /// The policy file is unreadable or invalid.
    #[error("Invalid policy {}: {message}", path.display())]
    Policy { path: PathBuf, message: String },
}

impl StartupError {
    pub(crate) fn config_update(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ConfigUpdate {
            path: path.into(),
            message: message.into(),
            source: None,
        }
    }

    pub(crate) fn cancelled(during: impl Into<String>) -> Self {
        Self::Cancelled {
            during: during.into(),
        }
    }

    /// The startup stage this error belongs to, or `None` for errors raised
    /// outside the stage sequence (cancellation, host diagnostics, policy).
    pub fn stage(&self) -> Option<Stage> {
        let stage = match self {
            StartupError::PortScan { .. } | StartupError::PortConflict { .. } => Stage::PortCheck,
            StartupError::ConfigGeneration { .. }
            | StartupError::StageFailure { .. }
            | StartupError::ConfigUpdate { .. } => Stage::ConfigResolved,
            StartupError::ConfigPaths { .. } | StartupError::DaemonStart { .. } => {
                Stage::ContainerStarting
            }
            StartupError::StateQuery { .. } | StartupError::FailedToStart { .. } => {
                Stage::ContainerRunning
            }
            StartupError::TimedOutWaitingForStart { .. } | StartupError::Timeout { .. } => {
                Stage::ListenerReady
            }
            StartupError::ClientSetup { .. }
            | StartupError::ReadinessFailed { .. }
            | StartupError::ReadinessTimeout { .. } => Stage::ServiceReady,
            StartupError::Cancelled { .. }
            | StartupError::TestServer { .. }
            | StartupError::HostQuery { .. }
            | StartupError::Policy { .. } => return None,
        };
        Some(stage)
    }

    /// Returns true once the daemon container has been launched, i.e. the
    /// failure left a container behind.
    pub fn container_launched(&self) -> bool {
        matches!(
            self,
            StartupError::StateQuery { .. }
                | StartupError::FailedToStart { .. }
                | StartupError::TimedOutWaitingForStart { .. }
                | StartupError::ClientSetup { .. }
                | StartupError::ReadinessFailed { .. }
                | StartupError::ReadinessTimeout { .. }
        )
    }
}
