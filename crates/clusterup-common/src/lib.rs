//! Runtime collaborators for clusterup.
//!
//! The startup orchestrator in the `clusterup` crate never touches docker,
//! the host filesystem or the network directly. It goes through the narrow
//! interfaces defined here:
//!
//! - [`runtime`]: [`ContainerRuntime`], [`HostFiles`] and the [`RunSpec`]
//!   builder describing one container invocation
//! - [`health`]: [`HealthClient`] and the TLS client trusting the control
//!   plane's own CA
//! - [`docker`]: [`DockerCli`], the `docker` CLI implementation of both
//!   runtime traits
//! - [`shell`]: command execution with proper quoting
//! - [`error`]: [`RuntimeError`] reported by every collaborator
//!
//! # Example
//!
//! ```ignore
//! use clusterup_common::{ContainerRuntime, DockerCli, RunSpec};
//!
//! let docker = DockerCli::new("openshift/origin:v3.6");
//! let spec = RunSpec::new("openshift/origin:v3.6")
//!     .discard()
//!     .command(["start", "--print-ip"]);
//! let output = docker.run(&spec).await?;
//! ```

pub mod docker;
pub mod error;
pub mod health;
pub mod runtime;
pub mod shell;

// Re-export commonly used items at crate root
pub use docker::DockerCli;
pub use error::{error_chain, RuntimeError, RuntimeResult};
pub use health::{
    HealthClient, HealthClientFactory, HealthResponse, HttpsClientFactory, HttpsHealthClient,
};
pub use runtime::{ContainerRuntime, ContainerState, HostFiles, RunOutput, RunSpec};
