//! Container runtime and host file collaborators.
//!
//! The orchestrator only talks to the container runtime through
//! [`ContainerRuntime`] and to the runtime host's filesystem through
//! [`HostFiles`]. A container invocation is described by a [`RunSpec`],
//! built fluently:
//!
//! ```
//! use clusterup_common::runtime::RunSpec;
//!
//! let spec = RunSpec::new("openshift/origin:v3.6")
//!     .discard()
//!     .privileged()
//!     .host_network()
//!     .entrypoint("hostname")
//!     .command(["-I"]);
//! assert!(spec.is_discarded());
//! ```

use std::path::Path;

use async_trait::async_trait;

use crate::error::RuntimeResult;

/// One container invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSpec {
    image: String,
    name: Option<String>,
    privileged: bool,
    host_network: bool,
    host_pid: bool,
    discard: bool,
    entrypoint: Option<String>,
    binds: Vec<String>,
    env: Vec<String>,
    command: Vec<String>,
}

impl RunSpec {
    /// Creates a spec for the given image.
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            ..Default::default()
        }
    }

    /// Names the container.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Runs the container in privileged mode.
    pub fn privileged(mut self) -> Self {
        self.privileged = true;
        self
    }

    /// Shares the host network namespace.
    pub fn host_network(mut self) -> Self {
        self.host_network = true;
        self
    }

    /// Shares the host PID namespace.
    pub fn host_pid(mut self) -> Self {
        self.host_pid = true;
        self
    }

    /// Removes the container once it exits.
    pub fn discard(mut self) -> Self {
        self.discard = true;
        self
    }

    /// Overrides the image entrypoint.
    pub fn entrypoint(mut self, entrypoint: impl Into<String>) -> Self {
        self.entrypoint = Some(entrypoint.into());
        self
    }

    /// Adds `host:container[:mode]` bind mounts.
    pub fn binds<I, S>(mut self, binds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.binds.extend(binds.into_iter().map(Into::into));
        self
    }

    /// Adds `KEY=VALUE` environment entries.
    pub fn env<I, S>(mut self, env: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.env.extend(env.into_iter().map(Into::into));
        self
    }

    /// Sets the command arguments passed after the image.
    pub fn command<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    pub fn container_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn is_privileged(&self) -> bool {
        self.privileged
    }

    pub fn uses_host_network(&self) -> bool {
        self.host_network
    }

    pub fn uses_host_pid(&self) -> bool {
        self.host_pid
    }

    pub fn is_discarded(&self) -> bool {
        self.discard
    }

    pub fn entrypoint_override(&self) -> Option<&str> {
        self.entrypoint.as_deref()
    }

    pub fn bind_mounts(&self) -> &[String] {
        &self.binds
    }

    pub fn environment(&self) -> &[String] {
        &self.env
    }

    pub fn args(&self) -> &[String] {
        &self.command
    }

    /// Renders the `docker run` option list (everything between `run` and
    /// the image, then the image and its command). `detach` adds `-d`.
    pub fn docker_run_args(&self, detach: bool) -> Vec<String> {
        let mut args = Vec::new();
        if detach {
            args.push("-d".to_string());
        }
        if self.discard {
            args.push("--rm".to_string());
        }
        if let Some(name) = &self.name {
            args.push(format!("--name={}", name));
        }
        if self.privileged {
            args.push("--privileged".to_string());
        }
        if self.host_network {
            args.push("--net=host".to_string());
        }
        if self.host_pid {
            args.push("--pid=host".to_string());
        }
        if let Some(entrypoint) = &self.entrypoint {
            args.push(format!("--entrypoint={}", entrypoint));
        }
        for bind in &self.binds {
            args.push("-v".to_string());
            args.push(bind.clone());
        }
        for env in &self.env {
            args.push("-e".to_string());
            args.push(env.clone());
        }
        args.push(self.image.clone());
        args.extend(self.command.iter().cloned());
        args
    }
}

/// Output of a container run to completion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutput {
    pub stdout: String,
    pub stderr: String,
}

impl RunOutput {
    /// Stdout followed by stderr, the way a terminal would show them.
    pub fn combined(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}\n{}", self.stdout, self.stderr),
        }
    }
}

/// Observed state of a named container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    Running,
    Exited,
}

impl ContainerState {
    pub fn is_running(&self) -> bool {
        matches!(self, ContainerState::Running)
    }
}

/// Container runtime client.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Runs a container to completion and captures its output.
    ///
    /// A non-zero exit status is an error.
    async fn run(&self, spec: &RunSpec) -> RuntimeResult<RunOutput>;

    /// Starts a long-running container in the background and returns its id.
    async fn start(&self, spec: &RunSpec) -> RuntimeResult<String>;

    /// Reports whether the named container is running.
    async fn container_state(&self, name: &str) -> RuntimeResult<ContainerState>;

    /// Stops and removes a container by name or id.
    async fn stop_and_remove(&self, name: &str) -> RuntimeResult<()>;
}

/// Access to the runtime host's filesystem namespace.
#[async_trait]
pub trait HostFiles: Send + Sync {
    /// Copies the contents of `host_dir` into the existing local directory
    /// `local_dir`.
    async fn copy_from_host(&self, host_dir: &Path, local_dir: &Path) -> RuntimeResult<()>;

    /// Copies one local file into the directory `host_dir` on the host,
    /// keeping its file name.
    async fn copy_file_to_host(&self, local_file: &Path, host_dir: &Path) -> RuntimeResult<()>;

    /// Hostname of the runtime host.
    async fn hostname(&self) -> RuntimeResult<String>;
}
