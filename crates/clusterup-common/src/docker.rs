//! Collaborators backed by the `docker` CLI.
//!
//! [`DockerCli`] implements both [`ContainerRuntime`] and [`HostFiles`].
//! Host filesystem access goes through short-lived helper containers that
//! bind the host directory and stream a tar archive over stdout/stdin, so it
//! works against a remote docker host as well as a local one.

use std::path::Path;

use async_trait::async_trait;
use tracing::{debug, info, instrument};

use crate::error::{RuntimeError, RuntimeResult};
use crate::runtime::{ContainerRuntime, ContainerState, HostFiles, RunOutput, RunSpec};
use crate::shell::{self, join_quoted, shellquote, DOCKER_CMD};

/// Mount point of the host directory inside file-copy helper containers.
const HOST_MOUNT: &str = "/clusterup-host";

/// Docker CLI client.
#[derive(Debug, Clone)]
pub struct DockerCli {
    /// Image used for helper containers (needs `tar` and `hostname`).
    helper_image: String,
}

impl DockerCli {
    pub fn new(helper_image: impl Into<String>) -> Self {
        Self {
            helper_image: helper_image.into(),
        }
    }

    pub fn helper_image(&self) -> &str {
        &self.helper_image
    }

    fn run_command(spec: &RunSpec, detach: bool) -> String {
        format!("{} run {}", DOCKER_CMD, join_quoted(&spec.docker_run_args(detach)))
    }

    fn copy_from_host_pipeline(&self, host_dir: &Path, local_dir: &Path) -> String {
        let reader = RunSpec::new(self.helper_image.clone())
            .discard()
            .entrypoint("tar")
            .binds([format!("{}:{}:ro", host_dir.display(), HOST_MOUNT)])
            .command(["-C", HOST_MOUNT, "-cf", "-", "."]);
        format!(
            "{} | tar -C {} -xf -",
            Self::run_command(&reader, false),
            shellquote(&local_dir.display().to_string())
        )
    }

    fn copy_to_host_pipeline(&self, local_file: &Path, host_dir: &Path) -> RuntimeResult<String> {
        let file_name = local_file
            .file_name()
            .ok_or_else(|| RuntimeError::internal(format!("{} has no file name", local_file.display())))?;
        let parent = local_file.parent().unwrap_or_else(|| Path::new("."));
        let writer = RunSpec::new(self.helper_image.clone())
            .discard()
            .entrypoint("tar")
            .binds([format!("{}:{}", host_dir.display(), HOST_MOUNT)])
            .command(["-C", HOST_MOUNT, "-xf", "-"]);
        // `-i` keeps stdin attached so the archive reaches the helper.
        Ok(format!(
            "tar -C {} -cf - {} | {} run -i {}",
            shellquote(&parent.display().to_string()),
            shellquote(&file_name.to_string_lossy()),
            DOCKER_CMD,
            join_quoted(&writer.docker_run_args(false))
        ))
    }
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    #[instrument(skip(self, spec), fields(image = %spec.image()))]
    async fn run(&self, spec: &RunSpec) -> RuntimeResult<RunOutput> {
        let cmd = Self::run_command(spec, false);
        let result = shell::exec(&cmd).await?;
        if !result.success() {
            return Err(RuntimeError::ShellCommandFailed {
                command: cmd,
                exit_code: result.exit_code,
                output: result.combined_output(),
            });
        }
        Ok(RunOutput {
            stdout: result.stdout,
            stderr: result.stderr,
        })
    }

    #[instrument(skip(self, spec), fields(image = %spec.image(), name = ?spec.container_name()))]
    async fn start(&self, spec: &RunSpec) -> RuntimeResult<String> {
        let id = shell::exec_or_throw(&Self::run_command(spec, true)).await?;
        info!(id = %id, "Started container");
        Ok(id)
    }

    async fn container_state(&self, name: &str) -> RuntimeResult<ContainerState> {
        let cmd = format!(
            "{} inspect --format {} {}",
            DOCKER_CMD,
            shellquote("{{.State.Running}}"),
            shellquote(name)
        );
        let result = shell::exec(&cmd).await?;
        if !result.success() {
            if result.stderr.contains("No such") {
                return Err(RuntimeError::ContainerNotFound {
                    name: name.to_string(),
                });
            }
            return Err(RuntimeError::ShellCommandFailed {
                command: cmd,
                exit_code: result.exit_code,
                output: result.combined_output(),
            });
        }
        parse_running_flag(&result.stdout)
    }

    async fn stop_and_remove(&self, name: &str) -> RuntimeResult<()> {
        let cmd = format!("{} rm -f {}", DOCKER_CMD, shellquote(name));
        shell::exec_or_throw(&cmd).await?;
        debug!(container = %name, "Removed container");
        Ok(())
    }
}

#[async_trait]
impl HostFiles for DockerCli {
    #[instrument(skip(self))]
    async fn copy_from_host(&self, host_dir: &Path, local_dir: &Path) -> RuntimeResult<()> {
        shell::exec_pipeline(&self.copy_from_host_pipeline(host_dir, local_dir)).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn copy_file_to_host(&self, local_file: &Path, host_dir: &Path) -> RuntimeResult<()> {
        shell::exec_pipeline(&self.copy_to_host_pipeline(local_file, host_dir)?).await?;
        Ok(())
    }

    async fn hostname(&self) -> RuntimeResult<String> {
        let spec = RunSpec::new(self.helper_image.clone())
            .discard()
            .host_network()
            .entrypoint("hostname");
        let output = self.run(&spec).await?;
        let hostname = output.stdout.trim();
        if hostname.is_empty() {
            return Err(RuntimeError::unexpected_output("hostname", output.combined()));
        }
        Ok(hostname.to_string())
    }
}

fn parse_running_flag(output: &str) -> RuntimeResult<ContainerState> {
    match output.trim() {
        "true" => Ok(ContainerState::Running),
        "false" => Ok(ContainerState::Exited),
        other => Err(RuntimeError::unexpected_output("inspect", other)),
    }
}
