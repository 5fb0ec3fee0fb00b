//! Local staging of the control plane configuration tree.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clusterup_common::{HostFiles, RuntimeError};
use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::error::{StartupError, StartupResult};

/// Master configuration file, relative to the configuration root.
pub const MASTER_CONFIG_FILE: &str = "master/master-config.yaml";

/// CA certificate, relative to the configuration root.
pub const MASTER_CA_FILE: &str = "master/ca.crt";

const STAGE_DIR_PREFIX: &str = "clusterup-config-";

/// A local copy of the configuration tree.
///
/// The directory is removed when the value is dropped, unless ownership
/// was handed off with [`StagedConfig::into_path`].
#[derive(Debug)]
pub struct StagedConfig {
    path: PathBuf,
    dir: Option<TempDir>,
}

impl StagedConfig {
    /// Creates a fresh, uniquely named directory under `parent`.
    ///
    /// The directory is created exclusively; an existing path is never reused.
    pub fn create_in(parent: &Path) -> StartupResult<Self> {
        let dir = tempfile::Builder::new()
            .prefix(STAGE_DIR_PREFIX)
            .tempdir_in(parent)
            .map_err(|e| StartupError::StageFailure {
                host_dir: parent.to_path_buf(),
                source: RuntimeError::io("create directory", parent, e),
            })?;
        Ok(Self {
            path: dir.path().to_path_buf(),
            dir: Some(dir),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn master_config(&self) -> PathBuf {
        self.path.join(MASTER_CONFIG_FILE)
    }

    pub fn ca_cert(&self) -> PathBuf {
        self.path.join(MASTER_CA_FILE)
    }

    pub fn has_master_config(&self) -> bool {
        self.master_config().is_file()
    }

    /// Hands the directory to the caller; it will no longer be removed.
    pub fn into_path(mut self) -> PathBuf {
        match self.dir.take() {
            Some(dir) => dir.keep(),
            None => std::mem::take(&mut self.path),
        }
    }
}

impl Drop for StagedConfig {
    fn drop(&mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };
        match dir.close() {
            Ok(()) => debug!(path = %self.path.display(), "Removed staged configuration"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Error removing staged configuration"),
        }
    }
}

/// Copies configuration between the runtime host and local staging.
#[derive(Clone)]
pub struct ConfigStager {
    host: Arc<dyn HostFiles>,
    staging_root: PathBuf,
}

impl ConfigStager {
    pub fn new(host: Arc<dyn HostFiles>) -> Self {
        Self::with_staging_root(host, std::env::temp_dir())
    }

    pub fn with_staging_root(host: Arc<dyn HostFiles>, staging_root: impl Into<PathBuf>) -> Self {
        Self {
            host,
            staging_root: staging_root.into(),
        }
    }

    /// Copies `host_dir` into a new staging directory.
    ///
    /// On copy failure the partially filled directory is removed.
    pub async fn stage(&self, host_dir: &Path) -> StartupResult<StagedConfig> {
        let staged = StagedConfig::create_in(&self.staging_root).map_err(|e| match e {
            StartupError::StageFailure { source, .. } => StartupError::StageFailure {
                host_dir: host_dir.to_path_buf(),
                source,
            },
            other => other,
        })?;
        info!(
            host_dir = %host_dir.display(),
            local_dir = %staged.path().display(),
            "Copying configuration from host"
        );
        self.host
            .copy_from_host(host_dir, staged.path())
            .await
            .map_err(|source| StartupError::StageFailure {
                host_dir: host_dir.to_path_buf(),
                source,
            })?;
        Ok(staged)
    }

    /// Copies `local_file`, which must live inside `staged`, back to the same
    /// relative location under `host_dir`.
    pub async fn commit(
        &self,
        staged: &StagedConfig,
        local_file: &Path,
        host_dir: &Path,
    ) -> StartupResult<()> {
        let relative = local_file.strip_prefix(staged.path()).map_err(|_| {
            StartupError::config_update(local_file, "file is not inside the staged configuration")
        })?;
        let host_parent = match relative.parent() {
            Some(parent) => host_dir.join(parent),
            None => host_dir.to_path_buf(),
        };
        debug!(file = %local_file.display(), host_dir = %host_parent.display(), "Committing file to host");
        self.host
            .copy_file_to_host(local_file, &host_parent)
            .await
            .map_err(|source| StartupError::ConfigUpdate {
                path: local_file.to_path_buf(),
                message: format!("copy to host directory {} failed", host_parent.display()),
                source: Some(source),
            })
    }
}
