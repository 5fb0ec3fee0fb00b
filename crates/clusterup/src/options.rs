//! Parameters of one bring-up attempt.

use std::path::{Path, PathBuf};

/// Default host directory holding the control plane configuration.
pub const DEFAULT_HOST_CONFIG_DIR: &str = "/var/lib/origin/openshift.local.config";

/// Default host directory for pod volumes.
pub const DEFAULT_HOST_VOLUMES_DIR: &str = "/var/lib/origin/openshift.local.volumes";

/// Immutable request describing one bring-up attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartOptions {
    server_ip: String,
    image_tag: String,
    host_volumes_dir: PathBuf,
    host_config_dir: PathBuf,
    host_data_dir: Option<PathBuf>,
    use_existing_config: bool,
    use_shared_volume: bool,
    environment: Vec<String>,
    log_level: u8,
}

impl StartOptions {
    pub fn new(server_ip: impl Into<String>) -> Self {
        Self {
            server_ip: server_ip.into(),
            image_tag: "latest".to_string(),
            host_volumes_dir: PathBuf::from(DEFAULT_HOST_VOLUMES_DIR),
            host_config_dir: PathBuf::from(DEFAULT_HOST_CONFIG_DIR),
            host_data_dir: None,
            use_existing_config: false,
            use_shared_volume: false,
            environment: Vec::new(),
            log_level: 0,
        }
    }

    pub fn with_image_tag(mut self, tag: impl Into<String>) -> Self {
        self.image_tag = tag.into();
        self
    }

    pub fn with_host_volumes_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.host_volumes_dir = dir.into();
        self
    }

    pub fn with_host_config_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.host_config_dir = dir.into();
        self
    }

    /// Persists the etcd write-ahead log store on the host.
    pub fn with_host_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.host_data_dir = Some(dir.into());
        self
    }

    pub fn use_existing_config(mut self, enabled: bool) -> Self {
        self.use_existing_config = enabled;
        self
    }

    pub fn use_shared_volume(mut self, enabled: bool) -> Self {
        self.use_shared_volume = enabled;
        self
    }

    /// Adds `KEY=VALUE` overrides passed verbatim to the containers.
    pub fn with_environment<I, S>(mut self, env: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.environment.extend(env.into_iter().map(Into::into));
        self
    }

    /// Daemon `--loglevel`; 0 omits the flag.
    pub fn with_log_level(mut self, level: u8) -> Self {
        self.log_level = level;
        self
    }

    pub fn server_ip(&self) -> &str {
        &self.server_ip
    }

    pub fn image_tag(&self) -> &str {
        &self.image_tag
    }

    pub fn host_volumes_dir(&self) -> &Path {
        &self.host_volumes_dir
    }

    pub fn host_config_dir(&self) -> &Path {
        &self.host_config_dir
    }

    pub fn host_data_dir(&self) -> Option<&Path> {
        self.host_data_dir.as_deref()
    }

    pub fn reuses_existing_config(&self) -> bool {
        self.use_existing_config
    }

    pub fn shares_volumes(&self) -> bool {
        self.use_shared_volume
    }

    pub fn environment(&self) -> &[String] {
        &self.environment
    }

    pub fn log_level(&self) -> u8 {
        self.log_level
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let opts = StartOptions::new("10.0.0.5");
        assert_eq!(opts.server_ip(), "10.0.0.5");
        assert_eq!(opts.host_config_dir(), Path::new(DEFAULT_HOST_CONFIG_DIR));
        assert_eq!(opts.host_data_dir(), None);
        assert!(!opts.reuses_existing_config());
        assert_eq!(opts.log_level(), 0);
    }

    #[test]
    fn test_builder() {
        let opts = StartOptions::new("10.0.0.5")
            .with_image_tag("v3.6.0")
            .with_host_data_dir("/var/lib/origin/openshift.local.etcd")
            .with_environment(["HTTP_PROXY=http://proxy:3128"])
            .with_environment(vec!["NO_PROXY=10.0.0.5".to_string()])
            .use_shared_volume(true)
            .with_log_level(4);
        assert_eq!(opts.image_tag(), "v3.6.0");
        assert_eq!(opts.environment().len(), 2);
        assert!(opts.shares_volumes());
        assert_eq!(
            opts.host_data_dir(),
            Some(Path::new("/var/lib/origin/openshift.local.etcd"))
        );
    }
}
