//! Test fixtures for clusterup
//!
//! Provides sample control plane configuration and host port tables

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// Master configuration as written by `start --write-config`, trimmed to the
/// parts tests look at.
pub const SAMPLE_MASTER_CONFIG: &str = r#"apiVersion: v1
kind: MasterConfig
assetConfig:
  publicURL: https://10.0.0.5:8443/console/
routingConfig:
  subdomain: ""
servingInfo:
  bindAddress: 0.0.0.0:8443
  certFile: master.server.crt
  clientCA: ca.crt
"#;

/// Placeholder CA bundle; fake health clients only check that it exists.
pub const SAMPLE_CA_CERT: &str = "-----BEGIN CERTIFICATE-----\nMIIB\n-----END CERTIFICATE-----\n";

/// Header line of `/proc/net/tcp`.
pub const PROC_NET_TCP_HEADER: &str =
    "  sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode";

/// Renders a `/proc/net/tcp` table with the given listening and established
/// local ports.
pub fn proc_net_tcp(listening: &[u16], established: &[u16]) -> String {
    let mut lines = vec![PROC_NET_TCP_HEADER.to_string()];
    let rows = listening
        .iter()
        .map(|port| (port, "0A"))
        .chain(established.iter().map(|port| (port, "01")));
    for (slot, (port, state)) in rows.enumerate() {
        lines.push(format!(
            "{:4}: 0100007F:{:04X} 00000000:0000 {} 00000000:00000000 00:00000000 00000000     0        0 {} 1 0000000000000000 100 0 0 10 0",
            slot,
            port,
            state,
            10_000 + slot
        ));
    }
    lines.join("\n")
}

/// A scratch directory standing in for the host configuration directory.
pub struct HostConfigDir {
    dir: TempDir,
}

impl HostConfigDir {
    /// Creates an empty configuration directory.
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            dir: tempfile::Builder::new().prefix("host-config-").tempdir()?,
        })
    }

    /// Creates a directory holding [`SAMPLE_MASTER_CONFIG`] and
    /// [`SAMPLE_CA_CERT`], as left behind by a previous run.
    pub fn with_generated_config() -> io::Result<Self> {
        let host = Self::new()?;
        write_generated_config(host.path())?;
        Ok(host)
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn file(&self, relative: &str) -> PathBuf {
        self.dir.path().join(relative)
    }

    pub fn write(&self, relative: &str, contents: &str) -> io::Result<()> {
        write_file(self.path(), relative, contents)
    }

    pub fn read(&self, relative: &str) -> io::Result<String> {
        fs::read_to_string(self.file(relative))
    }
}

/// Writes the files `start --write-config` would produce under `root`.
pub fn write_generated_config(root: &Path) -> io::Result<()> {
    write_file(root, "master/master-config.yaml", SAMPLE_MASTER_CONFIG)?;
    write_file(root, "master/ca.crt", SAMPLE_CA_CERT)?;
    write_file(root, "node-node1/node-config.yaml", "kind: NodeConfig\n")
}

fn write_file(root: &Path, relative: &str, contents: &str) -> io::Result<()> {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, contents)
}
