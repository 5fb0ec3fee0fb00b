//! Required-port conflict detection.
//!
//! Input is the raw text of `/proc/net/tcp` and `/proc/net/tcp6`:
//!
//! ```text
//!   sl  local_address rem_address   st tx_queue rx_queue ...
//!    0: 00000000:0035 00000000:0000 0A 00000000:00000000 ...
//! ```
//!
//! The local port is the hex component after the last `:` of the second
//! field; state `0A` is `TCP_LISTEN`.

use std::collections::HashSet;

use tracing::{debug, trace};

use crate::error::{StartupError, StartupResult};

/// Kernel state code for a listening socket.
pub const TCP_LISTEN: &str = "0A";

/// One parsed row of the connection table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionRecord<'a> {
    pub local_port: u16,
    pub state: &'a str,
}

impl ConnectionRecord<'_> {
    pub fn is_listening(&self) -> bool {
        self.state == TCP_LISTEN
    }
}

/// Parses one connection-table line. Header and malformed lines yield `None`.
pub fn parse_line(line: &str) -> Option<ConnectionRecord<'_>> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 4 {
        return None;
    }
    // Data rows start with "<slot>:"; the header starts with "sl".
    if !parts[0].contains(':') {
        return None;
    }
    let (_, port_hex) = parts[1].rsplit_once(':')?;
    let local_port = u16::from_str_radix(port_hex, 16).ok()?;
    Some(ConnectionRecord {
        local_port,
        state: parts[3],
    })
}

/// Returns every port in listening state.
pub fn used_ports(data: &str) -> HashSet<u16> {
    let ports: HashSet<u16> = data
        .lines()
        .filter_map(|line| {
            trace!(line = %line, "Determining port in use");
            parse_line(line)
        })
        .filter(|record| record.is_listening())
        .map(|record| record.local_port)
        .collect();
    debug!(ports = ?ports, "Listening ports on container host");
    ports
}

/// Fails with [`StartupError::PortConflict`] listing every required port
/// found listening, in the order of `required`.
pub fn check_ports_in_use(data: &str, required: &[u16]) -> StartupResult<()> {
    let used = used_ports(data);
    let conflicts: Vec<u16> = required
        .iter()
        .copied()
        .filter(|port| used.contains(port))
        .collect();
    if conflicts.is_empty() {
        Ok(())
    } else {
        Err(StartupError::PortConflict { ports: conflicts })
    }
}
