//! Bounded TCP dialing.

use std::future::Future;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{StartupError, StartupResult};

/// Dial parameters: per-attempt connect timeout, delay between attempts and
/// the number of attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DialPolicy {
    pub connect_timeout: Duration,
    pub interval: Duration,
    pub attempts: u32,
}

impl DialPolicy {
    pub fn new(connect_timeout: Duration, interval: Duration, attempts: u32) -> Self {
        Self {
            connect_timeout,
            interval,
            attempts,
        }
    }

    /// Upper bound on the time [`wait_for_dial`] can take.
    pub fn max_wait(&self) -> Duration {
        (self.connect_timeout + self.interval) * self.attempts
    }
}

/// Dials `addr` until a connection succeeds.
///
/// `verbose` logs the successful connect at info level; otherwise at debug.
/// Fails with [`StartupError::Timeout`] after `policy.attempts` failed
/// connects, or [`StartupError::Cancelled`] when `cancel` fires.
pub async fn wait_for_dial(
    verbose: bool,
    addr: &str,
    policy: DialPolicy,
    cancel: &CancellationToken,
) -> StartupResult<()> {
    dial_until_connected(verbose, addr, policy, cancel, || TcpStream::connect(addr)).await
}

/// Runs `connect` up to `policy.attempts` times, bounding each call by the
/// connect timeout and sleeping `policy.interval` between calls.
async fn dial_until_connected<F, Fut, T>(
    verbose: bool,
    addr: &str,
    policy: DialPolicy,
    cancel: &CancellationToken,
    mut connect: F,
) -> StartupResult<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<T>>,
{
    for attempt in 1..=policy.attempts {
        let dial = tokio::time::timeout(policy.connect_timeout, connect());
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(StartupError::cancelled(format!("dialing {}", addr))),
            outcome = dial => outcome,
        };
        match outcome {
            Ok(Ok(_conn)) => {
                if verbose {
                    info!(addr = %addr, attempt, "Connected");
                } else {
                    debug!(addr = %addr, attempt, "Connected");
                }
                return Ok(());
            }
            Ok(Err(e)) => debug!(addr = %addr, attempt, error = %e, "Dial failed"),
            Err(_) => debug!(addr = %addr, attempt, "Dial timed out"),
        }
        if attempt < policy.attempts {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(StartupError::cancelled(format!("waiting to dial {}", addr))),
                _ = tokio::time::sleep(policy.interval) => {}
            }
        }
    }
    Err(StartupError::Timeout {
        addr: addr.to_string(),
        attempts: policy.attempts,
    })
}
