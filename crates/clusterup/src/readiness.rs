//! Readiness polling of the control plane health endpoint.

use std::sync::Arc;
use std::time::Duration;

use clusterup_common::HealthClient;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::error::{ReadinessCause, StartupError, StartupResult};

/// Path of the readiness endpoint.
pub const READINESS_PATH: &str = "/healthz/ready";

/// Default sleep between transient responses.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Classification of one health response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Ready,
    Retry,
    Fatal,
}

/// 200 is ready; 503 and 403 mean "still initialising"; everything else is
/// fatal.
pub fn classify(status: u16) -> Verdict {
    match status {
        200 => Verdict::Ready,
        503 | 403 => Verdict::Retry,
        _ => Verdict::Fatal,
    }
}

/// Polls a readiness URL until it reports ready or fails.
pub struct ReadinessPoller {
    client: Arc<dyn HealthClient>,
    interval: Duration,
    deadline: Option<Duration>,
}

impl ReadinessPoller {
    pub fn new(client: Arc<dyn HealthClient>) -> Self {
        Self {
            client,
            interval: DEFAULT_POLL_INTERVAL,
            deadline: None,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Bounds the total wait. `None` polls until a terminal response.
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Polls `url`. Returns the number of requests issued on success.
    #[instrument(skip(self, cancel))]
    pub async fn wait_ready(&self, url: &str, cancel: &CancellationToken) -> StartupResult<u32> {
        let started = Instant::now();
        let mut requests = 0u32;
        loop {
            requests += 1;
            let response = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(StartupError::cancelled("waiting for readiness")),
                response = self.client.get(url) => response,
            };
            let response = response.map_err(|e| StartupError::ReadinessFailed {
                url: url.to_string(),
                cause: ReadinessCause::Transport(e),
            })?;

            match classify(response.status) {
                Verdict::Ready => {
                    info!(url = %url, requests, "Control plane is ready");
                    return Ok(requests);
                }
                Verdict::Retry => {
                    debug!(url = %url, status = response.status, "Control plane not ready yet");
                }
                Verdict::Fatal => {
                    return Err(StartupError::ReadinessFailed {
                        url: url.to_string(),
                        cause: ReadinessCause::Status {
                            status: response.status,
                            body: response.body,
                        },
                    });
                }
            }

            if let Some(deadline) = self.deadline {
                if started.elapsed() + self.interval > deadline {
                    return Err(StartupError::ReadinessTimeout {
                        url: url.to_string(),
                        waited: started.elapsed(),
                    });
                }
            }
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(StartupError::cancelled("waiting for readiness")),
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }
}
