//! Startup checkpoints and observers.
//!
//! The orchestrator reports each stage through a [`StartupObserver`] instead
//! of printing directly, so callers decide how progress is presented.

use std::fmt;

use tracing::{error, info};

use crate::error::StartupError;

/// States of the startup sequence. A stage is "entered" when the
/// orchestrator starts working towards it and "succeeded" once reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Init,
    PortCheck,
    ConfigResolved,
    ContainerStarting,
    ContainerRunning,
    ListenerReady,
    ServiceReady,
    Done,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Init => "init",
            Stage::PortCheck => "port-check",
            Stage::ConfigResolved => "config-resolved",
            Stage::ContainerStarting => "container-starting",
            Stage::ContainerRunning => "container-running",
            Stage::ListenerReady => "listener-ready",
            Stage::ServiceReady => "service-ready",
            Stage::Done => "done",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receives startup checkpoints.
///
/// All methods default to no-ops.
pub trait StartupObserver: Send + Sync {
    fn stage_entered(&self, _stage: Stage) {}

    fn stage_succeeded(&self, _stage: Stage) {}

    fn stage_failed(&self, _stage: Stage, _error: &StartupError) {}

    /// A user-facing progress line ("Starting control plane ...").
    fn progress(&self, _message: &str) {}
}

/// Discards every checkpoint.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl StartupObserver for NoopObserver {}

/// Reports checkpoints as tracing events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl StartupObserver for TracingObserver {
    fn stage_entered(&self, stage: Stage) {
        tracing::debug!(stage = %stage, "Entering stage");
    }

    fn stage_succeeded(&self, stage: Stage) {
        tracing::debug!(stage = %stage, "Stage complete");
    }

    fn stage_failed(&self, stage: Stage, err: &StartupError) {
        error!(stage = %stage, error = %err, "Stage failed");
    }

    fn progress(&self, message: &str) {
        info!("{}", message);
    }
}

/// Prints progress lines on stdout and forwards everything to tracing.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleObserver;

impl StartupObserver for ConsoleObserver {
    fn stage_entered(&self, stage: Stage) {
        TracingObserver.stage_entered(stage);
    }

    fn stage_succeeded(&self, stage: Stage) {
        TracingObserver.stage_succeeded(stage);
    }

    fn stage_failed(&self, stage: Stage, err: &StartupError) {
        TracingObserver.stage_failed(stage, err);
    }

    fn progress(&self, message: &str) {
        println!("{}", message);
    }
}
