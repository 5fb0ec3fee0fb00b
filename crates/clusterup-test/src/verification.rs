//! Verification helpers for testing the startup sequence
//!
//! Provides assertion helpers over the container invocations a
//! [`FakeRuntime`] recorded

use clusterup_common::RunSpec;
use thiserror::Error;

use crate::{FakeRuntime, InvocationKind};

/// Verification error types
#[derive(Error, Debug)]
pub enum VerificationError {
    #[error("Expected {expected} runs matching '{pattern}', found {actual}")]
    RunCountMismatch {
        pattern: String,
        expected: usize,
        actual: usize,
    },

    #[error("No container named '{name}' was started")]
    NotStarted { name: String },

    #[error("Expected container '{name}' removed={expected}, found removed={actual}")]
    RemovalMismatch {
        name: String,
        expected: bool,
        actual: bool,
    },

    #[error("Argument '{arg}' missing from invocation: {command}")]
    ArgumentMissing { arg: String, command: String },
}

/// Result type for verification operations
pub type VerifyResult<T> = Result<T, VerificationError>;

/// Assertions over a [`FakeRuntime`]'s recorded invocations
pub struct RuntimeVerifier<'a> {
    runtime: &'a FakeRuntime,
}

impl<'a> RuntimeVerifier<'a> {
    pub fn new(runtime: &'a FakeRuntime) -> Self {
        Self { runtime }
    }

    /// Verify the number of run-to-completion invocations matching `pattern`
    pub fn assert_run_count(&self, pattern: &str, expected: usize) -> VerifyResult<()> {
        let actual = self
            .runtime
            .matching(pattern)
            .iter()
            .filter(|inv| inv.kind == InvocationKind::Run)
            .count();
        if actual != expected {
            return Err(VerificationError::RunCountMismatch {
                pattern: pattern.to_string(),
                expected,
                actual,
            });
        }
        Ok(())
    }

    /// Returns the [`RunSpec`] of the long-running container started as `name`
    pub fn started(&self, name: &str) -> VerifyResult<RunSpec> {
        self.runtime
            .invocations()
            .into_iter()
            .find(|inv| inv.kind == InvocationKind::Start && inv.spec.container_name() == Some(name))
            .map(|inv| inv.spec)
            .ok_or_else(|| VerificationError::NotStarted {
                name: name.to_string(),
            })
    }

    /// Verify the container started as `name` was given `arg`
    pub fn assert_started_with(&self, name: &str, arg: &str) -> VerifyResult<()> {
        let spec = self.started(name)?;
        let args = spec.docker_run_args(true);
        if !args.iter().any(|a| a == arg) {
            return Err(VerificationError::ArgumentMissing {
                arg: arg.to_string(),
                command: args.join(" "),
            });
        }
        Ok(())
    }

    /// Verify whether `name` was stopped and removed
    pub fn assert_removed(&self, name: &str, expected: bool) -> VerifyResult<()> {
        let actual = self.runtime.removed().iter().any(|n| n == name);
        if actual != expected {
            return Err(VerificationError::RemovalMismatch {
                name: name.to_string(),
                expected,
                actual,
            });
        }
        Ok(())
    }
}
