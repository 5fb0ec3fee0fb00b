//! Error types for runtime collaborators.
//!
//! Every collaborator (shell executor, container runtime, host file copy,
//! health client) reports failures through [`RuntimeError`]. The startup
//! orchestrator wraps these in its own stage-specific errors.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for collaborator operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Errors that can occur while talking to the container runtime or the host.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Failed to execute a shell command (spawn error).
    #[error("Failed to execute shell command '{command}': {source}")]
    ShellExec {
        /// The command that failed to execute.
        command: String,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },

    /// Shell command returned non-zero exit code.
    #[error("Shell command failed: '{command}' (exit code {exit_code}): {output}")]
    ShellCommandFailed {
        /// The command that failed.
        command: String,
        /// The exit code.
        exit_code: i32,
        /// Combined stdout/stderr output.
        output: String,
    },

    /// Local filesystem operation failed.
    #[error("{operation} failed for {}: {source}", path.display())]
    Io {
        /// What was being attempted (e.g., "read", "create directory").
        operation: String,
        /// The path involved.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },

    /// Container does not exist.
    #[error("Container '{name}' not found")]
    ContainerNotFound {
        /// The container name or id.
        name: String,
    },

    /// Runtime returned output that could not be interpreted.
    #[error("Unexpected runtime output for {operation}: {output}")]
    UnexpectedOutput {
        /// The operation that produced the output.
        operation: String,
        /// The raw output.
        output: String,
    },

    /// HTTP transport failure (connect, TLS, timeout, body read).
    #[error("HTTP request to {url} failed: {message}")]
    Transport {
        /// The requested URL.
        url: String,
        /// Error message.
        message: String,
    },

    /// TLS or trust anchor setup failed.
    #[error("TLS setup failed for {}: {message}", path.display())]
    Tls {
        /// The CA certificate path.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// Internal error (unexpected state).
    #[error("Internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
    },
}

impl RuntimeError {
    /// Creates an IO error with operation and path context.
    pub fn io(operation: impl Into<String>, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            path: path.into(),
            source,
        }
    }

    /// Creates a transport error.
    pub fn transport(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Creates a transport error whose message carries `source` and every
    /// cause beneath it.
    pub fn transport_from(
        url: impl Into<String>,
        source: &(dyn std::error::Error + 'static),
    ) -> Self {
        Self::transport(url, error_chain(source))
    }

    /// Creates an unexpected output error.
    pub fn unexpected_output(operation: impl Into<String>, output: impl Into<String>) -> Self {
        Self::UnexpectedOutput {
            operation: operation.into(),
            output: output.into(),
        }
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if the failure came from a command that ran but
    /// exited non-zero, as opposed to one that could not be spawned.
    pub fn is_command_failure(&self) -> bool {
        matches!(self, RuntimeError::ShellCommandFailed { .. })
    }
}

/// Renders `err` followed by each `source()` beneath it, joined by ": ".
///
/// A cause whose text already appears in the rendering is skipped.
pub fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut rendered = err.to_string();
    let mut cause = err.source();
    while let Some(e) = cause {
        let text = e.to_string();
        if !text.is_empty() && !rendered.contains(&text) {
            rendered.push_str(": ");
            rendered.push_str(&text);
        }
        cause = e.source();
    }
    rendered
}
