//! Shell command execution utilities.
//!
//! The docker-backed collaborators build command lines as strings and run
//! them through `/bin/sh -c`. Every caller-supplied value must go through
//! [`shellquote`] before it is spliced into a command.
//!
//! # Example
//!
//! ```ignore
//! use clusterup_common::shell::{self, DOCKER_CMD, shellquote};
//!
//! let cmd = format!("{} inspect {}", DOCKER_CMD, shellquote("origin"));
//! let result = shell::exec(&cmd).await?;
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use std::process::Stdio;
use tokio::process::Command;

use crate::error::{RuntimeError, RuntimeResult};

/// The docker CLI, resolved through `PATH`.
pub const DOCKER_CMD: &str = "docker";

/// Path to the `bash` shell for pipelines that need `pipefail`.
pub const BASH_CMD: &str = "/bin/bash";

/// Path to the POSIX shell used by [`exec`].
pub const SH_CMD: &str = "/bin/sh";

/// Matches: $, `, ", \, and newline
static SHELL_ESCAPE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"([$`"\\\n])"#).expect("Invalid regex pattern"));

/// Quotes a string for safe use in shell commands.
///
/// Wraps the string in double quotes and escapes `$`, `` ` ``, `"`, `\`
/// and newline.
///
/// ```
/// use clusterup_common::shell::shellquote;
///
/// assert_eq!(shellquote("simple"), "\"simple\"");
/// assert_eq!(shellquote("with$var"), "\"with\\$var\"");
/// ```
pub fn shellquote(s: &str) -> String {
    let escaped = SHELL_ESCAPE_RE.replace_all(s, r"\$1");
    format!("\"{}\"", escaped)
}

/// Quotes and joins a list of arguments.
pub fn join_quoted<S: AsRef<str>>(args: &[S]) -> String {
    args.iter()
        .map(|a| shellquote(a.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Result of a shell command execution.
#[derive(Debug, Clone)]
pub struct ExecResult {
    /// The exit code of the command (0 = success).
    pub exit_code: i32,
    /// Trimmed stdout.
    pub stdout: String,
    /// Trimmed stderr.
    pub stderr: String,
}

impl ExecResult {
    /// Returns true if the command succeeded (exit code 0).
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Returns the combined output (stdout + stderr) for error messages.
    pub fn combined_output(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// Executes a shell command asynchronously through `/bin/sh -c`.
///
/// Returns `Err` only when the command could not be spawned; a non-zero
/// exit is reported through [`ExecResult::exit_code`].
pub async fn exec(cmd: &str) -> RuntimeResult<ExecResult> {
    tracing::debug!(command = %cmd, "Executing shell command");

    let output = Command::new(SH_CMD)
        .arg("-c")
        .arg(cmd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| RuntimeError::ShellExec {
            command: cmd.to_string(),
            source: e,
        })?;

    let exit_code = output.status.code().unwrap_or(-1);
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

    let result = ExecResult {
        exit_code,
        stdout,
        stderr,
    };

    if result.success() {
        tracing::trace!(command = %cmd, exit_code = exit_code, "Command succeeded");
    } else {
        tracing::warn!(
            command = %cmd,
            exit_code = exit_code,
            stderr = %result.stderr,
            "Command failed"
        );
    }

    Ok(result)
}

/// Executes a shell command and fails on non-zero exit.
///
/// Returns the trimmed stdout on success.
pub async fn exec_or_throw(cmd: &str) -> RuntimeResult<String> {
    let result = exec(cmd).await?;
    if result.success() {
        Ok(result.stdout)
    } else {
        Err(RuntimeError::ShellCommandFailed {
            command: cmd.to_string(),
            exit_code: result.exit_code,
            output: result.combined_output(),
        })
    }
}

/// Executes a pipeline under `bash -o pipefail`, so a failure on either
/// side of a `|` fails the whole command.
pub async fn exec_pipeline(pipeline: &str) -> RuntimeResult<String> {
    let cmd = format!("{} -o pipefail -c {}", BASH_CMD, shellquote(pipeline));
    exec_or_throw(&cmd).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shellquote_simple() {
        assert_eq!(shellquote("simple"), "\"simple\"");
        assert_eq!(shellquote("origin"), "\"origin\"");
        assert_eq!(shellquote("8443"), "\"8443\"");
    }

    #[test]
    fn test_shellquote_special_chars() {
        assert_eq!(shellquote("$HOME"), "\"\\$HOME\"");
        assert_eq!(shellquote("`whoami`"), "\"\\`whoami\\`\"");
        assert_eq!(shellquote("say \"hello\""), "\"say \\\"hello\\\"\"");
        assert_eq!(shellquote("path\\to"), "\"path\\\\to\"");
        assert_eq!(shellquote("line1\nline2"), "\"line1\\\nline2\"");
    }

    #[test]
    fn test_shellquote_component_template() {
        // The image template must reach the container unexpanded.
        assert_eq!(
            shellquote("--images=openshift/origin-${component}:v3.6"),
            "\"--images=openshift/origin-\\${component}:v3.6\""
        );
    }

    #[test]
    fn test_join_quoted() {
        assert_eq!(join_quoted(&["-c", "cat /proc/net/tcp"]), "\"-c\" \"cat /proc/net/tcp\"");
        assert_eq!(join_quoted::<&str>(&[]), "");
    }

    #[test]
    fn test_exec_result_combined() {
        let result = ExecResult {
            exit_code: 0,
            stdout: "stdout".to_string(),
            stderr: "stderr".to_string(),
        };
        assert!(result.success());
        assert_eq!(result.combined_output(), "stdout\nstderr");
    }

    #[tokio::test]
    async fn test_exec_echo() {
        let result = exec("echo hello").await.unwrap();
        assert!(result.success());
        assert_eq!(result.stdout, "hello");
    }

    #[tokio::test]
    async fn test_exec_or_throw_failure() {
        match exec_or_throw("exit 3").await {
            Err(RuntimeError::ShellCommandFailed { exit_code, .. }) => assert_eq!(exit_code, 3),
            other => panic!("Expected ShellCommandFailed error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_exec_pipeline_propagates_left_failure() {
        let result = exec_pipeline("false | cat").await;
        assert!(result.is_err());

        let output = exec_pipeline("echo piped | cat").await.unwrap();
        assert_eq!(output, "piped");
    }
}
