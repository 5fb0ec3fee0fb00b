//! In-memory collaborators for driving the orchestrator in tests.

use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use clusterup_common::{
    ContainerRuntime, ContainerState, HealthClient, HealthClientFactory, HealthResponse,
    HostFiles, RunOutput, RunSpec, RuntimeError, RuntimeResult,
};
use tracing::debug;

type RunHook = Box<dyn Fn(&RunSpec) -> RuntimeResult<RunOutput> + Send + Sync>;

enum Reply {
    Stdout(String),
    Fail(String),
    Hook(RunHook),
}

/// How a container was invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationKind {
    Run,
    Start,
}

/// One recorded container invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub kind: InvocationKind,
    pub spec: RunSpec,
}

impl Invocation {
    /// The `docker run` argument line this invocation corresponds to.
    pub fn command_line(&self) -> String {
        self.spec
            .docker_run_args(self.kind == InvocationKind::Start)
            .join(" ")
    }
}

/// Scripted container runtime.
///
/// `run` replies are matched by substring against the rendered argument
/// line; the first matching reply wins and unmatched runs succeed with empty
/// output.
pub struct FakeRuntime {
    replies: Vec<(String, Reply)>,
    start_failure: Option<String>,
    invocations: Mutex<Vec<Invocation>>,
    removed: Mutex<Vec<String>>,
    running: AtomicBool,
    missing: AtomicBool,
    next_id: AtomicU32,
}

impl Default for FakeRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeRuntime {
    /// A runtime whose containers start and keep running.
    pub fn new() -> Self {
        Self {
            replies: Vec::new(),
            start_failure: None,
            invocations: Mutex::new(Vec::new()),
            removed: Mutex::new(Vec::new()),
            running: AtomicBool::new(true),
            missing: AtomicBool::new(false),
            next_id: AtomicU32::new(1),
        }
    }

    /// Runs matching `pattern` print `stdout`.
    pub fn reply(mut self, pattern: impl Into<String>, stdout: impl Into<String>) -> Self {
        self.replies.push((pattern.into(), Reply::Stdout(stdout.into())));
        self
    }

    /// Runs matching `pattern` exit non-zero with `output`.
    pub fn fail(mut self, pattern: impl Into<String>, output: impl Into<String>) -> Self {
        self.replies.push((pattern.into(), Reply::Fail(output.into())));
        self
    }

    /// Runs matching `pattern` are answered by `hook`.
    pub fn on_run<F>(mut self, pattern: impl Into<String>, hook: F) -> Self
    where
        F: Fn(&RunSpec) -> RuntimeResult<RunOutput> + Send + Sync + 'static,
    {
        self.replies.push((pattern.into(), Reply::Hook(Box::new(hook))));
        self
    }

    /// Every `start` fails with `output`.
    pub fn fail_start(mut self, output: impl Into<String>) -> Self {
        self.start_failure = Some(output.into());
        self
    }

    /// State reported for started containers.
    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    /// State queries report the container as absent.
    pub fn set_missing(&self, missing: bool) {
        self.missing.store(missing, Ordering::SeqCst);
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        lock(&self.invocations).clone()
    }

    /// Invocations whose argument line contains `pattern`.
    pub fn matching(&self, pattern: &str) -> Vec<Invocation> {
        self.invocations()
            .into_iter()
            .filter(|inv| inv.command_line().contains(pattern))
            .collect()
    }

    /// Names or ids passed to `stop_and_remove`.
    pub fn removed(&self) -> Vec<String> {
        lock(&self.removed).clone()
    }

    fn record(&self, kind: InvocationKind, spec: &RunSpec) {
        lock(&self.invocations).push(Invocation {
            kind,
            spec: spec.clone(),
        });
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn run(&self, spec: &RunSpec) -> RuntimeResult<RunOutput> {
        self.record(InvocationKind::Run, spec);
        let line = spec.docker_run_args(false).join(" ");
        debug!(command = %line, "fake run");

        let reply = self
            .replies
            .iter()
            .find(|(pattern, _)| line.contains(pattern.as_str()))
            .map(|(_, reply)| reply);
        match reply {
            None => Ok(RunOutput::default()),
            Some(Reply::Stdout(stdout)) => Ok(RunOutput {
                stdout: stdout.clone(),
                stderr: String::new(),
            }),
            Some(Reply::Fail(output)) => Err(RuntimeError::ShellCommandFailed {
                command: format!("docker run {}", line),
                exit_code: 1,
                output: output.clone(),
            }),
            Some(Reply::Hook(hook)) => hook(spec),
        }
    }

    async fn start(&self, spec: &RunSpec) -> RuntimeResult<String> {
        self.record(InvocationKind::Start, spec);
        if let Some(output) = &self.start_failure {
            return Err(RuntimeError::ShellCommandFailed {
                command: format!("docker run {}", spec.docker_run_args(true).join(" ")),
                exit_code: 125,
                output: output.clone(),
            });
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(format!("fake-container-{}", id))
    }

    async fn container_state(&self, name: &str) -> RuntimeResult<ContainerState> {
        if self.missing.load(Ordering::SeqCst) {
            return Err(RuntimeError::ContainerNotFound {
                name: name.to_string(),
            });
        }
        if self.running.load(Ordering::SeqCst) {
            Ok(ContainerState::Running)
        } else {
            Ok(ContainerState::Exited)
        }
    }

    async fn stop_and_remove(&self, name: &str) -> RuntimeResult<()> {
        lock(&self.removed).push(name.to_string());
        Ok(())
    }
}

/// Host file access backed by the local filesystem.
///
/// "Host" paths are ordinary local paths, typically a
/// [`crate::HostConfigDir`].
pub struct FakeHost {
    hostname: String,
    copies_from_host: AtomicUsize,
    pushed: Mutex<Vec<(PathBuf, PathBuf)>>,
    fail_copies: AtomicBool,
}

impl FakeHost {
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            copies_from_host: AtomicUsize::new(0),
            pushed: Mutex::new(Vec::new()),
            fail_copies: AtomicBool::new(false),
        }
    }

    /// Makes every copy from the host fail.
    pub fn set_copy_failure(&self, fail: bool) {
        self.fail_copies.store(fail, Ordering::SeqCst);
    }

    pub fn copies_from_host(&self) -> usize {
        self.copies_from_host.load(Ordering::SeqCst)
    }

    /// `(local file, host directory)` pairs pushed back to the host.
    pub fn pushed(&self) -> Vec<(PathBuf, PathBuf)> {
        lock(&self.pushed).clone()
    }
}

#[async_trait]
impl HostFiles for FakeHost {
    async fn copy_from_host(&self, host_dir: &Path, local_dir: &Path) -> RuntimeResult<()> {
        self.copies_from_host.fetch_add(1, Ordering::SeqCst);
        if self.fail_copies.load(Ordering::SeqCst) {
            return Err(RuntimeError::ShellCommandFailed {
                command: format!("copy {}", host_dir.display()),
                exit_code: 2,
                output: "tar: Error is not recoverable".to_string(),
            });
        }
        copy_tree(host_dir, local_dir).map_err(|e| RuntimeError::io("copy", host_dir, e))
    }

    async fn copy_file_to_host(&self, local_file: &Path, host_dir: &Path) -> RuntimeResult<()> {
        let name = local_file
            .file_name()
            .ok_or_else(|| RuntimeError::internal(format!("no file name in {}", local_file.display())))?;
        fs::create_dir_all(host_dir).map_err(|e| RuntimeError::io("create directory", host_dir, e))?;
        fs::copy(local_file, host_dir.join(name))
            .map_err(|e| RuntimeError::io("copy", local_file, e))?;
        lock(&self.pushed).push((local_file.to_path_buf(), host_dir.to_path_buf()));
        Ok(())
    }

    async fn hostname(&self) -> RuntimeResult<String> {
        Ok(self.hostname.clone())
    }
}

fn copy_tree(from: &Path, to: &Path) -> io::Result<()> {
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let target = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            fs::create_dir_all(&target)?;
            copy_tree(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[derive(Debug, Clone)]
enum HealthReply {
    Status(u16, String),
    Transport(String),
}

/// Health endpoint answering from a queue of canned replies.
///
/// Once the queue is drained the last reply repeats.
pub struct CannedHealth {
    replies: Mutex<VecDeque<HealthReply>>,
    last: Mutex<Option<HealthReply>>,
    requests: AtomicU32,
    urls: Mutex<Vec<String>>,
}

impl CannedHealth {
    /// Replies with each status in turn and an empty body.
    pub fn statuses(statuses: impl IntoIterator<Item = u16>) -> Self {
        let health = Self {
            replies: Mutex::new(VecDeque::new()),
            last: Mutex::new(None),
            requests: AtomicU32::new(0),
            urls: Mutex::new(Vec::new()),
        };
        for status in statuses {
            health.then_status(status, "");
        }
        health
    }

    /// Queues a reply with a body.
    pub fn then_status(&self, status: u16, body: impl Into<String>) -> &Self {
        lock(&self.replies).push_back(HealthReply::Status(status, body.into()));
        self
    }

    /// Queues a connection failure.
    pub fn then_transport_error(&self, message: impl Into<String>) -> &Self {
        lock(&self.replies).push_back(HealthReply::Transport(message.into()));
        self
    }

    pub fn requests(&self) -> u32 {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn urls(&self) -> Vec<String> {
        lock(&self.urls).clone()
    }
}

#[async_trait]
impl HealthClient for CannedHealth {
    async fn get(&self, url: &str) -> RuntimeResult<HealthResponse> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        lock(&self.urls).push(url.to_string());

        let next = lock(&self.replies).pop_front();
        let reply = match next {
            Some(reply) => {
                *lock(&self.last) = Some(reply.clone());
                reply
            }
            None => lock(&self.last)
                .clone()
                .unwrap_or_else(|| HealthReply::Transport("connection refused".to_string())),
        };
        match reply {
            HealthReply::Status(status, body) => Ok(HealthResponse::new(status, body)),
            HealthReply::Transport(message) => Err(RuntimeError::transport(url, message)),
        }
    }
}

/// Hands out a shared [`CannedHealth`], checking the CA file exists the way
/// a real client would.
pub struct CannedHealthFactory {
    client: Arc<CannedHealth>,
    ca_certs: Mutex<Vec<PathBuf>>,
}

impl CannedHealthFactory {
    pub fn new(client: Arc<CannedHealth>) -> Self {
        Self {
            client,
            ca_certs: Mutex::new(Vec::new()),
        }
    }

    /// CA paths clients were built with.
    pub fn ca_certs(&self) -> Vec<PathBuf> {
        lock(&self.ca_certs).clone()
    }
}

#[async_trait]
impl HealthClientFactory for CannedHealthFactory {
    async fn build(&self, ca_cert: &Path) -> RuntimeResult<Arc<dyn HealthClient>> {
        lock(&self.ca_certs).push(ca_cert.to_path_buf());
        if !tokio::fs::metadata(ca_cert).await.is_ok_and(|m| m.is_file()) {
            return Err(RuntimeError::io(
                "read",
                ca_cert,
                io::Error::new(io::ErrorKind::NotFound, "CA certificate missing"),
            ));
        }
        Ok(self.client.clone())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
