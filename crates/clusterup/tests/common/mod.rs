//! Shared harness for orchestrator integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use clusterup::{Orchestrator, Stage, StartOptions, StartupError, StartupObserver, StartupPolicy};
use clusterup_common::{RunOutput, RuntimeError};
use clusterup_test::{
    write_generated_config, CannedHealth, CannedHealthFactory, FakeHost, FakeRuntime,
    HostConfigDir,
};
use tempfile::TempDir;
use tokio::net::TcpListener;

/// Records every checkpoint as `enter:<stage>`, `ok:<stage>`,
/// `fail:<stage>` or `progress:<message>`.
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<String>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    /// Events starting with `prefix`, prefix stripped.
    pub fn with_prefix(&self, prefix: &str) -> Vec<String> {
        self.events()
            .iter()
            .filter_map(|e| e.strip_prefix(prefix).map(str::to_string))
            .collect()
    }

    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

impl StartupObserver for RecordingObserver {
    fn stage_entered(&self, stage: Stage) {
        self.push(format!("enter:{}", stage));
    }

    fn stage_succeeded(&self, stage: Stage) {
        self.push(format!("ok:{}", stage));
    }

    fn stage_failed(&self, stage: Stage, _error: &StartupError) {
        self.push(format!("fail:{}", stage));
    }

    fn progress(&self, message: &str) {
        self.push(format!("progress:{}", message));
    }
}

/// Policy with waits short enough for tests.
pub fn fast_policy(api_port: u16) -> StartupPolicy {
    let mut policy = StartupPolicy::default();
    policy.ports.api_port = api_port;
    policy.timing.initial_status_check_ms = 10;
    policy.timing.dial_timeout_ms = 200;
    policy.timing.dial_interval_ms = 10;
    policy.timing.server_up_attempts = 3;
    policy.timing.test_ip_attempts = 2;
    policy.timing.readiness_interval_ms = 5;
    policy.timing.readiness_deadline_secs = 0;
    policy
}

/// Fakes wired together around a scratch host configuration directory and
/// a local listener on the API port.
pub struct Harness {
    pub runtime: Arc<FakeRuntime>,
    pub host: Arc<FakeHost>,
    pub health: Arc<CannedHealth>,
    pub factory: Arc<CannedHealthFactory>,
    pub observer: Arc<RecordingObserver>,
    pub host_config: HostConfigDir,
    pub staging: TempDir,
    pub policy: StartupPolicy,
    listener: Option<TcpListener>,
}

impl Harness {
    /// Harness whose configuration generation writes the sample config.
    pub async fn new(statuses: &[u16]) -> Self {
        Self::with_runtime(statuses, |runtime| runtime).await
    }

    /// `configure` scripts the runtime before the generation hook is added,
    /// so its replies take precedence.
    pub async fn with_runtime<F>(statuses: &[u16], configure: F) -> Self
    where
        F: FnOnce(FakeRuntime) -> FakeRuntime,
    {
        let host_config = HostConfigDir::new().unwrap();
        let config_dir = host_config.path().to_path_buf();
        let runtime = configure(FakeRuntime::new()).on_run("--write-config", move |_| {
            write_generated_config(&config_dir)
                .map_err(|e| RuntimeError::io("write", &config_dir, e))?;
            Ok(RunOutput::default())
        });

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let api_port = listener.local_addr().unwrap().port();
        let health = Arc::new(CannedHealth::statuses(statuses.iter().copied()));

        Self {
            runtime: Arc::new(runtime),
            host: Arc::new(FakeHost::new("node1")),
            factory: Arc::new(CannedHealthFactory::new(health.clone())),
            health,
            observer: Arc::new(RecordingObserver::default()),
            host_config,
            staging: TempDir::new().unwrap(),
            policy: fast_policy(api_port),
            listener: Some(listener),
        }
    }

    /// Stops listening on the API port; the port stays reserved in the policy.
    pub fn close_listener(&mut self) {
        self.listener = None;
    }

    pub fn orchestrator(&self) -> Orchestrator {
        Orchestrator::new(self.runtime.clone(), self.host.clone(), self.policy.clone())
            .with_image("openshift/origin:v3.6.0")
            .with_health_clients(self.factory.clone())
            .with_observer(self.observer.clone())
            .with_staging_root(self.staging.path())
    }

    pub fn options(&self) -> StartOptions {
        StartOptions::new("127.0.0.1")
            .with_image_tag("v3.6.0")
            .with_host_config_dir(self.host_config.path())
            .with_host_volumes_dir("/var/lib/origin/openshift.local.volumes")
    }

    /// Number of entries left in the staging root.
    pub fn staged_dirs(&self) -> usize {
        count_entries(self.staging.path())
    }

    /// Routing subdomain currently in the host's master config.
    pub fn host_subdomain(&self) -> String {
        let text = self.host_config.read("master/master-config.yaml").unwrap();
        let doc: serde_yaml::Value = serde_yaml::from_str(&text).unwrap();
        doc["routingConfig"]["subdomain"]
            .as_str()
            .unwrap_or_default()
            .to_string()
    }
}

pub fn count_entries(dir: &Path) -> usize {
    fs::read_dir(dir).map(|entries| entries.count()).unwrap_or(0)
}
