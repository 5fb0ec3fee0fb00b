//! The startup sequence.
//!
//! ```text
//! Init -> ConfigResolved -> ContainerStarting -> ContainerRunning
//!      -> ListenerReady -> ServiceReady -> Done
//! ```
//!
//! Every stage can fail; the staged configuration directory is owned by
//! [`StagedConfig`] and removed on every failure once created. Only a
//! successful run hands it to the caller.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use clusterup_common::{
    ContainerRuntime, HealthClientFactory, HostFiles, HttpsClientFactory, RunSpec,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::error::{StartupError, StartupResult};
use crate::observer::{Stage, StartupObserver, TracingObserver};
use crate::options::StartOptions;
use crate::patcher::ConfigPatcher;
use crate::policy::StartupPolicy;
use crate::ports;
use crate::dial::wait_for_dial;
use crate::readiness::{ReadinessPoller, READINESS_PATH};
use crate::stager::{ConfigStager, StagedConfig, MASTER_CONFIG_FILE};

/// Brings up the control plane container.
pub struct Orchestrator {
    runtime: Arc<dyn ContainerRuntime>,
    stager: ConfigStager,
    host: Arc<dyn HostFiles>,
    health: Arc<dyn HealthClientFactory>,
    observer: Arc<dyn StartupObserver>,
    policy: StartupPolicy,
    image: String,
    public_host: Option<String>,
    routing_suffix: Option<String>,
    cancel: CancellationToken,
}

impl Orchestrator {
    /// Creates an orchestrator using `policy.container.image` at tag
    /// `latest`, the HTTPS health client and a tracing observer.
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        host: Arc<dyn HostFiles>,
        policy: StartupPolicy,
    ) -> Self {
        Self {
            runtime,
            stager: ConfigStager::new(host.clone()),
            host,
            health: Arc::new(HttpsClientFactory),
            observer: Arc::new(TracingObserver),
            image: policy.image_ref("latest"),
            policy,
            public_host: None,
            routing_suffix: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Full image reference of the control plane image.
    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    /// Public hostname advertised as `--public-master`.
    pub fn with_public_host(mut self, host: impl Into<String>) -> Self {
        self.public_host = Some(host.into()).filter(|h: &String| !h.is_empty());
        self
    }

    /// Explicit routing subdomain, overriding `<ip>.<wildcard suffix>`.
    pub fn with_routing_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.routing_suffix = Some(suffix.into()).filter(|s: &String| !s.is_empty());
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn StartupObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_health_clients(mut self, factory: Arc<dyn HealthClientFactory>) -> Self {
        self.health = factory;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Directory under which staged configuration copies are created.
    pub fn with_staging_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.stager = ConfigStager::with_staging_root(self.host.clone(), root);
        self
    }

    pub fn container_name(&self) -> &str {
        &self.policy.container.container_name
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    pub fn policy(&self) -> &StartupPolicy {
        &self.policy
    }

    /// `https://<ip>:<api port>`
    pub fn master_url(&self, ip: &str) -> String {
        format!("https://{}:{}", ip, self.policy.ports.api_port)
    }

    pub fn readiness_url(&self, ip: &str) -> String {
        format!("{}{}", self.master_url(ip), READINESS_PATH)
    }

    fn api_addr(&self, ip: &str) -> String {
        format!("{}:{}", ip, self.policy.ports.api_port)
    }

    /// Fails with [`StartupError::PortConflict`] if any required port is
    /// already listening on the container host.
    #[instrument(skip(self))]
    pub async fn check_ports(&self) -> StartupResult<()> {
        self.checkpoint(Stage::PortCheck, async {
            let spec = RunSpec::new(self.image.clone())
                .discard()
                .privileged()
                .host_network()
                .host_pid()
                .entrypoint("/bin/bash")
                .command(["-c", "cat /proc/net/tcp /proc/net/tcp6"]);
            let output = self
                .cancellable("reading TCP port information", async {
                    self.runtime
                        .run(&spec)
                        .await
                        .map_err(|source| StartupError::PortScan { source })
                })
                .await?;
            ports::check_ports_in_use(&output.combined(), &self.policy.ports.required)
        })
        .await
    }

    /// Checks that `ip` reaches the container host by starting a throwaway
    /// listener on the API port and dialing it.
    #[instrument(skip(self))]
    pub async fn test_ip(&self, ip: &str) -> StartupResult<()> {
        let spec = RunSpec::new(self.image.clone())
            .privileged()
            .host_network()
            .entrypoint("socat")
            .command([
                format!("TCP-LISTEN:{},crlf,reuseaddr,fork", self.policy.ports.api_port),
                "SYSTEM:echo 'hello world'".to_string(),
            ]);
        let id = self
            .runtime
            .start(&spec)
            .await
            .map_err(|source| StartupError::TestServer { source })?;

        let addr = self.api_addr(ip);
        debug!(addr = %addr, "Attempting to dial");
        let result = wait_for_dial(false, &addr, self.policy.test_ip_dial(), &self.cancel).await;

        if let Err(e) = self.runtime.stop_and_remove(&id).await {
            warn!(container = %id, error = %e, "Could not remove test server container");
        }
        match &result {
            Ok(()) => debug!(addr = %addr, "Successfully dialed"),
            Err(e) => debug!(addr = %addr, error = %e, "Dial error"),
        }
        result
    }

    /// The IP the control plane would advertise, as reported by
    /// `start --print-ip`.
    pub async fn server_ip(&self) -> StartupResult<String> {
        let spec = RunSpec::new(self.image.clone())
            .discard()
            .privileged()
            .host_network()
            .command(["start", "--print-ip"]);
        let output = self.runtime.run(&spec).await.map_err(|source| StartupError::HostQuery {
            what: "server IP".to_string(),
            source,
        })?;
        Ok(output.stdout.trim().to_string())
    }

    /// IPv4 addresses of the container host other than `exclude`.
    pub async fn other_ips(&self, exclude: &str) -> StartupResult<Vec<String>> {
        let spec = RunSpec::new(self.image.clone())
            .discard()
            .privileged()
            .host_network()
            .entrypoint("hostname")
            .command(["-I"]);
        let output = self.runtime.run(&spec).await.map_err(|source| StartupError::HostQuery {
            what: "IP addresses".to_string(),
            source,
        })?;
        // IPv6 addresses are ignored for now.
        Ok(output
            .stdout
            .split_whitespace()
            .filter(|ip| *ip != exclude && !ip.contains(':'))
            .map(str::to_string)
            .collect())
    }

    /// Runs the full startup sequence.
    ///
    /// On success the staged configuration directory is returned and becomes
    /// the caller's to remove.
    #[instrument(skip(self, opts), fields(container = %self.container_name(), ip = %opts.server_ip()))]
    pub async fn start(&self, opts: &StartOptions) -> StartupResult<PathBuf> {
        self.observer.stage_entered(Stage::Init);
        let (binds, env) = self.container_mounts(opts);
        self.observer.stage_succeeded(Stage::Init);

        let staged = self
            .checkpoint(Stage::ConfigResolved, self.resolve_config(opts, &binds, &env))
            .await?;

        self.checkpoint(
            Stage::ContainerStarting,
            self.start_daemon(opts, binds, env),
        )
        .await?;

        if let Err(e) = self.await_service(opts, &staged).await {
            self.teardown_after_failure().await;
            return Err(e);
        }

        self.observer.stage_entered(Stage::Done);
        self.observer.progress("Control plane server started");
        self.observer.stage_succeeded(Stage::Done);
        Ok(staged.into_path())
    }

    fn container_mounts(&self, opts: &StartOptions) -> (Vec<String>, Vec<String>) {
        let mut binds = self.policy.container.binds.clone();
        let mut env = Vec::new();
        let volumes = opts.host_volumes_dir().display();
        if opts.shares_volumes() {
            binds.push(format!("{0}:{0}:shared", volumes));
            env.push("OPENSHIFT_CONTAINERIZED=false".to_string());
        } else {
            binds.push(format!("{0}:{0}", volumes));
        }
        env.extend(opts.environment().iter().cloned());
        binds.push(format!(
            "{}:{}:z",
            opts.host_config_dir().display(),
            self.policy.container.config_root
        ));
        (binds, env)
    }

    async fn resolve_config(
        &self,
        opts: &StartOptions,
        binds: &[String],
        env: &[String],
    ) -> StartupResult<StagedConfig> {
        let host_dir = opts.host_config_dir();

        if opts.reuses_existing_config() {
            match self.stager.stage(host_dir).await {
                Ok(staged) if staged.has_master_config() => {
                    info!(host_dir = %host_dir.display(), "Using existing configuration");
                    self.observer.progress("Using existing control plane configuration");
                    return Ok(staged);
                }
                Ok(_) => debug!(host_dir = %host_dir.display(), "No master configuration found, creating one"),
                Err(e) => debug!(error = %e, "Existing configuration unavailable, creating one"),
            }
        }

        info!(host_dir = %host_dir.display(), "Creating configuration on container host");
        self.observer.progress("Creating initial control plane configuration");
        let spec = RunSpec::new(self.image.clone())
            .privileged()
            .discard()
            .host_network()
            .host_pid()
            .binds(binds.iter().cloned())
            .env(env.iter().cloned())
            .command(self.create_config_command(opts));
        self.cancellable("creating configuration", async {
            self.runtime
                .run(&spec)
                .await
                .map_err(|source| StartupError::ConfigGeneration {
                    host_dir: host_dir.to_path_buf(),
                    source,
                })
        })
        .await?;

        let staged = self.stager.stage(host_dir).await?;
        ConfigPatcher::new(
            &self.stager,
            self.routing_suffix.as_deref(),
            &self.policy.routing.wildcard_dns_suffix,
        )
        .patch(&staged, host_dir, opts.server_ip())
        .await?;
        Ok(staged)
    }

    fn create_config_command(&self, opts: &StartOptions) -> Vec<String> {
        let mut cmd = vec![
            "start".to_string(),
            format!("--images={}", self.policy.component_images(opts.image_tag())),
            format!("--master={}", opts.server_ip()),
            format!("--volume-dir={}", opts.host_volumes_dir().display()),
            "--dns=0.0.0.0:53".to_string(),
            format!("--write-config={}", self.policy.container.config_root),
        ];
        if let Some(public_host) = &self.public_host {
            cmd.push(format!("--public-master={}", self.master_url(public_host)));
        }
        cmd
    }

    /// In-container paths of the master and node configuration files.
    async fn config_file_paths(&self) -> StartupResult<(PathBuf, PathBuf)> {
        let hostname = self
            .host
            .hostname()
            .await
            .map_err(|source| StartupError::ConfigPaths { source })?;
        let root = self.policy.config_root();
        Ok((
            root.join(MASTER_CONFIG_FILE),
            root.join(format!("node-{}", hostname)).join("node-config.yaml"),
        ))
    }

    async fn start_daemon(
        &self,
        opts: &StartOptions,
        mut binds: Vec<String>,
        env: Vec<String>,
    ) -> StartupResult<String> {
        let (master_config, node_config) = self.config_file_paths().await?;

        self.observer.progress(&format!(
            "Starting control plane using container '{}'",
            self.container_name()
        ));
        let mut cmd = vec![
            "start".to_string(),
            format!("--master-config={}", master_config.display()),
            format!("--node-config={}", node_config.display()),
        ];
        if opts.log_level() > 0 {
            cmd.push(format!("--loglevel={}", opts.log_level()));
        }
        if let Some(data_dir) = opts.host_data_dir() {
            binds.push(format!(
                "{}:{}:z",
                data_dir.display(),
                self.policy.container.data_root
            ));
        }

        let spec = RunSpec::new(self.image.clone())
            .name(self.container_name())
            .privileged()
            .host_network()
            .host_pid()
            .binds(binds)
            .env(env)
            .command(cmd);
        self.runtime
            .start(&spec)
            .await
            .map_err(|source| StartupError::DaemonStart {
                container: self.container_name().to_string(),
                source,
            })
    }

    /// Stages after launch: still running, listening, ready.
    async fn await_service(&self, opts: &StartOptions, staged: &StagedConfig) -> StartupResult<()> {
        let container = self.container_name().to_string();

        self.checkpoint(Stage::ContainerRunning, async {
            // A daemon that crashes on startup is gone by the end of the grace period.
            self.cancellable("waiting for the container to settle", async {
                tokio::time::sleep(self.policy.initial_status_check()).await;
                Ok(())
            })
            .await?;
            let state = self
                .runtime
                .container_state(&container)
                .await
                .map_err(|source| StartupError::StateQuery {
                    container: container.clone(),
                    source,
                })?;
            if state.is_running() {
                Ok(())
            } else {
                Err(StartupError::FailedToStart {
                    container: container.clone(),
                })
            }
        })
        .await?;

        self.checkpoint(Stage::ListenerReady, async {
            self.observer.progress("Waiting for API server to start listening");
            let addr = self.api_addr(opts.server_ip());
            wait_for_dial(true, &addr, self.policy.server_up_dial(), &self.cancel)
                .await
                .map_err(|e| match e {
                    StartupError::Timeout { addr, .. } => StartupError::TimedOutWaitingForStart {
                        container: container.clone(),
                        addr,
                    },
                    other => other,
                })
        })
        .await?;

        self.checkpoint(Stage::ServiceReady, async {
            let ca_cert = staged.ca_cert();
            let client = self
                .health
                .build(&ca_cert)
                .await
                .map_err(|source| StartupError::ClientSetup {
                    ca_cert: ca_cert.clone(),
                    source,
                })?;
            ReadinessPoller::new(client)
                .with_interval(self.policy.readiness_interval())
                .with_deadline(self.policy.readiness_deadline())
                .wait_ready(&self.readiness_url(opts.server_ip()), &self.cancel)
                .await
                .map(|_| ())
        })
        .await
    }

    async fn teardown_after_failure(&self) {
        let name = self.container_name();
        if !self.policy.container.teardown_on_failure {
            info!(container = %name, "Leaving container in place for inspection");
            return;
        }
        match self.runtime.stop_and_remove(name).await {
            Ok(()) => info!(container = %name, "Removed failed control plane container"),
            Err(e) => warn!(container = %name, error = %e, "Could not remove failed container"),
        }
    }

    async fn checkpoint<T, F>(&self, stage: Stage, fut: F) -> StartupResult<T>
    where
        F: Future<Output = StartupResult<T>>,
    {
        self.observer.stage_entered(stage);
        match fut.await {
            Ok(value) => {
                self.observer.stage_succeeded(stage);
                Ok(value)
            }
            Err(e) => {
                self.observer.stage_failed(stage, &e);
                Err(e)
            }
        }
    }

    async fn cancellable<T, F>(&self, during: &str, fut: F) -> StartupResult<T>
    where
        F: Future<Output = StartupResult<T>>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(StartupError::cancelled(during)),
            result = fut => result,
        }
    }
}
