//! End-to-end startup sequence against fake collaborators.

mod common;

use std::time::Duration;

use clusterup::{ReadinessCause, StartupError};
use clusterup_common::RunOutput;
use clusterup_test::{write_generated_config, RuntimeVerifier, SAMPLE_MASTER_CONFIG};
use common::Harness;
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

const GENERATE: &str = "--write-config";

#[tokio::test]
async fn test_start_generates_config_and_reports_ready() {
    let harness = Harness::new(&[503, 503, 200]).await;
    let orch = harness.orchestrator();

    let staged = orch.start(&harness.options()).await.unwrap();

    assert!(staged.starts_with(harness.staging.path()));
    assert!(staged.join("master/master-config.yaml").is_file());
    assert_eq!(harness.health.requests(), 3);
    assert_eq!(
        harness.health.urls()[0],
        format!("https://127.0.0.1:{}/healthz/ready", harness.policy.ports.api_port)
    );
    assert_eq!(harness.factory.ca_certs(), vec![staged.join("master/ca.crt")]);
    assert_eq!(harness.host_subdomain(), "127.0.0.1.xip.io");

    let verify = RuntimeVerifier::new(&harness.runtime);
    verify.assert_run_count(GENERATE, 1).unwrap();
    verify
        .assert_started_with(
            "origin",
            "--master-config=/var/lib/origin/openshift.local.config/master/master-config.yaml",
        )
        .unwrap();
    verify
        .assert_started_with(
            "origin",
            "--node-config=/var/lib/origin/openshift.local.config/node-node1/node-config.yaml",
        )
        .unwrap();
    verify.assert_removed("origin", false).unwrap();

    assert_eq!(
        harness.observer.with_prefix("ok:"),
        vec![
            "init",
            "config-resolved",
            "container-starting",
            "container-running",
            "listener-ready",
            "service-ready",
            "done",
        ]
    );
    assert!(harness
        .observer
        .with_prefix("progress:")
        .contains(&"Waiting for API server to start listening".to_string()));
}

#[tokio::test]
async fn test_generation_command_and_mounts() {
    let harness = Harness::new(&[200]).await;
    let orch = harness.orchestrator().with_public_host("master.example.com");

    orch.start(&harness.options().with_environment(["HTTP_PROXY=http://proxy:3128"]))
        .await
        .unwrap();

    let generation = harness.runtime.matching(GENERATE);
    assert_eq!(generation.len(), 1);
    let spec = &generation[0].spec;
    assert!(spec.is_discarded());
    assert!(spec.uses_host_pid());
    assert_eq!(
        spec.args(),
        &[
            "start".to_string(),
            "--images=openshift/origin-${component}:v3.6.0".to_string(),
            "--master=127.0.0.1".to_string(),
            "--volume-dir=/var/lib/origin/openshift.local.volumes".to_string(),
            "--dns=0.0.0.0:53".to_string(),
            "--write-config=/var/lib/origin/openshift.local.config".to_string(),
            format!(
                "--public-master=https://master.example.com:{}",
                harness.policy.ports.api_port
            ),
        ]
    );
    assert_eq!(spec.environment(), &["HTTP_PROXY=http://proxy:3128".to_string()]);
    assert!(spec.bind_mounts().contains(&format!(
        "{}:/var/lib/origin/openshift.local.config:z",
        harness.host_config.path().display()
    )));
}

#[tokio::test]
async fn test_daemon_container_options() {
    let harness = Harness::new(&[200]).await;
    let orch = harness.orchestrator();
    let opts = harness
        .options()
        .with_host_data_dir("/data/etcd")
        .use_shared_volume(true)
        .with_log_level(4);

    orch.start(&opts).await.unwrap();

    let verify = RuntimeVerifier::new(&harness.runtime);
    verify.assert_started_with("origin", "--loglevel=4").unwrap();
    let spec = verify.started("origin").unwrap();
    assert!(spec.is_privileged());
    assert!(spec.uses_host_network());
    assert!(spec
        .bind_mounts()
        .contains(&"/data/etcd:/var/lib/origin/openshift.local.etcd:z".to_string()));
    assert!(spec.bind_mounts().contains(
        &"/var/lib/origin/openshift.local.volumes:/var/lib/origin/openshift.local.volumes:shared"
            .to_string()
    ));
    assert_eq!(spec.environment()[0], "OPENSHIFT_CONTAINERIZED=false");

    // The data directory is only mounted into the long-running container.
    let generation = &harness.runtime.matching(GENERATE)[0].spec;
    assert!(!generation.bind_mounts().iter().any(|b| b.starts_with("/data/etcd")));
}

#[tokio::test]
async fn test_explicit_routing_suffix() {
    let harness = Harness::new(&[200]).await;
    let orch = harness.orchestrator().with_routing_suffix("apps.example.com");

    orch.start(&harness.options()).await.unwrap();

    assert_eq!(harness.host_subdomain(), "apps.example.com");
    let pushed = harness.host.pushed();
    assert_eq!(pushed.len(), 1);
    assert_eq!(pushed[0].1, harness.host_config.file("master"));
}

#[tokio::test]
async fn test_existing_config_is_reused() {
    let harness = Harness::new(&[200]).await;
    write_generated_config(harness.host_config.path()).unwrap();
    let orch = harness.orchestrator();

    let staged = orch
        .start(&harness.options().use_existing_config(true))
        .await
        .unwrap();

    RuntimeVerifier::new(&harness.runtime)
        .assert_run_count(GENERATE, 0)
        .unwrap();
    assert!(harness.host.pushed().is_empty());
    assert_eq!(
        std::fs::read_to_string(staged.join("master/master-config.yaml")).unwrap(),
        SAMPLE_MASTER_CONFIG
    );
    assert!(harness
        .observer
        .with_prefix("progress:")
        .contains(&"Using existing control plane configuration".to_string()));
}

#[tokio::test]
async fn test_existing_config_missing_falls_back_to_generation() {
    let harness = Harness::new(&[200]).await;
    let orch = harness.orchestrator();

    orch.start(&harness.options().use_existing_config(true))
        .await
        .unwrap();

    RuntimeVerifier::new(&harness.runtime)
        .assert_run_count(GENERATE, 1)
        .unwrap();
    // The empty staging copy is discarded; only the returned directory remains.
    assert_eq!(harness.staged_dirs(), 1);
    assert_eq!(harness.host.copies_from_host(), 2);
}

#[tokio::test]
async fn test_generation_failure() {
    let harness = Harness::with_runtime(&[200], |runtime| {
        runtime.fail(GENERATE, "error: cannot write config")
    })
    .await;
    let orch = harness.orchestrator();

    let err = orch.start(&harness.options()).await.unwrap_err();

    assert!(matches!(err, StartupError::ConfigGeneration { .. }));
    assert!(!err.container_launched());
    assert_eq!(harness.staged_dirs(), 0);
    assert!(RuntimeVerifier::new(&harness.runtime).started("origin").is_err());
    assert_eq!(harness.observer.with_prefix("fail:"), vec!["config-resolved"]);
}

#[tokio::test]
async fn test_stage_failure() {
    let harness = Harness::new(&[200]).await;
    harness.host.set_copy_failure(true);
    let orch = harness.orchestrator();

    let err = orch.start(&harness.options()).await.unwrap_err();

    assert!(matches!(err, StartupError::StageFailure { .. }));
    assert_eq!(harness.staged_dirs(), 0);
}

#[tokio::test]
async fn test_daemon_start_failure() {
    let harness =
        Harness::with_runtime(&[200], |runtime| runtime.fail_start("Conflict. The name is in use")).await;
    let orch = harness.orchestrator();

    let err = orch.start(&harness.options()).await.unwrap_err();

    assert!(matches!(err, StartupError::DaemonStart { ref container, .. } if container == "origin"));
    assert_eq!(harness.staged_dirs(), 0);
    RuntimeVerifier::new(&harness.runtime)
        .assert_removed("origin", false)
        .unwrap();
}

#[tokio::test]
async fn test_container_not_running() {
    let harness = Harness::new(&[200]).await;
    harness.runtime.set_running(false);
    let orch = harness.orchestrator();

    let err = orch.start(&harness.options()).await.unwrap_err();

    assert!(matches!(err, StartupError::FailedToStart { ref container } if container == "origin"));
    assert!(err.container_launched());
    assert_eq!(harness.staged_dirs(), 0);
    assert_eq!(harness.health.requests(), 0);
    // Left in place for inspection by default.
    RuntimeVerifier::new(&harness.runtime)
        .assert_removed("origin", false)
        .unwrap();
    assert_eq!(harness.observer.with_prefix("fail:"), vec!["container-running"]);
}

#[tokio::test]
async fn test_container_not_running_with_teardown() {
    let mut harness = Harness::new(&[200]).await;
    harness.policy.container.teardown_on_failure = true;
    harness.runtime.set_running(false);
    let orch = harness.orchestrator();

    orch.start(&harness.options()).await.unwrap_err();

    RuntimeVerifier::new(&harness.runtime)
        .assert_removed("origin", true)
        .unwrap();
}

#[tokio::test]
async fn test_state_query_failure() {
    let harness = Harness::new(&[200]).await;
    harness.runtime.set_missing(true);
    let orch = harness.orchestrator();

    let err = orch.start(&harness.options()).await.unwrap_err();

    assert!(matches!(err, StartupError::StateQuery { .. }));
}

#[tokio::test]
async fn test_listener_never_opens() {
    let mut harness = Harness::new(&[200]).await;
    harness.close_listener();
    let orch = harness.orchestrator();

    let err = orch.start(&harness.options()).await.unwrap_err();

    match err {
        StartupError::TimedOutWaitingForStart { container, addr } => {
            assert_eq!(container, "origin");
            assert_eq!(addr, format!("127.0.0.1:{}", harness.policy.ports.api_port));
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(harness.health.requests(), 0);
    assert_eq!(harness.staged_dirs(), 0);
}

#[tokio::test]
async fn test_missing_ca_certificate() {
    let harness = Harness::with_runtime(&[200], |runtime| {
        runtime.on_run(GENERATE, |spec| {
            // Writes only the master config; the host dir is the first bind
            // ending in the config root.
            let bind = spec
                .bind_mounts()
                .iter()
                .find(|b| b.ends_with(":/var/lib/origin/openshift.local.config:z"))
                .cloned()
                .unwrap_or_default();
            let host_dir = bind.split(':').next().unwrap_or_default().to_string();
            let master = std::path::Path::new(&host_dir).join("master");
            std::fs::create_dir_all(&master).unwrap();
            std::fs::write(master.join("master-config.yaml"), SAMPLE_MASTER_CONFIG).unwrap();
            Ok(RunOutput::default())
        })
    })
    .await;
    let orch = harness.orchestrator();

    let err = orch.start(&harness.options()).await.unwrap_err();

    assert!(matches!(err, StartupError::ClientSetup { .. }));
    assert!(err.container_launched());
    assert_eq!(harness.staged_dirs(), 0);
}

#[tokio::test]
async fn test_readiness_fatal_status() {
    let harness = Harness::new(&[]).await;
    harness.health.then_status(403, "").then_status(500, "etcd not healthy");
    let orch = harness.orchestrator();

    let err = orch.start(&harness.options()).await.unwrap_err();

    match err {
        StartupError::ReadinessFailed {
            cause: ReadinessCause::Status { status, body },
            ..
        } => {
            assert_eq!(status, 500);
            assert_eq!(body, "etcd not healthy");
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(harness.health.requests(), 2);
    assert_eq!(harness.staged_dirs(), 0);
}

#[tokio::test]
async fn test_readiness_deadline() {
    let mut harness = Harness::new(&[503]).await;
    harness.policy.timing.readiness_interval_ms = 200;
    harness.policy.timing.readiness_deadline_secs = 1;
    let orch = harness.orchestrator();

    let err = orch.start(&harness.options()).await.unwrap_err();

    assert!(matches!(err, StartupError::ReadinessTimeout { .. }));
    assert!(harness.health.requests() >= 2);
}

#[tokio::test]
async fn test_cancel_during_readiness() {
    let harness = Harness::new(&[503]).await;
    let cancel = CancellationToken::new();
    let orch = harness.orchestrator().with_cancellation(cancel.clone());

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        cancel.cancel();
    });
    let err = orch.start(&harness.options()).await.unwrap_err();
    canceller.await.unwrap();

    assert!(matches!(err, StartupError::Cancelled { .. }));
    assert_eq!(err.stage(), None);
    assert!(harness.health.requests() > 0);
    assert_eq!(harness.staged_dirs(), 0);
}

#[tokio::test]
async fn test_cancel_before_start() {
    let harness = Harness::new(&[200]).await;
    let cancel = CancellationToken::new();
    cancel.cancel();
    let orch = harness.orchestrator().with_cancellation(cancel);

    let err = orch.start(&harness.options()).await.unwrap_err();

    assert!(matches!(err, StartupError::Cancelled { .. }));
    assert!(RuntimeVerifier::new(&harness.runtime).started("origin").is_err());
}
