//! Port pre-check and host diagnostics.

mod common;

use clusterup::StartupError;
use clusterup_test::{proc_net_tcp, RuntimeVerifier};
use common::Harness;
use pretty_assertions::assert_eq;

#[tokio::test]
async fn test_check_ports_free() {
    let harness = Harness::with_runtime(&[], |runtime| {
        runtime.reply("/proc/net/tcp", proc_net_tcp(&[22, 631], &[443, 8443]))
    })
    .await;

    harness.orchestrator().check_ports().await.unwrap();

    let scans = harness.runtime.matching("/proc/net/tcp");
    assert_eq!(scans.len(), 1);
    let spec = &scans[0].spec;
    assert!(spec.is_discarded());
    assert!(spec.is_privileged());
    assert!(spec.uses_host_network());
    assert!(spec.uses_host_pid());
    assert_eq!(spec.entrypoint_override(), Some("/bin/bash"));
    assert_eq!(harness.observer.with_prefix("ok:"), vec!["port-check"]);
}

#[tokio::test]
async fn test_check_ports_conflict() {
    let harness = Harness::with_runtime(&[], |runtime| {
        runtime.reply("/proc/net/tcp", proc_net_tcp(&[8443, 22, 53], &[80]))
    })
    .await;

    let err = harness.orchestrator().check_ports().await.unwrap_err();

    match err {
        StartupError::PortConflict { ports } => assert_eq!(ports, vec![53, 8443]),
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(harness.observer.with_prefix("fail:"), vec!["port-check"]);
}

#[tokio::test]
async fn test_check_ports_scan_failure() {
    let harness = Harness::with_runtime(&[], |runtime| {
        runtime.fail("/proc/net/tcp", "cat: /proc/net/tcp6: No such file or directory")
    })
    .await;

    let err = harness.orchestrator().check_ports().await.unwrap_err();

    assert!(matches!(err, StartupError::PortScan { .. }));
}

#[tokio::test]
async fn test_test_ip_reachable() {
    let harness = Harness::new(&[]).await;

    harness.orchestrator().test_ip("127.0.0.1").await.unwrap();

    let invocations = harness.runtime.invocations();
    assert_eq!(invocations.len(), 1);
    assert_eq!(invocations[0].spec.entrypoint_override(), Some("socat"));
    RuntimeVerifier::new(&harness.runtime)
        .assert_removed("fake-container-1", true)
        .unwrap();
}

#[tokio::test]
async fn test_test_ip_unreachable_still_removes_listener() {
    let mut harness = Harness::new(&[]).await;
    harness.close_listener();

    let err = harness.orchestrator().test_ip("127.0.0.1").await.unwrap_err();

    match err {
        StartupError::Timeout { attempts, .. } => assert_eq!(attempts, 2),
        other => panic!("unexpected error: {}", other),
    }
    RuntimeVerifier::new(&harness.runtime)
        .assert_removed("fake-container-1", true)
        .unwrap();
}

#[tokio::test]
async fn test_test_ip_listener_start_failure() {
    let harness = Harness::with_runtime(&[], |runtime| runtime.fail_start("no such image")).await;

    let err = harness.orchestrator().test_ip("127.0.0.1").await.unwrap_err();

    assert!(matches!(err, StartupError::TestServer { .. }));
    assert!(harness.runtime.removed().is_empty());
}

#[tokio::test]
async fn test_server_ip() {
    let harness =
        Harness::with_runtime(&[], |runtime| runtime.reply("--print-ip", "10.0.0.5\n")).await;

    assert_eq!(harness.orchestrator().server_ip().await.unwrap(), "10.0.0.5");
}

#[tokio::test]
async fn test_other_ips_skips_excluded_and_ipv6() {
    let harness = Harness::with_runtime(&[], |runtime| {
        runtime.reply("hostname", "10.0.0.5 192.168.1.10 fe80::1 172.17.0.1 \n")
    })
    .await;

    let ips = harness.orchestrator().other_ips("10.0.0.5").await.unwrap();

    assert_eq!(ips, vec!["192.168.1.10", "172.17.0.1"]);
}

#[tokio::test]
async fn test_other_ips_failure() {
    let harness = Harness::with_runtime(&[], |runtime| runtime.fail("hostname", "exec failed")).await;

    let err = harness.orchestrator().other_ips("10.0.0.5").await.unwrap_err();

    assert!(matches!(err, StartupError::HostQuery { .. }));
}
