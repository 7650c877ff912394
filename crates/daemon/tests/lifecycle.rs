//! Daemon handle lifecycle against real in-process nodes.

use assert_matches::assert_matches;
use bytes::Bytes;
use relayprobe_daemon::{
    Daemon, DaemonError, DaemonState, EmbeddedDaemon, SpawnConfig, SpawnedDaemon,
};
use relayprobe_node_api::{NodeControl, collect_stream};
use relayprobe_node_config::{NodeConfig, NodeConfigBuilder, NodeFamily, NodeIndex, NodeKind};
use relayprobe_observability::init_test_logging;
use relayprobe_rpc_client::ApiClient;

fn config(index: u16, family: NodeFamily) -> NodeConfig {
    NodeConfigBuilder::new(NodeIndex::new(index), family)
        .kind(NodeKind::Leaf)
        .build()
}

#[tokio::test(flavor = "multi_thread")]
async fn test_embedded_start_identity_stop() {
    init_test_logging();

    let mut daemon = EmbeddedDaemon::new(config(911, NodeFamily::Embedded));
    assert_eq!(daemon.state(), DaemonState::Stopped);
    assert!(daemon.control().is_none());

    daemon.start(true).await.unwrap();
    assert_eq!(daemon.state(), DaemonState::Running);

    let identity = daemon.identity().await.unwrap();
    assert!(!identity.addresses.is_empty());
    assert_eq!(daemon.identity().await.unwrap(), identity);

    // The control API serves the same node.
    let client = ApiClient::from_multiaddr(&daemon.config().addresses.api).unwrap();
    assert_eq!(
        client.identity().await.unwrap().peer_id,
        identity.peer_id
    );

    assert_matches!(daemon.start(true).await, Err(DaemonError::AlreadyStarted));

    daemon.stop().await.unwrap();
    assert_eq!(daemon.state(), DaemonState::Stopped);
    assert!(daemon.control().is_none());
    assert!(!client.is_reachable().await);

    // Stopping again is a no-op.
    daemon.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_stop_without_start() {
    let mut daemon = EmbeddedDaemon::new(config(912, NodeFamily::Embedded));
    daemon.stop().await.unwrap();
    assert_eq!(daemon.state(), DaemonState::Stopped);

    assert_matches!(daemon.identity().await, Err(DaemonError::NotRunning));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_missing_repository_fails_start() {
    init_test_logging();

    let mut daemon = EmbeddedDaemon::new(config(913, NodeFamily::Embedded));
    assert_matches!(daemon.start(false).await, Err(DaemonError::Storage(_)));
    assert_eq!(daemon.state(), DaemonState::Starting);

    daemon.stop().await.unwrap();
    assert_eq!(daemon.state(), DaemonState::Stopped);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_existing_repository_is_reused() {
    init_test_logging();
    let repo = tempfile::tempdir().unwrap();

    let mut first = EmbeddedDaemon::new(config(914, NodeFamily::Embedded)).with_repo(repo.path());
    first.start(true).await.unwrap();
    let control = first.control().unwrap();
    let reference = control.add(Bytes::from_static(b"persisted")).await.unwrap();
    first.stop().await.unwrap();
    assert!(repo.path().exists(), "caller-owned repository must survive stop");

    let mut second = EmbeddedDaemon::new(config(914, NodeFamily::Embedded)).with_repo(repo.path());
    second.start(false).await.unwrap();
    let own = second.identity().await.unwrap().peer_id;
    let stream = second.control().unwrap().cat(own, reference).await.unwrap();
    assert_eq!(
        &collect_stream(stream).await.unwrap()[..],
        b"persisted"
    );
    second.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_occupied_api_port_fails_start() {
    init_test_logging();

    let config = config(915, NodeFamily::Embedded);
    let _squatter = std::net::TcpListener::bind(config.api_socket_addr().unwrap()).unwrap();

    let mut daemon = EmbeddedDaemon::new(config);
    assert_matches!(daemon.start(true).await, Err(DaemonError::Start(_)));
    daemon.stop().await.unwrap();

    // Swarm ports were released with the node.
    std::net::TcpListener::bind(("127.0.0.1", daemon.config().ports().swarm)).unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_duplicate_swarm_ports_fail_without_api() {
    init_test_logging();

    let mut first = EmbeddedDaemon::new(config(918, NodeFamily::Embedded)).with_api(false);
    first.start(true).await.unwrap();

    let mut second = EmbeddedDaemon::new(config(918, NodeFamily::Embedded)).with_api(false);
    assert_matches!(second.start(true).await, Err(DaemonError::Start(_)));
    second.stop().await.unwrap();

    assert!(first.identity().await.is_ok());
    first.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_wait_for_exit_after_api_shutdown() {
    init_test_logging();

    let mut daemon = EmbeddedDaemon::new(config(917, NodeFamily::Embedded));
    daemon.start(true).await.unwrap();

    let client = ApiClient::from_multiaddr(&daemon.config().addresses.api).unwrap();
    client.shutdown().await.unwrap();

    tokio::time::timeout(std::time::Duration::from_secs(10), daemon.wait_for_exit())
        .await
        .unwrap();
    daemon.stop().await.unwrap();
    assert!(!client.is_reachable().await);
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread")]
async fn test_spawned_process_exiting_early_fails_start() {
    init_test_logging();

    // `sh daemon ...` exits immediately: there is no script called "daemon".
    let spawn = SpawnConfig::new("sh").inherit_output(false);
    let mut daemon = SpawnedDaemon::new(config(916, NodeFamily::External), spawn);
    assert_matches!(daemon.start(true).await, Err(DaemonError::Start(_)));
    daemon.stop().await.unwrap();
    assert_eq!(daemon.state(), DaemonState::Stopped);
}
