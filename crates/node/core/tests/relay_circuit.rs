//! In-process nodes connecting directly and through a relay circuit.

use std::time::Duration;

use assert_matches::assert_matches;
use bytes::Bytes;
use relayprobe_node_api::{
    ConnectionRoute, ContentRef, ControlError, NodeControl, PeerIdentity, collect_stream,
};
use relayprobe_node_config::{NodeConfigBuilder, NodeFamily, NodeIndex, NodeKind};
use relayprobe_node_core::{BlockStore, Node, NodeHandle, wait_ready};
use relayprobe_observability::init_test_logging;
use tempfile::TempDir;

struct TestNode {
    handle: NodeHandle,
    _repo: TempDir,
}

async fn start_node(index: u16, kind: NodeKind) -> eyre::Result<TestNode> {
    let config = NodeConfigBuilder::new(NodeIndex::new(index), NodeFamily::Embedded)
        .kind(kind)
        .build();
    let repo = tempfile::tempdir()?;
    let store = BlockStore::init(repo.path())?;

    let (mut node, handle) = Node::builder(config).with_store(store).build().await?;
    let mut events = handle.subscribe();
    node.start_listening()?;
    tokio::spawn(node.run());
    wait_ready(&mut events).await?;

    Ok(TestNode {
        handle,
        _repo: repo,
    })
}

#[tokio::test(flavor = "multi_thread")]
async fn test_leaves_exchange_content_through_relay() {
    init_test_logging();

    let relay = start_node(901, NodeKind::Relay).await.unwrap();
    let a = start_node(902, NodeKind::Leaf).await.unwrap();
    let b = start_node(903, NodeKind::Leaf).await.unwrap();

    let relay_id = relay.handle.identity().await.unwrap();
    assert!(!relay_id.addresses.is_empty());

    assert_eq!(
        a.handle.connect(&relay_id).await.unwrap(),
        ConnectionRoute::Direct
    );
    assert_eq!(
        b.handle.connect(&relay_id).await.unwrap(),
        ConnectionRoute::Direct
    );

    // Let identify run and B's reservation settle.
    tokio::time::sleep(Duration::from_secs(1)).await;

    let b_id = b.handle.local_peer_id();
    let route = a.handle.connect(&PeerIdentity::peer_only(b_id)).await.unwrap();
    assert_eq!(
        route,
        ConnectionRoute::Relayed {
            relay: relay_id.peer_id
        }
    );

    let payload = Bytes::from_static(b"through the circuit");
    let reference = b.handle.add(payload.clone()).await.unwrap();
    let stream = a.handle.cat(b_id, reference).await.unwrap();
    assert_eq!(collect_stream(stream).await.unwrap(), payload);

    for node in [&a, &b, &relay] {
        node.handle.shutdown().await.unwrap();
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_peer_only_without_relay_has_no_route() {
    init_test_logging();

    let a = start_node(904, NodeKind::Leaf).await.unwrap();
    let b = start_node(905, NodeKind::Leaf).await.unwrap();

    let result = a
        .handle
        .connect(&PeerIdentity::peer_only(b.handle.local_peer_id()))
        .await;
    assert_matches!(result, Err(ControlError::NoRoute(_)));

    // With addresses the leaves connect directly.
    let b_id = b.handle.identity().await.unwrap();
    assert_eq!(
        a.handle.connect(&b_id).await.unwrap(),
        ConnectionRoute::Direct
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_occupied_port_fails_start() {
    init_test_logging();

    let _first = start_node(906, NodeKind::Leaf).await.unwrap();
    assert!(start_node(906, NodeKind::Leaf).await.is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_shutdown_releases_ports() {
    init_test_logging();

    let node = start_node(907, NodeKind::Relay).await.unwrap();
    node.handle.shutdown().await.unwrap();
    assert!(!node.handle.is_running());

    // Shutting down twice is harmless.
    node.handle.shutdown().await.unwrap();
    assert_matches!(node.handle.identity().await, Err(ControlError::Stopped));

    let again = start_node(907, NodeKind::Relay).await.unwrap();
    again.handle.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cat_from_self() {
    init_test_logging();

    let node = start_node(908, NodeKind::Leaf).await.unwrap();
    let own = node.handle.local_peer_id();

    let reference = node.handle.add(Bytes::from_static(b"local")).await.unwrap();
    let stream = node.handle.cat(own, reference).await.unwrap();
    assert_eq!(&collect_stream(stream).await.unwrap()[..], b"local");

    let missing = ContentRef::for_content(b"missing");
    assert_matches!(
        node.handle.cat(own, missing).await.err(),
        Some(ControlError::NotFound(r)) if r == missing
    );
}
