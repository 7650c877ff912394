//! Control API server and client talking over real sockets to a mock node.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use assert_matches::assert_matches;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use libp2p::PeerId;
use parking_lot::Mutex;
use relayprobe_node_api::{
    ByteStream, ConnectionRoute, ContentRef, ControlError, NodeControl, PeerIdentity,
    collect_stream,
};
use relayprobe_node_config::HttpHeaders;
use relayprobe_rpc_client::ApiClient;
use relayprobe_rpc_server::{ApiServer, ApiServerConfig, RpcServer};

struct MockNode {
    identity: PeerIdentity,
    relay: PeerId,
    blocks: Mutex<HashMap<ContentRef, Bytes>>,
    shutdowns: AtomicUsize,
}

impl MockNode {
    fn new() -> Arc<Self> {
        let peer_id = PeerId::random();
        let addr = format!("/ip4/127.0.0.1/tcp/10999/p2p/{peer_id}").parse().unwrap();
        Arc::new(Self {
            identity: PeerIdentity::new(peer_id, vec![addr]),
            relay: PeerId::random(),
            blocks: Mutex::new(HashMap::new()),
            shutdowns: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl NodeControl for MockNode {
    async fn identity(&self) -> Result<PeerIdentity, ControlError> {
        Ok(self.identity.clone())
    }

    async fn connect(&self, peer: &PeerIdentity) -> Result<ConnectionRoute, ControlError> {
        if peer.addresses.is_empty() {
            Ok(ConnectionRoute::Relayed { relay: self.relay })
        } else {
            Err(ControlError::Connect {
                peer: peer.peer_id,
                reason: "connection refused".into(),
            })
        }
    }

    async fn add(&self, data: Bytes) -> Result<ContentRef, ControlError> {
        let reference = ContentRef::for_content(&data);
        self.blocks.lock().insert(reference, data);
        Ok(reference)
    }

    async fn cat(&self, _provider: PeerId, reference: ContentRef) -> Result<ByteStream, ControlError> {
        let data = self
            .blocks
            .lock()
            .get(&reference)
            .cloned()
            .ok_or(ControlError::NotFound(reference))?;
        let (head, tail) = data.split_at(data.len() / 2);
        let chunks = vec![
            Ok(Bytes::copy_from_slice(head)),
            Ok(Bytes::copy_from_slice(tail)),
        ];
        Ok(Box::pin(stream::iter(chunks)))
    }

    async fn shutdown(&self) -> Result<(), ControlError> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

async fn serve(node: Arc<MockNode>) -> (Arc<ApiServer>, ApiClient) {
    let config = ApiServerConfig {
        api_addr: "127.0.0.1:0".parse().unwrap(),
        gateway_addr: Some("127.0.0.1:0".parse().unwrap()),
        http_headers: HttpHeaders::permissive(),
    };
    let server = ApiServer::bind(config, node).await.unwrap();
    tokio::spawn({
        let server = server.clone();
        async move { server.start().await }
    });
    let client = ApiClient::new(server.address()).unwrap();
    (server, client)
}

#[tokio::test(flavor = "multi_thread")]
async fn test_operations_roundtrip() {
    let node = MockNode::new();
    let (_server, client) = serve(node.clone()).await;

    assert_eq!(client.identity().await.unwrap(), node.identity);

    let route = client
        .connect(&PeerIdentity::peer_only(PeerId::random()))
        .await
        .unwrap();
    assert_eq!(route, ConnectionRoute::Relayed { relay: node.relay });

    let payload = Bytes::from_static(b"0123456789abcdef");
    let reference = client.add(payload.clone()).await.unwrap();
    assert_eq!(reference, ContentRef::for_content(&payload));

    let stream = client.cat(node.identity.peer_id, reference).await.unwrap();
    assert_eq!(collect_stream(stream).await.unwrap(), payload);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_errors_keep_their_variant() {
    let node = MockNode::new();
    let (_server, client) = serve(node.clone()).await;

    let target = PeerIdentity::new(
        PeerId::random(),
        vec!["/ip4/127.0.0.1/tcp/1".parse().unwrap()],
    );
    assert_matches!(
        client.connect(&target).await,
        Err(ControlError::Connect { peer, .. }) if peer == target.peer_id
    );

    let missing = ContentRef::for_content(b"missing");
    assert_matches!(
        client.cat(node.identity.peer_id, missing).await.err(),
        Some(ControlError::NotFound(r)) if r == missing
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_gateway_and_cors() {
    let node = MockNode::new();
    let (server, client) = serve(node.clone()).await;
    let reference = client.add(Bytes::from_static(b"gateway")).await.unwrap();

    let http = reqwest::Client::new();
    let gateway = server.gateway_address().unwrap();
    let body = http
        .get(format!("http://{gateway}/ipfs/{reference}"))
        .send()
        .await
        .unwrap()
        .bytes()
        .await
        .unwrap();
    assert_eq!(&body[..], b"gateway");

    let response = http
        .post(format!("{}/api/v0/id", client.base_url()))
        .header("Origin", "http://localhost:3000")
        .send()
        .await
        .unwrap();
    assert_eq!(
        response.headers()["access-control-allow-origin"],
        "*"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_shutdown_stops_node_and_server() {
    let node = MockNode::new();
    let (server, client) = serve(node.clone()).await;

    client.shutdown().await.unwrap();
    server.stopped().await;
    assert_eq!(node.shutdowns.load(Ordering::SeqCst), 1);

    // Graceful shutdown finishes in-flight requests, then the socket closes.
    for _ in 0..50 {
        if !client.is_reachable().await {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert_matches!(client.identity().await, Err(ControlError::Unreachable(_)));
}
