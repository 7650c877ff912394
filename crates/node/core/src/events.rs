use libp2p::{Multiaddr, PeerId};
use tokio::sync::broadcast;

/// Lifecycle notifications published by a running [`Node`](crate::Node).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEvent {
    /// Every configured swarm listener is bound.
    Ready {
        peer_id: PeerId,
        listen_addrs: Vec<Multiaddr>,
    },
    /// An internal fault. Before `Ready` this means startup failed.
    Error(String),
    /// The event loop has exited and all listeners are closed.
    Stopped,
}

/// Wait on `events` until the node is ready, returning its listen addresses.
///
/// `events` must have been subscribed before [`Node::start_listening`](crate::Node::start_listening).
pub async fn wait_ready(events: &mut broadcast::Receiver<NodeEvent>) -> eyre::Result<Vec<Multiaddr>> {
    loop {
        match events.recv().await {
            Ok(NodeEvent::Ready { listen_addrs, .. }) => return Ok(listen_addrs),
            Ok(NodeEvent::Error(error)) => eyre::bail!("node failed to start: {error}"),
            Ok(NodeEvent::Stopped) => eyre::bail!("node stopped before becoming ready"),
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => eyre::bail!("node event loop is gone"),
        }
    }
}
