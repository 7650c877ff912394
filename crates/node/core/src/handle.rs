use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use libp2p::PeerId;
use relayprobe_node_api::{
    ByteStream, ConnectionRoute, ContentRef, ControlError, NodeControl, PeerIdentity,
};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::debug;

use crate::{BlockStore, NodeEvent};

/// Size of the chunks `cat` streams content in.
const CAT_CHUNK_SIZE: usize = 64 * 1024;

pub(crate) enum Command {
    Identity {
        reply: oneshot::Sender<PeerIdentity>,
    },
    Connect {
        peer: PeerIdentity,
        reply: oneshot::Sender<Result<ConnectionRoute, ControlError>>,
    },
    Cat {
        provider: PeerId,
        reference: ContentRef,
        reply: oneshot::Sender<Result<Bytes, ControlError>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Cloneable control surface of a running [`Node`](crate::Node).
#[derive(Clone)]
pub struct NodeHandle {
    local_peer_id: PeerId,
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<NodeEvent>,
    store: Arc<BlockStore>,
}

impl NodeHandle {
    pub(crate) fn new(
        local_peer_id: PeerId,
        commands: mpsc::Sender<Command>,
        events: broadcast::Sender<NodeEvent>,
        store: Arc<BlockStore>,
    ) -> Self {
        Self {
            local_peer_id,
            commands,
            events,
            store,
        }
    }

    pub fn local_peer_id(&self) -> PeerId {
        self.local_peer_id
    }

    /// Subscribe to lifecycle events. Only events published after this call are seen.
    pub fn subscribe(&self) -> broadcast::Receiver<NodeEvent> {
        self.events.subscribe()
    }

    /// True while the event loop is accepting commands.
    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, ControlError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(command(tx))
            .await
            .map_err(|_| ControlError::Stopped)?;
        rx.await.map_err(|_| ControlError::Stopped)
    }
}

#[async_trait]
impl NodeControl for NodeHandle {
    async fn identity(&self) -> Result<PeerIdentity, ControlError> {
        self.request(|reply| Command::Identity { reply }).await
    }

    async fn connect(&self, peer: &PeerIdentity) -> Result<ConnectionRoute, ControlError> {
        let peer = peer.clone();
        self.request(|reply| Command::Connect { peer, reply })
            .await?
    }

    async fn add(&self, data: Bytes) -> Result<ContentRef, ControlError> {
        let reference = self
            .store
            .put(&data)
            .map_err(|e| ControlError::Transfer(e.to_string()))?;
        debug!(%reference, len = data.len(), "Added content");
        Ok(reference)
    }

    async fn cat(
        &self,
        provider: PeerId,
        reference: ContentRef,
    ) -> Result<ByteStream, ControlError> {
        let data = self
            .request(|reply| Command::Cat {
                provider,
                reference,
                reply,
            })
            .await??;
        Ok(chunked(data))
    }

    async fn shutdown(&self) -> Result<(), ControlError> {
        match self.request(|reply| Command::Shutdown { reply }).await {
            Ok(()) | Err(ControlError::Stopped) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

fn chunked(data: Bytes) -> ByteStream {
    let chunks: Vec<Result<Bytes, ControlError>> = (0..data.len())
        .step_by(CAT_CHUNK_SIZE)
        .map(|start| Ok(data.slice(start..data.len().min(start + CAT_CHUNK_SIZE))))
        .collect();
    Box::pin(stream::iter(chunks))
}

#[cfg(test)]
mod tests {
    use relayprobe_node_api::collect_stream;

    use super::*;

    #[tokio::test]
    async fn test_chunked_preserves_content() {
        let data = Bytes::from((0..CAT_CHUNK_SIZE * 2 + 17).map(|i| i as u8).collect::<Vec<_>>());
        let collected = collect_stream(chunked(data.clone())).await.unwrap();
        assert_eq!(collected, data);
    }

    #[tokio::test]
    async fn test_chunked_empty() {
        let collected = collect_stream(chunked(Bytes::new())).await.unwrap();
        assert!(collected.is_empty());
    }
}
