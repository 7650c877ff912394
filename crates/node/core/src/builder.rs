use std::{sync::Arc, time::Duration};

use eyre::{OptionExt, Result};
use libp2p::{SwarmBuilder, identity::Keypair, noise, tcp, yamux};
use relayprobe_node_config::NodeConfig;
use tokio::sync::{broadcast, mpsc};
use tracing::info;

use crate::{BlockStore, Node, NodeEvent, NodeHandle, behaviour::NodeBehaviour};

const COMMAND_BUFFER: usize = 64;
const EVENT_BUFFER: usize = 16;

/// Builder for [`Node`].
pub struct NodeBuilder {
    config: NodeConfig,
    store: Option<BlockStore>,
    keypair: Option<Keypair>,
    idle_timeout: Duration,
    request_timeout: Duration,
}

impl NodeBuilder {
    pub fn new(config: NodeConfig) -> Self {
        Self {
            config,
            store: None,
            keypair: None,
            idle_timeout: Duration::from_secs(60),
            request_timeout: Duration::from_secs(10),
        }
    }

    /// Block store backing `add` and served to fetch requests. Required.
    pub fn with_store(mut self, store: BlockStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Use a fixed identity instead of a freshly generated one.
    pub fn with_keypair(mut self, keypair: Keypair) -> Self {
        self.keypair = Some(keypair);
        self
    }

    /// How long an unused connection stays open.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// How long a block fetch may take before failing.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Build the node and a handle to control it.
    ///
    /// Nothing is bound until [`Node::start_listening`].
    pub async fn build(self) -> Result<(Node, NodeHandle)> {
        info!(index = %self.config.index, kind = %self.config.kind, "Initializing P2P node...");

        let store = Arc::new(self.store.ok_or_eyre("node requires a block store")?);

        let keypair = self.keypair.unwrap_or_else(Keypair::generate_ed25519);
        let relay_config = self.config.relay;
        let request_timeout = self.request_timeout;
        let idle_timeout = self.idle_timeout;

        let swarm = SwarmBuilder::with_existing_identity(keypair)
            .with_tokio()
            .with_tcp(
                tcp::Config::default().nodelay(true),
                noise::Config::new,
                yamux::Config::default,
            )?
            .with_dns()?
            .with_websocket(noise::Config::new, yamux::Config::default)
            .await?
            .with_relay_client(noise::Config::new, yamux::Config::default)?
            .with_behaviour(|keypair, relay_client| {
                Ok(NodeBehaviour::new(
                    keypair.public(),
                    relay_client,
                    &relay_config,
                    request_timeout,
                ))
            })?
            .with_swarm_config(|cfg| cfg.with_idle_connection_timeout(idle_timeout))
            .build();

        let local_peer_id = *swarm.local_peer_id();
        info!(%local_peer_id, hop = relay_config.hop.enabled, "Node peer ID");

        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (event_tx, _) = broadcast::channel::<NodeEvent>(EVENT_BUFFER);

        let handle = NodeHandle::new(local_peer_id, command_tx, event_tx.clone(), store.clone());
        let node = Node::new(swarm, self.config, store, command_rx, event_tx);

        Ok((node, handle))
    }
}
