use std::sync::Arc;

use async_trait::async_trait;
use relayprobe_node_api::{NodeControl, PeerIdentity};
use relayprobe_node_config::{NodeConfig, NodeFamily};

use crate::{DaemonError, DaemonState, EmbeddedDaemon, SpawnConfig, SpawnedDaemon};

/// Lifecycle operations shared by every node implementation.
#[async_trait]
pub trait Daemon: Send + Sync {
    /// Configuration the node was (or will be) started with.
    fn config(&self) -> &NodeConfig;

    fn state(&self) -> DaemonState;

    /// Bring the node up on its configured addresses.
    ///
    /// With `initialize_storage` a fresh repository is created, otherwise an
    /// existing one is required. Resolves once the node is live. Not bounded
    /// by a timeout; callers bound it. Callable once per handle.
    async fn start(&mut self, initialize_storage: bool) -> Result<(), DaemonError>;

    /// The node's identity. Fetched on first call and cached.
    async fn identity(&mut self) -> Result<PeerIdentity, DaemonError>;

    /// Control surface of the running node.
    fn control(&self) -> Option<Arc<dyn NodeControl>>;

    /// Release every resource the handle holds.
    ///
    /// Safe after a failed or abandoned start and on a handle that never
    /// started. Cleanup always runs to completion; the error reports what
    /// could not be released cleanly.
    async fn stop(&mut self) -> Result<(), DaemonError>;
}

/// The handle variant matching `config.family`.
pub fn daemon_for(config: NodeConfig, spawn: &SpawnConfig) -> Box<dyn Daemon> {
    match config.family {
        NodeFamily::Embedded => Box::new(EmbeddedDaemon::new(config)),
        NodeFamily::External => Box::new(SpawnedDaemon::new(config, spawn.clone())),
    }
}
