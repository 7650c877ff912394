use std::fmt;

use libp2p::{Multiaddr, PeerId};
use relayprobe_net_addrs::strip_peer_id;

/// A node's identifier and the addresses it is reachable on.
///
/// Obtained once a node is running and cached for the rest of the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerIdentity {
    pub peer_id: PeerId,
    /// Externally reachable addresses, each ending in `/p2p/<peer_id>`.
    pub addresses: Vec<Multiaddr>,
}

impl PeerIdentity {
    pub fn new(peer_id: PeerId, addresses: Vec<Multiaddr>) -> Self {
        Self { peer_id, addresses }
    }

    /// The identifier alone. Connecting to it leaves routing to the node,
    /// which can only reach the peer through relays it is connected to.
    pub fn peer_only(peer_id: PeerId) -> Self {
        Self {
            peer_id,
            addresses: Vec::new(),
        }
    }

    /// Addresses without their `/p2p/<peer_id>` suffix, ready for dialing.
    pub fn dial_addresses(&self) -> Vec<Multiaddr> {
        self.addresses
            .iter()
            .cloned()
            .map(strip_peer_id)
            .collect()
    }
}

impl fmt::Display for PeerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.peer_id)
    }
}

/// How an established connection reaches the remote peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionRoute {
    /// A direct transport connection.
    Direct,
    /// A circuit through `relay`.
    Relayed { relay: PeerId },
}

impl ConnectionRoute {
    pub fn is_relayed(&self) -> bool {
        matches!(self, ConnectionRoute::Relayed { .. })
    }

    /// The relay this route goes through, if any.
    pub fn relay(&self) -> Option<PeerId> {
        match self {
            ConnectionRoute::Direct => None,
            ConnectionRoute::Relayed { relay } => Some(*relay),
        }
    }
}

impl fmt::Display for ConnectionRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionRoute::Direct => write!(f, "direct"),
            ConnectionRoute::Relayed { relay } => write!(f, "relayed via {relay}"),
        }
    }
}
