//! Listen port allocation for co-located relayprobe daemons.
//!
//! Every daemon in a fleet is identified by a small [`NodeIndex`]. Its four
//! listen ports (primary swarm, websocket swarm, control API, gateway) are
//! derived from that index by zero-padding it to [`NodeIndex::WIDTH`] digits
//! and appending it to a two-digit prefix that depends on the port kind and
//! on the node's [`NodeFamily`]:
//!
//! ```text
//! family     swarm  websocket  api  gateway
//! embedded   10     20         31   32       index 7  -> 10007 20007 31007 32007
//! external   11     21         33   44       index 27 -> 11027 21027 33027 44027
//! ```
//!
//! Prefixes differ per port kind within a family and per family on every
//! port kind, so two nodes can only collide if they share both family and
//! index. Allocation is pure and total; indices above [`NodeIndex::MAX`] are
//! unrepresentable.

mod multiaddr;

pub use multiaddr::{
    circuit_multiaddr, peer_id_of, relay_of_circuit, socket_addr, strip_peer_id, tcp_multiaddr,
    ws_multiaddr,
};

use std::fmt;

use serde::{Deserialize, Serialize};

/// Index of a node within one test run.
///
/// Only used to derive addresses; never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct NodeIndex(u16);

impl NodeIndex {
    /// Number of decimal digits an index is padded to.
    pub const WIDTH: u32 = 3;

    /// Largest index that fits in [`Self::WIDTH`] digits.
    pub const MAX: u16 = 999;

    /// Create an index.
    ///
    /// # Panics
    ///
    /// Panics if `index > NodeIndex::MAX`. Passing such an index is a caller
    /// contract violation; use [`Self::try_new`] for untrusted input.
    pub const fn new(index: u16) -> Self {
        assert!(index <= Self::MAX, "node index exceeds three digits");
        Self(index)
    }

    /// Create an index, returning `None` if it does not fit in three digits.
    pub const fn try_new(index: u16) -> Option<Self> {
        if index <= Self::MAX {
            Some(Self(index))
        } else {
            None
        }
    }

    /// The raw index value.
    pub const fn get(self) -> u16 {
        self.0
    }
}

impl fmt::Display for NodeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03}", self.0)
    }
}

impl TryFrom<u16> for NodeIndex {
    type Error = String;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Self::try_new(value).ok_or_else(|| format!("node index {value} exceeds {}", Self::MAX))
    }
}

impl From<NodeIndex> for u16 {
    fn from(index: NodeIndex) -> Self {
        index.0
    }
}

/// Implementation family a node belongs to.
///
/// Families are provisioned differently (in-process vs spawned process) and
/// use disjoint port ranges, so one host can run both side by side.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum NodeFamily {
    /// Node runs inside the harness process.
    Embedded,
    /// Node runs as a separately spawned daemon process.
    External,
}

impl NodeFamily {
    /// All families, in allocation order.
    pub const ALL: [NodeFamily; 2] = [NodeFamily::Embedded, NodeFamily::External];

    /// Two-digit prefix for a port kind in this family.
    pub const fn prefix(self, kind: PortKind) -> u16 {
        match (self, kind) {
            (NodeFamily::Embedded, PortKind::Swarm) => 10,
            (NodeFamily::Embedded, PortKind::Websocket) => 20,
            (NodeFamily::Embedded, PortKind::Api) => 31,
            (NodeFamily::Embedded, PortKind::Gateway) => 32,
            (NodeFamily::External, PortKind::Swarm) => 11,
            (NodeFamily::External, PortKind::Websocket) => 21,
            (NodeFamily::External, PortKind::Api) => 33,
            (NodeFamily::External, PortKind::Gateway) => 44,
        }
    }
}

/// The four listen endpoints every daemon exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum PortKind {
    /// Primary plain-TCP swarm transport.
    Swarm,
    /// Secondary websocket swarm transport.
    Websocket,
    /// Control API.
    Api,
    /// Read-only content gateway.
    Gateway,
}

impl PortKind {
    /// All port kinds, in allocation order.
    pub const ALL: [PortKind; 4] = [
        PortKind::Swarm,
        PortKind::Websocket,
        PortKind::Api,
        PortKind::Gateway,
    ];
}

/// Ports allocated to one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodePorts {
    pub swarm: u16,
    pub websocket: u16,
    pub api: u16,
    pub gateway: u16,
}

impl NodePorts {
    /// Port for a given kind.
    pub const fn get(&self, kind: PortKind) -> u16 {
        match kind {
            PortKind::Swarm => self.swarm,
            PortKind::Websocket => self.websocket,
            PortKind::Api => self.api,
            PortKind::Gateway => self.gateway,
        }
    }

    /// Iterate over `(kind, port)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (PortKind, u16)> + '_ {
        PortKind::ALL.into_iter().map(|kind| (kind, self.get(kind)))
    }

    /// First port shared with `other`, if any.
    pub fn conflict_with(&self, other: &NodePorts) -> Option<u16> {
        self.iter()
            .map(|(_, port)| port)
            .find(|port| other.iter().any(|(_, theirs)| theirs == *port))
    }
}

/// Derive a single port: `prefix` followed by the index padded to three digits.
pub const fn port_for(index: NodeIndex, family: NodeFamily, kind: PortKind) -> u16 {
    // Decimal concatenation of "PP" and "III".
    family.prefix(kind) * 10u16.pow(NodeIndex::WIDTH) + index.get()
}

/// Allocate all ports for a node.
pub const fn allocate(index: NodeIndex, family: NodeFamily) -> NodePorts {
    NodePorts {
        swarm: port_for(index, family, PortKind::Swarm),
        websocket: port_for(index, family, PortKind::Websocket),
        api: port_for(index, family, PortKind::Api),
        gateway: port_for(index, family, PortKind::Gateway),
    }
}
