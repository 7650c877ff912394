//! Node configuration for relayprobe fleets.
//!
//! [`NodeConfigBuilder`] turns a [`NodeIndex`], a [`NodeFamily`] and a
//! [`NodeKind`] into a complete [`NodeConfig`]. Generated configs always
//! isolate the node: discovery is off and the bootstrap list is empty, so the
//! only edges in the connection graph are the ones a test creates explicitly.

mod builder;

pub use builder::NodeConfigBuilder;
pub use relayprobe_net_addrs::{NodeFamily, NodeIndex, NodePorts};

use std::net::SocketAddr;

use libp2p::Multiaddr;
use relayprobe_net_addrs::socket_addr;
use serde::{Deserialize, Serialize};

/// Role of a node in the relay topology.
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
pub enum NodeKind {
    /// Forwards traffic for other peers on request (hop enabled).
    Relay,
    /// Regular participant; may dial through relays but never forwards.
    Leaf,
}

/// Complete configuration of one node. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NodeConfig {
    pub index: NodeIndex,
    pub family: NodeFamily,
    pub kind: NodeKind,
    pub addresses: Addresses,
    pub bootstrap: Vec<Multiaddr>,
    pub discovery: DiscoveryConfig,
    #[serde(rename = "API")]
    pub api: ApiConfig,
    pub relay: RelayConfig,
}

impl NodeConfig {
    /// Ports this config was allocated.
    pub fn ports(&self) -> NodePorts {
        relayprobe_net_addrs::allocate(self.index, self.family)
    }

    /// True if the node can only join the graph through explicit connects.
    pub fn is_isolated(&self) -> bool {
        self.discovery.is_disabled() && self.bootstrap.is_empty()
    }

    /// Socket address of the control API.
    pub fn api_socket_addr(&self) -> Option<SocketAddr> {
        socket_addr(&self.addresses.api)
    }

    /// Socket address of the gateway.
    pub fn gateway_socket_addr(&self) -> Option<SocketAddr> {
        socket_addr(&self.addresses.gateway)
    }
}

/// Listen addresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Addresses {
    /// Swarm listen addresses: plain TCP first, then websocket.
    pub swarm: Vec<Multiaddr>,
    #[serde(rename = "API")]
    pub api: Multiaddr,
    pub gateway: Multiaddr,
}

/// Peer discovery mechanisms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DiscoveryConfig {
    /// Local-network (mDNS) discovery.
    #[serde(rename = "MDNS")]
    pub mdns: bool,
    /// Rendezvous/signalling-server discovery.
    pub rendezvous: bool,
}

impl DiscoveryConfig {
    /// Both mechanisms off.
    pub const DISABLED: Self = Self {
        mdns: false,
        rendezvous: false,
    };

    pub fn is_disabled(&self) -> bool {
        !self.mdns && !self.rendezvous
    }
}

/// Control API settings.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ApiConfig {
    #[serde(rename = "HTTPHeaders")]
    pub http_headers: HttpHeaders,
}

/// CORS headers attached to control API responses.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HttpHeaders {
    #[serde(rename = "Access-Control-Allow-Headers")]
    pub allow_headers: Vec<String>,
    #[serde(rename = "Access-Control-Allow-Methods")]
    pub allow_methods: Vec<String>,
    #[serde(rename = "Access-Control-Allow-Origin")]
    pub allow_origin: Vec<String>,
}

impl HttpHeaders {
    /// Headers that let any local tooling query the API.
    pub fn permissive() -> Self {
        Self {
            allow_headers: vec!["X-Requested-With".to_string(), "Range".to_string()],
            allow_methods: vec!["GET".to_string()],
            allow_origin: vec!["*".to_string()],
        }
    }
}

/// Circuit relay settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RelayConfig {
    /// Node may dial and be dialled through relays.
    pub enabled: bool,
    #[serde(rename = "HOP")]
    pub hop: HopConfig,
}

/// Relay hop (forwarding) settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HopConfig {
    /// Forward circuits for other peers when asked.
    pub enabled: bool,
    /// Proactively dial destinations for circuits. Never set by the builder.
    pub active: bool,
}
