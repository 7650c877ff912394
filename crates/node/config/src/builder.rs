//! [`NodeConfig`] generation.

use std::net::{IpAddr, Ipv4Addr};

use libp2p::Multiaddr;
use relayprobe_net_addrs::{NodeFamily, NodeIndex, allocate, tcp_multiaddr, ws_multiaddr};

use crate::{
    Addresses, ApiConfig, DiscoveryConfig, HopConfig, HttpHeaders, NodeConfig, NodeKind,
    RelayConfig,
};

/// Default host for swarm and API listeners.
const DEFAULT_LISTEN_HOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// Builds the [`NodeConfig`] for one fleet member.
///
/// ```
/// use relayprobe_node_config::{NodeConfigBuilder, NodeFamily, NodeIndex, NodeKind};
///
/// let config = NodeConfigBuilder::new(NodeIndex::new(7), NodeFamily::Embedded)
///     .kind(NodeKind::Relay)
///     .build();
/// assert_eq!(config.addresses.api.to_string(), "/ip4/127.0.0.1/tcp/31007");
/// assert!(config.is_isolated());
/// ```
#[derive(Debug, Clone)]
pub struct NodeConfigBuilder {
    index: NodeIndex,
    family: NodeFamily,
    kind: NodeKind,
    listen_host: IpAddr,
}

impl NodeConfigBuilder {
    pub fn new(index: NodeIndex, family: NodeFamily) -> Self {
        Self {
            index,
            family,
            kind: NodeKind::Leaf,
            listen_host: DEFAULT_LISTEN_HOST,
        }
    }

    /// Set the node kind (defaults to [`NodeKind::Leaf`]).
    pub fn kind(mut self, kind: NodeKind) -> Self {
        self.kind = kind;
        self
    }

    /// Set the host swarm and API listeners bind to.
    pub fn listen_host(mut self, host: IpAddr) -> Self {
        self.listen_host = host;
        self
    }

    pub fn build(self) -> NodeConfig {
        let ports = allocate(self.index, self.family);

        // External daemons expose their gateway on every interface.
        let gateway_host = match self.family {
            NodeFamily::Embedded => self.listen_host,
            NodeFamily::External => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        };

        let swarm: Vec<Multiaddr> = vec![
            tcp_multiaddr(self.listen_host, ports.swarm),
            ws_multiaddr(self.listen_host, ports.websocket),
        ];

        NodeConfig {
            index: self.index,
            family: self.family,
            kind: self.kind,
            addresses: Addresses {
                swarm,
                api: tcp_multiaddr(self.listen_host, ports.api),
                gateway: tcp_multiaddr(gateway_host, ports.gateway),
            },
            bootstrap: Vec::new(),
            discovery: DiscoveryConfig::DISABLED,
            api: ApiConfig {
                http_headers: HttpHeaders::permissive(),
            },
            relay: RelayConfig {
                enabled: true,
                hop: HopConfig {
                    enabled: self.kind == NodeKind::Relay,
                    active: false,
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_embedded_relay() {
        let config = NodeConfigBuilder::new(NodeIndex::new(7), NodeFamily::Embedded)
            .kind(NodeKind::Relay)
            .build();

        let swarm: Vec<String> = config.addresses.swarm.iter().map(|a| a.to_string()).collect();
        assert_eq!(
            swarm,
            ["/ip4/127.0.0.1/tcp/10007", "/ip4/127.0.0.1/tcp/20007/ws"]
        );
        assert_eq!(config.addresses.api.to_string(), "/ip4/127.0.0.1/tcp/31007");
        assert_eq!(
            config.addresses.gateway.to_string(),
            "/ip4/127.0.0.1/tcp/32007"
        );
        assert!(config.relay.enabled);
        assert!(config.relay.hop.enabled);
        assert!(!config.relay.hop.active);
    }

    #[test]
    fn test_external_gateway_binds_all_interfaces() {
        let config = NodeConfigBuilder::new(NodeIndex::new(27), NodeFamily::External).build();
        assert_eq!(config.addresses.api.to_string(), "/ip4/127.0.0.1/tcp/33027");
        assert_eq!(config.addresses.gateway.to_string(), "/ip4/0.0.0.0/tcp/44027");
    }

    #[test]
    fn test_leaf_does_not_forward() {
        let config = NodeConfigBuilder::new(NodeIndex::new(12), NodeFamily::Embedded).build();
        assert_eq!(config.kind, NodeKind::Leaf);
        assert!(config.relay.enabled);
        assert!(!config.relay.hop.enabled);
    }

    #[test]
    fn test_permissive_cors() {
        let config = NodeConfigBuilder::new(NodeIndex::new(8), NodeFamily::Embedded).build();
        let headers = &config.api.http_headers;
        assert_eq!(headers.allow_origin, ["*"]);
        assert_eq!(headers.allow_methods, ["GET"]);
        assert_eq!(headers.allow_headers, ["X-Requested-With", "Range"]);
    }

    #[test]
    fn test_json_layout() {
        let config = NodeConfigBuilder::new(NodeIndex::new(7), NodeFamily::Embedded)
            .kind(NodeKind::Relay)
            .build();
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["Relay"]["HOP"]["Active"], false);
        assert_eq!(json["Discovery"]["MDNS"], false);
        assert_eq!(json["Addresses"]["API"], "/ip4/127.0.0.1/tcp/31007");
        assert_eq!(
            json["API"]["HTTPHeaders"]["Access-Control-Allow-Origin"][0],
            "*"
        );

        let back: NodeConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, config);
    }

    fn kind() -> impl Strategy<Value = NodeKind> {
        prop_oneof![Just(NodeKind::Relay), Just(NodeKind::Leaf)]
    }

    fn family() -> impl Strategy<Value = NodeFamily> {
        prop_oneof![Just(NodeFamily::Embedded), Just(NodeFamily::External)]
    }

    proptest! {
        #[test]
        fn prop_always_isolated(index in 0..=NodeIndex::MAX, kind in kind(), family in family()) {
            let config = NodeConfigBuilder::new(NodeIndex::new(index), family).kind(kind).build();
            prop_assert!(config.discovery.is_disabled());
            prop_assert!(config.bootstrap.is_empty());
            prop_assert!(config.is_isolated());
            prop_assert!(!config.relay.hop.active);
            prop_assert!(config.api_socket_addr().is_some());
        }
    }
}
