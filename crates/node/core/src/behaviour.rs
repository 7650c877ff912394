//! Composed network behaviour of a relayprobe node.

use std::time::Duration;

use libp2p::{
    PeerId, identify,
    identity::PublicKey,
    relay,
    request_response::{self, ProtocolSupport},
    swarm::{NetworkBehaviour, behaviour::toggle::Toggle},
};
use relayprobe_node_config::RelayConfig;

use crate::protocol::{FETCH_PROTOCOL, FetchRequest, FetchResponse};

const IDENTIFY_PROTOCOL: &str = "/relayprobe/1.0.0";

/// Per-circuit byte budget on relays, well above any test payload.
const MAX_CIRCUIT_BYTES: u64 = 1 << 24;

/// identify + optional relay server + relay client + block fetch.
#[derive(NetworkBehaviour)]
#[behaviour(to_swarm = "BehaviourEvent")]
pub(crate) struct NodeBehaviour {
    /// Identify protocol - exchange listen addresses and supported protocols.
    pub(crate) identify: identify::Behaviour,

    /// Relay server, present only when hop is enabled.
    pub(crate) relay: Toggle<relay::Behaviour>,

    /// Relay client - reservations and dialing through circuits.
    pub(crate) relay_client: relay::client::Behaviour,

    /// Block fetch request/response.
    pub(crate) fetch: request_response::cbor::Behaviour<FetchRequest, FetchResponse>,
}

impl NodeBehaviour {
    pub(crate) fn new(
        local_public_key: PublicKey,
        relay_client: relay::client::Behaviour,
        relay_config: &RelayConfig,
        request_timeout: Duration,
    ) -> Self {
        let local_peer_id = PeerId::from_public_key(&local_public_key);

        let relay = relay_config
            .hop
            .enabled
            .then(|| {
                relay::Behaviour::new(
                    local_peer_id,
                    relay::Config {
                        max_circuit_bytes: MAX_CIRCUIT_BYTES,
                        ..Default::default()
                    },
                )
            });

        Self {
            identify: identify::Behaviour::new(
                identify::Config::new(IDENTIFY_PROTOCOL.to_string(), local_public_key)
                    .with_agent_version(format!("relayprobe/{}", env!("CARGO_PKG_VERSION"))),
            ),
            relay: Toggle::from(relay),
            relay_client,
            fetch: request_response::cbor::Behaviour::new(
                [(FETCH_PROTOCOL, ProtocolSupport::Full)],
                request_response::Config::default().with_request_timeout(request_timeout),
            ),
        }
    }
}

/// Events from the node behaviour.
#[derive(Debug)]
pub(crate) enum BehaviourEvent {
    Identify(Box<identify::Event>),
    Relay(relay::Event),
    RelayClient(relay::client::Event),
    Fetch(request_response::Event<FetchRequest, FetchResponse>),
}

impl From<identify::Event> for BehaviourEvent {
    fn from(event: identify::Event) -> Self {
        BehaviourEvent::Identify(Box::new(event))
    }
}

impl From<relay::Event> for BehaviourEvent {
    fn from(event: relay::Event) -> Self {
        BehaviourEvent::Relay(event)
    }
}

impl From<relay::client::Event> for BehaviourEvent {
    fn from(event: relay::client::Event) -> Self {
        BehaviourEvent::RelayClient(event)
    }
}

impl From<request_response::Event<FetchRequest, FetchResponse>> for BehaviourEvent {
    fn from(event: request_response::Event<FetchRequest, FetchResponse>) -> Self {
        BehaviourEvent::Fetch(event)
    }
}
