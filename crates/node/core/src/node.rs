//! The node event loop.

use std::{
    collections::{HashMap, HashSet},
    ops::ControlFlow,
    sync::Arc,
};

use bytes::Bytes;
use eyre::{Result, WrapErr};
use futures::StreamExt;
use libp2p::{
    Multiaddr, PeerId, Swarm, identify,
    core::{ConnectedPoint, transport::ListenerId},
    relay,
    request_response::{self, OutboundRequestId},
    swarm::{ConnectionId, SwarmEvent, dial_opts::DialOpts},
};
use relayprobe_net_addrs::{circuit_multiaddr, relay_of_circuit, socket_addr, strip_peer_id};
use relayprobe_node_api::{ConnectionRoute, ContentRef, ControlError, PeerIdentity};
use relayprobe_node_config::NodeConfig;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, trace, warn};

use crate::{
    BlockStore, NodeBuilder, NodeEvent,
    behaviour::{BehaviourEvent, NodeBehaviour},
    handle::Command,
    protocol::{FetchRequest, FetchResponse},
};

type Reply<T> = oneshot::Sender<Result<T, ControlError>>;

struct PendingDial {
    peer: PeerId,
    reply: Reply<ConnectionRoute>,
}

struct PendingFetch {
    reference: ContentRef,
    reply: Reply<Bytes>,
}

/// A libp2p node owning its swarm, driven by [`NodeHandle`](crate::NodeHandle) commands.
///
/// Call [`Node::start_listening`] and then spawn [`Node::run`]. The node
/// publishes [`NodeEvent::Ready`] once every configured listener is bound.
pub struct Node {
    swarm: Swarm<NodeBehaviour>,
    config: NodeConfig,
    store: Arc<BlockStore>,
    commands: mpsc::Receiver<Command>,
    events: broadcast::Sender<NodeEvent>,

    /// Listeners not yet bound. `None` once ready has been announced.
    startup: Option<HashSet<ListenerId>>,
    /// Routes of open connections, per peer.
    connections: HashMap<PeerId, HashMap<ConnectionId, ConnectionRoute>>,
    /// Address we dialed each directly connected peer on.
    direct_addrs: HashMap<PeerId, Multiaddr>,
    /// Directly connected peers offering hop, with the address to build circuits on.
    relays: HashMap<PeerId, Multiaddr>,
    /// Circuit listeners (reservations) we hold, by relay.
    reservations: HashMap<ListenerId, PeerId>,

    pending_dials: HashMap<ConnectionId, PendingDial>,
    pending_fetches: HashMap<OutboundRequestId, PendingFetch>,
}

impl Node {
    pub(crate) fn new(
        swarm: Swarm<NodeBehaviour>,
        config: NodeConfig,
        store: Arc<BlockStore>,
        commands: mpsc::Receiver<Command>,
        events: broadcast::Sender<NodeEvent>,
    ) -> Self {
        Self {
            swarm,
            config,
            store,
            commands,
            events,
            startup: Some(HashSet::new()),
            connections: HashMap::new(),
            direct_addrs: HashMap::new(),
            relays: HashMap::new(),
            reservations: HashMap::new(),
            pending_dials: HashMap::new(),
            pending_fetches: HashMap::new(),
        }
    }

    /// Create a builder for a node with `config`.
    pub fn builder(config: NodeConfig) -> NodeBuilder {
        NodeBuilder::new(config)
    }

    pub fn local_peer_id(&self) -> &PeerId {
        self.swarm.local_peer_id()
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Bind every configured swarm address and dial bootstrap peers.
    ///
    /// Fails if any address cannot be bound.
    pub fn start_listening(&mut self) -> Result<()> {
        if !self.config.discovery.is_disabled() {
            warn!("Peer discovery is not supported, the node only joins through explicit connects");
        }
        if self.config.relay.hop.active {
            warn!("Active hop is not supported, circuits are only opened to reserved peers");
        }

        let addrs = self.config.addresses.swarm.clone();
        for addr in &addrs {
            ensure_port_free(addr)?;
        }
        for addr in addrs {
            let listener = self
                .swarm
                .listen_on(addr.clone())
                .wrap_err_with(|| format!("failed to listen on {addr}"))?;
            info!(%addr, ?listener, "Listening on address");
            if let Some(pending) = self.startup.as_mut() {
                pending.insert(listener);
            }
        }

        self.connect_bootstrap();
        self.check_ready();
        Ok(())
    }

    fn connect_bootstrap(&mut self) {
        let bootstrap = self.config.bootstrap.clone();
        if bootstrap.is_empty() {
            debug!("No bootstrap peers configured");
            return;
        }

        info!(count = bootstrap.len(), "Dialing bootstrap peers...");
        for addr in bootstrap {
            match self.swarm.dial(addr.clone()) {
                Ok(()) => debug!(%addr, "Dial initiated"),
                Err(e) => warn!(%addr, %e, "Failed to dial bootstrap peer"),
            }
        }
    }

    /// Run the event loop until shut down or every handle is dropped.
    pub async fn run(mut self) {
        info!(peer_id = %self.local_peer_id(), "Starting node event loop");

        let shutdown_reply = loop {
            tokio::select! {
                event = self.swarm.select_next_some() => {
                    self.handle_swarm_event(event);
                }

                command = self.commands.recv() => match command {
                    Some(command) => {
                        if let ControlFlow::Break(reply) = self.handle_command(command) {
                            break Some(reply);
                        }
                    }
                    None => break None,
                },
            }
        };

        info!(peer_id = %self.local_peer_id(), "Node event loop stopped");

        // Dropping the swarm closes every listener and connection; pending
        // replies are dropped with it and surface as `ControlError::Stopped`.
        let events = self.events.clone();
        drop(self);
        let _ = events.send(NodeEvent::Stopped);
        if let Some(reply) = shutdown_reply {
            let _ = reply.send(());
        }
    }

    fn publish(&self, event: NodeEvent) {
        if self.events.send(event).is_err() {
            trace!("No node event subscribers");
        }
    }

    fn check_ready(&mut self) {
        if self.startup.as_ref().is_some_and(HashSet::is_empty) {
            self.startup = None;
            let listen_addrs: Vec<Multiaddr> = self.swarm.listeners().cloned().collect();
            info!(peer_id = %self.local_peer_id(), ?listen_addrs, "Node ready");
            self.publish(NodeEvent::Ready {
                peer_id: *self.local_peer_id(),
                listen_addrs,
            });
        }
    }

    fn handle_command(&mut self, command: Command) -> ControlFlow<oneshot::Sender<()>> {
        match command {
            Command::Identity { reply } => {
                let _ = reply.send(self.identity());
            }
            Command::Connect { peer, reply } => self.on_connect(peer, reply),
            Command::Cat {
                provider,
                reference,
                reply,
            } => self.on_cat(provider, reference, reply),
            Command::Shutdown { reply } => return ControlFlow::Break(reply),
        }
        ControlFlow::Continue(())
    }

    fn identity(&self) -> PeerIdentity {
        let peer_id = *self.local_peer_id();
        let addresses = self
            .swarm
            .external_addresses()
            .filter_map(|addr| addr.clone().with_p2p(peer_id).ok())
            .collect();
        PeerIdentity::new(peer_id, addresses)
    }

    fn existing_route(&self, peer: &PeerId) -> Option<ConnectionRoute> {
        self.connections
            .get(peer)
            .and_then(|routes| routes.values().next().copied())
    }

    fn on_connect(&mut self, peer: PeerIdentity, reply: Reply<ConnectionRoute>) {
        let target = peer.peer_id;
        if target == *self.local_peer_id() {
            let _ = reply.send(Err(ControlError::Connect {
                peer: target,
                reason: "cannot connect to self".to_string(),
            }));
            return;
        }

        if let Some(route) = self.existing_route(&target) {
            debug!(%target, %route, "Already connected");
            let _ = reply.send(Ok(route));
            return;
        }

        let addresses = if peer.addresses.is_empty() {
            self.circuit_addresses(&target)
        } else {
            peer.dial_addresses()
        };
        if addresses.is_empty() {
            let _ = reply.send(Err(ControlError::NoRoute(target)));
            return;
        }

        debug!(%target, ?addresses, "Dialing peer");
        let opts = DialOpts::peer_id(target).addresses(addresses).build();
        let connection_id = opts.connection_id();
        match self.swarm.dial(opts) {
            Ok(()) => {
                self.pending_dials.insert(
                    connection_id,
                    PendingDial {
                        peer: target,
                        reply,
                    },
                );
            }
            Err(e) => {
                let _ = reply.send(Err(ControlError::Connect {
                    peer: target,
                    reason: e.to_string(),
                }));
            }
        }
    }

    /// Circuit addresses for `target` through every relay we are connected to.
    fn circuit_addresses(&self, target: &PeerId) -> Vec<Multiaddr> {
        if !self.config.relay.enabled {
            return Vec::new();
        }
        self.relays
            .iter()
            .filter(|(relay, _)| *relay != target)
            .map(|(relay, addr)| circuit_multiaddr(addr.clone(), *relay))
            .collect()
    }

    fn on_cat(&mut self, provider: PeerId, reference: ContentRef, reply: Reply<Bytes>) {
        if provider == *self.local_peer_id() {
            let result = match self.store.get(&reference) {
                Ok(Some(data)) => Ok(data),
                Ok(None) => Err(ControlError::NotFound(reference)),
                Err(e) => Err(ControlError::Transfer(e.to_string())),
            };
            let _ = reply.send(result);
            return;
        }

        // Only fetch over existing connections so the transfer uses the
        // route the caller set up.
        if !self.swarm.is_connected(&provider) {
            let _ = reply.send(Err(ControlError::NoRoute(provider)));
            return;
        }

        let request_id = self
            .swarm
            .behaviour_mut()
            .fetch
            .send_request(&provider, FetchRequest { reference });
        debug!(%provider, %reference, ?request_id, "Requested block");
        self.pending_fetches
            .insert(request_id, PendingFetch { reference, reply });
    }

    fn handle_swarm_event(&mut self, event: SwarmEvent<BehaviourEvent>) {
        match event {
            SwarmEvent::NewListenAddr {
                listener_id,
                address,
                ..
            } => {
                info!(%address, "New listen address");
                self.swarm.add_external_address(address);
                if let Some(pending) = self.startup.as_mut() {
                    pending.remove(&listener_id);
                }
                self.check_ready();
            }
            SwarmEvent::ExpiredListenAddr { address, .. } => {
                info!(%address, "Expired listen address");
                self.swarm.remove_external_address(&address);
            }
            SwarmEvent::ListenerClosed {
                listener_id,
                reason,
                ..
            } => {
                if let Some(relay) = self.reservations.remove(&listener_id) {
                    info!(%relay, ?reason, "Relay reservation closed");
                } else if let Err(e) = reason {
                    self.on_listener_failure(format!("listener closed: {e}"));
                }
            }
            SwarmEvent::ListenerError {
                listener_id, error, ..
            } => {
                if let Some(relay) = self.reservations.get(&listener_id) {
                    warn!(%relay, %error, "Relay reservation error");
                } else {
                    self.on_listener_failure(format!("listener error: {error}"));
                }
            }
            SwarmEvent::ConnectionEstablished {
                peer_id,
                connection_id,
                endpoint,
                num_established,
                ..
            } => {
                let route = route_of(&endpoint);
                debug!(
                    %peer_id,
                    endpoint = %endpoint.get_remote_address(),
                    %route,
                    num_established,
                    "Connection established"
                );

                if let ConnectedPoint::Dialer { address, .. } = &endpoint
                    && !route.is_relayed()
                {
                    self.direct_addrs
                        .insert(peer_id, strip_peer_id(address.clone()));
                }
                self.connections
                    .entry(peer_id)
                    .or_default()
                    .insert(connection_id, route);

                if let Some(pending) = self.pending_dials.remove(&connection_id) {
                    info!(peer_id = %pending.peer, %route, "Connected");
                    let _ = pending.reply.send(Ok(route));
                }
            }
            SwarmEvent::ConnectionClosed {
                peer_id,
                connection_id,
                cause,
                num_established,
                ..
            } => {
                info!(%peer_id, num_established, cause = ?cause, "Connection closed");
                if let Some(routes) = self.connections.get_mut(&peer_id) {
                    routes.remove(&connection_id);
                    if routes.is_empty() {
                        self.connections.remove(&peer_id);
                        self.direct_addrs.remove(&peer_id);
                        self.relays.remove(&peer_id);
                    }
                }
            }
            SwarmEvent::OutgoingConnectionError {
                connection_id,
                peer_id,
                error,
                ..
            } => {
                warn!(?peer_id, %error, "Outgoing connection error");
                if let Some(pending) = self.pending_dials.remove(&connection_id) {
                    let _ = pending.reply.send(Err(ControlError::Connect {
                        peer: pending.peer,
                        reason: error.to_string(),
                    }));
                }
            }
            SwarmEvent::IncomingConnection {
                local_addr,
                send_back_addr,
                ..
            } => {
                debug!(%local_addr, %send_back_addr, "Incoming connection");
            }
            SwarmEvent::Behaviour(event) => self.handle_behaviour_event(event),
            _ => {}
        }
    }

    fn on_listener_failure(&mut self, error: String) {
        warn!(%error, "Swarm listener failed");
        self.publish(NodeEvent::Error(error));
    }

    fn handle_behaviour_event(&mut self, event: BehaviourEvent) {
        match event {
            BehaviourEvent::Identify(event) => self.handle_identify_event(*event),
            BehaviourEvent::Relay(event) => Self::handle_relay_event(event),
            BehaviourEvent::RelayClient(event) => Self::handle_relay_client_event(event),
            BehaviourEvent::Fetch(event) => self.handle_fetch_event(event),
        }
    }

    fn handle_identify_event(&mut self, event: identify::Event) {
        match event {
            identify::Event::Received { peer_id, info, .. } => {
                debug!(
                    %peer_id,
                    protocol_version = %info.protocol_version,
                    agent_version = %info.agent_version,
                    "Received identify info"
                );
                if info.protocols.contains(&relay::HOP_PROTOCOL_NAME) {
                    self.on_relay_discovered(peer_id);
                }
            }
            identify::Event::Error { peer_id, error, .. } => {
                warn!(%peer_id, %error, "Identify error");
            }
            event => trace!(?event, "Identify event"),
        }
    }

    /// A directly connected peer offers hop: remember it for circuit dials and
    /// reserve a slot on it so others can reach us through it.
    fn on_relay_discovered(&mut self, relay: PeerId) {
        if !self.config.relay.enabled {
            return;
        }
        let Some(addr) = self.direct_addrs.get(&relay).cloned() else {
            debug!(%relay, "Relay not dialed directly, ignoring");
            return;
        };
        if self.relays.insert(relay, addr.clone()).is_some() {
            return;
        }

        let circuit = circuit_multiaddr(addr, relay);
        match self.swarm.listen_on(circuit.clone()) {
            Ok(listener) => {
                info!(%relay, %circuit, "Requesting relay reservation");
                self.reservations.insert(listener, relay);
            }
            Err(e) => warn!(%relay, %e, "Failed to listen through relay"),
        }
    }

    fn handle_relay_event(event: relay::Event) {
        match event {
            relay::Event::ReservationReqAccepted { src_peer_id, .. } => {
                info!(peer_id = %src_peer_id, "Accepted reservation");
            }
            relay::Event::CircuitReqAccepted {
                src_peer_id,
                dst_peer_id,
                ..
            } => {
                info!(src = %src_peer_id, dst = %dst_peer_id, "Relaying circuit");
            }
            event => debug!(?event, "Relay event"),
        }
    }

    fn handle_relay_client_event(event: relay::client::Event) {
        match event {
            relay::client::Event::ReservationReqAccepted { relay_peer_id, .. } => {
                info!(relay = %relay_peer_id, "Reservation accepted");
            }
            event => debug!(?event, "Relay client event"),
        }
    }

    fn handle_fetch_event(&mut self, event: request_response::Event<FetchRequest, FetchResponse>) {
        match event {
            request_response::Event::Message {
                peer,
                message:
                    request_response::Message::Request {
                        request, channel, ..
                    },
                ..
            } => {
                let response = match self.store.get(&request.reference) {
                    Ok(Some(data)) => FetchResponse::Found(data.to_vec()),
                    Ok(None) => FetchResponse::NotFound,
                    Err(e) => {
                        warn!(%e, reference = %request.reference, "Failed to read block");
                        FetchResponse::NotFound
                    }
                };
                debug!(%peer, reference = %request.reference, "Serving block");
                if self
                    .swarm
                    .behaviour_mut()
                    .fetch
                    .send_response(channel, response)
                    .is_err()
                {
                    warn!(%peer, "Fetch response channel closed");
                }
            }
            request_response::Event::Message {
                peer,
                message:
                    request_response::Message::Response {
                        request_id,
                        response,
                    },
                ..
            } => {
                let Some(pending) = self.pending_fetches.remove(&request_id) else {
                    return;
                };
                let result = match response {
                    FetchResponse::Found(data) if pending.reference.matches(&data) => {
                        Ok(Bytes::from(data))
                    }
                    FetchResponse::Found(_) => Err(ControlError::Protocol(format!(
                        "{peer} returned data not matching {}",
                        pending.reference
                    ))),
                    FetchResponse::NotFound => Err(ControlError::NotFound(pending.reference)),
                };
                let _ = pending.reply.send(result);
            }
            request_response::Event::OutboundFailure {
                peer,
                request_id,
                error,
                ..
            } => {
                warn!(%peer, %error, "Fetch request failed");
                if let Some(pending) = self.pending_fetches.remove(&request_id) {
                    let _ = pending
                        .reply
                        .send(Err(ControlError::Transfer(error.to_string())));
                }
            }
            request_response::Event::InboundFailure { peer, error, .. } => {
                warn!(%peer, %error, "Serving fetch request failed");
            }
            event => trace!(?event, "Fetch event"),
        }
    }
}

/// Fail if the TCP port of `addr` is already taken.
///
/// libp2p-tcp binds with `SO_REUSEPORT`, so two nodes on the same port would
/// both succeed and split incoming connections. An exclusive bind detects it.
fn ensure_port_free(addr: &Multiaddr) -> Result<()> {
    let Some(socket) = socket_addr(addr).filter(|socket| socket.port() != 0) else {
        return Ok(());
    };
    std::net::TcpListener::bind(socket)
        .map(drop)
        .wrap_err_with(|| format!("address {addr} is already in use"))
}

/// Route of a connection: relayed if either side's address goes through a circuit.
fn route_of(endpoint: &ConnectedPoint) -> ConnectionRoute {
    let addr = match endpoint {
        ConnectedPoint::Dialer { address, .. } => address,
        ConnectedPoint::Listener { local_addr, .. } => local_addr,
    };
    match relay_of_circuit(addr) {
        Some(relay) => ConnectionRoute::Relayed { relay },
        None => ConnectionRoute::Direct,
    }
}
