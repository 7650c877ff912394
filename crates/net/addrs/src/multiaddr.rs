//! Multiaddr construction and inspection helpers.

use std::net::{IpAddr, SocketAddr};

use libp2p::{Multiaddr, PeerId, multiaddr::Protocol};

/// `/ip4/<ip>/tcp/<port>` (or `/ip6/...`).
pub fn tcp_multiaddr(ip: IpAddr, port: u16) -> Multiaddr {
    Multiaddr::empty()
        .with(Protocol::from(ip))
        .with(Protocol::Tcp(port))
}

/// `/ip4/<ip>/tcp/<port>/ws`.
pub fn ws_multiaddr(ip: IpAddr, port: u16) -> Multiaddr {
    tcp_multiaddr(ip, port).with(Protocol::Ws("/".into()))
}

/// Extract the IP and TCP port of a multiaddr, ignoring trailing protocols.
pub fn socket_addr(addr: &Multiaddr) -> Option<SocketAddr> {
    let mut iter = addr.iter();
    let ip = match iter.next()? {
        Protocol::Ip4(ip) => IpAddr::V4(ip),
        Protocol::Ip6(ip) => IpAddr::V6(ip),
        _ => return None,
    };
    match iter.next()? {
        Protocol::Tcp(port) => Some(SocketAddr::new(ip, port)),
        _ => None,
    }
}

/// The trailing `/p2p/<peer>` component, if present.
pub fn peer_id_of(addr: &Multiaddr) -> Option<PeerId> {
    match addr.iter().last()? {
        Protocol::P2p(peer_id) => Some(peer_id),
        _ => None,
    }
}

/// Remove a trailing `/p2p/<peer>` component.
pub fn strip_peer_id(mut addr: Multiaddr) -> Multiaddr {
    if peer_id_of(&addr).is_some() {
        addr.pop();
    }
    addr
}

/// `<relay_addr>/p2p/<relay>/p2p-circuit`: the address under which peers
/// holding a reservation on `relay` are reachable.
pub fn circuit_multiaddr(relay_addr: Multiaddr, relay: PeerId) -> Multiaddr {
    strip_peer_id(relay_addr)
        .with(Protocol::P2p(relay))
        .with(Protocol::P2pCircuit)
}

/// The relay a circuit address routes through, i.e. the `/p2p/<relay>`
/// component immediately preceding `/p2p-circuit`.
pub fn relay_of_circuit(addr: &Multiaddr) -> Option<PeerId> {
    let mut last_peer = None;
    for protocol in addr.iter() {
        match protocol {
            Protocol::P2p(peer_id) => last_peer = Some(peer_id),
            Protocol::P2pCircuit => return last_peer,
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    #[test]
    fn test_tcp_and_ws_format() {
        assert_eq!(
            tcp_multiaddr(LOCALHOST, 10007).to_string(),
            "/ip4/127.0.0.1/tcp/10007"
        );
        assert_eq!(
            ws_multiaddr(LOCALHOST, 20007).to_string(),
            "/ip4/127.0.0.1/tcp/20007/ws"
        );
    }

    #[test]
    fn test_socket_addr() {
        let addr: Multiaddr = "/ip4/127.0.0.1/tcp/31007".parse().unwrap();
        assert_eq!(socket_addr(&addr), Some(SocketAddr::new(LOCALHOST, 31007)));

        let ws = ws_multiaddr(LOCALHOST, 20007);
        assert_eq!(socket_addr(&ws), Some(SocketAddr::new(LOCALHOST, 20007)));

        let dns: Multiaddr = "/dns4/example.com/tcp/1".parse().unwrap();
        assert_eq!(socket_addr(&dns), None);
    }

    #[test]
    fn test_circuit_roundtrip() {
        let relay = PeerId::random();
        let relay_addr = tcp_multiaddr(LOCALHOST, 10007).with(Protocol::P2p(relay));

        let circuit = circuit_multiaddr(relay_addr, relay);
        assert_eq!(
            circuit.to_string(),
            format!("/ip4/127.0.0.1/tcp/10007/p2p/{relay}/p2p-circuit")
        );
        assert_eq!(relay_of_circuit(&circuit), Some(relay));

        let target = PeerId::random();
        let dialed = circuit.with(Protocol::P2p(target));
        assert_eq!(relay_of_circuit(&dialed), Some(relay));
        assert_eq!(peer_id_of(&dialed), Some(target));
    }

    #[test]
    fn test_direct_address_has_no_relay() {
        let addr = tcp_multiaddr(LOCALHOST, 10008).with(Protocol::P2p(PeerId::random()));
        assert_eq!(relay_of_circuit(&addr), None);
        assert_eq!(strip_peer_id(addr), tcp_multiaddr(LOCALHOST, 10008));
    }
}
