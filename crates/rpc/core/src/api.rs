//! HTTP routes and JSON bodies of the control API.
//!
//! Every control route is a `POST` under [`API_PREFIX`]. Failures are
//! reported as a non-2xx status with an [`ErrorResponse`] body.

use libp2p::{Multiaddr, PeerId};
use relayprobe_node_api::{ConnectionRoute, ContentRef, ControlError, PeerIdentity};
use serde::{Deserialize, Serialize};

pub const API_PREFIX: &str = "/api/v0";
pub const ID_PATH: &str = "/api/v0/id";
pub const CONNECT_PATH: &str = "/api/v0/swarm/connect";
pub const ADD_PATH: &str = "/api/v0/add";
pub const CAT_PATH: &str = "/api/v0/cat";
pub const SHUTDOWN_PATH: &str = "/api/v0/shutdown";

/// Read-only gateway route serving stored blocks.
pub const GATEWAY_PATH: &str = "/ipfs/{reference}";

/// Body of `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct IdResponse {
    #[serde(rename = "ID")]
    pub id: PeerId,
    pub addresses: Vec<Multiaddr>,
}

impl From<PeerIdentity> for IdResponse {
    fn from(identity: PeerIdentity) -> Self {
        Self {
            id: identity.peer_id,
            addresses: identity.addresses,
        }
    }
}

impl From<IdResponse> for PeerIdentity {
    fn from(response: IdResponse) -> Self {
        PeerIdentity::new(response.id, response.addresses)
    }
}

/// Body of `swarm/connect`. Empty `addresses` means "route through relays".
pub type ConnectRequest = IdResponse;

/// Result of `swarm/connect`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ConnectResponse {
    /// Relay the connection goes through, absent for direct connections.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relay: Option<PeerId>,
}

impl From<ConnectionRoute> for ConnectResponse {
    fn from(route: ConnectionRoute) -> Self {
        Self {
            relay: route.relay(),
        }
    }
}

impl From<ConnectResponse> for ConnectionRoute {
    fn from(response: ConnectResponse) -> Self {
        match response.relay {
            Some(relay) => ConnectionRoute::Relayed { relay },
            None => ConnectionRoute::Direct,
        }
    }
}

/// Result of `add`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AddResponse {
    pub hash: ContentRef,
}

/// Query string of `cat`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatQuery {
    pub arg: ContentRef,
    pub provider: PeerId,
}

/// Machine-readable error class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    Unreachable,
    Stopped,
    Connect,
    NoRoute,
    NotFound,
    Transfer,
    Protocol,
}

/// Error body of any failed control request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ErrorResponse {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer: Option<PeerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<ContentRef>,
}

impl ErrorResponse {
    fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            peer: None,
            reference: None,
        }
    }
}

impl From<&ControlError> for ErrorResponse {
    fn from(error: &ControlError) -> Self {
        match error {
            ControlError::Unreachable(m) => Self::new(ErrorCode::Unreachable, m.clone()),
            ControlError::Stopped => Self::new(ErrorCode::Stopped, error.to_string()),
            ControlError::Connect { peer, reason } => Self {
                peer: Some(*peer),
                ..Self::new(ErrorCode::Connect, reason.clone())
            },
            ControlError::NoRoute(peer) => Self {
                peer: Some(*peer),
                ..Self::new(ErrorCode::NoRoute, error.to_string())
            },
            ControlError::NotFound(reference) => Self {
                reference: Some(*reference),
                ..Self::new(ErrorCode::NotFound, error.to_string())
            },
            ControlError::Transfer(m) => Self::new(ErrorCode::Transfer, m.clone()),
            ControlError::Protocol(m) => Self::new(ErrorCode::Protocol, m.clone()),
        }
    }
}

impl From<ErrorResponse> for ControlError {
    fn from(response: ErrorResponse) -> Self {
        match (response.code, response.peer, response.reference) {
            (ErrorCode::Unreachable, ..) => ControlError::Unreachable(response.message),
            (ErrorCode::Stopped, ..) => ControlError::Stopped,
            (ErrorCode::Connect, Some(peer), _) => ControlError::Connect {
                peer,
                reason: response.message,
            },
            (ErrorCode::NoRoute, Some(peer), _) => ControlError::NoRoute(peer),
            (ErrorCode::NotFound, _, Some(reference)) => ControlError::NotFound(reference),
            (ErrorCode::Transfer, ..) => ControlError::Transfer(response.message),
            (ErrorCode::Protocol, ..) => ControlError::Protocol(response.message),
            (code, ..) => ControlError::Protocol(format!(
                "incomplete {code:?} error: {}",
                response.message
            )),
        }
    }
}
