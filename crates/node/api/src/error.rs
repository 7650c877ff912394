use libp2p::PeerId;

use crate::ContentRef;

/// Failure of a control-surface operation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ControlError {
    /// The node (or its control API) cannot be reached.
    #[error("node unreachable: {0}")]
    Unreachable(String),
    /// The node has shut down and no longer accepts commands.
    #[error("node stopped")]
    Stopped,
    /// Dialing the target failed.
    #[error("connect to {peer} failed: {reason}")]
    Connect { peer: PeerId, reason: String },
    /// No route to the target exists (no address and no relay connection).
    #[error("no route to {0}")]
    NoRoute(PeerId),
    /// The provider does not hold the requested content.
    #[error("content {0} not found")]
    NotFound(ContentRef),
    /// Content could not be stored or transferred.
    #[error("transfer failed: {0}")]
    Transfer(String),
    /// The peer answered with something that violates the control protocol.
    #[error("protocol error: {0}")]
    Protocol(String),
}
