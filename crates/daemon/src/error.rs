use relayprobe_node_api::ControlError;
use relayprobe_node_core::StoreError;

/// Errors from [`Daemon`](crate::Daemon) operations.
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    /// `start` was called on a handle that was already started once.
    #[error("daemon already started")]
    AlreadyStarted,
    /// The operation needs a running node.
    #[error("daemon is not running")]
    NotRunning,
    /// The node could not reach readiness.
    #[error("failed to start: {0:#}")]
    Start(eyre::Report),
    /// The repository could not be prepared.
    #[error("repository: {0}")]
    Storage(#[from] StoreError),
    /// The running node did not report its identity.
    #[error("identity fetch failed: {0}")]
    Identity(#[source] ControlError),
    /// Releasing resources failed. Cleanup still ran to completion.
    #[error("stop failed: {0}")]
    Stop(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
