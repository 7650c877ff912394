use std::time::Duration;

use relayprobe_daemon::DaemonError;

use crate::NodeSpec;

/// A node spec that could not be brought up.
#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    /// Two specs were allocated the same port. The spec was never launched.
    #[error("{spec}: port {port} is already allocated to {other}")]
    AddressConflict {
        spec: NodeSpec,
        other: NodeSpec,
        port: u16,
    },
    /// The node failed while starting.
    #[error("{spec} failed to start: {source}")]
    Start {
        spec: NodeSpec,
        #[source]
        source: DaemonError,
    },
    /// The node did not become ready in time.
    #[error("{spec} not running after {timeout:?}")]
    Timeout { spec: NodeSpec, timeout: Duration },
}

impl ProvisionError {
    /// The spec that failed.
    pub fn spec(&self) -> &NodeSpec {
        match self {
            ProvisionError::AddressConflict { spec, .. }
            | ProvisionError::Start { spec, .. }
            | ProvisionError::Timeout { spec, .. } => spec,
        }
    }
}
