use std::{fmt, sync::Arc, time::Duration};

use libp2p::PeerId;
use relayprobe_node_api::{ConnectionRoute, ControlError, NodeControl};

/// Participant of a scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum Role {
    #[strum(serialize = "relay")]
    Relay,
    /// The leaf that fetches the payload.
    #[strum(serialize = "leaf-a")]
    LeafA,
    /// The leaf that holds the payload.
    #[strum(serialize = "leaf-b")]
    LeafB,
}

/// Two leaves and the relay they must communicate through.
#[derive(Clone)]
pub struct Scenario {
    pub name: String,
    pub relay: Arc<dyn NodeControl>,
    pub leaf_a: Arc<dyn NodeControl>,
    pub leaf_b: Arc<dyn NodeControl>,
}

impl Scenario {
    pub fn new(
        name: impl Into<String>,
        relay: Arc<dyn NodeControl>,
        leaf_a: Arc<dyn NodeControl>,
        leaf_b: Arc<dyn NodeControl>,
    ) -> Self {
        Self {
            name: name.into(),
            relay,
            leaf_a,
            leaf_b,
        }
    }
}

impl fmt::Debug for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scenario").field("name", &self.name).finish_non_exhaustive()
    }
}

/// States of a scenario run, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, strum::Display)]
pub enum ScenarioStep {
    Idle,
    /// Identities of all participants are known.
    PeersResolved,
    /// Both leaves hold relay connections and leaf A reached leaf B.
    RelayLinked,
    /// The payload is stored at leaf B and requested by leaf A.
    DataSent,
    /// The received bytes equal the payload.
    Verified,
}

/// Why a step failed.
#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    #[error("identity of {role}: {source}")]
    Identity {
        role: Role,
        #[source]
        source: ControlError,
    },
    #[error("{from} -> {to} connect failed: {source}")]
    Connect {
        from: Role,
        to: Role,
        #[source]
        source: ControlError,
    },
    /// The leaf-to-leaf connection did not go through the scenario's relay.
    #[error("leaf connection is {route}, expected relayed via {relay}")]
    NotRelayed {
        route: ConnectionRoute,
        relay: PeerId,
    },
    /// Storing the payload failed.
    #[error("add failed: {0}")]
    Add(#[source] ControlError),
    /// Fetching or receiving the payload failed.
    #[error("transfer failed: {0}")]
    Transfer(#[source] ControlError),
    #[error(
        "payload mismatch: sent {sent} bytes, received {received} bytes, first difference at offset {offset}"
    )]
    Mismatch {
        sent: usize,
        received: usize,
        offset: usize,
    },
    /// The step did not finish within its bound.
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// A failed scenario: the step that could not be reached and why.
#[derive(Debug, thiserror::Error)]
#[error("{step}: {error}")]
pub struct ScenarioFailure {
    pub step: ScenarioStep,
    #[source]
    pub error: ScenarioError,
}

/// Result of one scenario run.
#[derive(Debug)]
pub struct ScenarioReport {
    pub name: String,
    /// Last state reached.
    pub reached: ScenarioStep,
    /// Route of the leaf-to-leaf connection, once established.
    pub route: Option<ConnectionRoute>,
    /// Byte comparison result, once the payload was received in full.
    pub payload_matched: Option<bool>,
    pub failure: Option<ScenarioFailure>,
    pub elapsed: Duration,
}

impl ScenarioReport {
    pub fn is_success(&self) -> bool {
        self.failure.is_none() && self.reached == ScenarioStep::Verified
    }

    /// The step that failed, if any.
    pub fn failed_step(&self) -> Option<ScenarioStep> {
        self.failure.as_ref().map(|failure| failure.step)
    }
}

impl fmt::Display for ScenarioReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.is_success() { "PASS" } else { "FAIL" };
        write!(f, "{status} {}", self.name)?;
        if let Some(route) = &self.route {
            write!(f, " route={route}")?;
        }
        if let Some(matched) = self.payload_matched {
            write!(f, " payload_matched={matched}")?;
        }
        if let Some(failure) = &self.failure {
            write!(f, " failed_at={} error=\"{}\"", failure.step, failure.error)?;
        }
        write!(f, " ({:.2?})", self.elapsed)
    }
}
