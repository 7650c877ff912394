use std::{future::Future, time::Duration};

use futures::future::try_join3;
use relayprobe_node_api::{ByteStream, ConnectionRoute, NodeControl, PeerIdentity, collect_stream};
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

use crate::{
    Role, Scenario, ScenarioError, ScenarioFailure, ScenarioReport, ScenarioStep, TransferPayload,
};

/// Verifier tunables.
#[derive(Debug, Clone, Copy)]
pub struct VerifierConfig {
    /// Pause after both leaves connected to the relay, before leaf A dials leaf B.
    pub settle_delay: Duration,
    /// Bound on each step.
    pub step_timeout: Duration,
    /// Fail unless the leaf-to-leaf connection goes through the relay.
    pub require_relayed_route: bool,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_secs(1),
            step_timeout: Duration::from_secs(20),
            require_relayed_route: true,
        }
    }
}

struct Identities {
    relay: PeerIdentity,
    leaf_b: PeerIdentity,
}

/// Drives scenarios through `Idle → PeersResolved → RelayLinked → DataSent → Verified`.
///
/// Steps run strictly in order, each bounded by `step_timeout`. The first
/// failing step ends the run; nothing is retried.
#[derive(Debug, Clone, Default)]
pub struct CircuitVerifier {
    config: VerifierConfig,
}

impl CircuitVerifier {
    pub fn new(config: VerifierConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    /// Run `scenario`, sending `payload` from leaf B to leaf A over the relay.
    pub async fn verify(&self, scenario: &Scenario, payload: &TransferPayload) -> ScenarioReport {
        let started = Instant::now();
        let mut report = ScenarioReport {
            name: scenario.name.clone(),
            reached: ScenarioStep::Idle,
            route: None,
            payload_matched: None,
            failure: None,
            elapsed: Duration::ZERO,
        };

        info!(scenario = %scenario.name, payload = payload.len(), "Running scenario");
        if let Err(failure) = self.drive(scenario, payload, &mut report).await {
            warn!(scenario = %scenario.name, %failure, "Scenario failed");
            report.failure = Some(failure);
        }
        report.elapsed = started.elapsed();

        let outcome = if report.is_success() { "passed" } else { "failed" };
        metrics::counter!("relayprobe_scenarios_total", "outcome" => outcome).increment(1);
        info!(scenario = %scenario.name, outcome, elapsed = ?report.elapsed, "Scenario finished");
        report
    }

    async fn drive(
        &self,
        scenario: &Scenario,
        payload: &TransferPayload,
        report: &mut ScenarioReport,
    ) -> Result<(), ScenarioFailure> {
        let identities = self
            .step(ScenarioStep::PeersResolved, resolve(scenario))
            .await?;
        report.reached = ScenarioStep::PeersResolved;

        let route = self
            .step(ScenarioStep::RelayLinked, self.link(scenario, &identities))
            .await?;
        report.route = Some(route);
        report.reached = ScenarioStep::RelayLinked;

        let stream = self
            .step(
                ScenarioStep::DataSent,
                transfer(scenario, &identities, payload),
            )
            .await?;
        report.reached = ScenarioStep::DataSent;

        let received = self
            .step(ScenarioStep::Verified, async {
                collect_stream(stream).await.map_err(ScenarioError::Transfer)
            })
            .await?;
        let difference = payload.first_difference(&received);
        report.payload_matched = Some(difference.is_none());
        if let Some(offset) = difference {
            return Err(ScenarioFailure {
                step: ScenarioStep::Verified,
                error: ScenarioError::Mismatch {
                    sent: payload.len(),
                    received: received.len(),
                    offset,
                },
            });
        }
        report.reached = ScenarioStep::Verified;
        Ok(())
    }

    async fn step<T>(
        &self,
        step: ScenarioStep,
        work: impl Future<Output = Result<T, ScenarioError>>,
    ) -> Result<T, ScenarioFailure> {
        debug!(%step, "Entering step");
        match time::timeout(self.config.step_timeout, work).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(error)) => Err(ScenarioFailure { step, error }),
            Err(_) => Err(ScenarioFailure {
                step,
                error: ScenarioError::Timeout(self.config.step_timeout),
            }),
        }
    }

    /// Leaf A and leaf B connect to the relay, then leaf A connects to leaf
    /// B by identifier alone so the only viable route is the relay circuit.
    async fn link(
        &self,
        scenario: &Scenario,
        identities: &Identities,
    ) -> Result<ConnectionRoute, ScenarioError> {
        connect(&scenario.leaf_a, Role::LeafA, Role::Relay, &identities.relay).await?;
        connect(&scenario.leaf_b, Role::LeafB, Role::Relay, &identities.relay).await?;

        time::sleep(self.config.settle_delay).await;

        let target = PeerIdentity::peer_only(identities.leaf_b.peer_id);
        let route = connect(&scenario.leaf_a, Role::LeafA, Role::LeafB, &target).await?;
        debug!(%route, "Leaf A reached leaf B");

        let relay = identities.relay.peer_id;
        if self.config.require_relayed_route && route.relay() != Some(relay) {
            return Err(ScenarioError::NotRelayed { route, relay });
        }
        Ok(route)
    }
}

async fn resolve(scenario: &Scenario) -> Result<Identities, ScenarioError> {
    let (relay, leaf_a, leaf_b) = try_join3(
        identity_of(scenario.relay.as_ref(), Role::Relay),
        identity_of(scenario.leaf_a.as_ref(), Role::LeafA),
        identity_of(scenario.leaf_b.as_ref(), Role::LeafB),
    )
    .await?;
    debug!(%relay, %leaf_a, %leaf_b, "Peers resolved");
    Ok(Identities { relay, leaf_b })
}

async fn identity_of(node: &dyn NodeControl, role: Role) -> Result<PeerIdentity, ScenarioError> {
    node.identity()
        .await
        .map_err(|source| ScenarioError::Identity { role, source })
}

async fn connect(
    node: &dyn NodeControl,
    from: Role,
    to: Role,
    target: &PeerIdentity,
) -> Result<ConnectionRoute, ScenarioError> {
    node.connect(target)
        .await
        .map_err(|source| ScenarioError::Connect { from, to, source })
}

/// Store the payload at leaf B and open leaf A's fetch of it.
async fn transfer(
    scenario: &Scenario,
    identities: &Identities,
    payload: &TransferPayload,
) -> Result<ByteStream, ScenarioError> {
    let reference = scenario
        .leaf_b
        .add(payload.to_bytes())
        .await
        .map_err(ScenarioError::Add)?;
    debug!(%reference, "Payload stored at leaf B");

    scenario
        .leaf_a
        .cat(identities.leaf_b.peer_id, reference)
        .await
        .map_err(ScenarioError::Transfer)
}
