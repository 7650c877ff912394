//! `relayprobe run`: the full suite.

use eyre::{Result, bail, eyre};
use relayprobe_daemon::SpawnConfig;
use relayprobe_fleet::{FleetOrchestrator, NodeSpec, default_fleet};
use relayprobe_node_config::NodeFamily;
use relayprobe_observability::LogArgs;
use relayprobe_verifier::{CircuitVerifier, Scenario, TransferPayload};
use tracing::{info, warn};

use crate::{cli::RunArgs, config::HarnessConfig};

/// A scenario over nodes of the default fleet.
struct ScenarioPlan {
    name: &'static str,
    relay: NodeSpec,
    leaf_a: NodeSpec,
    leaf_b: NodeSpec,
}

const SCENARIOS: [ScenarioPlan; 3] = [
    ScenarioPlan {
        name: "embedded-relay",
        relay: NodeSpec::relay(7, NodeFamily::Embedded),
        leaf_a: NodeSpec::leaf(8, NodeFamily::Embedded),
        leaf_b: NodeSpec::leaf(12, NodeFamily::Embedded),
    },
    ScenarioPlan {
        name: "cross-family",
        relay: NodeSpec::relay(27, NodeFamily::External),
        leaf_a: NodeSpec::leaf(13, NodeFamily::Embedded),
        leaf_b: NodeSpec::leaf(12, NodeFamily::Embedded),
    },
    ScenarioPlan {
        name: "all-external",
        relay: NodeSpec::relay(27, NodeFamily::External),
        leaf_a: NodeSpec::leaf(28, NodeFamily::External),
        leaf_b: NodeSpec::leaf(31, NodeFamily::External),
    },
];

impl ScenarioPlan {
    fn resolve(&self, fleet: &FleetOrchestrator) -> Result<Scenario> {
        let control = |spec: &NodeSpec| {
            fleet
                .control(spec)
                .ok_or_else(|| eyre!("{spec} is not running"))
        };
        Ok(Scenario::new(
            self.name,
            control(&self.relay)?,
            control(&self.leaf_a)?,
            control(&self.leaf_b)?,
        ))
    }
}

pub(crate) async fn run(args: RunArgs, logs: &LogArgs) -> Result<()> {
    let mut config = HarnessConfig::load(args.harness.config.as_deref())?;
    config.apply_cli_args(&args.harness);
    info!(?config, "Harness configuration");

    // External daemons are this executable's `daemon` subcommand.
    let spawn = SpawnConfig::current_exe()?
        .inherit_output(!args.quiet_daemons)
        .with_global_args(logs.to_cli_args());
    let mut fleet = FleetOrchestrator::new(config.fleet_config(spawn));

    let outcome = match fleet.provision(&default_fleet()).await {
        Ok(()) => run_scenarios(&fleet, &config).await,
        Err(e) => Err(eyre::Report::new(e).wrap_err("provisioning failed")),
    };

    let teardown = fleet.teardown_all().await;
    if teardown.is_clean() {
        info!(stopped = teardown.stopped.len(), "Fleet torn down");
    } else {
        warn!(
            stopped = teardown.stopped.len(),
            failed = teardown.failed.len(),
            "Fleet torn down with errors"
        );
    }

    outcome
}

async fn run_scenarios(fleet: &FleetOrchestrator, config: &HarnessConfig) -> Result<()> {
    let verifier = CircuitVerifier::new(config.verifier_config());

    let mut failed = 0;
    for plan in &SCENARIOS {
        let scenario = plan.resolve(fleet)?;
        let payload = TransferPayload::random(config.payload_size);
        let report = verifier.verify(&scenario, &payload).await;
        println!("{report}");
        if !report.is_success() {
            failed += 1;
        }
    }

    if failed > 0 {
        bail!("{failed} of {} scenarios failed", SCENARIOS.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scenarios_use_default_fleet_nodes() {
        let fleet = default_fleet();
        for plan in &SCENARIOS {
            for spec in [plan.relay, plan.leaf_a, plan.leaf_b] {
                assert!(fleet.contains(&spec), "{} uses {spec}", plan.name);
            }
        }
    }
}
