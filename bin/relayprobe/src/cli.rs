//! Command line interface.

use std::{path::PathBuf, time::Duration};

use clap::{Args, Parser, Subcommand};
use relayprobe_node_config::{NodeFamily, NodeKind};
use relayprobe_observability::LogArgs;

/// Relay circuit test harness.
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub(crate) struct Cli {
    /// Logging configuration (applies to all subcommands).
    #[command(flatten)]
    pub(crate) logs: LogArgs,

    #[command(subcommand)]
    pub(crate) command: Commands,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Commands {
    /// Run a single node with its control API until it is asked to shut down.
    Daemon(DaemonArgs),
    /// Provision the default fleet, run every scenario, tear down.
    Run(RunArgs),
    /// Print the generated configuration of a node as JSON.
    Config(NodeArgs),
}

/// Identifies one node of a fleet.
#[derive(Debug, Clone, Args)]
#[command(next_help_heading = "Node")]
pub(crate) struct NodeArgs {
    /// Node index; determines every listen port.
    #[arg(long, value_parser = clap::value_parser!(u16).range(0..=999))]
    pub(crate) index: u16,

    #[arg(long, value_enum, default_value_t = NodeKind::Leaf)]
    pub(crate) kind: NodeKind,

    /// Port family the node allocates from.
    #[arg(long, value_enum, default_value_t = NodeFamily::External)]
    pub(crate) family: NodeFamily,
}

#[derive(Debug, Clone, Args)]
pub(crate) struct DaemonArgs {
    #[command(flatten)]
    pub(crate) node: NodeArgs,

    /// Repository directory. A private temporary directory if omitted.
    #[arg(long, value_name = "DIR")]
    pub(crate) repo: Option<PathBuf>,

    /// Create a fresh repository instead of opening an existing one.
    #[arg(long)]
    pub(crate) init: bool,
}

#[derive(Debug, Clone, Args)]
pub(crate) struct RunArgs {
    #[command(flatten)]
    pub(crate) harness: HarnessArgs,

    /// Discard the output of spawned daemons.
    #[arg(long = "fleet.quiet-daemons")]
    pub(crate) quiet_daemons: bool,
}

/// Overrides for [`HarnessConfig`](crate::config::HarnessConfig).
#[derive(Debug, Clone, Default, Args)]
#[command(next_help_heading = "Harness")]
pub(crate) struct HarnessArgs {
    /// TOML file with harness settings.
    #[arg(long, value_name = "FILE")]
    pub(crate) config: Option<PathBuf>,

    /// Pause before each daemon stop during teardown (e.g. "100ms").
    #[arg(long = "fleet.stop-stagger", value_name = "DURATION", value_parser = humantime::parse_duration)]
    pub(crate) stop_stagger: Option<Duration>,

    /// Bound on each daemon's start.
    #[arg(long = "fleet.startup-timeout", value_name = "DURATION", value_parser = humantime::parse_duration)]
    pub(crate) startup_timeout: Option<Duration>,

    /// Pause after both leaves joined the relay.
    #[arg(long = "scenario.settle-delay", value_name = "DURATION", value_parser = humantime::parse_duration)]
    pub(crate) settle_delay: Option<Duration>,

    /// Bound on each scenario step.
    #[arg(long = "scenario.step-timeout", value_name = "DURATION", value_parser = humantime::parse_duration)]
    pub(crate) step_timeout: Option<Duration>,

    /// Size of the random payload in bytes.
    #[arg(long = "scenario.payload-size", value_name = "BYTES")]
    pub(crate) payload_size: Option<usize>,

    /// Accept a direct leaf-to-leaf connection instead of failing the scenario.
    #[arg(long = "scenario.allow-direct-route")]
    pub(crate) allow_direct_route: bool,
}
