//! Harness configuration.
//!
//! Priority (highest wins):
//! 1. CLI arguments
//! 2. Config file (TOML)
//! 3. Defaults

use std::{fs, path::Path, time::Duration};

use eyre::{Result, WrapErr};
use relayprobe_daemon::SpawnConfig;
use relayprobe_fleet::FleetConfig;
use relayprobe_verifier::VerifierConfig;
use serde::{Deserialize, Serialize};

use crate::cli::HarnessArgs;

/// Tunables of a suite run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct HarnessConfig {
    /// Pause before each daemon stop during teardown.
    #[serde(with = "humantime_serde")]
    pub(crate) stop_stagger: Duration,
    /// Bound on each daemon's start.
    #[serde(with = "humantime_serde")]
    pub(crate) startup_timeout: Duration,
    /// Pause after both leaves joined the relay.
    #[serde(with = "humantime_serde")]
    pub(crate) settle_delay: Duration,
    /// Bound on each scenario step.
    #[serde(with = "humantime_serde")]
    pub(crate) step_timeout: Duration,
    /// Size of the random payload, in bytes.
    pub(crate) payload_size: usize,
    /// Fail scenarios whose leaf-to-leaf connection is not relayed.
    pub(crate) require_relayed_route: bool,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            stop_stagger: Duration::from_millis(100),
            startup_timeout: Duration::from_secs(20),
            settle_delay: Duration::from_secs(1),
            step_timeout: Duration::from_secs(20),
            payload_size: 128,
            require_relayed_route: true,
        }
    }
}

impl HarnessConfig {
    /// Defaults, overlaid with the TOML file at `path` if given.
    pub(crate) fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .wrap_err_with(|| format!("failed to parse config file {}", path.display()))
    }

    /// Apply command line overrides.
    pub(crate) fn apply_cli_args(&mut self, args: &HarnessArgs) {
        if let Some(stagger) = args.stop_stagger {
            self.stop_stagger = stagger;
        }
        if let Some(timeout) = args.startup_timeout {
            self.startup_timeout = timeout;
        }
        if let Some(delay) = args.settle_delay {
            self.settle_delay = delay;
        }
        if let Some(timeout) = args.step_timeout {
            self.step_timeout = timeout;
        }
        if let Some(size) = args.payload_size {
            self.payload_size = size;
        }
        if args.allow_direct_route {
            self.require_relayed_route = false;
        }
    }

    pub(crate) fn fleet_config(&self, spawn: SpawnConfig) -> FleetConfig {
        FleetConfig::new(spawn)
            .with_stop_stagger(self.stop_stagger)
            .with_startup_timeout(self.startup_timeout)
    }

    pub(crate) fn verifier_config(&self) -> VerifierConfig {
        VerifierConfig {
            settle_delay: self.settle_delay,
            step_timeout: self.step_timeout,
            require_relayed_route: self.require_relayed_route,
        }
    }
}
