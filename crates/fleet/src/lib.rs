//! Fleet provisioning.
//!
//! A [`FleetOrchestrator`] owns every daemon handle of a run. It starts
//! nodes concurrently from an ordered list of [`NodeSpec`]s and later stops
//! them one by one with a short pause before each stop, so shutdowns do not
//! contend for ports and file descriptors.
//!
//! ```no_run
//! # async fn run() -> Result<(), relayprobe_fleet::ProvisionError> {
//! use relayprobe_daemon::SpawnConfig;
//! use relayprobe_fleet::{FleetConfig, FleetOrchestrator, default_fleet};
//!
//! let mut fleet = FleetOrchestrator::new(FleetConfig::new(SpawnConfig::new("relayprobe")));
//! let provisioned = fleet.provision(&default_fleet()).await;
//! // Torn down whether or not provisioning succeeded.
//! let report = fleet.teardown_all().await;
//! assert!(report.is_clean());
//! provisioned
//! # }
//! ```

mod error;
mod orchestrator;
mod spec;

pub use error::ProvisionError;
pub use orchestrator::{DaemonFactory, FleetConfig, FleetOrchestrator, TeardownReport};
pub use spec::{NodeSpec, default_fleet};
