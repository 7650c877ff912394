//! Daemon handles.
//!
//! A [`Daemon`] owns one node for the duration of a run: its configuration,
//! its lifecycle state, its temporary repository and, once running, its
//! cached [`PeerIdentity`](relayprobe_node_api::PeerIdentity). Two variants
//! exist:
//!
//! - [`EmbeddedDaemon`] runs the node inside the current process and serves
//!   its control API alongside it.
//! - [`SpawnedDaemon`] launches `relayprobe daemon` as a child process and
//!   drives it through its HTTP control API.
//!
//! Callers never branch on the variant; everything goes through the trait.

mod daemon;
mod embedded;
mod error;
mod lifecycle;
mod repo;
mod spawned;

pub use daemon::{Daemon, daemon_for};
pub use embedded::EmbeddedDaemon;
pub use error::DaemonError;
pub use lifecycle::DaemonState;
pub use spawned::{SpawnConfig, SpawnedDaemon};
