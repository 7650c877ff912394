//! Control surface of a relayprobe node.
//!
//! Every node the harness drives, whether it runs in-process or behind a
//! spawned daemon's HTTP API, is reached through [`NodeControl`]:
//!
//! ```text
//! identity()          -> PeerIdentity        own id + reachable addresses
//! connect(&identity)  -> ConnectionRoute     direct, or relayed through a relay
//! add(bytes)          -> ContentRef          store content locally
//! cat(provider, ref)  -> ByteStream          fetch content from a peer
//! shutdown()                                  graceful stop
//! ```
//!
//! The harness never branches on which implementation sits behind the trait.

mod content;
mod control;
mod error;
mod identity;

pub use content::{ContentRef, InvalidContentRef};
pub use control::{ByteStream, NodeControl, collect_stream};
pub use error::ControlError;
pub use identity::{ConnectionRoute, PeerIdentity};
