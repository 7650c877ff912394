//! In-process relayprobe node.
//!
//! A [`Node`] runs a libp2p swarm with TCP and websocket transports, identify,
//! circuit relay (client always, server when hop is enabled) and a
//! request/response block fetch protocol. It is driven through a
//! [`NodeHandle`], which implements [`NodeControl`](relayprobe_node_api::NodeControl).
//!
//! ```ignore
//! let store = BlockStore::init(repo_dir)?;
//! let (mut node, handle) = Node::builder(config).with_store(store).build().await?;
//! let mut events = handle.subscribe();
//! node.start_listening()?;
//! tokio::spawn(node.run());
//! wait_ready(&mut events).await?;
//! ```

mod behaviour;
mod builder;
mod events;
mod handle;
mod node;
mod protocol;
mod store;

pub use builder::NodeBuilder;
pub use events::{NodeEvent, wait_ready};
pub use handle::NodeHandle;
pub use node::Node;
pub use protocol::{FetchRequest, FetchResponse};
pub use store::{BlockStore, StoreError};
