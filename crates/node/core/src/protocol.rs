//! Block fetch protocol: one request, one response, CBOR encoded.

use libp2p::StreamProtocol;
use relayprobe_node_api::ContentRef;
use serde::{Deserialize, Serialize};

pub(crate) const FETCH_PROTOCOL: StreamProtocol = StreamProtocol::new("/relayprobe/fetch/1.0.0");

/// Ask a provider for one block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchRequest {
    pub reference: ContentRef,
}

/// A provider's answer to a [`FetchRequest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FetchResponse {
    Found(Vec<u8>),
    NotFound,
}
