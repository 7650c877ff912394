use std::pin::Pin;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use libp2p::PeerId;

use crate::{ConnectionRoute, ContentRef, ControlError, PeerIdentity};

/// Content delivered by [`NodeControl::cat`], in arbitrarily sized chunks.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, ControlError>> + Send>>;

/// Operations the harness performs against a running node.
#[async_trait]
#[auto_impl::auto_impl(&, Arc, Box)]
pub trait NodeControl: Send + Sync {
    /// The node's own identifier and reachable addresses.
    async fn identity(&self) -> Result<PeerIdentity, ControlError>;

    /// Connect to `peer`.
    ///
    /// With addresses, the node dials them. With [`PeerIdentity::peer_only`],
    /// the node routes the connection through relays it is already connected
    /// to. Resolves once a connection is established and reports its route.
    async fn connect(&self, peer: &PeerIdentity) -> Result<ConnectionRoute, ControlError>;

    /// Store `data` locally and return its reference.
    async fn add(&self, data: Bytes) -> Result<ContentRef, ControlError>;

    /// Fetch `reference` from `provider` (which may be the node itself).
    async fn cat(&self, provider: PeerId, reference: ContentRef)
    -> Result<ByteStream, ControlError>;

    /// Stop the node gracefully.
    async fn shutdown(&self) -> Result<(), ControlError>;
}

/// Drain a [`ByteStream`] into one buffer.
pub async fn collect_stream(mut stream: ByteStream) -> Result<Bytes, ControlError> {
    let mut buf = BytesMut::new();
    while let Some(chunk) = stream.next().await {
        buf.extend_from_slice(&chunk?);
    }
    Ok(buf.freeze())
}

#[cfg(test)]
mod tests {
    use futures::stream;

    use super::*;

    #[tokio::test]
    async fn test_collect_concatenates_chunks() {
        let chunks = vec![
            Ok(Bytes::from_static(b"ab")),
            Ok(Bytes::from_static(b"")),
            Ok(Bytes::from_static(b"cd")),
        ];
        let collected = collect_stream(Box::pin(stream::iter(chunks))).await.unwrap();
        assert_eq!(&collected[..], b"abcd");
    }

    #[tokio::test]
    async fn test_collect_stops_on_error() {
        let chunks = vec![
            Ok(Bytes::from_static(b"ab")),
            Err(ControlError::Transfer("reset".into())),
        ];
        let result = collect_stream(Box::pin(stream::iter(chunks))).await;
        assert!(matches!(result, Err(ControlError::Transfer(_))));
    }
}
