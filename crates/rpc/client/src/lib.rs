//! Client side of the relayprobe control API.
//!
//! [`ApiClient`] implements [`NodeControl`] on top of HTTP requests, so a node
//! running in another process is driven exactly like an in-process one.

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use libp2p::{Multiaddr, PeerId};
use relayprobe_net_addrs::socket_addr;
use relayprobe_node_api::{
    ByteStream, ConnectionRoute, ContentRef, ControlError, NodeControl, PeerIdentity,
};
use relayprobe_rpc_core::api::{
    self, AddResponse, CatQuery, ConnectRequest, ConnectResponse, ErrorResponse, IdResponse,
};
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::trace;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Errors constructing an [`ApiClient`].
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("API address {0} is not an IP/TCP multiaddr")]
    InvalidAddress(Multiaddr),
    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

/// HTTP client for one node's control API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    /// Client for the API listening on `addr`. Unspecified hosts are reached on loopback.
    pub fn new(addr: SocketAddr) -> Result<Self, ClientError> {
        let host = if addr.ip().is_unspecified() {
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        } else {
            addr.ip()
        };
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: format!("http://{}", SocketAddr::new(host, addr.port())),
        })
    }

    /// Client for the API listening on `/ip4/<ip>/tcp/<port>`.
    pub fn from_multiaddr(addr: &Multiaddr) -> Result<Self, ClientError> {
        let socket = socket_addr(addr).ok_or_else(|| ClientError::InvalidAddress(addr.clone()))?;
        Self::new(socket)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// True if the API answers an identity query.
    pub async fn is_reachable(&self) -> bool {
        self.identity().await.is_ok()
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.http.post(format!("{}{path}", self.base_url))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, ControlError> {
        let response = request
            .send()
            .await
            .map_err(|e| ControlError::Unreachable(e.to_string()))?;

        let status = response.status();
        trace!(%status, url = %response.url(), "API response");
        if status.is_success() {
            return Ok(response);
        }
        match response.json::<ErrorResponse>().await {
            Ok(error) => Err(error.into()),
            Err(_) => Err(ControlError::Protocol(format!("unexpected status {status}"))),
        }
    }

    async fn json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ControlError> {
        self.send(request)
            .await?
            .json()
            .await
            .map_err(|e| ControlError::Protocol(format!("malformed response: {e}")))
    }
}

#[async_trait]
impl NodeControl for ApiClient {
    async fn identity(&self) -> Result<PeerIdentity, ControlError> {
        let response: IdResponse = self.json(self.post(api::ID_PATH)).await?;
        Ok(response.into())
    }

    async fn connect(&self, peer: &PeerIdentity) -> Result<ConnectionRoute, ControlError> {
        let body = ConnectRequest::from(peer.clone());
        let response: ConnectResponse = self
            .json(self.post(api::CONNECT_PATH).json(&body))
            .await?;
        Ok(response.into())
    }

    async fn add(&self, data: Bytes) -> Result<ContentRef, ControlError> {
        let response: AddResponse = self.json(self.post(api::ADD_PATH).body(data)).await?;
        Ok(response.hash)
    }

    async fn cat(
        &self,
        provider: PeerId,
        reference: ContentRef,
    ) -> Result<ByteStream, ControlError> {
        let query = CatQuery {
            arg: reference,
            provider,
        };
        let response = self.send(self.post(api::CAT_PATH).query(&query)).await?;
        Ok(response
            .bytes_stream()
            .map_err(|e| ControlError::Transfer(e.to_string()))
            .boxed())
    }

    async fn shutdown(&self) -> Result<(), ControlError> {
        self.send(self.post(api::SHUTDOWN_PATH)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unspecified_host_uses_loopback() {
        let client = ApiClient::new("0.0.0.0:33027".parse().unwrap()).unwrap();
        assert_eq!(client.base_url(), "http://127.0.0.1:33027");
    }

    #[test]
    fn test_from_multiaddr() {
        let client = ApiClient::from_multiaddr(&"/ip4/127.0.0.1/tcp/31007".parse().unwrap()).unwrap();
        assert_eq!(client.base_url(), "http://127.0.0.1:31007");

        let dns: Multiaddr = "/dns4/localhost/tcp/1".parse().unwrap();
        assert!(matches!(
            ApiClient::from_multiaddr(&dns),
            Err(ClientError::InvalidAddress(_))
        ));
    }
}
