//! Control API definitions for relayprobe nodes.
//!
//! This crate defines the [`RpcServer`] trait implemented by the HTTP control
//! API and the JSON wire types exchanged with it (see [`api`]).

pub mod api;

use std::net::SocketAddr;

use async_trait::async_trait;

/// RPC server capability for nodes.
#[async_trait]
#[auto_impl::auto_impl(&, Arc)]
pub trait RpcServer: Send + Sync {
    /// Serve requests until [`RpcServer::stop`] is called.
    ///
    /// This method should be called in a spawned task as it will run
    /// until the server is stopped.
    async fn start(&self) -> eyre::Result<()>;

    /// Stop the RPC server gracefully.
    ///
    /// This signals the server to stop accepting new connections and
    /// wait for existing requests to complete.
    async fn stop(&self) -> eyre::Result<()>;

    /// Get the address the server is listening on.
    fn address(&self) -> SocketAddr;

    /// Check if the server is running.
    fn is_running(&self) -> bool;
}
