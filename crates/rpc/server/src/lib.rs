//! HTTP control API server for relayprobe nodes.
//!
//! Exposes a [`NodeControl`] implementation over HTTP so nodes running in
//! other processes can be driven by the harness. Serves two listeners:
//!
//! - the control API (`POST /api/v0/...`), see [`relayprobe_rpc_core::api`]
//! - an optional read-only gateway (`GET /ipfs/{reference}`)
//!
//! # Usage
//!
//! ```ignore
//! use relayprobe_rpc_server::{ApiServer, ApiServerConfig};
//! use relayprobe_rpc_core::RpcServer;
//!
//! let server = ApiServer::bind(ApiServerConfig::from_node_config(&config)?, control).await?;
//! tokio::spawn({ let server = server.clone(); async move { server.start().await } });
//! ```

mod cors;
mod error;
mod handlers;

use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use async_trait::async_trait;
use axum::{
    Router,
    routing::{get, post},
};
use eyre::{OptionExt, WrapErr};
use libp2p::PeerId;
use parking_lot::Mutex;
use relayprobe_node_api::NodeControl;
use relayprobe_node_config::{HttpHeaders, NodeConfig};
use relayprobe_rpc_core::api;
pub use relayprobe_rpc_core::RpcServer;
use tokio::{net::TcpListener, sync::watch};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Configuration for the API server.
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// Address of the control API.
    pub api_addr: SocketAddr,
    /// Address of the gateway, if served.
    pub gateway_addr: Option<SocketAddr>,
    /// CORS headers attached to control API responses.
    pub http_headers: HttpHeaders,
}

impl ApiServerConfig {
    /// Addresses and headers from a node's configuration.
    pub fn from_node_config(config: &NodeConfig) -> eyre::Result<Self> {
        Ok(Self {
            api_addr: config
                .api_socket_addr()
                .ok_or_eyre("API address is not an IP/TCP multiaddr")?,
            gateway_addr: Some(
                config
                    .gateway_socket_addr()
                    .ok_or_eyre("gateway address is not an IP/TCP multiaddr")?,
            ),
            http_headers: config.api.http_headers.clone(),
        })
    }
}

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) control: Arc<dyn NodeControl>,
    pub(crate) local_peer_id: PeerId,
    pub(crate) shutdown_tx: Arc<watch::Sender<bool>>,
}

struct Listeners {
    api: TcpListener,
    gateway: Option<TcpListener>,
}

/// HTTP server exposing a node's [`NodeControl`].
///
/// Sockets are bound by [`ApiServer::bind`], so address conflicts surface
/// before the server is started.
pub struct ApiServer {
    state: AppState,
    http_headers: HttpHeaders,
    api_addr: SocketAddr,
    gateway_addr: Option<SocketAddr>,
    listeners: Mutex<Option<Listeners>>,
    shutdown_rx: watch::Receiver<bool>,
    running: AtomicBool,
}

impl ApiServer {
    /// Bind the configured listeners for `control`.
    pub async fn bind(
        config: ApiServerConfig,
        control: Arc<dyn NodeControl>,
    ) -> eyre::Result<Arc<Self>> {
        let local_peer_id = control.identity().await?.peer_id;

        let api = TcpListener::bind(config.api_addr)
            .await
            .wrap_err_with(|| format!("failed to bind API on {}", config.api_addr))?;
        let gateway = match config.gateway_addr {
            Some(addr) => Some(
                TcpListener::bind(addr)
                    .await
                    .wrap_err_with(|| format!("failed to bind gateway on {addr}"))?,
            ),
            None => None,
        };
        let api_addr = api.local_addr()?;
        let gateway_addr = gateway.as_ref().map(TcpListener::local_addr).transpose()?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Ok(Arc::new(Self {
            state: AppState {
                control,
                local_peer_id,
                shutdown_tx: Arc::new(shutdown_tx),
            },
            http_headers: config.http_headers,
            api_addr,
            gateway_addr,
            listeners: Mutex::new(Some(Listeners { api, gateway })),
            shutdown_rx,
            running: AtomicBool::new(false),
        }))
    }

    /// Address the gateway is bound to, if served.
    pub fn gateway_address(&self) -> Option<SocketAddr> {
        self.gateway_addr
    }

    /// Resolves once a stop was requested, through [`RpcServer::stop`] or the
    /// API's shutdown route.
    pub async fn stopped(&self) {
        let mut rx = self.shutdown_rx.clone();
        let _ = rx.wait_for(|stopped| *stopped).await;
    }

    fn api_router(&self) -> Router {
        Router::new()
            .route(api::ID_PATH, post(handlers::id))
            .route(api::CONNECT_PATH, post(handlers::connect))
            .route(api::ADD_PATH, post(handlers::add))
            .route(api::CAT_PATH, post(handlers::cat))
            .route(api::SHUTDOWN_PATH, post(handlers::shutdown))
            .with_state(self.state.clone())
            .layer(cors::layer(&self.http_headers))
            .layer(TraceLayer::new_for_http())
    }

    fn gateway_router(&self) -> Router {
        Router::new()
            .route(api::GATEWAY_PATH, get(handlers::gateway))
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http())
    }
}

async fn serve(
    listener: TcpListener,
    router: Router,
    mut shutdown_rx: watch::Receiver<bool>,
) -> std::io::Result<()> {
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.wait_for(|stopped| *stopped).await;
        })
        .await
}

#[async_trait]
impl RpcServer for ApiServer {
    async fn start(&self) -> eyre::Result<()> {
        let Some(Listeners { api, gateway }) = self.listeners.lock().take() else {
            eyre::bail!("API server already started");
        };

        info!(addr = %self.api_addr, "Starting API server");
        self.running.store(true, Ordering::SeqCst);

        let api_task = serve(api, self.api_router(), self.shutdown_rx.clone());
        let result = match gateway {
            Some(gateway) => {
                info!(addr = ?self.gateway_addr, "Starting gateway");
                let gateway_task = serve(gateway, self.gateway_router(), self.shutdown_rx.clone());
                tokio::try_join!(api_task, gateway_task).map(|_| ())
            }
            None => api_task.await,
        };

        self.running.store(false, Ordering::SeqCst);

        match result {
            Ok(()) => {
                info!("API server stopped");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "API server error");
                Err(e.into())
            }
        }
    }

    async fn stop(&self) -> eyre::Result<()> {
        info!("Stopping API server");
        self.state.shutdown_tx.send_replace(true);
        Ok(())
    }

    fn address(&self) -> SocketAddr {
        self.api_addr
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
