use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use relayprobe_node_api::{NodeControl, PeerIdentity};
use relayprobe_node_config::NodeConfig;
use relayprobe_node_core::{BlockStore, Node, NodeHandle, wait_ready};
use relayprobe_rpc_server::{ApiServer, ApiServerConfig, RpcServer};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{
    Daemon, DaemonError, DaemonState,
    lifecycle::Lifecycle,
    repo::RepoDir,
};

struct ApiTask {
    server: Arc<ApiServer>,
    task: JoinHandle<eyre::Result<()>>,
}

/// A node running inside the harness process.
pub struct EmbeddedDaemon {
    config: NodeConfig,
    lifecycle: Lifecycle,
    serve_api: bool,
    repo_path: Option<PathBuf>,

    repo: Option<RepoDir>,
    handle: Option<NodeHandle>,
    node_task: Option<JoinHandle<()>>,
    api: Option<ApiTask>,
}

impl EmbeddedDaemon {
    pub fn new(config: NodeConfig) -> Self {
        Self {
            config,
            lifecycle: Lifecycle::default(),
            serve_api: true,
            repo_path: None,
            repo: None,
            handle: None,
            node_task: None,
            api: None,
        }
    }

    /// Serve the control API and gateway on the configured addresses (default on).
    pub fn with_api(mut self, serve_api: bool) -> Self {
        self.serve_api = serve_api;
        self
    }

    /// Keep the repository in `path` instead of a private temporary directory.
    pub fn with_repo(mut self, path: impl AsRef<Path>) -> Self {
        self.repo_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Handle to the in-process node, once started.
    pub fn node(&self) -> Option<&NodeHandle> {
        self.handle.as_ref()
    }

    /// Resolves once the node's event loop has exited, e.g. after a shutdown
    /// request on the control API. Immediately if the node never started.
    pub async fn wait_for_exit(&mut self) {
        if let Some(task) = self.node_task.as_mut() {
            if let Err(e) = task.await {
                warn!(index = %self.config.index, %e, "Node task failed");
            }
            self.node_task = None;
        }
    }

    async fn launch(&mut self, initialize_storage: bool) -> Result<(), DaemonError> {
        let repo = RepoDir::for_config(&self.config, self.repo_path.as_deref())?;
        let store = BlockStore::prepare(repo.path(), initialize_storage);
        self.repo = Some(repo);
        let store = store?;

        let (mut node, handle) = Node::builder(self.config.clone())
            .with_store(store)
            .build()
            .await
            .map_err(DaemonError::Start)?;

        let mut events = handle.subscribe();
        node.start_listening().map_err(DaemonError::Start)?;

        // Held before awaiting readiness so an abandoned start can be stopped.
        self.handle = Some(handle.clone());
        self.node_task = Some(tokio::spawn(node.run()));
        wait_ready(&mut events).await.map_err(DaemonError::Start)?;

        if self.serve_api {
            let api_config =
                ApiServerConfig::from_node_config(&self.config).map_err(DaemonError::Start)?;
            let server = ApiServer::bind(api_config, Arc::new(handle))
                .await
                .map_err(DaemonError::Start)?;
            let task = tokio::spawn({
                let server = server.clone();
                async move { server.start().await }
            });
            self.api = Some(ApiTask { server, task });
        }

        Ok(())
    }

    fn holds_resources(&self) -> bool {
        self.repo.is_some() || self.handle.is_some() || self.node_task.is_some() || self.api.is_some()
    }
}

#[async_trait]
impl Daemon for EmbeddedDaemon {
    fn config(&self) -> &NodeConfig {
        &self.config
    }

    fn state(&self) -> DaemonState {
        self.lifecycle.state()
    }

    async fn start(&mut self, initialize_storage: bool) -> Result<(), DaemonError> {
        self.lifecycle.begin_start()?;
        info!(index = %self.config.index, kind = %self.config.kind, "Starting embedded daemon");

        self.launch(initialize_storage).await?;

        self.lifecycle.set_running();
        metrics::counter!("relayprobe_daemons_started_total", "family" => "embedded").increment(1);
        info!(index = %self.config.index, "Embedded daemon running");
        Ok(())
    }

    async fn identity(&mut self) -> Result<PeerIdentity, DaemonError> {
        if let Some(identity) = self.lifecycle.cached_identity() {
            return Ok(identity.clone());
        }
        self.lifecycle.ensure_running()?;
        let handle = self.handle.as_ref().ok_or(DaemonError::NotRunning)?;
        let identity = handle.identity().await.map_err(DaemonError::Identity)?;
        self.lifecycle.cache_identity(identity.clone());
        Ok(identity)
    }

    fn control(&self) -> Option<Arc<dyn NodeControl>> {
        if self.lifecycle.state() != DaemonState::Running {
            return None;
        }
        self.handle
            .clone()
            .map(|handle| Arc::new(handle) as Arc<dyn NodeControl>)
    }

    async fn stop(&mut self) -> Result<(), DaemonError> {
        if !self.holds_resources() {
            self.lifecycle.set_stopped();
            return Ok(());
        }

        let was_running = self.lifecycle.state() == DaemonState::Running;
        self.lifecycle.begin_stop();
        debug!(index = %self.config.index, "Stopping embedded daemon");

        let mut errors = Vec::new();

        if let Some(ApiTask { server, task }) = self.api.take() {
            if let Err(e) = server.stop().await {
                errors.push(format!("API stop: {e}"));
            }
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => errors.push(format!("API server: {e}")),
                Err(e) => errors.push(format!("API task: {e}")),
            }
        }

        if let Some(handle) = self.handle.take()
            && let Err(e) = handle.shutdown().await
        {
            errors.push(format!("node shutdown: {e}"));
        }

        // The event loop drops the swarm, and with it every listener, on exit.
        if let Some(task) = self.node_task.take()
            && let Err(e) = task.await
        {
            errors.push(format!("node task: {e}"));
        }

        if let Some(repo) = self.repo.take()
            && let Err(e) = repo.release()
        {
            errors.push(format!("repository cleanup: {e}"));
        }

        self.lifecycle.set_stopped();
        if was_running {
            metrics::counter!("relayprobe_daemons_stopped_total", "family" => "embedded")
                .increment(1);
        }

        if errors.is_empty() {
            info!(index = %self.config.index, "Embedded daemon stopped");
            Ok(())
        } else {
            let errors = errors.join("; ");
            warn!(index = %self.config.index, %errors, "Embedded daemon stopped with errors");
            Err(DaemonError::Stop(errors))
        }
    }
}
