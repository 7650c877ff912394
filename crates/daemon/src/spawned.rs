use std::{
    path::{Path, PathBuf},
    process::Stdio,
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use eyre::eyre;
use relayprobe_node_api::{NodeControl, PeerIdentity};
use relayprobe_node_config::NodeConfig;
use relayprobe_rpc_client::ApiClient;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::{Daemon, DaemonError, DaemonState, lifecycle::Lifecycle, repo::RepoDir};

/// How to launch external daemons.
#[derive(Debug, Clone)]
pub struct SpawnConfig {
    /// Executable providing the `daemon` subcommand.
    pub program: PathBuf,
    /// Pass the child's stdout/stderr through instead of discarding them.
    pub inherit_output: bool,
    /// Interval between control API probes while starting.
    pub poll_interval: Duration,
    /// Bound on a single control API probe.
    pub probe_timeout: Duration,
    /// Time a child gets to exit after a shutdown request before it is killed.
    pub stop_grace: Duration,
    /// Global flags passed ahead of the subcommand, e.g. logging options.
    pub global_args: Vec<String>,
}

impl SpawnConfig {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            inherit_output: true,
            poll_interval: Duration::from_millis(100),
            probe_timeout: Duration::from_secs(1),
            stop_grace: Duration::from_secs(5),
            global_args: Vec::new(),
        }
    }

    /// Re-launch the running executable.
    pub fn current_exe() -> std::io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?))
    }

    pub fn inherit_output(mut self, inherit: bool) -> Self {
        self.inherit_output = inherit;
        self
    }

    pub fn with_global_args(mut self, args: impl IntoIterator<Item = String>) -> Self {
        self.global_args.extend(args);
        self
    }

    fn command(&self, config: &NodeConfig, repo: &Path, initialize_storage: bool) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.global_args)
            .arg("daemon")
            .arg("--index")
            .arg(config.index.get().to_string())
            .arg("--kind")
            .arg(config.kind.to_string())
            .arg("--family")
            .arg(config.family.to_string())
            .arg("--repo")
            .arg(repo);
        if initialize_storage {
            command.arg("--init");
        }

        // RUST_LOG is inherited with the rest of the environment.
        command.stdin(Stdio::null()).kill_on_drop(true);
        if !self.inherit_output {
            command.stdout(Stdio::null()).stderr(Stdio::null());
        }
        command
    }
}

/// A node running in a child process, driven over its control API.
pub struct SpawnedDaemon {
    config: NodeConfig,
    spawn: SpawnConfig,
    lifecycle: Lifecycle,
    repo_path: Option<PathBuf>,

    repo: Option<RepoDir>,
    child: Option<Child>,
    client: Option<ApiClient>,
}

impl SpawnedDaemon {
    pub fn new(config: NodeConfig, spawn: SpawnConfig) -> Self {
        Self {
            config,
            spawn,
            lifecycle: Lifecycle::default(),
            repo_path: None,
            repo: None,
            child: None,
            client: None,
        }
    }

    /// Keep the repository in `path` instead of a private temporary directory.
    pub fn with_repo(mut self, path: impl AsRef<Path>) -> Self {
        self.repo_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// OS process id of the child, while it runs.
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(Child::id)
    }

    async fn launch(&mut self, initialize_storage: bool) -> Result<(), DaemonError> {
        let client = ApiClient::from_multiaddr(&self.config.addresses.api)
            .map_err(|e| DaemonError::Start(e.into()))?;

        let repo = RepoDir::for_config(&self.config, self.repo_path.as_deref())?;
        let mut command = self.spawn.command(&self.config, repo.path(), initialize_storage);
        self.repo = Some(repo);

        let child = command
            .spawn()
            .map_err(|e| DaemonError::Start(eyre!("failed to spawn {:?}: {e}", self.spawn.program)))?;
        debug!(index = %self.config.index, pid = ?child.id(), "Spawned daemon process");
        self.child = Some(child);
        self.client = Some(client.clone());

        // The child binds its API only once its node is live.
        loop {
            if let Some(child) = self.child.as_mut()
                && let Some(status) = child.try_wait()?
            {
                return Err(DaemonError::Start(eyre!(
                    "daemon exited with {status} before its API came up"
                )));
            }
            if let Ok(true) = tokio::time::timeout(self.spawn.probe_timeout, client.is_reachable()).await {
                return Ok(());
            }
            tokio::time::sleep(self.spawn.poll_interval).await;
        }
    }

    /// Ask the child to shut down, then wait for it, killing it after the grace period.
    async fn stop_child(&mut self, errors: &mut Vec<String>) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        let client = self.client.take();

        let exited = matches!(child.try_wait(), Ok(Some(_)));
        if !exited && let Some(client) = client {
            match tokio::time::timeout(self.spawn.stop_grace, client.shutdown()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!(%e, "Shutdown request failed"),
                Err(_) => debug!("Shutdown request timed out"),
            }
        }

        match tokio::time::timeout(self.spawn.stop_grace, child.wait()).await {
            Ok(Ok(status)) if status.success() => {}
            // Exited on its own before stop; its failure was reported by start.
            Ok(Ok(status)) if exited => debug!(%status, "Daemon had already exited"),
            Ok(Ok(status)) => errors.push(format!("daemon exited with {status}")),
            Ok(Err(e)) => errors.push(format!("waiting for daemon: {e}")),
            Err(_) => {
                warn!(index = %self.config.index, "Daemon ignored shutdown, killing");
                if let Err(e) = child.kill().await {
                    errors.push(format!("kill: {e}"));
                } else {
                    errors.push("daemon killed after grace period".to_string());
                }
            }
        }
    }
}

#[async_trait]
impl Daemon for SpawnedDaemon {
    fn config(&self) -> &NodeConfig {
        &self.config
    }

    fn state(&self) -> DaemonState {
        self.lifecycle.state()
    }

    async fn start(&mut self, initialize_storage: bool) -> Result<(), DaemonError> {
        self.lifecycle.begin_start()?;
        info!(
            index = %self.config.index,
            kind = %self.config.kind,
            program = ?self.spawn.program,
            "Starting spawned daemon"
        );

        self.launch(initialize_storage).await?;

        self.lifecycle.set_running();
        metrics::counter!("relayprobe_daemons_started_total", "family" => "external").increment(1);
        info!(index = %self.config.index, pid = ?self.pid(), "Spawned daemon running");
        Ok(())
    }

    async fn identity(&mut self) -> Result<PeerIdentity, DaemonError> {
        if let Some(identity) = self.lifecycle.cached_identity() {
            return Ok(identity.clone());
        }
        self.lifecycle.ensure_running()?;
        let client = self.client.as_ref().ok_or(DaemonError::NotRunning)?;
        let identity = client.identity().await.map_err(DaemonError::Identity)?;
        self.lifecycle.cache_identity(identity.clone());
        Ok(identity)
    }

    fn control(&self) -> Option<Arc<dyn NodeControl>> {
        if self.lifecycle.state() != DaemonState::Running {
            return None;
        }
        self.client
            .clone()
            .map(|client| Arc::new(client) as Arc<dyn NodeControl>)
    }

    async fn stop(&mut self) -> Result<(), DaemonError> {
        if self.child.is_none() && self.repo.is_none() {
            self.lifecycle.set_stopped();
            return Ok(());
        }

        let was_running = self.lifecycle.state() == DaemonState::Running;
        self.lifecycle.begin_stop();
        debug!(index = %self.config.index, pid = ?self.pid(), "Stopping spawned daemon");

        let mut errors = Vec::new();
        self.stop_child(&mut errors).await;

        if let Some(repo) = self.repo.take()
            && let Err(e) = repo.release()
        {
            errors.push(format!("repository cleanup: {e}"));
        }

        self.lifecycle.set_stopped();
        if was_running {
            metrics::counter!("relayprobe_daemons_stopped_total", "family" => "external")
                .increment(1);
        }

        if errors.is_empty() {
            info!(index = %self.config.index, "Spawned daemon stopped");
            Ok(())
        } else {
            let errors = errors.join("; ");
            warn!(index = %self.config.index, %errors, "Spawned daemon stopped with errors");
            Err(DaemonError::Stop(errors))
        }
    }
}
