//! `relayprobe daemon`: the process behind a spawned daemon handle.

use eyre::Result;
use relayprobe_daemon::{Daemon, EmbeddedDaemon};
use tracing::{info, warn};

use crate::cli::DaemonArgs;

pub(crate) async fn run(args: DaemonArgs) -> Result<()> {
    let config = super::node_config(&args.node);
    info!(index = %config.index, kind = %config.kind, family = %config.family, "Starting daemon");

    let mut daemon = EmbeddedDaemon::new(config);
    if let Some(repo) = &args.repo {
        daemon = daemon.with_repo(repo);
    }

    if let Err(e) = daemon.start(args.init).await {
        // Release whatever the failed start acquired before reporting it.
        if let Err(stop) = daemon.stop().await {
            warn!(error = %stop, "Cleanup after failed start");
        }
        return Err(e.into());
    }

    tokio::select! {
        () = daemon.wait_for_exit() => info!("Node stopped"),
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("Interrupted");
        }
    }

    daemon.stop().await?;
    Ok(())
}
