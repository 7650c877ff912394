use std::{
    io,
    path::{Path, PathBuf},
};

use relayprobe_node_config::NodeConfig;
use tempfile::TempDir;

/// Directory holding a daemon's block repository.
#[derive(Debug)]
pub(crate) enum RepoDir {
    /// Private to the handle and removed on release.
    Temp(TempDir),
    /// Supplied by the caller and left in place.
    Existing(PathBuf),
}

impl RepoDir {
    pub(crate) fn for_config(config: &NodeConfig, existing: Option<&Path>) -> io::Result<Self> {
        match existing {
            Some(path) => Ok(Self::Existing(path.to_path_buf())),
            None => tempfile::Builder::new()
                .prefix(&format!("relayprobe-{}-{}-", config.family, config.index))
                .tempdir()
                .map(Self::Temp),
        }
    }

    pub(crate) fn path(&self) -> &Path {
        match self {
            Self::Temp(dir) => dir.path(),
            Self::Existing(path) => path,
        }
    }

    pub(crate) fn release(self) -> io::Result<()> {
        match self {
            Self::Temp(dir) => dir.close(),
            Self::Existing(_) => Ok(()),
        }
    }
}
