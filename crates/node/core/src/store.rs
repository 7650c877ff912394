//! On-disk block store.
//!
//! A repository is a directory with a `blocks/` subdirectory holding one file
//! per stored block, named by the hex [`ContentRef`] of its contents. Blocks
//! are immutable, so writing an existing block is a no-op.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use bytes::Bytes;
use relayprobe_node_api::ContentRef;
use tracing::debug;

const BLOCKS_DIR: &str = "blocks";

/// Errors from the block store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// `open` was asked for a repository that was never initialized.
    #[error("no repository at {0}")]
    Missing(PathBuf),
    /// `init` was asked to create a repository over an existing one.
    #[error("repository already initialized at {0}")]
    AlreadyInitialized(PathBuf),
    #[error("block store I/O at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl StoreError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Content-addressed block storage rooted at a repository directory.
#[derive(Debug)]
pub struct BlockStore {
    root: PathBuf,
}

impl BlockStore {
    /// Create a fresh repository at `root`.
    ///
    /// `root` may exist, but must not already contain a repository.
    pub fn init(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        let blocks = root.join(BLOCKS_DIR);
        if blocks.is_dir() {
            return Err(StoreError::AlreadyInitialized(root));
        }
        fs::create_dir_all(&blocks).map_err(|e| StoreError::io(&blocks, e))?;
        debug!(root = %root.display(), "Initialized repository");
        Ok(Self { root })
    }

    /// Open the existing repository at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        if !root.join(BLOCKS_DIR).is_dir() {
            return Err(StoreError::Missing(root));
        }
        Ok(Self { root })
    }

    /// Open `root`, initializing it first when `initialize` is set.
    pub fn prepare(root: impl Into<PathBuf>, initialize: bool) -> Result<Self, StoreError> {
        if initialize {
            Self::init(root)
        } else {
            Self::open(root)
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn block_path(&self, reference: &ContentRef) -> PathBuf {
        self.root.join(BLOCKS_DIR).join(reference.to_string())
    }

    /// Store `data`, returning its reference.
    pub fn put(&self, data: &[u8]) -> Result<ContentRef, StoreError> {
        let reference = ContentRef::for_content(data);
        let path = self.block_path(&reference);
        if path.exists() {
            return Ok(reference);
        }

        // Write under a temporary name so readers never see a partial block.
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, data).map_err(|e| StoreError::io(&tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| StoreError::io(&path, e))?;

        debug!(%reference, len = data.len(), "Stored block");
        Ok(reference)
    }

    /// Load the block for `reference`, if stored.
    pub fn get(&self, reference: &ContentRef) -> Result<Option<Bytes>, StoreError> {
        let path = self.block_path(reference);
        match fs::read(&path) {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::io(&path, e)),
        }
    }

    pub fn contains(&self, reference: &ContentRef) -> bool {
        self.block_path(reference).is_file()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn test_put_then_get() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlockStore::init(dir.path()).unwrap();

        let reference = store.put(b"hello relay").unwrap();
        assert!(store.contains(&reference));
        assert_eq!(&store.get(&reference).unwrap().unwrap()[..], b"hello relay");

        // Idempotent.
        assert_eq!(store.put(b"hello relay").unwrap(), reference);
    }

    #[test]
    fn test_unknown_reference() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlockStore::init(dir.path()).unwrap();
        let missing = ContentRef::for_content(b"never stored");
        assert!(store.get(&missing).unwrap().is_none());
    }

    #[test]
    fn test_open_requires_existing_repo() {
        let dir = tempfile::tempdir().unwrap();
        assert_matches!(BlockStore::open(dir.path()), Err(StoreError::Missing(_)));

        let reference = BlockStore::init(dir.path()).unwrap().put(b"kept").unwrap();
        let reopened = BlockStore::prepare(dir.path(), false).unwrap();
        assert!(reopened.contains(&reference));
    }

    #[test]
    fn test_init_refuses_existing_repo() {
        let dir = tempfile::tempdir().unwrap();
        BlockStore::init(dir.path()).unwrap();
        assert_matches!(
            BlockStore::prepare(dir.path(), true),
            Err(StoreError::AlreadyInitialized(_))
        );
    }
}
