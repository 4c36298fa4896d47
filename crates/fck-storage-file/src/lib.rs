//! fck-storage-file
//!
//! A durable, file-backed `StorageAdapter` for the Federated Capability
//! Kernel: one file per key under a configured root directory.
//!
//! Key bytes are opaque to this adapter (`spec.md` §6); it only decides how
//! a key string maps to a file path and how reads/writes are performed.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use async_trait::async_trait;
use fck_kernel::StorageAdapter;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File-backed implementation of [`StorageAdapter`].
///
/// Each key is mapped to a single file under `root`, sanitized so that a key
/// containing path separators or other unsafe characters cannot escape the
/// root directory.
#[derive(Debug, Clone)]
pub struct FileStorageAdapter {
    root: PathBuf,
}

impl FileStorageAdapter {
    /// Create an adapter rooted at `root`. The directory is not created
    /// until the first [`StorageAdapter::set`] call.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The root directory this adapter persists state under.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn key_path(&self, key: &str) -> PathBuf {
        let sanitized: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
            .collect();
        self.root.join(format!("{sanitized}.state"))
    }
}

#[async_trait]
impl StorageAdapter for FileStorageAdapter {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let path = self.key_path(key);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(anyhow::Error::new(e).context(format!("read state from {}", path.display()))),
        }
    }

    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let path = self.key_path(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| anyhow::Error::new(e).context(format!("create storage dir {}", parent.display())))?;
        }
        tokio::fs::write(&path, value)
            .await
            .map_err(|e| anyhow::Error::new(e).context(format!("write state to {}", path.display())))?;
        debug!(target: "fck.storage_file", path = %path.display(), bytes = value.len(), "persisted state");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_key_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = FileStorageAdapter::new(dir.path());
        assert_eq!(adapter.get("acip.kernel.state.agent-1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn set_then_get_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = FileStorageAdapter::new(dir.path());
        adapter.set("acip.kernel.state.agent-1", "{\"a\":1}").await.unwrap();
        assert_eq!(adapter.get("acip.kernel.state.agent-1").await.unwrap().as_deref(), Some("{\"a\":1}"));
    }

    #[tokio::test]
    async fn overwrite_replaces_value() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = FileStorageAdapter::new(dir.path());
        adapter.set("k", "v1").await.unwrap();
        adapter.set("k", "v2").await.unwrap();
        assert_eq!(adapter.get("k").await.unwrap().as_deref(), Some("v2"));
    }

    #[tokio::test]
    async fn distinct_keys_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = FileStorageAdapter::new(dir.path());
        adapter.set("acip.kernel.state.agent-1", "one").await.unwrap();
        adapter.set("acip.kernel.state.agent-2", "two").await.unwrap();
        assert_eq!(adapter.get("acip.kernel.state.agent-1").await.unwrap().as_deref(), Some("one"));
        assert_eq!(adapter.get("acip.kernel.state.agent-2").await.unwrap().as_deref(), Some("two"));
    }

    #[tokio::test]
    async fn path_traversal_attempt_is_sanitized_and_confined_to_root() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = FileStorageAdapter::new(dir.path());
        adapter.set("../../etc/passwd", "malicious").await.unwrap();
        let mut entries = tokio::fs::read_dir(dir.path()).await.unwrap();
        let mut saw_file = false;
        while let Some(entry) = entries.next_entry().await.unwrap() {
            assert!(entry.path().starts_with(dir.path()));
            saw_file = true;
        }
        assert!(saw_file);
    }

    #[tokio::test]
    async fn root_created_lazily_on_first_write() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("nested").join("state");
        let adapter = FileStorageAdapter::new(&nested);
        assert!(!nested.exists());
        adapter.set("k", "v").await.unwrap();
        assert!(nested.exists());
    }
}
