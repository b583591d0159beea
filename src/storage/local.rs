use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;

use super::{BlobHandle, StorageGateway, StorageScope};
use crate::acquire::ClientContext;
use crate::Result;

/// Filesystem-backed storage gateway.
///
/// Blobs live under `<root>/audio/` and `<root>/logs/`, keyed by filename.
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn blob_path(&self, key: &str, scope: StorageScope) -> PathBuf {
        self.root.join(scope.dir_name()).join(key)
    }
}

#[async_trait]
impl StorageGateway for LocalStorage {
    async fn store(
        &self,
        key: &str,
        scope: StorageScope,
        source: &Path,
        mime_type: &str,
        ctx: &ClientContext,
    ) -> Result<()> {
        let dest = self.blob_path(key, scope);
        if let Some(parent) = dest.parent() {
            fs_err::create_dir_all(parent)?;
        }

        fs_err::copy(source, &dest)
            .with_context(|| format!("failed to store blob under key {:?}", key))?;

        tracing::debug!(
            "[{}] stored {} blob {} ({})",
            ctx,
            scope.dir_name(),
            key,
            mime_type
        );
        Ok(())
    }

    async fn provide(
        &self,
        key: &str,
        scope: StorageScope,
        _ctx: &ClientContext,
    ) -> Option<BlobHandle> {
        let path = self.blob_path(key, scope);
        if !path.is_file() {
            return None;
        }

        Some(BlobHandle {
            key: key.to_string(),
            scope,
            location: path.display().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_store_then_provide() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path());
        let ctx = ClientContext::anonymous();

        let source = dir.path().join("source.m4a");
        fs_err::write(&source, b"audio").unwrap();

        storage
            .store("song-1.m4a", StorageScope::Audio, &source, "audio/m4a", &ctx)
            .await
            .unwrap();

        let handle = storage
            .provide("song-1.m4a", StorageScope::Audio, &ctx)
            .await
            .unwrap();
        assert_eq!(handle.key, "song-1.m4a");
        assert_eq!(handle.scope, StorageScope::Audio);
        assert_eq!(fs_err::read(&handle.location).unwrap(), b"audio");
    }

    #[tokio::test]
    async fn test_provide_missing_blob_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path());
        let ctx = ClientContext::anonymous();

        assert!(storage.provide("nope.m4a", StorageScope::Audio, &ctx).await.is_none());
    }

    #[tokio::test]
    async fn test_scopes_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path());
        let ctx = ClientContext::anonymous();

        let source = dir.path().join("a.log");
        fs_err::write(&source, b"log line").unwrap();

        storage
            .store("a.log", StorageScope::Log, &source, "text/plain", &ctx)
            .await
            .unwrap();

        assert!(storage.provide("a.log", StorageScope::Log, &ctx).await.is_some());
        assert!(storage.provide("a.log", StorageScope::Audio, &ctx).await.is_none());
    }
}
