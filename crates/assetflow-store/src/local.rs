use std::path::{Path, PathBuf};
use std::pin::Pin;

use assetflow_core::AssetId;
use async_trait::async_trait;
use tokio::fs;
use tokio::io::{AsyncRead, AsyncWriteExt};

use crate::traits::{ContentStore, StoreError, StoreResult};

/// Local filesystem content store.
///
/// Objects live flat under the base directory as `{uuid}.{type}`; names are
/// built from the id, never from caller strings, so there is no path to
/// traverse out of.
#[derive(Clone)]
pub struct LocalContentStore {
    base_path: PathBuf,
}

impl LocalContentStore {
    /// Create a new LocalContentStore rooted at `base_path`.
    pub async fn new(base_path: impl Into<PathBuf>) -> StoreResult<Self> {
        let base_path = base_path.into();

        fs::create_dir_all(&base_path).await.map_err(|e| {
            StoreError::ConfigError(format!(
                "Failed to create store directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        Ok(LocalContentStore { base_path })
    }

    fn object_path(&self, asset: &AssetId) -> PathBuf {
        self.base_path.join(asset.object_name())
    }

    async fn path_exists(path: &Path) -> bool {
        fs::try_exists(path).await.unwrap_or(false)
    }
}

#[async_trait]
impl ContentStore for LocalContentStore {
    async fn exists(&self, asset: &AssetId) -> StoreResult<bool> {
        Ok(Self::path_exists(&self.object_path(asset)).await)
    }

    async fn size(&self, asset: &AssetId) -> StoreResult<u64> {
        let path = self.object_path(asset);
        let meta = fs::metadata(&path)
            .await
            .map_err(|_| StoreError::NotFound(asset.to_string()))?;
        Ok(meta.len())
    }

    async fn read(&self, asset: &AssetId) -> StoreResult<Vec<u8>> {
        let path = self.object_path(asset);

        if !Self::path_exists(&path).await {
            return Err(StoreError::NotFound(asset.to_string()));
        }

        let data = fs::read(&path).await.map_err(|e| {
            StoreError::ReadFailed(format!("Failed to read {}: {}", path.display(), e))
        })?;

        tracing::debug!(
            asset_id = %asset,
            size_bytes = data.len(),
            "Local store read"
        );

        Ok(data)
    }

    async fn reader(
        &self,
        asset: &AssetId,
    ) -> StoreResult<Pin<Box<dyn AsyncRead + Send + Unpin>>> {
        let path = self.object_path(asset);

        if !Self::path_exists(&path).await {
            return Err(StoreError::NotFound(asset.to_string()));
        }

        let file = fs::File::open(&path).await.map_err(|e| {
            StoreError::ReadFailed(format!("Failed to open {}: {}", path.display(), e))
        })?;

        Ok(Box::pin(file))
    }

    async fn write(&self, asset: &AssetId, data: &[u8]) -> StoreResult<()> {
        let path = self.object_path(asset);

        let mut file = fs::File::create(&path).await.map_err(|e| {
            StoreError::WriteFailed(format!("Failed to create {}: {}", path.display(), e))
        })?;

        file.write_all(data).await.map_err(|e| {
            StoreError::WriteFailed(format!("Failed to write {}: {}", path.display(), e))
        })?;

        file.sync_all().await.map_err(|e| {
            StoreError::WriteFailed(format!("Failed to sync {}: {}", path.display(), e))
        })?;

        tracing::debug!(
            asset_id = %asset,
            size_bytes = data.len(),
            "Local store write"
        );

        Ok(())
    }

    async fn append(&self, asset: &AssetId, chunk: &[u8]) -> StoreResult<u64> {
        let path = self.object_path(asset);

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| {
                StoreError::WriteFailed(format!("Failed to open {}: {}", path.display(), e))
            })?;

        file.write_all(chunk).await.map_err(|e| {
            StoreError::WriteFailed(format!("Failed to append to {}: {}", path.display(), e))
        })?;

        let meta = file.metadata().await.map_err(|e| {
            StoreError::WriteFailed(format!("Failed to stat {}: {}", path.display(), e))
        })?;

        Ok(meta.len())
    }

    async fn rename(&self, from: &AssetId, to: &AssetId) -> StoreResult<()> {
        let from_path = self.object_path(from);
        let to_path = self.object_path(to);

        if !Self::path_exists(&from_path).await {
            return Err(StoreError::NotFound(from.to_string()));
        }

        fs::rename(&from_path, &to_path).await.map_err(|e| {
            StoreError::WriteFailed(format!(
                "Failed to rename {} to {}: {}",
                from_path.display(),
                to_path.display(),
                e
            ))
        })?;

        tracing::debug!(from = %from, to = %to, "Local store rename");

        Ok(())
    }

    async fn remove(&self, asset: &AssetId) -> StoreResult<()> {
        let path = self.object_path(asset);

        if !Self::path_exists(&path).await {
            return Ok(());
        }

        fs::remove_file(&path).await.map_err(|e| {
            StoreError::WriteFailed(format!("Failed to delete {}: {}", path.display(), e))
        })?;

        Ok(())
    }
}
