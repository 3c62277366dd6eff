//! Content store abstraction trait
//!
//! This module defines the ContentStore trait the transfer engine reads
//! upload bodies from and lands download bytes in.

use std::pin::Pin;

use assetflow_core::AssetId;
use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncRead;

/// Store operation errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("read failed: {0}")]
    ReadFailed(String),

    #[error("write failed: {0}")]
    WriteFailed(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    ConfigError(String),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Byte-addressable local store of assets, keyed by `AssetId`.
///
/// Uploads read from the store; downloads are written under a scratch id and
/// renamed over the final id once the transfer commits, so readers never see
/// a half-written object under its real name.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Check whether an object exists (regardless of size).
    async fn exists(&self, asset: &AssetId) -> StoreResult<bool>;

    /// Size in bytes of an object. `NotFound` if it does not exist.
    async fn size(&self, asset: &AssetId) -> StoreResult<u64>;

    /// Read a whole object into memory.
    async fn read(&self, asset: &AssetId) -> StoreResult<Vec<u8>>;

    /// Open an object for incremental reading (upload bodies).
    async fn reader(&self, asset: &AssetId)
        -> StoreResult<Pin<Box<dyn AsyncRead + Send + Unpin>>>;

    /// Create or replace an object with the given bytes.
    async fn write(&self, asset: &AssetId, data: &[u8]) -> StoreResult<()>;

    /// Append a chunk to an object, creating it if absent. Returns the new
    /// object size so the caller can enforce growth bounds.
    async fn append(&self, asset: &AssetId, chunk: &[u8]) -> StoreResult<u64>;

    /// Atomically move an object over another id.
    async fn rename(&self, from: &AssetId, to: &AssetId) -> StoreResult<()>;

    /// Delete an object. Deleting a missing object is not an error.
    async fn remove(&self, asset: &AssetId) -> StoreResult<()>;
}
