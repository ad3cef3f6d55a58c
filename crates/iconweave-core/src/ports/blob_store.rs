//! BlobBackend port - 名前空間付きの永続 Blob ストレージ
//!
//! パスは root からの相対（`vector/foo.svg` のような `/` 区切り）。
//! TieredStore がこの上に version / eviction / scrub を載せる。

use async_trait::async_trait;
use bytes::Bytes;

use crate::domain::StoreError;

/// One entry from `list`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobEntry {
    pub name: String,
    pub size: u64,
}

#[async_trait]
pub trait BlobBackend: Send + Sync {
    /// Feature detection: can this host persist anything at all?
    async fn probe(&self) -> bool;

    /// Make sure a directory exists.
    async fn ensure_dir(&self, dir: &str) -> Result<(), StoreError>;

    /// `Ok(None)` when the entry does not exist.
    async fn read(&self, path: &str) -> Result<Option<Bytes>, StoreError>;

    async fn write(&self, path: &str, bytes: Bytes) -> Result<(), StoreError>;

    /// Removing a missing entry is not an error.
    async fn remove(&self, path: &str) -> Result<(), StoreError>;

    /// Direct children of `dir` (files only).
    async fn list(&self, dir: &str) -> Result<Vec<BlobEntry>, StoreError>;

    /// Recursively remove `dir` and everything under it.
    async fn remove_dir(&self, dir: &str) -> Result<(), StoreError>;
}
