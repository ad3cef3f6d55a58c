//! FsBlobBackend - ディレクトリを root とするファイルシステム Blob ストア
//!
//! 書き込みは temp + rename で atomic にする。

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;

use crate::domain::StoreError;
use crate::ports::{BlobBackend, BlobEntry};

pub struct FsBlobBackend {
    root: PathBuf,
}

impl FsBlobBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Relative `/`-separated path -> absolute path under root.
    /// Rejects anything that could climb out of the root.
    fn resolve(&self, rel: &str) -> Result<PathBuf, StoreError> {
        let mut path = self.root.clone();
        for part in rel.split('/').filter(|p| !p.is_empty()) {
            if part == ".." || part == "." || part.contains('\\') {
                return Err(StoreError::Other(format!("illegal path segment in {rel}")));
            }
            path.push(part);
        }
        Ok(path)
    }
}

#[async_trait]
impl BlobBackend for FsBlobBackend {
    async fn probe(&self) -> bool {
        tokio::fs::create_dir_all(&self.root).await.is_ok()
    }

    async fn ensure_dir(&self, dir: &str) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(self.resolve(dir)?).await?;
        Ok(())
    }

    async fn read(&self, path: &str) -> Result<Option<Bytes>, StoreError> {
        match tokio::fs::read(self.resolve(path)?).await {
            Ok(bytes) => Ok(Some(Bytes::from(bytes))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, path: &str, bytes: Bytes) -> Result<(), StoreError> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut temp = target.clone().into_os_string();
        temp.push(".tmp");
        let temp = PathBuf::from(temp);
        tokio::fs::write(&temp, &bytes).await?;
        tokio::fs::rename(&temp, &target).await?;
        Ok(())
    }

    async fn remove(&self, path: &str) -> Result<(), StoreError> {
        match tokio::fs::remove_file(self.resolve(path)?).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, dir: &str) -> Result<Vec<BlobEntry>, StoreError> {
        let mut entries = Vec::new();
        let mut reader = match tokio::fs::read_dir(self.resolve(dir)?).await {
            Ok(reader) => reader,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(entries),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = reader.next_entry().await? {
            let meta = entry.metadata().await?;
            if !meta.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(".tmp") {
                continue;
            }
            entries.push(BlobEntry {
                name,
                size: meta.len(),
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn remove_dir(&self, dir: &str) -> Result<(), StoreError> {
        match tokio::fs::remove_dir_all(self.resolve(dir)?).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
