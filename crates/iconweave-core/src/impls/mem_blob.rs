//! MemoryBlobBackend - テスト・開発用のメモリ上 Blob ストア

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;

use crate::domain::StoreError;
use crate::ports::{BlobBackend, BlobEntry};

pub struct MemoryBlobBackend {
    blobs: Mutex<BTreeMap<String, Bytes>>,
    supported: bool,
    fail_writes: AtomicBool,
    probes: AtomicUsize,
}

impl MemoryBlobBackend {
    pub fn new() -> Self {
        Self {
            blobs: Mutex::new(BTreeMap::new()),
            supported: true,
            fail_writes: AtomicBool::new(false),
            probes: AtomicUsize::new(0),
        }
    }

    /// A backend whose probe reports "not supported".
    pub fn unsupported() -> Self {
        Self {
            supported: false,
            ..Self::new()
        }
    }

    /// Make every subsequent write fail (quota exceeded, etc.).
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    pub fn paths(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Bytes>> {
        self.blobs.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for MemoryBlobBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlobBackend for MemoryBlobBackend {
    async fn probe(&self) -> bool {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.supported
    }

    async fn ensure_dir(&self, _dir: &str) -> Result<(), StoreError> {
        Ok(())
    }

    async fn read(&self, path: &str) -> Result<Option<Bytes>, StoreError> {
        Ok(self.lock().get(path).cloned())
    }

    async fn write(&self, path: &str, bytes: Bytes) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Other("write refused".to_string()));
        }
        self.lock().insert(path.to_string(), bytes);
        Ok(())
    }

    async fn remove(&self, path: &str) -> Result<(), StoreError> {
        self.lock().remove(path);
        Ok(())
    }

    async fn list(&self, dir: &str) -> Result<Vec<BlobEntry>, StoreError> {
        let prefix = format!("{}/", dir.trim_end_matches('/'));
        Ok(self
            .lock()
            .iter()
            .filter_map(|(path, bytes)| {
                let name = path.strip_prefix(&prefix)?;
                (!name.contains('/')).then(|| BlobEntry {
                    name: name.to_string(),
                    size: bytes.len() as u64,
                })
            })
            .collect())
    }

    async fn remove_dir(&self, dir: &str) -> Result<(), StoreError> {
        let prefix = format!("{}/", dir.trim_end_matches('/'));
        self.lock().retain(|path, _| !path.starts_with(&prefix));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn list_is_shallow() {
        let backend = MemoryBlobBackend::new();
        backend.write("vector/a.svg", Bytes::from_static(b"12")).await.unwrap();
        backend.write("vector/sub/b.svg", Bytes::from_static(b"1")).await.unwrap();
        backend.write("raster/c.png", Bytes::from_static(b"1")).await.unwrap();
        let listed = backend.list("vector").await.unwrap();
        assert_eq!(
            listed,
            vec![BlobEntry {
                name: "a.svg".to_string(),
                size: 2
            }]
        );
        backend.remove_dir("vector").await.unwrap();
        assert_eq!(backend.paths(), vec!["raster/c.png".to_string()]);
    }
}
