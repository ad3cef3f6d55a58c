//! Persistent tiered store.
//!
//! Layout under the backend root:
//!
//! ```text
//! .cache-meta.json        { version, created, lastAccess }
//! vector/<key>.svg        vector originals
//! raster/<key>@<n>.png    rasterized variants, one per size bucket
//! ```
//!
//! # 設計原則
//! - これは最適化層であって正しさの依存先ではない。失敗はすべて `false` / `None`
//! - 初期化は `OnceCell` で memoize し、同時に来た最初の呼び出しは同じ future を共有
//! - backend が無い、または probe に失敗したら以後すべて即座に no-op

mod filename;
mod meta;

use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::config::StoreConfig;
use crate::domain::{StoreError, looks_like_vector};
use crate::ports::{BlobBackend, Clock};

pub use self::filename::{BlobKey, Namespace, sanitize};
pub use self::meta::{EvictReason, META_FILE, StoreMetadata};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub vector_count: usize,
    pub raster_count: usize,
    pub total_size: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RepairReport {
    pub scanned: usize,
    pub removed: usize,
}

pub struct TieredStore {
    backend: Option<Arc<dyn BlobBackend>>,
    clock: Arc<dyn Clock>,
    config: StoreConfig,
    ready: OnceCell<bool>,
}

impl TieredStore {
    /// `backend = None` means the host has no persistent storage.
    pub fn new(
        backend: Option<Arc<dyn BlobBackend>>,
        clock: Arc<dyn Clock>,
        config: StoreConfig,
    ) -> Self {
        Self {
            backend,
            clock,
            config,
            ready: OnceCell::new(),
        }
    }

    pub fn unsupported(clock: Arc<dyn Clock>) -> Self {
        Self::new(None, clock, StoreConfig::default())
    }

    /// Open the store, evicting it wholesale when stale. Memoized.
    pub async fn init(&self) -> bool {
        *self.ready.get_or_init(|| self.open()).await
    }

    async fn open(&self) -> bool {
        let Some(backend) = self.backend.as_deref() else {
            debug!("persistent store unsupported: no backend");
            return false;
        };
        if !backend.probe().await {
            debug!("persistent store unsupported: probe failed");
            return false;
        }
        match self.open_inner(backend).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "persistent store init failed");
                false
            }
        }
    }

    async fn open_inner(&self, backend: &dyn BlobBackend) -> Result<(), StoreError> {
        for ns in Namespace::ALL {
            backend.ensure_dir(ns.dir()).await?;
        }
        let now = self.clock.now_millis();
        let existing = match backend.read(META_FILE).await? {
            None => None,
            Some(raw) => Some(serde_json::from_slice::<StoreMetadata>(&raw).map_err(|_| ())),
        };

        let (evict, meta) = match existing {
            None => (None, StoreMetadata::fresh(self.config.version, now)),
            Some(Err(())) => (
                Some(EvictReason::Malformed),
                StoreMetadata::fresh(self.config.version, now),
            ),
            Some(Ok(meta)) => match self.evict_reason(backend, &meta, now).await? {
                Some(reason) => (Some(reason), StoreMetadata::fresh(self.config.version, now)),
                None => (None, meta.touched(now)),
            },
        };

        if let Some(reason) = evict {
            info!(?reason, "evicting persistent store");
            self.wipe(backend).await?;
        }
        write_meta(backend, &meta).await
    }

    async fn evict_reason(
        &self,
        backend: &dyn BlobBackend,
        meta: &StoreMetadata,
        now: i64,
    ) -> Result<Option<EvictReason>, StoreError> {
        if meta.version != self.config.version {
            return Ok(Some(EvictReason::VersionMismatch {
                found: meta.version,
                expected: self.config.version,
            }));
        }
        let idle_ms = now - meta.last_access;
        let max_age_ms =
            i64::try_from(self.config.max_age_secs.saturating_mul(1000)).unwrap_or(i64::MAX);
        if idle_ms > max_age_ms {
            return Ok(Some(EvictReason::Expired { idle_ms }));
        }
        let bytes = scan(backend).await?.total_size;
        if bytes > self.config.max_size_bytes {
            return Ok(Some(EvictReason::OverSize { bytes }));
        }
        Ok(None)
    }

    async fn wipe(&self, backend: &dyn BlobBackend) -> Result<(), StoreError> {
        for ns in Namespace::ALL {
            backend.remove_dir(ns.dir()).await?;
            backend.ensure_dir(ns.dir()).await?;
        }
        Ok(())
    }

    async fn ready_backend(&self) -> Option<&dyn BlobBackend> {
        if self.init().await {
            self.backend.as_deref()
        } else {
            None
        }
    }

    pub async fn put(&self, key: &BlobKey, bytes: Bytes) -> bool {
        let Some(backend) = self.ready_backend().await else {
            return false;
        };
        let path = key.path(self.config.max_filename_len);
        match backend.write(&path, bytes).await {
            Ok(()) => true,
            Err(e) => {
                debug!(path, error = %e, "store put failed");
                false
            }
        }
    }

    pub async fn get(&self, key: &BlobKey) -> Option<Bytes> {
        let backend = self.ready_backend().await?;
        let path = key.path(self.config.max_filename_len);
        match backend.read(&path).await {
            Ok(hit) => hit,
            Err(e) => {
                debug!(path, error = %e, "store get failed");
                None
            }
        }
    }

    pub async fn has(&self, key: &BlobKey) -> bool {
        self.get(key).await.is_some()
    }

    pub async fn remove(&self, key: &BlobKey) -> bool {
        let Some(backend) = self.ready_backend().await else {
            return false;
        };
        let path = key.path(self.config.max_filename_len);
        match backend.remove(&path).await {
            Ok(()) => true,
            Err(e) => {
                debug!(path, error = %e, "store remove failed");
                false
            }
        }
    }

    /// Empty both namespaces, keep the metadata record, and re-stamp it.
    pub async fn clear(&self) -> bool {
        let Some(backend) = self.ready_backend().await else {
            return false;
        };
        let now = self.clock.now_millis();
        let result = async {
            self.wipe(backend).await?;
            let meta = match backend.read(META_FILE).await? {
                Some(raw) => serde_json::from_slice::<StoreMetadata>(&raw)
                    .map(|m| m.touched(now))
                    .unwrap_or_else(|_| StoreMetadata::fresh(self.config.version, now)),
                None => StoreMetadata::fresh(self.config.version, now),
            };
            write_meta(backend, &meta).await
        }
        .await;
        match result {
            Ok(()) => {
                info!("persistent store cleared");
                true
            }
            Err(e) => {
                warn!(error = %e, "store clear failed");
                false
            }
        }
    }

    pub async fn stats(&self) -> StoreStats {
        let Some(backend) = self.ready_backend().await else {
            return StoreStats::default();
        };
        scan(backend).await.unwrap_or_default()
    }

    pub async fn metadata(&self) -> Option<StoreMetadata> {
        let backend = self.ready_backend().await?;
        let raw = backend.read(META_FILE).await.ok()??;
        serde_json::from_slice(&raw).ok()
    }

    /// Remove entries that cannot possibly be valid.
    ///
    /// Vectors must be non-empty and start with vector markup; rasters must
    /// be non-empty.
    pub async fn validate_and_repair(&self) -> RepairReport {
        let mut report = RepairReport::default();
        let Some(backend) = self.ready_backend().await else {
            return report;
        };
        for ns in Namespace::ALL {
            let entries = match backend.list(ns.dir()).await {
                Ok(entries) => entries,
                Err(e) => {
                    debug!(namespace = %ns, error = %e, "scrub listing failed");
                    continue;
                }
            };
            for entry in entries {
                report.scanned += 1;
                let path = format!("{}/{}", ns.dir(), entry.name);
                let corrupted = match backend.read(&path).await {
                    Ok(Some(bytes)) => match ns {
                        Namespace::Vector => bytes.is_empty() || !looks_like_vector(&bytes),
                        Namespace::Raster => bytes.is_empty(),
                    },
                    Ok(None) => false,
                    Err(_) => true,
                };
                if corrupted && backend.remove(&path).await.is_ok() {
                    report.removed += 1;
                    warn!(path, "removed corrupted store entry");
                }
            }
        }
        report
    }

    /// Run the scrub in the background once init has completed.
    pub fn spawn_repair(self: &Arc<Self>) -> tokio::task::JoinHandle<RepairReport> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let report = store.validate_and_repair().await;
            if report.removed > 0 {
                info!(scanned = report.scanned, removed = report.removed, "store scrub finished");
            }
            report
        })
    }
}

async fn write_meta(backend: &dyn BlobBackend, meta: &StoreMetadata) -> Result<(), StoreError> {
    let raw = serde_json::to_vec(meta)?;
    backend.write(META_FILE, Bytes::from(raw)).await
}

async fn scan(backend: &dyn BlobBackend) -> Result<StoreStats, StoreError> {
    let mut stats = StoreStats::default();
    for ns in Namespace::ALL {
        let entries = backend.list(ns.dir()).await?;
        match ns {
            Namespace::Vector => stats.vector_count = entries.len(),
            Namespace::Raster => stats.raster_count = entries.len(),
        }
        stats.total_size += entries.iter().map(|e| e.size).sum::<u64>();
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::MemoryBlobBackend;
    use crate::ports::FixedClock;
    use chrono::{Duration, TimeZone, Utc};

    fn clock() -> Arc<FixedClock> {
        Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap(),
        ))
    }

    fn store_with(backend: Arc<MemoryBlobBackend>, clock: Arc<FixedClock>) -> TieredStore {
        TieredStore::new(Some(backend), clock, StoreConfig::default())
    }

    async fn seed(backend: &MemoryBlobBackend, meta: StoreMetadata) {
        backend
            .write(META_FILE, Bytes::from(serde_json::to_vec(&meta).unwrap()))
            .await
            .unwrap();
        backend
            .write("vector/old.svg", Bytes::from_static(b"<svg/>"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn put_get_remove() {
        let store = store_with(Arc::new(MemoryBlobBackend::new()), clock());
        let key = BlobKey::vector("https://app.example/a.svg");
        assert!(store.put(&key, Bytes::from_static(b"<svg/>")).await);
        assert_eq!(store.get(&key).await.unwrap(), Bytes::from_static(b"<svg/>"));
        assert!(store.has(&key).await);
        assert!(store.remove(&key).await);
        assert!(!store.has(&key).await);
    }

    #[tokio::test]
    async fn raster_buckets_are_separate_entries() {
        let store = store_with(Arc::new(MemoryBlobBackend::new()), clock());
        store.put(&BlobKey::raster("k", 32), Bytes::from_static(b"a")).await;
        store.put(&BlobKey::raster("k", 64), Bytes::from_static(b"bb")).await;
        assert_eq!(store.get(&BlobKey::raster("k", 64)).await.unwrap().len(), 2);
        let stats = store.stats().await;
        assert_eq!(stats.raster_count, 2);
        assert_eq!(stats.vector_count, 0);
        assert_eq!(stats.total_size, 3);
    }

    #[tokio::test]
    async fn unsupported_store_is_a_noop() {
        let store = TieredStore::unsupported(clock());
        assert!(!store.init().await);
        assert!(!store.put(&BlobKey::vector("k"), Bytes::from_static(b"<svg/>")).await);
        assert!(store.get(&BlobKey::vector("k")).await.is_none());
        assert!(!store.clear().await);
        assert_eq!(store.stats().await, StoreStats::default());
    }

    #[tokio::test]
    async fn failed_probe_disables_store() {
        let backend = Arc::new(MemoryBlobBackend::unsupported());
        let store = store_with(backend, clock());
        assert!(!store.init().await);
        assert!(!store.put(&BlobKey::vector("k"), Bytes::from_static(b"<svg/>")).await);
    }

    #[tokio::test]
    async fn write_failures_degrade_to_false() {
        let backend = Arc::new(MemoryBlobBackend::new());
        let store = store_with(Arc::clone(&backend), clock());
        assert!(store.init().await);
        backend.fail_writes(true);
        assert!(!store.put(&BlobKey::vector("k"), Bytes::from_static(b"<svg/>")).await);
    }

    #[tokio::test]
    async fn stale_version_is_evicted() {
        let backend = Arc::new(MemoryBlobBackend::new());
        let clock = clock();
        seed(&backend, StoreMetadata::fresh(1, clock.now_millis())).await;
        let store = store_with(Arc::clone(&backend), Arc::clone(&clock));
        assert!(store.init().await);
        assert!(!store.has(&BlobKey::vector("old")).await);
        assert_eq!(store.metadata().await.unwrap().version, 2);
    }

    #[tokio::test]
    async fn idle_store_is_evicted() {
        let backend = Arc::new(MemoryBlobBackend::new());
        let clock = clock();
        seed(&backend, StoreMetadata::fresh(2, clock.now_millis())).await;
        clock.advance(Duration::days(8));
        let store = store_with(Arc::clone(&backend), Arc::clone(&clock));
        assert!(store.init().await);
        assert_eq!(store.stats().await.vector_count, 0);
    }

    #[tokio::test]
    async fn oversized_store_is_evicted() {
        let backend = Arc::new(MemoryBlobBackend::new());
        let clock = clock();
        seed(&backend, StoreMetadata::fresh(2, clock.now_millis())).await;
        let config = StoreConfig {
            max_size_bytes: 4,
            ..StoreConfig::default()
        };
        let store = TieredStore::new(Some(backend), clock, config);
        assert!(store.init().await);
        assert_eq!(store.stats().await.vector_count, 0);
    }

    #[tokio::test]
    async fn healthy_store_is_kept_and_touched() {
        let backend = Arc::new(MemoryBlobBackend::new());
        let clock = clock();
        let created = clock.now_millis();
        seed(&backend, StoreMetadata::fresh(2, created)).await;
        clock.advance(Duration::hours(1));
        let store = store_with(Arc::clone(&backend), Arc::clone(&clock));
        assert!(store.init().await);
        assert!(store.has(&BlobKey::vector("old")).await);
        let meta = store.metadata().await.unwrap();
        assert_eq!(meta.created, created);
        assert_eq!(meta.last_access, clock.now_millis());
    }

    #[tokio::test]
    async fn malformed_metadata_is_evicted() {
        let backend = Arc::new(MemoryBlobBackend::new());
        backend
            .write(META_FILE, Bytes::from_static(b"{not json"))
            .await
            .unwrap();
        backend
            .write("vector/old.svg", Bytes::from_static(b"<svg/>"))
            .await
            .unwrap();
        let store = store_with(Arc::clone(&backend), clock());
        assert!(store.init().await);
        assert_eq!(store.stats().await.vector_count, 0);
        assert!(store.metadata().await.is_some());
    }

    #[tokio::test]
    async fn concurrent_init_opens_once() {
        let backend = Arc::new(MemoryBlobBackend::new());
        let store = Arc::new(store_with(Arc::clone(&backend), clock()));
        let (a, b) = tokio::join!(store.init(), store.init());
        assert!(a && b);
        assert_eq!(backend.probe_count(), 1);
    }

    #[tokio::test]
    async fn clear_keeps_metadata() {
        let backend = Arc::new(MemoryBlobBackend::new());
        let store = store_with(Arc::clone(&backend), clock());
        store.put(&BlobKey::vector("a"), Bytes::from_static(b"<svg/>")).await;
        store.put(&BlobKey::raster("a", 32), Bytes::from_static(b"png")).await;
        let created = store.metadata().await.unwrap().created;
        assert!(store.clear().await);
        assert_eq!(store.stats().await, StoreStats::default());
        assert_eq!(store.metadata().await.unwrap().created, created);
    }

    #[tokio::test]
    async fn scrub_removes_corrupted_entries() {
        let backend = Arc::new(MemoryBlobBackend::new());
        let store = Arc::new(store_with(Arc::clone(&backend), clock()));
        store.put(&BlobKey::vector("good"), Bytes::from_static(b"<svg/>")).await;
        store.put(&BlobKey::vector("html"), Bytes::from_static(b"<html>")).await;
        store.put(&BlobKey::vector("empty"), Bytes::new()).await;
        store.put(&BlobKey::raster("good", 32), Bytes::from_static(b"png")).await;
        store.put(&BlobKey::raster("empty", 32), Bytes::new()).await;

        let report = store.spawn_repair().await.unwrap();
        assert_eq!(report.scanned, 5);
        assert_eq!(report.removed, 3);
        assert!(store.has(&BlobKey::vector("good")).await);
        assert!(!store.has(&BlobKey::vector("html")).await);
        assert!(store.has(&BlobKey::raster("good", 32)).await);
        assert!(!store.has(&BlobKey::raster("empty", 32)).await);
    }
}
