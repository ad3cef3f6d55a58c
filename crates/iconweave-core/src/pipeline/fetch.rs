//! VectorLoader - vector の取得・検証・キャッシュ
//!
//! # 解決順序
//! 1. メモリキャッシュ（canonical URL → Representation）
//! 2. 永続ストア（`vector/` 名前空間、canonical URL がキー）
//! 3. 候補 URL を順番に取得（proxy → 元 URL → mirror）
//! 4. 失敗時: Permanent / Validation は再試行しない、Transient は RetryScheduler へ
//! 5. それでも駄目なら、ストアの古いコピー、最後に FALLBACK_SVG
//!
//! `load_vector` は決して失敗しない。常に描画可能な Representation を返す。

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use futures::future::BoxFuture;
use tracing::{debug, info, warn};
use url::Url;

use super::inflight::InFlight;
use crate::config::FetchConfig;
use crate::domain::{
    AssetPayload, FetchError, Producer, Reference, Representation, extract_urls,
    fallback_representation, looks_like_vector,
};
use crate::normalize::{CanonicalUrl, UrlNormalizer};
use crate::observability::Counters;
use crate::ports::{Fetcher, ProxyPolicy};
use crate::retry::{RetryDescriptor, RetryScheduler};
use crate::store::{BlobKey, TieredStore};

pub struct VectorLoader {
    normalizer: Arc<UrlNormalizer>,
    fetcher: Arc<dyn Fetcher>,
    store: Arc<TieredStore>,
    retry: RetryScheduler<Bytes>,
    proxy_policy: ProxyPolicy,
    config: FetchConfig,
    memory: Mutex<HashMap<CanonicalUrl, Representation>>,
    inflight: InFlight<CanonicalUrl, Representation>,
    counters: Arc<Counters>,
}

impl VectorLoader {
    pub(crate) fn new(
        normalizer: Arc<UrlNormalizer>,
        fetcher: Arc<dyn Fetcher>,
        store: Arc<TieredStore>,
        retry: RetryScheduler<Bytes>,
        proxy_policy: ProxyPolicy,
        config: FetchConfig,
        counters: Arc<Counters>,
    ) -> Self {
        Self {
            normalizer,
            fetcher,
            store,
            retry,
            proxy_policy,
            config,
            memory: Mutex::new(HashMap::new()),
            inflight: InFlight::new(),
            counters,
        }
    }

    /// Resolve any reference into something renderable.
    pub async fn load_vector(self: &Arc<Self>, reference: Reference) -> Representation {
        match reference {
            Reference::Path(raw) => self.load_path(&raw).await,
            Reference::Inline(bytes) => self.load_inline(bytes),
            Reference::Producer(producer) => self.load_produced(producer).await,
        }
    }

    async fn load_path(self: &Arc<Self>, raw: &str) -> Representation {
        let raw = raw.trim();
        let target = if starts_with_ignore_case(raw, "url(")
            || starts_with_ignore_case(raw, "image-set(")
        {
            match extract_urls(raw).into_iter().next() {
                Some(inner) => inner,
                None => {
                    warn!(raw, "declaration without a url target, using fallback");
                    return self.fallback();
                }
            }
        } else {
            raw.to_string()
        };
        let target = target.trim();

        if !self.normalizer.is_resolvable(target) {
            return self.load_unresolvable(target);
        }
        let canonical = match self.normalizer.normalize(target) {
            Ok(canonical) => canonical,
            Err(e) => {
                warn!(raw, error = %e, "unresolvable reference, using fallback");
                return self.fallback();
            }
        };

        let this = Arc::clone(self);
        let key = canonical.clone();
        self.inflight
            .run(canonical, move || Box::pin(async move { this.resolve_canonical(key).await }))
            .await
    }

    /// Inline markup is validated like inline bytes; encoded payloads and
    /// handles pass through; anything else is not displayable.
    fn load_unresolvable(&self, value: &str) -> Representation {
        if value.starts_with('<') {
            return self.load_inline(Bytes::copy_from_slice(value.as_bytes()));
        }
        if starts_with_ignore_case(value, "data:") || starts_with_ignore_case(value, "blob:") {
            return Representation::new(value);
        }
        if !value.is_empty() && !value.eq_ignore_ascii_case("none") {
            debug!(value, "not a loadable reference, using fallback");
        }
        self.fallback()
    }

    fn fallback(&self) -> Representation {
        self.counters.fallback();
        fallback_representation()
    }

    fn load_inline(&self, bytes: Bytes) -> Representation {
        match self.validate(bytes) {
            Ok(bytes) => AssetPayload::vector(bytes).to_representation(),
            Err(e) => {
                warn!(error = %e, "inline vector rejected, using fallback");
                self.fallback()
            }
        }
    }

    async fn load_produced(self: &Arc<Self>, producer: Producer) -> Representation {
        let timeout = self.config.first_attempt_timeout();
        let first = produce_with_timeout(&producer, timeout)
            .await
            .and_then(|bytes| self.validate(bytes));
        let result = match first {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind().is_retryable() => {
                debug!(error = %e, "producer failed, scheduling retry");
                let this = Arc::clone(self);
                let descriptor = RetryDescriptor::new("producer", move || {
                    let this = Arc::clone(&this);
                    let producer = producer.clone();
                    Box::pin(async move {
                        produce_with_timeout(&producer, timeout)
                            .await
                            .and_then(|bytes| this.validate(bytes))
                    }) as BoxFuture<'static, _>
                });
                self.retry.enqueue(descriptor, 1, e).await
            }
            Err(e) => Err(e),
        };
        match result {
            Ok(bytes) => AssetPayload::vector(bytes).to_representation(),
            Err(e) => {
                warn!(error = %e, "producer exhausted, using fallback");
                self.fallback()
            }
        }
    }

    async fn resolve_canonical(self: Arc<Self>, canonical: CanonicalUrl) -> Representation {
        if let Some(hit) = self.memory_get(&canonical) {
            self.counters.memory_hit();
            return hit;
        }

        let blob_key = BlobKey::vector(canonical.as_str());
        if let Some(bytes) = self.store.get(&blob_key).await
            && let Ok(bytes) = self.validate(bytes)
        {
            debug!(url = %canonical, "vector store hit");
            self.counters.store_hit();
            return self.remember(&canonical, bytes);
        }

        let candidates = self.candidates(canonical.as_url());
        let result = match self.fetch_candidates(&candidates).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind().is_retryable() => {
                debug!(url = %canonical, error = %e, "all candidates failed, scheduling retry");
                let this = Arc::clone(&self);
                let candidates = Arc::new(candidates);
                let descriptor = RetryDescriptor::new(canonical.as_str(), move || {
                    let this = Arc::clone(&this);
                    let candidates = Arc::clone(&candidates);
                    Box::pin(async move { this.fetch_candidates(&candidates).await })
                        as BoxFuture<'static, _>
                });
                self.retry.enqueue(descriptor, 1, e).await
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(bytes) => {
                let store = Arc::clone(&self.store);
                let write = bytes.clone();
                tokio::spawn(async move {
                    store.put(&blob_key, write).await;
                });
                self.remember(&canonical, bytes)
            }
            Err(e) => {
                if let Some(bytes) = self.store.get(&blob_key).await
                    && let Ok(bytes) = self.validate(bytes)
                {
                    info!(url = %canonical, error = %e, "serving stale cached vector");
                    self.counters.stale_hit();
                    return AssetPayload::vector(bytes).to_representation();
                }
                warn!(url = %canonical, error = %e, "vector unavailable, using fallback");
                self.fallback()
            }
        }
    }

    /// Proxy (if allowed), then the original, then mirrors; no duplicates.
    pub fn candidates(&self, url: &Url) -> Vec<Url> {
        let mut out: Vec<Url> = Vec::new();
        let mut push = |candidate: Url| {
            if !out.contains(&candidate) {
                out.push(candidate);
            }
        };
        if (self.proxy_policy)(url)
            && let Some(proxy) = self.normalizer.proxy_url(url)
        {
            push(proxy);
        }
        push(url.clone());
        for mirror in self.normalizer.mirror_urls(url) {
            push(mirror);
        }
        out
    }

    /// Sequential sweep; the first validated payload wins.
    async fn fetch_candidates(&self, candidates: &[Url]) -> Result<Bytes, FetchError> {
        let mut last = FetchError::validation("no candidates");
        for candidate in candidates {
            self.counters.network_fetch();
            let attempt = tokio::time::timeout(self.config.timeout(), self.fetcher.fetch(candidate))
                .await
                .unwrap_or(Err(FetchError::Timeout))
                .and_then(|bytes| self.validate(bytes));
            match attempt {
                Ok(bytes) => return Ok(bytes),
                Err(e) => {
                    debug!(url = %candidate, error = %e, "candidate failed");
                    last = e;
                }
            }
        }
        Err(last)
    }

    fn validate(&self, bytes: Bytes) -> Result<Bytes, FetchError> {
        if bytes.is_empty() {
            return Err(FetchError::validation("empty payload"));
        }
        if bytes.len() > self.config.max_payload_bytes {
            return Err(FetchError::validation(format!(
                "payload of {} bytes exceeds {}",
                bytes.len(),
                self.config.max_payload_bytes
            )));
        }
        if !looks_like_vector(&bytes) {
            return Err(FetchError::validation("not vector markup"));
        }
        Ok(bytes)
    }

    fn memory_get(&self, canonical: &CanonicalUrl) -> Option<Representation> {
        self.memory
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(canonical)
            .cloned()
    }

    fn remember(&self, canonical: &CanonicalUrl, bytes: Bytes) -> Representation {
        let rep = AssetPayload::vector(bytes).to_representation();
        self.memory
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(canonical.clone(), rep.clone());
        rep
    }

    /// Drop the memory tier. The store is left alone.
    pub fn clear_memory(&self) {
        self.memory.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    pub fn memory_len(&self) -> usize {
        self.memory.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn retry(&self) -> &RetryScheduler<Bytes> {
        &self.retry
    }
}

fn starts_with_ignore_case(value: &str, prefix: &str) -> bool {
    value
        .get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

async fn produce_with_timeout(
    producer: &Producer,
    timeout: std::time::Duration,
) -> Result<Bytes, FetchError> {
    tokio::time::timeout(timeout, producer())
        .await
        .unwrap_or(Err(FetchError::Timeout))
}
