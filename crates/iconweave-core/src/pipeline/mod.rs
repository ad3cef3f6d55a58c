//! Pipeline - キー → 宣言値の解決
//!
//! # モジュール構成
//! - **inflight**: キー単位の重複排除
//! - **fetch**: vector の取得（メモリ → ストア → ネットワーク → 再試行 → fallback）
//! - **raster**: bucket サイズへのラスタライズ
//! - **builder**: ports の配線
//!
//! `AssetPipeline` はプロセスに 1 つ。メモリキャッシュや pending map は
//! すべてこのインスタンスが所有する。

pub mod builder;
pub mod fetch;
pub mod inflight;
pub mod raster;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::PipelineConfig;
use crate::domain::{
    AssetKey, DeclarationValue, Reference, Representation, fallback_representation, quantize,
};
use crate::observability::{Counters, PipelineCounts};
use crate::registry::OutputRegistry;
use crate::store::TieredStore;

pub use self::builder::{AssetPipelineBuilder, BuildError};
pub use self::fetch::VectorLoader;
pub use self::inflight::InFlight;
pub use self::raster::{PLACEHOLDER, Placement, Rasterizer, placement};

const FALLBACK_CACHE_KEY: &str = "__fallback";

/// A resolved value plus whether it is only the fallback glyph.
#[derive(Debug, Clone, PartialEq)]
struct Resolved {
    value: DeclarationValue,
    placeholder: bool,
}

/// Outcome of [`AssetPipeline::warm_up`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarmUp {
    pub store_ready: bool,
    pub channel_ready: bool,
}

pub struct AssetPipeline {
    config: PipelineConfig,
    store: Arc<TieredStore>,
    loader: Arc<VectorLoader>,
    rasterizer: Option<Arc<Rasterizer>>,
    registry: Arc<OutputRegistry>,
    inflight: InFlight<AssetKey, Resolved>,
    counters: Arc<Counters>,
}

impl AssetPipeline {
    pub fn builder(config: PipelineConfig) -> AssetPipelineBuilder {
        AssetPipelineBuilder::new(config)
    }

    /// Open the store, start the background scrub, and acquire the output
    /// channel (restoring persisted rules).
    pub async fn warm_up(&self) -> WarmUp {
        let store_ready = self.store.init().await;
        if store_ready {
            self.store.spawn_repair();
        }
        let channel_ready = self.registry.ensure_channel().is_some();
        debug!(store_ready, channel_ready, "pipeline warmed up");
        WarmUp {
            store_ready,
            channel_ready,
        }
    }

    /// Resolve `key` to a declaration value. Concurrent calls for the same
    /// key share one resolution.
    pub async fn resolve(self: &Arc<Self>, key: AssetKey) -> DeclarationValue {
        self.resolve_tracked(key).await.value
    }

    async fn resolve_tracked(self: &Arc<Self>, key: AssetKey) -> Resolved {
        let this = Arc::clone(self);
        let owned = key.clone();
        self.inflight
            .run(key, move || Box::pin(async move { this.resolve_uncached(owned).await }))
            .await
    }

    async fn resolve_uncached(&self, key: AssetKey) -> Resolved {
        let raw = self
            .config
            .asset_reference(key.logical_name(), key.variant());
        let vector = self.loader.load_vector(Reference::path(raw)).await;
        let placeholder = vector == fallback_representation();
        let Some(rasterizer) = &self.rasterizer else {
            return Resolved {
                value: DeclarationValue::url(vector),
                placeholder,
            };
        };

        let cache_key = if placeholder {
            FALLBACK_CACHE_KEY.to_string()
        } else {
            format!("{}:{}", key.logical_name(), key.variant())
        };
        let value = if self.config.device_scales.len() <= 1 {
            rasterizer.rasterize(&vector, key.bucket(), &cache_key).await
        } else {
            self.image_set(rasterizer, &vector, key.bucket(), &cache_key)
                .await
        };
        Resolved { value, placeholder }
    }

    async fn image_set(
        &self,
        rasterizer: &Rasterizer,
        vector: &Representation,
        bucket: u32,
        cache_key: &str,
    ) -> DeclarationValue {
        let mut entries = Vec::with_capacity(self.config.device_scales.len());
        for &scale in &self.config.device_scales {
            let scaled = quantize(f64::from(bucket) * f64::from(scale));
            if let DeclarationValue::Url(rep) = rasterizer.rasterize(vector, scaled, cache_key).await {
                entries.push((rep, scale));
            }
        }
        if entries.is_empty() {
            DeclarationValue::None
        } else {
            DeclarationValue::ImageSet(entries)
        }
    }

    /// Resolve and register the resulting rule. Returns the value.
    pub async fn request(
        self: &Arc<Self>,
        logical_name: &str,
        variant: &str,
        size_hint: f64,
    ) -> DeclarationValue {
        let key = AssetKey::new(logical_name, variant, size_hint);
        let Resolved { value, placeholder } = self.resolve_tracked(key.clone()).await;
        if value.is_none() {
            return value;
        }
        let declaration = value.to_declaration();
        if placeholder {
            self.registry
                .register_placeholder(key.to_string(), key.selector(), declaration);
        } else {
            self.registry
                .register(key.to_string(), key.selector(), declaration);
        }
        value
    }

    /// Fire-and-forget: the result shows up as a committed output rule.
    ///
    /// Keys showing only the fallback glyph are requested again.
    pub fn request_asset(self: &Arc<Self>, logical_name: &str, variant: &str, size_hint: f64) {
        let key = AssetKey::new(logical_name, variant, size_hint);
        if self.registry.has(&key.to_string()) {
            return;
        }
        let this = Arc::clone(self);
        let (name, variant) = (logical_name.to_string(), variant.to_string());
        tokio::spawn(async move {
            this.request(&name, &variant, size_hint).await;
        });
    }

    pub fn has_rule(&self, logical_name: &str, variant: &str, bucket: u32) -> bool {
        let key = AssetKey::with_bucket(logical_name, variant, bucket);
        self.registry.has(&key.to_string())
    }

    /// Commit pending rules now instead of waiting for the deferred flush.
    pub fn flush(&self) -> usize {
        self.registry.flush()
    }

    pub fn counts(&self) -> PipelineCounts {
        let retry = self.loader.retry().counts();
        PipelineCounts {
            retries_scheduled: retry.scheduled,
            offline_drops: retry.offline_drops,
            ..self.counters.snapshot()
        }
    }

    /// Drop the memory tiers. Store and registry are untouched.
    pub fn clear_memory(&self) {
        self.loader.clear_memory();
        if let Some(rasterizer) = &self.rasterizer {
            rasterizer.clear_memo();
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<TieredStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<OutputRegistry> {
        &self.registry
    }

    pub fn loader(&self) -> &Arc<VectorLoader> {
        &self.loader
    }
}
