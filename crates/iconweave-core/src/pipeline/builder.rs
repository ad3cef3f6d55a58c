//! AssetPipelineBuilder - ports の配線
//!
//! # Fail-fast 設計
//! - 必須の port（Fetcher, ChannelProvider）が無ければ build() でエラー
//! - `raster = true` なのに RasterHost が無ければエラー
//! - config の検証もここで行う

use std::sync::Arc;

use url::Url;

use super::AssetPipeline;
use super::fetch::VectorLoader;
use super::inflight::InFlight;
use super::raster::Rasterizer;
use crate::config::{ConfigError, PipelineConfig};
use crate::impls::StaticNetwork;
use crate::normalize::{MirrorTable, UrlNormalizer};
use crate::observability::Counters;
use crate::ports::{
    BlobBackend, ChannelProvider, Clock, Fetcher, KeyValueStore, NetworkMonitor, ProxyPolicy,
    RasterHost, SystemClock, always_proxy,
};
use crate::registry::OutputRegistry;
use crate::retry::{RetryPolicy, RetryScheduler};
use crate::store::TieredStore;

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("missing port: {0}")]
    MissingPort(&'static str),
}

/// Wires ports into an [`AssetPipeline`].
///
/// # 使用例
/// ```ignore
/// let pipeline = AssetPipeline::builder(config)
///     .fetcher(Arc::new(DirectoryFetcher::new("assets")))
///     .channels(Arc::new(MemoryChannelProvider::new()))
///     .build()?;
/// ```
pub struct AssetPipelineBuilder {
    config: PipelineConfig,
    fetcher: Option<Arc<dyn Fetcher>>,
    network: Option<Arc<dyn NetworkMonitor>>,
    blobs: Option<Arc<dyn BlobBackend>>,
    kv: Option<Arc<dyn KeyValueStore>>,
    channels: Option<Arc<dyn ChannelProvider>>,
    raster_host: Option<Arc<dyn RasterHost>>,
    clock: Arc<dyn Clock>,
    proxy_policy: ProxyPolicy,
    mirrors: MirrorTable,
}

impl AssetPipelineBuilder {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            fetcher: None,
            network: None,
            blobs: None,
            kv: None,
            channels: None,
            raster_host: None,
            clock: Arc::new(SystemClock),
            proxy_policy: always_proxy(),
            mirrors: MirrorTable::builtin(),
        }
    }

    pub fn fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Without one the pipeline assumes it is always online.
    pub fn network(mut self, network: Arc<dyn NetworkMonitor>) -> Self {
        self.network = Some(network);
        self
    }

    /// Without one the persistent store is unsupported (every call a no-op).
    pub fn blob_backend(mut self, blobs: Arc<dyn BlobBackend>) -> Self {
        self.blobs = Some(blobs);
        self
    }

    /// Without one committed rules are not persisted.
    pub fn key_value_store(mut self, kv: Arc<dyn KeyValueStore>) -> Self {
        self.kv = Some(kv);
        self
    }

    pub fn channels(mut self, channels: Arc<dyn ChannelProvider>) -> Self {
        self.channels = Some(channels);
        self
    }

    pub fn raster_host(mut self, host: Arc<dyn RasterHost>) -> Self {
        self.raster_host = Some(host);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn proxy_policy(mut self, policy: ProxyPolicy) -> Self {
        self.proxy_policy = policy;
        self
    }

    pub fn mirrors(mut self, mirrors: MirrorTable) -> Self {
        self.mirrors = mirrors;
        self
    }

    pub fn build(self) -> Result<AssetPipeline, BuildError> {
        self.config.validate()?;
        let fetcher = self.fetcher.ok_or(BuildError::MissingPort("fetcher"))?;
        let channels = self.channels.ok_or(BuildError::MissingPort("channel provider"))?;
        let rasterizer_host = match (self.config.raster, self.raster_host) {
            (true, None) => return Err(BuildError::MissingPort("raster host")),
            (true, Some(host)) => Some(host),
            (false, _) => None,
        };

        let origin = Url::parse(&self.config.origin).map_err(|e| ConfigError::Invalid {
            field: "origin",
            reason: e.to_string(),
        })?;
        let network = self
            .network
            .unwrap_or_else(|| Arc::new(StaticNetwork::online()));

        let normalizer = Arc::new(UrlNormalizer::new(
            origin.clone(),
            self.config.base_url.as_deref(),
            self.mirrors,
        ));
        let store = Arc::new(TieredStore::new(
            self.blobs,
            Arc::clone(&self.clock),
            self.config.store.clone(),
        ));
        let retry = RetryScheduler::new(RetryPolicy::from_config(&self.config.retry), network);
        let counters = Arc::new(Counters::default());
        let loader = Arc::new(VectorLoader::new(
            normalizer,
            fetcher,
            Arc::clone(&store),
            retry,
            self.proxy_policy,
            self.config.fetch.clone(),
            Arc::clone(&counters),
        ));
        let rasterizer =
            rasterizer_host.map(|host| Arc::new(Rasterizer::new(host, Arc::clone(&store))));
        let registry = Arc::new(OutputRegistry::new(
            channels,
            self.kv,
            self.clock,
            origin,
            self.config.registry.clone(),
        ));

        Ok(AssetPipeline {
            config: self.config,
            store,
            loader,
            rasterizer,
            registry,
            inflight: InFlight::new(),
            counters,
        })
    }
}
