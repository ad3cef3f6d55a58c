//! iconweave-core
//!
//! Icon asset caching and delivery: turns `(logical name, variant, size)`
//! requests into committed output rules, going through memory, a persistent
//! tiered store, and the network, with dedup and delayed retries.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（AssetKey, Reference, DeclarationValue, OutputRule, errors）
//! - **ports**: ホスト環境への抽象化（Fetcher, BlobBackend, KeyValueStore, OutputChannel, RasterHost, Clock）
//! - **impls**: ports の実装（in-memory / filesystem / テスト用）
//! - **normalize**: URL 正規化と mirror テーブル
//! - **store**: 永続 tiered store（vector / raster 名前空間）
//! - **retry**: 遅延バッチ再試行
//! - **pipeline**: 取得・デコード・ラスタライズと facade
//! - **registry**: 出力ルールのバッチコミットと永続化
//! - **config**: JSON 設定
//! - **observability**: カウンタ

pub mod config;
pub mod domain;
pub mod impls;
pub mod normalize;
pub mod observability;
pub mod pipeline;
pub mod ports;
pub mod registry;
pub mod retry;
pub mod store;

pub use config::{ConfigError, PipelineConfig};
pub use domain::{AssetKey, DeclarationValue, FetchError, Reference, Representation};
pub use observability::PipelineCounts;
pub use pipeline::{AssetPipeline, AssetPipelineBuilder, BuildError};
pub use registry::OutputRegistry;
