//! Ports - 抽象化レイヤー
//!
//! ホスト環境（ネットワーク、永続ストレージ、出力面、ラスタ面、時計）への
//! インターフェース。すべて feature-detect 前提で、欠けていても
//! pipeline は機能を落として動き続ける。

pub mod blob_store;
pub mod clock;
pub mod fetcher;
pub mod kv_store;
pub mod network;
pub mod output;
pub mod proxy;
pub mod raster;

pub use self::blob_store::{BlobBackend, BlobEntry};
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::fetcher::Fetcher;
pub use self::kv_store::KeyValueStore;
pub use self::network::{NetworkMonitor, NetworkQuality};
pub use self::output::{ChannelProvider, OutputChannel};
pub use self::proxy::{ProxyPolicy, always_proxy, never_proxy};
pub use self::raster::{DecodedImage, RasterHost, RasterOutput, RasterSurface, Rgba};
