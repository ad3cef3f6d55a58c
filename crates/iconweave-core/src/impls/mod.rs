//! Impls - ports の実装（開発用・テスト用・CLI 用）
//!
//! # 含まれる実装
//! - **MemoryBlobBackend / FsBlobBackend**: 永続 Blob ストア
//! - **MemoryKeyValueStore / FileKeyValueStore**: レジストリ永続化
//! - **MemoryChannel / MemoryChannelProvider**: 出力チャネル
//! - **ScriptedFetcher / DirectoryFetcher**: ネットワーク
//! - **StaticNetwork**: online/offline
//! - **GeometryRasterHost**: ラスタ面

pub mod dir_fetch;
pub mod file_kv;
pub mod fs_blob;
pub mod geometry_raster;
pub mod mem_blob;
pub mod mem_kv;
pub mod memory_channel;
pub mod scripted_fetch;
pub mod static_network;

pub use self::dir_fetch::DirectoryFetcher;
pub use self::file_kv::FileKeyValueStore;
pub use self::fs_blob::FsBlobBackend;
pub use self::geometry_raster::{DrawOp, GeometryRasterHost, SurfaceRecord};
pub use self::mem_blob::MemoryBlobBackend;
pub use self::mem_kv::MemoryKeyValueStore;
pub use self::memory_channel::{MemoryChannel, MemoryChannelProvider};
pub use self::scripted_fetch::{Scripted, ScriptedFetcher};
pub use self::static_network::StaticNetwork;
