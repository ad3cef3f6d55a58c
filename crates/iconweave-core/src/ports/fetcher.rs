//! Fetcher port - ネットワーク取得の抽象化
//!
//! timeout はここでは扱わない。呼び出し側（pipeline）が
//! `tokio::time::timeout` で包み、超過したら future を drop する（= abort）。

use async_trait::async_trait;
use bytes::Bytes;
use url::Url;

use crate::domain::FetchError;

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch the whole body of `url`.
    ///
    /// Non-2xx responses must come back as `FetchError::Status`.
    async fn fetch(&self, url: &Url) -> Result<Bytes, FetchError>;
}
