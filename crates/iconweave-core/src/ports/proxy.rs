//! ProxyPolicy port - same-origin proxy を使うかどうかの判定
//!
//! 実行環境ごとの判定ロジックは持たず、ホストから注入する。

use std::sync::Arc;

use url::Url;

pub type ProxyPolicy = Arc<dyn Fn(&Url) -> bool + Send + Sync>;

pub fn always_proxy() -> ProxyPolicy {
    Arc::new(|_| true)
}

pub fn never_proxy() -> ProxyPolicy {
    Arc::new(|_| false)
}
