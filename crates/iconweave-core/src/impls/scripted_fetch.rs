//! ScriptedFetcher - URL ごとに応答を仕込めるテスト用 Fetcher
//!
//! 仕込んだ応答は順番に返し、最後の 1 件は以後ずっと繰り返す。
//! 何も仕込んでいない URL は 404。

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use url::Url;

use crate::domain::FetchError;
use crate::ports::Fetcher;

#[derive(Debug, Clone)]
pub enum Scripted {
    Ok(Bytes),
    Err(FetchError),
    /// Never completes; only a timeout gets the caller out.
    Hang,
}

#[derive(Default)]
pub struct ScriptedFetcher {
    routes: Mutex<HashMap<String, VecDeque<Scripted>>>,
    calls: Mutex<Vec<String>>,
    latency: Mutex<Option<Duration>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&self, url: &str, response: Scripted) -> &Self {
        self.routes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(url.to_string())
            .or_default()
            .push_back(response);
        self
    }

    pub fn respond(&self, url: &str, body: impl Into<Bytes>) -> &Self {
        self.on(url, Scripted::Ok(body.into()))
    }

    pub fn fail(&self, url: &str, error: FetchError) -> &Self {
        self.on(url, Scripted::Err(error))
    }

    pub fn hang(&self, url: &str) -> &Self {
        self.on(url, Scripted::Hang)
    }

    /// Delay every response by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock().unwrap_or_else(|e| e.into_inner()) = latency;
    }

    /// Every URL fetched, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn calls_for(&self, url: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == url).count()
    }

    fn next(&self, url: &str) -> Scripted {
        let mut routes = self.routes.lock().unwrap_or_else(|e| e.into_inner());
        match routes.get_mut(url) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or(Scripted::Hang),
            Some(queue) => queue
                .front()
                .cloned()
                .unwrap_or_else(|| Scripted::Err(FetchError::status(404, url))),
            None => Scripted::Err(FetchError::status(404, url)),
        }
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, url: &Url) -> Result<Bytes, FetchError> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(url.to_string());
        let response = self.next(url.as_str());
        let latency = *self.latency.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        match response {
            Scripted::Ok(bytes) => Ok(bytes),
            Scripted::Err(e) => Err(e),
            Scripted::Hang => futures::future::pending().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sequence_then_sticky_last() {
        let fetcher = ScriptedFetcher::new();
        let url = Url::parse("https://x.example/a.svg").unwrap();
        fetcher
            .fail(url.as_str(), FetchError::Timeout)
            .respond(url.as_str(), Bytes::from_static(b"<svg/>"));
        assert_eq!(fetcher.fetch(&url).await, Err(FetchError::Timeout));
        assert!(fetcher.fetch(&url).await.is_ok());
        assert!(fetcher.fetch(&url).await.is_ok());
        assert_eq!(fetcher.calls_for(url.as_str()), 3);
    }

    #[tokio::test]
    async fn unknown_url_is_not_found() {
        let fetcher = ScriptedFetcher::new();
        let url = Url::parse("https://x.example/missing.svg").unwrap();
        let err = fetcher.fetch(&url).await.unwrap_err();
        assert!(err.is_terminal());
    }
}
