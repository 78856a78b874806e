//! Mock asset fetcher for testing.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::transcoder::{AssetFetcher, FetchError};

/// Mock implementation of the AssetFetcher trait.
///
/// Serves configured assets by exact URL; any other URL answers 404.
#[derive(Debug, Default)]
pub struct MockAssetFetcher {
    assets: Arc<RwLock<HashMap<String, Bytes>>>,
    requested: Arc<RwLock<Vec<String>>>,
    fetch_count: AtomicUsize,
}

impl MockAssetFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves `body` at `url`.
    pub async fn set_asset(&self, url: impl Into<String>, body: impl Into<Bytes>) {
        self.assets.write().await.insert(url.into(), body.into());
    }

    /// Every URL requested so far, in order.
    pub async fn requested_urls(&self) -> Vec<String> {
        self.requested.read().await.clone()
    }

    /// Number of successful fetches.
    pub fn fetch_count(&self) -> usize {
        self.fetch_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AssetFetcher for MockAssetFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
        self.requested.write().await.push(url.to_string());

        match self.assets.read().await.get(url) {
            Some(body) => {
                self.fetch_count.fetch_add(1, Ordering::SeqCst);
                Ok(body.clone())
            }
            None => Err(FetchError::Status {
                url: url.to_string(),
                status: 404,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_serves_configured_assets() {
        let fetcher = MockAssetFetcher::new();
        fetcher.set_asset("https://a.example.com/ffmpeg", b"bin".to_vec()).await;

        let body = fetcher.fetch("https://a.example.com/ffmpeg").await.unwrap();
        assert_eq!(&body[..], b"bin");

        let err = fetcher.fetch("https://a.example.com/ffprobe").await.unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 404, .. }));

        assert_eq!(fetcher.fetch_count(), 1);
        assert_eq!(fetcher.requested_urls().await.len(), 2);
    }
}
