//! Where pad sound files come from.
//!
//! Every pad sound lives at `{base}/{key}.wav`. The store only fetches raw
//! bytes; decoding and caching happen in [`super::SoundSource`].

use crate::recording::PadKey;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Fetches the raw bytes of a pad's sound asset.
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Fetches the asset for `key`.
    async fn fetch(&self, key: PadKey) -> Result<Vec<u8>>;

    /// Human-readable location of the asset, for log messages.
    fn locate(&self, key: PadKey) -> String;
}

/// Sound assets stored as files in a directory.
#[derive(Debug, Clone)]
pub struct FileAssetStore {
    base_path: PathBuf,
}

impl FileAssetStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Returns the file path for a pad.
    pub fn asset_path(&self, key: PadKey) -> PathBuf {
        self.base_path.join(format!("{}.wav", key))
    }
}

#[async_trait]
impl AssetStore for FileAssetStore {
    async fn fetch(&self, key: PadKey) -> Result<Vec<u8>> {
        let path = self.asset_path(key);
        tokio::fs::read(&path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))
    }

    fn locate(&self, key: PadKey) -> String {
        self.asset_path(key).display().to_string()
    }
}

/// Sound assets served over HTTP.
#[cfg(feature = "http")]
#[derive(Debug, Clone)]
pub struct HttpAssetStore {
    base_url: String,
    client: reqwest::Client,
}

#[cfg(feature = "http")]
impl HttpAssetStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[cfg(feature = "http")]
#[async_trait]
impl AssetStore for HttpAssetStore {
    async fn fetch(&self, key: PadKey) -> Result<Vec<u8>> {
        let url = self.locate(key);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?
            .error_for_status()
            .with_context(|| format!("GET {} returned an error status", url))?;
        let bytes = response
            .bytes()
            .await
            .with_context(|| format!("failed to read body of {}", url))?;
        Ok(bytes.to_vec())
    }

    fn locate(&self, key: PadKey) -> String {
        format!("{}/{}.wav", self.base_url, key)
    }
}

/// In-memory asset store for tests and embedded sound sets.
///
/// Counts fetches so callers can check caching behaviour, and can simulate
/// slow storage with a fixed latency.
#[derive(Debug, Default)]
pub struct MemoryAssetStore {
    content: Mutex<HashMap<PadKey, Vec<u8>>>,
    fetches: AtomicUsize,
    latency: Option<Duration>,
}

impl MemoryAssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every fetch by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn insert(&self, key: PadKey, data: Vec<u8>) {
        self.content
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, data);
    }

    /// Number of fetch calls served so far, successful or not.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl AssetStore for MemoryAssetStore {
    async fn fetch(&self, key: PadKey) -> Result<Vec<u8>> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.content
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&key)
            .cloned()
            .ok_or_else(|| anyhow!("no asset for key {}", key))
    }

    fn locate(&self, key: PadKey) -> String {
        format!("memory://{}.wav", key)
    }
}
