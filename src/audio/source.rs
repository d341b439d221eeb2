//! Cached pad sounds.
//!
//! [`SoundSource`] owns the per-key decode cache. Each key gets one
//! `OnceCell`, so concurrent loads of the same pad share a single fetch and
//! converge on one cache entry. A failed load leaves the cell empty and the
//! next caller retries.

use super::assets::AssetStore;
use super::engine::{PlayingSound, SoundSink, SAMPLE_RATE};
use super::sound::{decode_wav, DecodedSound};
use crate::error::{PadError, Result};
use crate::recording::PadKey;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Pads preloaded in the background: q, w, e, r, a, s, d, f.
pub const DEFAULT_WARM_KEYS: [u32; 8] = [113, 119, 101, 114, 97, 115, 100, 102];

/// Delay before the background preload starts.
pub const DEFAULT_WARM_DELAY: Duration = Duration::from_secs(1);

type SoundCell = Arc<OnceCell<Arc<DecodedSound>>>;

/// Loads, caches and plays pad sounds.
pub struct SoundSource {
    /// Where raw asset bytes come from.
    store: Arc<dyn AssetStore>,
    /// Where voices are started.
    sink: Arc<dyn SoundSink>,
    /// One cell per key; a cell is filled by the first successful load.
    cache: Mutex<HashMap<PadKey, SoundCell>>,
    /// Volume for new voices, stored as `f32` bits.
    volume: AtomicU32,
}

impl SoundSource {
    /// Creates a sound source at full volume with an empty cache.
    pub fn new(store: Arc<dyn AssetStore>, sink: Arc<dyn SoundSink>) -> Self {
        Self {
            store,
            sink,
            cache: Mutex::new(HashMap::new()),
            volume: AtomicU32::new(1.0f32.to_bits()),
        }
    }

    /// Returns the cell for a key, creating it on first use.
    fn cell(&self, key: PadKey) -> SoundCell {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(cache.entry(key).or_default())
    }

    /// Loads the decoded sound for a pad.
    ///
    /// Returns the cached decode if one exists. Otherwise fetches and decodes
    /// the asset (resampled to [`SAMPLE_RATE`]); concurrent callers for the
    /// same key wait on the same load.
    ///
    /// # Errors
    ///
    /// Returns [`PadError::Load`] if the asset cannot be fetched or decoded.
    /// Failures are not cached.
    pub async fn load(&self, key: PadKey) -> Result<Arc<DecodedSound>> {
        let cell = self.cell(key);
        let sound = cell
            .get_or_try_init(|| async {
                let bytes = self
                    .store
                    .fetch(key)
                    .await
                    .map_err(|e| PadError::load(key, e))?;
                let decoded = decode_wav(&bytes).map_err(|e| PadError::load(key, e))?;
                tracing::debug!(
                    "Loaded sound {} from {} ({:.2}s)",
                    key,
                    self.store.locate(key),
                    decoded.duration_seconds()
                );
                Ok::<_, PadError>(Arc::new(decoded.resampled(SAMPLE_RATE)))
            })
            .await?;
        Ok(Arc::clone(sound))
    }

    /// Returns true if a decode for `key` is cached.
    pub fn is_cached(&self, key: PadKey) -> bool {
        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&key)
            .is_some_and(|cell| cell.initialized())
    }

    /// Plays a pad's sound as a new independent voice.
    ///
    /// Loads the sound first if needed. Failures are logged, never raised.
    ///
    /// # Returns
    ///
    /// The started voice, or None if loading or starting failed
    pub async fn play(&self, key: PadKey) -> Option<PlayingSound> {
        let sound = match self.load(key).await {
            Ok(sound) => sound,
            Err(e) => {
                tracing::warn!("Error playing sound {}: {}", key, e);
                return None;
            }
        };
        self.start_voice(key, sound)
    }

    /// Like [`play`](Self::play), but gives up if `token` is cancelled while
    /// the sound is still loading.
    pub(crate) async fn play_unless_cancelled(
        &self,
        key: PadKey,
        token: &CancellationToken,
    ) -> Option<PlayingSound> {
        let sound = match self.load(key).await {
            Ok(sound) => sound,
            Err(e) => {
                tracing::warn!("Error playing sound {}: {}", key, e);
                return None;
            }
        };
        if token.is_cancelled() {
            return None;
        }
        self.start_voice(key, sound)
    }

    fn start_voice(&self, key: PadKey, sound: Arc<DecodedSound>) -> Option<PlayingSound> {
        match self.sink.start(key, sound, self.volume()) {
            Ok(playing) => Some(playing),
            Err(e) => {
                tracing::warn!("Error playing sound {}: {}", key, e);
                None
            }
        }
    }

    /// Sets the volume for voices started from now on.
    ///
    /// Values are clamped to `[0, 1]`; NaN counts as silence.
    pub fn set_volume(&self, volume: f32) {
        let volume = if volume.is_nan() {
            0.0
        } else {
            volume.clamp(0.0, 1.0)
        };
        self.volume.store(volume.to_bits(), Ordering::Relaxed);
    }

    /// Returns the volume applied to new voices.
    pub fn volume(&self) -> f32 {
        f32::from_bits(self.volume.load(Ordering::Relaxed))
    }

    /// Loads a set of pads, logging the outcome of each.
    ///
    /// # Returns
    ///
    /// The number of pads that loaded successfully
    pub async fn preload(&self, keys: &[PadKey]) -> usize {
        let results = futures::future::join_all(keys.iter().map(|&key| async move {
            match self.load(key).await {
                Ok(_) => {
                    tracing::debug!("Preloaded sound {}", key);
                    true
                }
                Err(e) => {
                    tracing::warn!("Could not preload sound {}: {}", key, e);
                    false
                }
            }
        }))
        .await;
        results.into_iter().filter(|ok| *ok).count()
    }

    /// Preloads the warm set in the background after `delay`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn_warmup(self: &Arc<Self>, keys: Vec<PadKey>, delay: Duration) -> JoinHandle<()> {
        let source = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let loaded = source.preload(&keys).await;
            tracing::info!("Preloaded {} of {} common sounds", loaded, keys.len());
        })
    }
}
