//! Audio export functionality.
//!
//! Renders a recording offline into a stereo 44.1 kHz buffer and encodes it
//! as WAV. The primary path mixes the real pad sounds; if none of them can
//! be loaded, or the primary render fails, a synthesized-tone render is used
//! instead so the user still gets a file.

use super::codec::{self, ms_to_frame, AudioBuffer};
use super::engine::SAMPLE_RATE;
use super::sound::DecodedSound;
use super::source::SoundSource;
use super::tone;
use crate::error::{PadError, Result};
use crate::notify::{Notifier, PadNotification};
use crate::recording::{PadKey, Recording};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Message shown to the user when no file could be produced.
pub const EXPORT_FAILED_MESSAGE: &str =
    "Could not export audio. Please try again or check console for errors.";

/// Number of channels in exported files.
const EXPORT_CHANNELS: usize = 2;

/// Where the exporter is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportState {
    Idle,
    Exporting,
    Succeeded,
    Failed,
}

/// A finished export, ready to be saved or offered for download.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportedTrack {
    /// Suggested file name, `musicpad_track_{timestampMs}.wav`.
    pub file_name: String,
    /// Complete WAV file contents.
    pub data: Vec<u8>,
    /// True if the synthesized-tone renderer produced the audio.
    pub used_fallback: bool,
}

impl ExportedTrack {
    fn new(data: Vec<u8>, used_fallback: bool) -> Self {
        Self {
            file_name: export_file_name(Utc::now()),
            data,
            used_fallback,
        }
    }

    /// Writes the file into a directory, creating it if needed.
    ///
    /// # Returns
    ///
    /// The path of the written file
    pub fn write_to_dir<P: AsRef<Path>>(&self, dir: P) -> Result<PathBuf> {
        std::fs::create_dir_all(dir.as_ref())?;
        let path = dir.as_ref().join(&self.file_name);
        std::fs::write(&path, &self.data)?;
        Ok(path)
    }
}

/// Builds the download file name for an export made at `at`.
pub fn export_file_name(at: DateTime<Utc>) -> String {
    format!("musicpad_track_{}.wav", at.timestamp_millis())
}

/// Mixes decoded pad sounds into a buffer at their event offsets.
///
/// Events whose key has no entry in `sounds` stay silent. Sounds running
/// past the end of the buffer are cut off.
///
/// # Errors
///
/// Returns [`PadError::Render`] if the buffer cannot be allocated
pub fn render_sounds(
    recording: &Recording,
    sounds: &HashMap<PadKey, Arc<DecodedSound>>,
    sample_rate: u32,
) -> Result<AudioBuffer> {
    let mut buffer =
        AudioBuffer::for_duration(EXPORT_CHANNELS, recording.duration_ms(), sample_rate)?;
    let total = buffer.frames();

    for event in recording.key_downs() {
        let Some(sound) = sounds.get(&event.key) else {
            continue;
        };
        let start = ms_to_frame(event.offset_ms, sample_rate)?;
        let available = total.saturating_sub(start);

        for i in 0..sound.frames().min(available) {
            let (left, right) = sound.stereo_frame(i);
            buffer.mix_sample(0, start + i, left);
            buffer.mix_sample(1, start + i, right);
        }
    }

    Ok(buffer)
}

/// Turns recordings into downloadable WAV files.
pub struct AudioExporter {
    /// Shared sound cache used to resolve pad sounds.
    sounds: Arc<SoundSource>,
    notifier: Notifier,
    state: Mutex<ExportState>,
    /// Outcome of the last finished export.
    last_outcome: Mutex<Option<ExportState>>,
}

impl AudioExporter {
    pub fn new(sounds: Arc<SoundSource>, notifier: Notifier) -> Self {
        Self {
            sounds,
            notifier,
            state: Mutex::new(ExportState::Idle),
            last_outcome: Mutex::new(None),
        }
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> ExportState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns how the last export ended, if any has finished.
    pub fn last_outcome(&self) -> Option<ExportState> {
        *self.last_outcome.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: ExportState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
        if matches!(state, ExportState::Succeeded | ExportState::Failed) {
            *self.last_outcome.lock().unwrap_or_else(|e| e.into_inner()) = Some(state);
        }
        self.notifier
            .emit(PadNotification::ExportStateChanged(state));
    }

    /// Exports a recording to WAV.
    ///
    /// Resolves each pressed pad's sound (individual failures only leave
    /// that pad silent), renders offline and encodes. Falls back to the tone
    /// renderer when no sound resolved or the primary render failed.
    ///
    /// # Returns
    ///
    /// The exported file, or None if there was nothing to export or both
    /// render paths failed
    pub async fn export(&self, recording: Option<Arc<Recording>>) -> Option<ExportedTrack> {
        let Some(recording) = recording.filter(|r| r.is_playable()) else {
            tracing::error!("No track to export");
            return None;
        };

        self.set_state(ExportState::Exporting);
        let result = match self.export_primary(Arc::clone(&recording)).await {
            Ok(Some(track)) => Ok(track),
            Ok(None) => {
                tracing::warn!("No pad sounds could be loaded, using alternative export method");
                self.render_alternative(recording).await
            }
            Err(e) => {
                tracing::error!("Error exporting track: {}", e);
                self.render_alternative(recording).await
            }
        };
        self.finish(result)
    }

    /// Exports a recording using only synthesized tones.
    ///
    /// # Returns
    ///
    /// The exported file, or None if the render failed
    pub async fn export_alternative(
        &self,
        recording: Option<Arc<Recording>>,
    ) -> Option<ExportedTrack> {
        let Some(recording) = recording.filter(|r| r.is_playable()) else {
            tracing::error!("No track to export");
            return None;
        };

        self.set_state(ExportState::Exporting);
        let result = self.render_alternative(recording).await;
        self.finish(result)
    }

    /// Records the outcome, tells the user about failures and returns to idle.
    fn finish(&self, result: Result<ExportedTrack>) -> Option<ExportedTrack> {
        let outcome = match result {
            Ok(track) => {
                tracing::info!(
                    "Exported {} ({} bytes{})",
                    track.file_name,
                    track.data.len(),
                    if track.used_fallback {
                        ", synthesized tones"
                    } else {
                        ""
                    }
                );
                self.set_state(ExportState::Succeeded);
                Some(track)
            }
            Err(e) => {
                tracing::error!("Error in alternative export: {}", e);
                self.notifier.emit(PadNotification::ExportFailed {
                    message: EXPORT_FAILED_MESSAGE.to_string(),
                });
                self.set_state(ExportState::Failed);
                None
            }
        };
        self.set_state(ExportState::Idle);
        outcome
    }

    /// Renders with the real pad sounds.
    ///
    /// Returns `Ok(None)` when not a single pad sound could be resolved.
    async fn export_primary(&self, recording: Arc<Recording>) -> Result<Option<ExportedTrack>> {
        let keys = recording.distinct_down_keys();
        let loads = keys.iter().map(|&key| async move { (key, self.sounds.load(key).await) });

        let mut resolved = HashMap::new();
        for (key, result) in futures::future::join_all(loads).await {
            match result {
                Ok(sound) => {
                    resolved.insert(key, sound);
                }
                Err(e) => tracing::warn!("Error loading sound {} for export: {}", key, e),
            }
        }

        if resolved.is_empty() {
            return Ok(None);
        }
        tracing::debug!("Rendering {} of {} pad sounds", resolved.len(), keys.len());

        let data = tokio::task::spawn_blocking(move || {
            let buffer = render_sounds(&recording, &resolved, SAMPLE_RATE)?;
            codec::encode(&buffer)
        })
        .await
        .map_err(|e| PadError::Render(format!("render task failed: {}", e)))??;

        Ok(Some(ExportedTrack::new(data, false)))
    }

    /// Renders synthesized tones in place of the pad sounds.
    async fn render_alternative(&self, recording: Arc<Recording>) -> Result<ExportedTrack> {
        tracing::info!("Using alternative export method");

        let data = tokio::task::spawn_blocking(move || {
            let buffer = tone::render_tones(&recording, SAMPLE_RATE)?;
            codec::encode(&buffer)
        })
        .await
        .map_err(|e| PadError::ExportFailure(format!("tone render task failed: {}", e)))?
        .map_err(|e| PadError::ExportFailure(e.to_string()))?;

        Ok(ExportedTrack::new(data, true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::codec::WAV_HEADER_LEN;
    use crate::notify::drain;
    use crate::recording::PadEvent;
    use crate::testing::memory_source;

    fn recording(events: Vec<PadEvent>, duration_ms: u64) -> Option<Arc<Recording>> {
        Some(Arc::new(Recording::new(events, duration_ms)))
    }

    fn pcm_samples(wav: &[u8]) -> Vec<i16> {
        wav[WAV_HEADER_LEN..]
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect()
    }

    #[test]
    fn test_file_name_pattern() {
        let at = DateTime::from_timestamp_millis(1_700_000_000_123).unwrap();
        assert_eq!(export_file_name(at), "musicpad_track_1700000000123.wav");
    }

    #[tokio::test]
    async fn test_missing_recording_returns_none() {
        let (sounds, _, _) = memory_source(&[113]);
        let exporter = AudioExporter::new(sounds, Notifier::new());
        assert!(exporter.export(None).await.is_none());
        assert!(exporter.export(recording(Vec::new(), 500)).await.is_none());
        assert_eq!(exporter.state(), ExportState::Idle);
        assert_eq!(exporter.last_outcome(), None);
    }

    #[tokio::test]
    async fn test_primary_export_places_sounds_at_offsets() {
        let (sounds, _, _) = memory_source(&[113]);
        let exporter = AudioExporter::new(sounds, Notifier::new());

        let track = exporter
            .export(recording(
                vec![PadEvent::down(113, 0), PadEvent::down(113, 500)],
                1000,
            ))
            .await
            .unwrap();
        assert!(!track.used_fallback);
        assert!(track.file_name.starts_with("musicpad_track_"));

        let samples = pcm_samples(&track.data);
        assert_eq!(samples.len(), 88200 * 2);
        // test sound: 441 frames at 8192/32768 = 0.25
        assert_eq!(samples[0], to_level(0.25));
        assert_eq!(samples[440 * 2 + 1], to_level(0.25));
        assert_eq!(samples[441 * 2], 0);
        assert_eq!(samples[22050 * 2], to_level(0.25));
        assert_eq!(exporter.last_outcome(), Some(ExportState::Succeeded));
    }

    fn to_level(v: f32) -> i16 {
        codec::to_pcm16(v)
    }

    #[tokio::test]
    async fn test_unloadable_key_is_silent_not_fatal() {
        let (sounds, _, _) = memory_source(&[113]);
        let exporter = AudioExporter::new(sounds, Notifier::new());

        let track = exporter
            .export(recording(
                vec![PadEvent::down(999, 0), PadEvent::down(113, 100)],
                200,
            ))
            .await
            .unwrap();
        assert!(!track.used_fallback);

        let samples = pcm_samples(&track.data);
        assert!(samples[..4410 * 2].iter().all(|s| *s == 0));
        assert_ne!(samples[4410 * 2], 0);
    }

    #[tokio::test]
    async fn test_all_loads_failing_uses_tones() {
        let (sounds, _, _) = memory_source(&[]);
        let notifier = Notifier::new();
        let mut rx = notifier.subscribe();
        let exporter = AudioExporter::new(sounds, notifier);

        let track = exporter
            .export(recording(vec![PadEvent::down(113, 0), PadEvent::up(113, 80)], 300))
            .await
            .unwrap();
        assert!(track.used_fallback);
        assert!(pcm_samples(&track.data).iter().any(|s| *s != 0));

        assert_eq!(
            drain(&mut rx),
            vec![
                PadNotification::ExportStateChanged(ExportState::Exporting),
                PadNotification::ExportStateChanged(ExportState::Succeeded),
                PadNotification::ExportStateChanged(ExportState::Idle),
            ]
        );
    }

    #[tokio::test]
    async fn test_both_renders_failing_reports_to_user() {
        let (sounds, _, _) = memory_source(&[113]);
        let notifier = Notifier::new();
        let mut rx = notifier.subscribe();
        let exporter = AudioExporter::new(sounds, notifier);

        // too long for a WAV file, so both renders fail to allocate
        let take = recording(vec![PadEvent::down(113, 0)], 30_000_000);
        assert!(exporter.export(take).await.is_none());

        assert_eq!(
            drain(&mut rx),
            vec![
                PadNotification::ExportStateChanged(ExportState::Exporting),
                PadNotification::ExportFailed {
                    message: EXPORT_FAILED_MESSAGE.to_string(),
                },
                PadNotification::ExportStateChanged(ExportState::Failed),
                PadNotification::ExportStateChanged(ExportState::Idle),
            ]
        );
        assert_eq!(exporter.state(), ExportState::Idle);
        assert_eq!(exporter.last_outcome(), Some(ExportState::Failed));
    }

    #[tokio::test]
    async fn test_export_alternative_is_deterministic() {
        let (sounds, _, _) = memory_source(&[]);
        let exporter = AudioExporter::new(sounds, Notifier::new());
        let take = recording(vec![PadEvent::down(97, 10), PadEvent::down(98, 40)], 100);

        let a = exporter.export_alternative(take.clone()).await.unwrap();
        let b = exporter.export_alternative(take).await.unwrap();
        assert_eq!(a.data, b.data);
    }

    #[tokio::test]
    async fn test_write_to_dir() {
        let (sounds, _, _) = memory_source(&[]);
        let exporter = AudioExporter::new(sounds, Notifier::new());
        let track = exporter
            .export(recording(vec![PadEvent::down(1, 0)], 10))
            .await
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = track.write_to_dir(dir.path().join("out")).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), track.data);
        assert!(path.ends_with(&track.file_name));
    }

    #[test]
    fn test_sound_longer_than_buffer_is_cut() {
        let sound = Arc::new(DecodedSound {
            samples: vec![0.5; 4000],
            sample_rate: 1000,
            channels: 1,
        });
        let take = Recording::new(vec![PadEvent::down(1, 500)], 500);
        let sounds = HashMap::from([(PadKey(1), sound)]);

        let buffer = render_sounds(&take, &sounds, 1000).unwrap();
        assert_eq!(buffer.frames(), 1500);
        assert_eq!(buffer.channel(1)[1499], 0.5);
        assert_eq!(buffer.channel(0)[499], 0.0);
    }
}
