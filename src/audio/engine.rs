//! Live audio output.
//!
//! A [`SoundSink`] turns a decoded sound into an independently playing
//! voice. The real sink mixes voices through rodio; [`CaptureSink`] just
//! writes down what would have been played.

use super::sound::DecodedSound;
use crate::error::{PadError, Result};
use crate::recording::PadKey;
use anyhow::Context;
use rodio::{OutputStream, OutputStreamHandle, Source};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Sample rate used for playback and export (44.1 kHz standard).
pub const SAMPLE_RATE: u32 = 44100;

/// Description of a voice that has started playing.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayingSound {
    /// The pad whose sound is playing.
    pub key: PadKey,
    /// Gain applied to this voice, fixed at start.
    pub volume: f32,
    /// Length of the voice.
    pub duration: Duration,
}

/// Starts playback of decoded sounds.
pub trait SoundSink: Send + Sync {
    /// Starts a new voice for `sound` at the given volume.
    ///
    /// Each call must produce an independent voice, so rapid repeats of the
    /// same pad overlap instead of restarting each other.
    fn start(&self, key: PadKey, sound: Arc<DecodedSound>, volume: f32) -> Result<PlayingSound>;
}

/// One playing instance of a cached sound.
///
/// Reads straight from the shared decode; only the read position and the
/// gain belong to the voice.
struct SoundVoice {
    /// The shared decoded sound.
    sound: Arc<DecodedSound>,
    /// Index of the next interleaved sample.
    pos: usize,
    /// Gain applied to every sample.
    volume: f32,
}

impl SoundVoice {
    fn new(sound: Arc<DecodedSound>, volume: f32) -> Self {
        Self {
            sound,
            pos: 0,
            volume,
        }
    }
}

impl Iterator for SoundVoice {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        let sample = *self.sound.samples.get(self.pos)?;
        self.pos += 1;
        Some(sample * self.volume)
    }
}

impl Source for SoundVoice {
    fn current_frame_len(&self) -> Option<usize> {
        Some(self.sound.samples.len().saturating_sub(self.pos))
    }

    fn channels(&self) -> u16 {
        self.sound.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sound.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        Some(Duration::from_secs_f64(self.sound.duration_seconds()))
    }
}

/// Plays voices on a rodio output stream.
///
/// The owning [`OutputStream`] must be kept alive by the caller for as long
/// as the sink is used.
#[derive(Clone)]
pub struct RodioSink {
    handle: OutputStreamHandle,
}

impl RodioSink {
    pub fn new(handle: OutputStreamHandle) -> Self {
        Self { handle }
    }

    /// Opens the default output device.
    ///
    /// # Errors
    ///
    /// Returns error if no audio output can be opened
    pub fn open_default() -> anyhow::Result<(OutputStream, Self)> {
        let (stream, handle) =
            OutputStream::try_default().context("Failed to open audio output")?;
        Ok((stream, Self::new(handle)))
    }
}

impl SoundSink for RodioSink {
    fn start(&self, key: PadKey, sound: Arc<DecodedSound>, volume: f32) -> Result<PlayingSound> {
        let duration = Duration::from_secs_f64(sound.duration_seconds());
        self.handle
            .play_raw(SoundVoice::new(sound, volume))
            .map_err(|e| PadError::Playback(format!("sound {}: {}", key, e)))?;

        Ok(PlayingSound {
            key,
            volume,
            duration,
        })
    }
}

/// A voice start recorded by [`CaptureSink`].
#[derive(Debug, Clone)]
pub struct CapturedVoice {
    pub key: PadKey,
    pub volume: f32,
    /// Runtime clock reading when the voice started.
    pub at: tokio::time::Instant,
}

/// Sink that records voice starts instead of producing sound.
///
/// Used headless (dry runs) and by tests that check what fired and when.
#[derive(Debug, Default)]
pub struct CaptureSink {
    voices: Mutex<Vec<CapturedVoice>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every voice started so far.
    pub fn voices(&self) -> Vec<CapturedVoice> {
        self.voices
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Returns the keys of every voice started so far, in start order.
    pub fn keys(&self) -> Vec<PadKey> {
        self.voices().into_iter().map(|v| v.key).collect()
    }

    pub fn count(&self) -> usize {
        self.voices.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl SoundSink for CaptureSink {
    fn start(&self, key: PadKey, sound: Arc<DecodedSound>, volume: f32) -> Result<PlayingSound> {
        self.voices
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(CapturedVoice {
                key,
                volume,
                at: tokio::time::Instant::now(),
            });

        Ok(PlayingSound {
            key,
            volume,
            duration: Duration::from_secs_f64(sound.duration_seconds()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sound() -> Arc<DecodedSound> {
        Arc::new(DecodedSound {
            samples: vec![0.5, -0.5, 1.0, -1.0],
            sample_rate: SAMPLE_RATE,
            channels: 2,
        })
    }

    #[test]
    fn test_voice_applies_volume() {
        let voice = SoundVoice::new(sound(), 0.5);
        let samples: Vec<f32> = voice.collect();
        assert_eq!(samples, vec![0.25, -0.25, 0.5, -0.5]);
    }

    #[test]
    fn test_voices_do_not_share_position() {
        let shared = sound();
        let mut a = SoundVoice::new(Arc::clone(&shared), 1.0);
        let mut b = SoundVoice::new(Arc::clone(&shared), 1.0);

        a.next();
        a.next();
        assert_eq!(b.next(), Some(0.5));
        assert_eq!(a.next(), Some(1.0));
        assert_eq!(a.current_frame_len(), Some(1));
    }

    #[tokio::test]
    async fn test_capture_sink_records_starts() {
        let sink = CaptureSink::new();
        let playing = sink.start(PadKey(113), sound(), 0.8).unwrap();
        assert_eq!(playing.key, PadKey(113));
        assert_eq!(sink.keys(), vec![PadKey(113)]);
        assert_eq!(sink.voices()[0].volume, 0.8);
    }
}
