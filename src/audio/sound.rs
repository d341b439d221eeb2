//! Decoded pad sounds.
//!
//! Assets are decoded once into interleaved `f32` samples and shared behind
//! an `Arc`; every playback or render reads from that shared copy.

use anyhow::{Context, Result};
use std::io::Cursor;

/// A fully decoded sound, ready for playback or offline mixing.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedSound {
    /// Interleaved samples (L, R, L, R, ... for stereo).
    pub samples: Vec<f32>,
    /// Frames per second.
    pub sample_rate: u32,
    /// Number of interleaved channels.
    pub channels: u16,
}

impl DecodedSound {
    /// Total number of frames (samples per channel).
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }

    /// Duration in seconds.
    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Returns the (left, right) pair for a frame.
    ///
    /// Mono sounds feed both sides; anything past the second channel is
    /// ignored.
    pub fn stereo_frame(&self, frame: usize) -> (f32, f32) {
        let channels = self.channels as usize;
        let base = frame * channels;
        match channels {
            0 => (0.0, 0.0),
            1 => {
                let s = self.samples.get(base).copied().unwrap_or(0.0);
                (s, s)
            }
            _ => (
                self.samples.get(base).copied().unwrap_or(0.0),
                self.samples.get(base + 1).copied().unwrap_or(0.0),
            ),
        }
    }

    /// Converts the sound to another sample rate with linear interpolation.
    ///
    /// Returns a plain copy if the rate already matches.
    pub fn resampled(&self, target_rate: u32) -> DecodedSound {
        if self.sample_rate == target_rate || self.sample_rate == 0 || self.channels == 0 {
            return self.clone();
        }

        let channels = self.channels as usize;
        let src_frames = self.frames();
        let ratio = self.sample_rate as f64 / target_rate as f64;
        let dst_frames = (src_frames as f64 / ratio).floor() as usize;

        let mut samples = Vec::with_capacity(dst_frames * channels);
        for i in 0..dst_frames {
            let pos = i as f64 * ratio;
            let idx = pos.floor() as usize;
            let frac = (pos - idx as f64) as f32;
            let next = (idx + 1).min(src_frames.saturating_sub(1));
            for ch in 0..channels {
                let a = self.samples[idx * channels + ch];
                let b = self.samples[next * channels + ch];
                samples.push(a + (b - a) * frac);
            }
        }

        DecodedSound {
            samples,
            sample_rate: target_rate,
            channels: self.channels,
        }
    }
}

/// Decodes a WAV file held in memory.
///
/// Integer formats are scaled to `[-1, 1)`; float formats are taken as is.
///
/// # Errors
///
/// Returns error if the header or the sample data is malformed
pub fn decode_wav(data: &[u8]) -> Result<DecodedSound> {
    let reader = hound::WavReader::new(Cursor::new(data)).context("failed to parse WAV header")?;

    let spec = reader.spec();
    if spec.channels == 0 {
        anyhow::bail!("WAV declares zero channels");
    }
    if spec.sample_rate == 0 {
        anyhow::bail!("WAV declares a sample rate of 0");
    }

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<Vec<_>, _>>()
            .context("failed to read float samples")?,
        hound::SampleFormat::Int => {
            let max_val = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<Result<Vec<_>, _>>()
                .context("failed to read int samples")?
        }
    };

    Ok(DecodedSound {
        samples,
        sample_rate: spec.sample_rate,
        channels: spec.channels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{SampleFormat, WavSpec, WavWriter};

    fn wav_bytes(channels: u16, rate: u32, samples: &[i16]) -> Vec<u8> {
        let spec = WavSpec {
            channels,
            sample_rate: rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
        for s in samples {
            writer.write_sample(*s).unwrap();
        }
        writer.finalize().unwrap();
        cursor.into_inner()
    }

    #[test]
    fn test_decode_int_wav() {
        let bytes = wav_bytes(2, 22050, &[16384, -16384, 0, 32767]);
        let sound = decode_wav(&bytes).unwrap();
        assert_eq!(sound.channels, 2);
        assert_eq!(sound.sample_rate, 22050);
        assert_eq!(sound.frames(), 2);
        assert!((sound.samples[0] - 0.5).abs() < 1e-4);
        assert!((sound.samples[1] + 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_wav(b"definitely not a wav file").is_err());
    }

    #[test]
    fn test_decode_rejects_zero_rate() {
        use crate::audio::codec::{encode, AudioBuffer};

        let bytes = encode(&AudioBuffer::silent(1, 4, 0).unwrap()).unwrap();
        assert_eq!(u32::from_le_bytes(bytes[24..28].try_into().unwrap()), 0);
        assert!(decode_wav(&bytes).is_err());
    }

    #[test]
    fn test_mono_feeds_both_sides() {
        let sound = DecodedSound {
            samples: vec![0.25, -0.5],
            sample_rate: 44100,
            channels: 1,
        };
        assert_eq!(sound.stereo_frame(1), (-0.5, -0.5));
        assert_eq!(sound.stereo_frame(5), (0.0, 0.0));
    }

    #[test]
    fn test_resample_doubles_frames() {
        let sound = DecodedSound {
            samples: vec![0.0, 1.0, 0.0, 1.0],
            sample_rate: 22050,
            channels: 1,
        };
        let up = sound.resampled(44100);
        assert_eq!(up.sample_rate, 44100);
        assert_eq!(up.frames(), 8);
        assert!((up.samples[1] - 0.5).abs() < 1e-6);
        assert!((up.duration_seconds() - sound.duration_seconds()).abs() < 1e-9);
    }
}
