//! Rendered sample buffers and their WAV encoding.
//!
//! Exports are written as canonical 16-bit PCM WAV: a 44-byte
//! RIFF/`fmt `/`data` header followed by interleaved little-endian samples.

use crate::error::{PadError, Result};

/// Size of the canonical PCM WAV header in bytes.
pub const WAV_HEADER_LEN: usize = 44;

/// Bytes per encoded sample.
const BYTES_PER_SAMPLE: usize = 2;

/// Planar multi-channel float samples, as produced by offline rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    sample_rate: u32,
    channels: Vec<Vec<f32>>,
}

impl AudioBuffer {
    /// Allocates a silent buffer.
    ///
    /// # Errors
    ///
    /// Returns [`PadError::Render`] if there are no channels or the buffer
    /// would be too large to store in a WAV file.
    pub fn silent(channels: usize, frames: usize, sample_rate: u32) -> Result<Self> {
        if channels == 0 {
            return Err(PadError::Render("buffer needs at least one channel".into()));
        }
        let max_frames = (u32::MAX as usize - 36) / (channels * BYTES_PER_SAMPLE);
        if frames > max_frames {
            return Err(PadError::Render(format!(
                "{} frames exceed the WAV size limit of {} frames",
                frames, max_frames
            )));
        }

        Ok(Self {
            sample_rate,
            channels: vec![vec![0.0; frames]; channels],
        })
    }

    /// Allocates a silent buffer long enough for a recording.
    ///
    /// The length is `duration + 1s`, which leaves room for the tail of the
    /// last sound.
    pub fn for_duration(channels: usize, duration_ms: u64, sample_rate: u32) -> Result<Self> {
        let frames = frames_for_duration(duration_ms, sample_rate)?;
        Self::silent(channels, frames, sample_rate)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// Frames per channel.
    pub fn frames(&self) -> usize {
        self.channels.first().map(Vec::len).unwrap_or(0)
    }

    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index]
    }

    pub fn channel_mut(&mut self, index: usize) -> &mut [f32] {
        &mut self.channels[index]
    }

    /// Adds a sample into one channel, ignoring frames past the end.
    pub fn mix_sample(&mut self, channel: usize, frame: usize, value: f32) {
        if let Some(slot) = self.channels[channel].get_mut(frame) {
            *slot += value;
        }
    }
}

/// Number of frames rendered for a recording of `duration_ms`.
///
/// # Errors
///
/// Returns [`PadError::Render`] if the frame count does not fit in memory
pub fn frames_for_duration(duration_ms: u64, sample_rate: u32) -> Result<usize> {
    duration_ms
        .checked_add(1000)
        .and_then(|ms| ms.checked_mul(sample_rate as u64))
        .and_then(|n| usize::try_from(n / 1000).ok())
        .ok_or_else(|| PadError::Render(format!("duration of {}ms is too long to render", duration_ms)))
}

/// Converts a millisecond offset to a frame index.
///
/// # Errors
///
/// Returns [`PadError::Render`] if the frame index overflows
pub fn ms_to_frame(offset_ms: u64, sample_rate: u32) -> Result<usize> {
    offset_ms
        .checked_mul(sample_rate as u64)
        .and_then(|n| usize::try_from(n / 1000).ok())
        .ok_or_else(|| PadError::Render(format!("offset of {}ms is out of range", offset_ms)))
}

/// Converts a float sample to 16-bit PCM.
///
/// The sample is clamped to `[-1, 1]`; negative values scale by 0x8000 and
/// non-negative values by 0x7FFF, truncating toward zero. NaN becomes 0.
pub fn to_pcm16(sample: f32) -> i16 {
    let s = sample.clamp(-1.0, 1.0);
    if s < 0.0 {
        (s * 32768.0) as i16
    } else {
        (s * 32767.0) as i16
    }
}

/// Encodes a buffer as a canonical 16-bit PCM WAV file.
///
/// The header is always the plain 44-byte PCM layout (format tag 1, 16-byte
/// `fmt ` chunk), whatever the channel count.
///
/// # Errors
///
/// Returns [`PadError::Render`] if the buffer does not fit the header fields
pub fn encode(buffer: &AudioBuffer) -> Result<Vec<u8>> {
    let channels = buffer.num_channels();
    let frames = buffer.frames();
    let sample_rate = buffer.sample_rate();

    let block_align = u16::try_from(channels * BYTES_PER_SAMPLE)
        .map_err(|_| PadError::Render(format!("{} channels do not fit a WAV header", channels)))?;
    let byte_rate = sample_rate
        .checked_mul(block_align as u32)
        .ok_or_else(|| PadError::Render(format!("byte rate overflows at {}Hz", sample_rate)))?;
    let data_len = frames
        .checked_mul(block_align as usize)
        .and_then(|n| u32::try_from(n).ok())
        .filter(|n| *n <= u32::MAX - 36)
        .ok_or_else(|| PadError::Render(format!("{} frames exceed the WAV size limit", frames)))?;

    let mut out = Vec::with_capacity(WAV_HEADER_LEN + data_len as usize);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&(channels as u16).to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&16u16.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());

    for frame in 0..frames {
        for channel in &buffer.channels {
            out.extend_from_slice(&to_pcm16(channel[frame]).to_le_bytes());
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u16_at(bytes: &[u8], offset: usize) -> u16 {
        u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
    }

    fn u32_at(bytes: &[u8], offset: usize) -> u32 {
        u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap())
    }

    #[test]
    fn test_one_second_stereo_silence_layout() {
        let buffer = AudioBuffer::silent(2, 44100, 44100).unwrap();
        let wav = encode(&buffer).unwrap();

        let data_size = 44100 * 2 * 2;
        assert_eq!(wav.len(), 44 + data_size);
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(u32_at(&wav, 4), 36 + data_size as u32);
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(&wav[12..16], b"fmt ");
        assert_eq!(u32_at(&wav, 16), 16);
        assert_eq!(u16_at(&wav, 20), 1);
        assert_eq!(u16_at(&wav, 22), 2);
        assert_eq!(u32_at(&wav, 24), 44100);
        assert_eq!(u32_at(&wav, 28), 44100 * 2 * 2);
        assert_eq!(u16_at(&wav, 32), 4);
        assert_eq!(u16_at(&wav, 34), 16);
        assert_eq!(&wav[36..40], b"data");
        assert_eq!(u32_at(&wav, 40), data_size as u32);
        assert!(wav[44..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_samples_are_interleaved_and_scaled() {
        let mut buffer = AudioBuffer::silent(2, 2, 44100).unwrap();
        buffer.channel_mut(0).copy_from_slice(&[1.0, -1.0]);
        buffer.channel_mut(1).copy_from_slice(&[0.5, 2.0]);

        let wav = encode(&buffer).unwrap();
        let samples: Vec<i16> = wav[44..]
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        assert_eq!(samples, vec![32767, 16383, -32768, 32767]);
    }

    #[test]
    fn test_pcm_conversion_edges() {
        assert_eq!(to_pcm16(0.0), 0);
        assert_eq!(to_pcm16(-0.5), -16384);
        assert_eq!(to_pcm16(-3.0), -32768);
        assert_eq!(to_pcm16(f32::NAN), 0);
    }

    #[test]
    fn test_duration_frames() {
        assert_eq!(frames_for_duration(0, 44100).unwrap(), 44100);
        assert_eq!(frames_for_duration(1500, 44100).unwrap(), 110250);
        assert_eq!(ms_to_frame(250, 44100).unwrap(), 11025);
    }

    #[test]
    fn test_huge_durations_are_render_errors() {
        assert!(matches!(
            frames_for_duration(u64::MAX - 10, 44100),
            Err(PadError::Render(_))
        ));
        assert!(matches!(
            ms_to_frame(u64::MAX / 1000, 44100),
            Err(PadError::Render(_))
        ));
        assert!(matches!(
            AudioBuffer::for_duration(2, u64::MAX / 44100, 44100),
            Err(PadError::Render(_))
        ));
    }

    #[test]
    fn test_four_channel_header_stays_canonical() {
        let mut buffer = AudioBuffer::silent(4, 10, 44100).unwrap();
        buffer.channel_mut(3)[0] = 0.5;
        let wav = encode(&buffer).unwrap();

        let data_size = 10 * 4 * 2;
        assert_eq!(wav.len(), 44 + data_size);
        assert_eq!(u32_at(&wav, 4), 36 + data_size as u32);
        assert_eq!(u32_at(&wav, 16), 16);
        assert_eq!(u16_at(&wav, 20), 1);
        assert_eq!(u16_at(&wav, 22), 4);
        assert_eq!(u32_at(&wav, 28), 44100 * 4 * 2);
        assert_eq!(u16_at(&wav, 32), 8);
        assert_eq!(&wav[36..40], b"data");
        assert_eq!(u32_at(&wav, 40), data_size as u32);
        // fourth sample of the first frame
        assert_eq!(u16_at(&wav, 44 + 6) as i16, 16383);
    }

    #[test]
    fn test_zero_channels_rejected() {
        assert!(matches!(
            AudioBuffer::silent(0, 10, 44100),
            Err(PadError::Render(_))
        ));
    }

    #[test]
    fn test_mix_past_end_is_ignored() {
        let mut buffer = AudioBuffer::silent(1, 2, 8000).unwrap();
        buffer.mix_sample(0, 1, 0.25);
        buffer.mix_sample(0, 1, 0.25);
        buffer.mix_sample(0, 9, 1.0);
        assert_eq!(buffer.channel(0), &[0.0, 0.5]);
    }
}
