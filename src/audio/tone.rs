//! Synthesized stand-in tones.
//!
//! When no pad sound can be decoded, an export still produces something
//! audible: each key-down becomes a short sine blip whose pitch is derived
//! from the key code.

use super::codec::{ms_to_frame, AudioBuffer};
use crate::error::Result;
use crate::recording::{PadKey, Recording};
use std::f64::consts::TAU;

/// Length of each tone.
pub const TONE_DURATION_MS: u64 = 100;

/// Time to ramp from silence to peak.
pub const TONE_ATTACK_MS: u64 = 10;

/// Gain at the end of the attack.
pub const TONE_PEAK_GAIN: f64 = 0.7;

/// Returns the tone frequency for a pad: `220 + (key mod 88) * 10` Hz.
pub fn tone_frequency(key: PadKey) -> f64 {
    220.0 + (key.code() % 88) as f64 * 10.0
}

/// Linear attack/decay envelope at `t` seconds into a tone.
///
/// Rises 0 -> 0.7 over the attack, then falls back to 0 at the end of the
/// tone.
pub fn tone_envelope(t: f64) -> f64 {
    let attack = TONE_ATTACK_MS as f64 / 1000.0;
    let total = TONE_DURATION_MS as f64 / 1000.0;

    if t < 0.0 || t >= total {
        0.0
    } else if t < attack {
        TONE_PEAK_GAIN * t / attack
    } else {
        TONE_PEAK_GAIN * (total - t) / (total - attack)
    }
}

/// Renders one tone per key-down event into a stereo buffer.
///
/// The buffer spans the recording plus one second, like the primary render.
///
/// # Errors
///
/// Returns [`crate::PadError::Render`] if the buffer cannot be allocated
pub fn render_tones(recording: &Recording, sample_rate: u32) -> Result<AudioBuffer> {
    let mut buffer = AudioBuffer::for_duration(2, recording.duration_ms(), sample_rate)?;
    let tone_frames = ms_to_frame(TONE_DURATION_MS, sample_rate)?;
    let rate = sample_rate as f64;

    for event in recording.key_downs() {
        let start = ms_to_frame(event.offset_ms, sample_rate)?;
        let freq = tone_frequency(event.key);

        for i in 0..tone_frames {
            let frame = start + i;
            if frame >= buffer.frames() {
                break;
            }
            let t = i as f64 / rate;
            let value = ((TAU * freq * t).sin() * tone_envelope(t)) as f32;
            buffer.mix_sample(0, frame, value);
            buffer.mix_sample(1, frame, value);
        }
    }

    Ok(buffer)
}
