//! Pad engine settings.
//!
//! Settings are stored as JSON. Missing fields fall back to their defaults,
//! so a config file only needs the values it changes.

use crate::audio::{DEFAULT_WARM_DELAY, DEFAULT_WARM_KEYS};
use crate::playback::{LoopCount, Quantizer, DEFAULT_COMPLETION_BUFFER};
use crate::recording::{PadKey, DEFAULT_MAX_EVENTS};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Cycles played by `loop` when no count is given.
pub const DEFAULT_LOOP_COUNT: u32 = 4;

/// Runtime configuration of a [`MusicPad`](crate::MusicPad).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PadConfig {
    /// Directory holding the `{key}.wav` sound assets.
    pub sound_dir: PathBuf,
    /// Initial volume for new voices, clamped to `[0, 1]`.
    pub volume: f32,
    /// Pads preloaded in the background after startup.
    pub warm_keys: Vec<u32>,
    pub warm_delay_ms: u64,
    /// Silence after a recording's end before a pass completes.
    pub completion_buffer_ms: u64,
    /// Tempo to snap playback to; None plays events at their recorded offsets.
    pub quantize_bpm: Option<f64>,
    /// Events a single take may hold.
    pub max_events: usize,
    /// Directory exports are written to.
    pub output_dir: PathBuf,
    /// Cycles for a loop without an explicit count. Zero loops forever.
    pub default_loop_count: u32,
}

impl Default for PadConfig {
    fn default() -> Self {
        Self {
            sound_dir: PathBuf::from("sounds"),
            volume: 1.0,
            warm_keys: DEFAULT_WARM_KEYS.to_vec(),
            warm_delay_ms: DEFAULT_WARM_DELAY.as_millis() as u64,
            completion_buffer_ms: DEFAULT_COMPLETION_BUFFER.as_millis() as u64,
            quantize_bpm: None,
            max_events: DEFAULT_MAX_EVENTS,
            output_dir: PathBuf::from("."),
            default_loop_count: DEFAULT_LOOP_COUNT,
        }
    }
}

impl PadConfig {
    /// Reads a config from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Writes the config as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be written
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> crate::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn warm_keys(&self) -> Vec<PadKey> {
        self.warm_keys.iter().copied().map(PadKey).collect()
    }

    pub fn warm_delay(&self) -> Duration {
        Duration::from_millis(self.warm_delay_ms)
    }

    pub fn completion_buffer(&self) -> Duration {
        Duration::from_millis(self.completion_buffer_ms)
    }

    /// The quantizer for `quantize_bpm`, if set to a usable tempo.
    pub fn quantizer(&self) -> Option<Quantizer> {
        self.quantize_bpm.and_then(Quantizer::new)
    }

    pub fn default_loop(&self) -> LoopCount {
        match self.default_loop_count {
            0 => LoopCount::Forever,
            n => LoopCount::Times(n),
        }
    }
}
