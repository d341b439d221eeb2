//! Pad sound loading, live playback and WAV export.
//!
//! This module provides:
//! - Asset stores that fetch `{key}.wav` files
//! - A single-flight decode cache with live playback through rodio
//! - Offline rendering of recordings and canonical WAV encoding
//! - A synthesized-tone fallback for exports without usable sounds

pub mod assets;
pub mod codec;
pub mod engine;
pub mod export;
pub mod sound;
pub mod source;
pub mod tone;

#[cfg(feature = "http")]
pub use assets::HttpAssetStore;
pub use assets::{AssetStore, FileAssetStore, MemoryAssetStore};
pub use codec::{encode, AudioBuffer};
pub use engine::{CaptureSink, PlayingSound, RodioSink, SoundSink, SAMPLE_RATE};
pub use export::{export_file_name, AudioExporter, ExportState, ExportedTrack};
pub use sound::{decode_wav, DecodedSound};
pub use source::{SoundSource, DEFAULT_WARM_DELAY, DEFAULT_WARM_KEYS};
