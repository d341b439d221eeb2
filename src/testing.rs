//! Shared fixtures for unit tests.

use crate::audio::{CaptureSink, MemoryAssetStore, SoundSource, SAMPLE_RATE};
use crate::recording::PadKey;
use hound::{SampleFormat, WavSpec, WavWriter};
use std::io::Cursor;
use std::sync::Arc;

/// A stereo 16-bit WAV of `frames` frames held at a constant `level`.
pub fn test_wav(frames: usize, level: i16) -> Vec<u8> {
    let spec = WavSpec {
        channels: 2,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
    for _ in 0..frames * 2 {
        writer.write_sample(level).unwrap();
    }
    writer.finalize().unwrap();
    cursor.into_inner()
}

/// A sound source backed by memory and a capturing sink.
///
/// Every key in `keys` gets a short test WAV; everything else fails to load.
pub fn memory_source(keys: &[u32]) -> (Arc<SoundSource>, Arc<MemoryAssetStore>, Arc<CaptureSink>) {
    let store = Arc::new(MemoryAssetStore::new());
    for &k in keys {
        store.insert(PadKey(k), test_wav(441, 8192));
    }
    let sink = Arc::new(CaptureSink::new());
    let source = Arc::new(SoundSource::new(store.clone(), sink.clone()));
    (source, store, sink)
}
