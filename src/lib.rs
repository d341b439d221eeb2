//! musicpad - A key-driven audio pad.
//!
//! This library provides the core of the pad: capturing key events with
//! their timing, replaying or looping them against cached pad sounds, and
//! exporting a recording to a WAV file.

pub mod app;
pub mod audio;
pub mod config;
pub mod error;
pub mod notify;
pub mod playback;
pub mod recording;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use app::MusicPad;
pub use audio::{AudioExporter, ExportState, ExportedTrack, SoundSource};
pub use config::PadConfig;
pub use error::{PadError, Result};
pub use notify::{Notifier, PadNotification};
pub use playback::{LoopCount, PlaybackScheduler, PlaybackState};
pub use recording::{EventKind, EventRecorder, PadEvent, PadKey, Recording};
