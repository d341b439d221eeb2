//! Error types for the pad engine.

use crate::recording::PadKey;

/// Result alias that carries [`PadError`].
pub type Result<T> = std::result::Result<T, PadError>;

/// Everything that can go wrong inside the record/playback/export core.
///
/// Most of these are absorbed and logged by the component that hits them.
/// Only [`PadError::ExportFailure`] is meant to reach the end user.
#[derive(Debug, thiserror::Error)]
pub enum PadError {
    /// A pad sound could not be fetched or decoded.
    #[error("failed to load sound {key}: {reason}")]
    Load { key: PadKey, reason: String },

    /// Stop, play or export was asked to work on a recording with no events.
    #[error("recording contains no events")]
    EmptyRecording,

    /// The recorder's event buffer reached its bound.
    #[error("event buffer full ({limit} events)")]
    BufferOverflow { limit: usize },

    /// Offline rendering or encoding failed.
    #[error("render failed: {0}")]
    Render(String),

    /// Both the primary and the fallback export paths failed.
    #[error("export failed: {0}")]
    ExportFailure(String),

    /// The live output device refused to start a sound.
    #[error("playback failed: {0}")]
    Playback(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl PadError {
    /// Builds a [`PadError::Load`] from any displayable cause.
    ///
    /// The alternate formatter is used so `anyhow` context chains survive.
    pub fn load(key: PadKey, reason: impl std::fmt::Display) -> Self {
        Self::Load {
            key,
            reason: format!("{:#}", reason),
        }
    }
}
