//! Captured pad performances.
//!
//! This module provides the types shared by the recorder, the playback
//! scheduler and the exporter: pad keys, timestamped key events and the
//! immutable [`Recording`] produced when a take stops.

mod clock;
mod recorder;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use recorder::{EventRecorder, RecorderState, DEFAULT_MAX_EVENTS, MAX_BUFFER_BYTES};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::Path;
use uuid::Uuid;

/// Identifier of a pad, as delivered by the input layer.
///
/// Keyboard pads use the character code of the key (`q` is 113), so the
/// same number addresses the sound asset `{key}.wav`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PadKey(pub u32);

impl PadKey {
    /// Returns the pad key for a typed character.
    pub fn from_char(c: char) -> Self {
        Self(c as u32)
    }

    /// Returns the raw key code.
    pub fn code(self) -> u32 {
        self.0
    }
}

impl fmt::Display for PadKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for PadKey {
    fn from(code: u32) -> Self {
        Self(code)
    }
}

/// Direction of a key transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "keydown")]
    KeyDown,
    #[serde(rename = "keyup")]
    KeyUp,
}

/// One captured key transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PadEvent {
    /// The pad that changed state.
    pub key: PadKey,
    /// Whether the pad went down or up.
    pub kind: EventKind,
    /// Milliseconds since the recording started.
    pub offset_ms: u64,
}

impl PadEvent {
    pub fn new(key: PadKey, kind: EventKind, offset_ms: u64) -> Self {
        Self {
            key,
            kind,
            offset_ms,
        }
    }

    /// Shorthand for a key-down event.
    pub fn down(key: impl Into<PadKey>, offset_ms: u64) -> Self {
        Self::new(key.into(), EventKind::KeyDown, offset_ms)
    }

    /// Shorthand for a key-up event.
    pub fn up(key: impl Into<PadKey>, offset_ms: u64) -> Self {
        Self::new(key.into(), EventKind::KeyUp, offset_ms)
    }

    /// Returns true for events that should make a sound.
    pub fn is_down(&self) -> bool {
        self.kind == EventKind::KeyDown
    }
}

/// Unique identifier assigned to a recording when it is finalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordingId(Uuid);

impl RecordingId {
    /// Generates a new random ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RecordingId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "track_{}", self.0.simple())
    }
}

/// An immutable, timestamped sequence of pad events.
///
/// Recordings are produced atomically by [`EventRecorder::stop`] and are
/// never mutated afterwards; callers share them behind an `Arc`.
/// A recording with no events is representable (for example after
/// deserializing) but is never playable or exportable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recording {
    id: RecordingId,
    events: Vec<PadEvent>,
    duration_ms: u64,
    created_at: DateTime<Utc>,
}

impl Recording {
    /// Freezes a list of events into a new recording.
    ///
    /// Events are kept in capture order (a stable sort by offset is applied so
    /// hand-built event lists obey the same ordering). The duration is widened
    /// to cover the last event if the caller passed something shorter.
    ///
    /// # Arguments
    ///
    /// * `events` - Captured events
    /// * `duration_ms` - Span from recording start to stop
    pub fn new(mut events: Vec<PadEvent>, duration_ms: u64) -> Self {
        events.sort_by_key(|e| e.offset_ms);
        let last_offset = events.last().map(|e| e.offset_ms).unwrap_or(0);

        Self {
            id: RecordingId::new(),
            events,
            duration_ms: duration_ms.max(last_offset),
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> RecordingId {
        self.id
    }

    pub fn events(&self) -> &[PadEvent] {
        &self.events
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Returns true if the recording has something to play or export.
    pub fn is_playable(&self) -> bool {
        !self.events.is_empty()
    }

    /// Iterates over the key-down events only.
    pub fn key_downs(&self) -> impl Iterator<Item = &PadEvent> {
        self.events.iter().filter(|e| e.is_down())
    }

    /// Returns each pad that is pressed at least once, in first-press order.
    pub fn distinct_down_keys(&self) -> Vec<PadKey> {
        let mut seen = HashSet::new();
        self.key_downs()
            .map(|e| e.key)
            .filter(|key| seen.insert(*key))
            .collect()
    }

    /// Serializes the recording to pretty JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Parses a recording from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Writes the recording to a JSON file.
    ///
    /// # Errors
    ///
    /// Returns error if serialization or file writing fails
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> crate::Result<()> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Reads a recording from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let json = fs::read_to_string(path)?;
        Ok(Self::from_json(&json)?)
    }
}
