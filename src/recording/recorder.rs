//! Key event capture.
//!
//! The recorder is a two-state machine (`Idle -> Recording -> Idle`). While
//! recording it appends every key transition with its offset from the
//! origin reading; stopping freezes the buffer into an immutable
//! [`Recording`] that replaces the previous take.

use super::{Clock, EventKind, PadEvent, PadKey, Recording};
use crate::error::{PadError, Result};
use crate::notify::{Notifier, PadNotification};
use std::sync::Arc;

/// Memory budget of the event buffer.
pub const MAX_BUFFER_BYTES: usize = 10 * 1024 * 1024;

/// Number of events that fit in [`MAX_BUFFER_BYTES`].
pub const DEFAULT_MAX_EVENTS: usize = MAX_BUFFER_BYTES / std::mem::size_of::<PadEvent>();

/// Whether a take is in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    Idle,
    Recording,
}

/// Check run before each take to make sure audio can be produced at all.
type ContextProbe = Box<dyn Fn() -> anyhow::Result<()> + Send + Sync>;

/// Captures timestamped key transitions into recordings.
pub struct EventRecorder {
    /// Source of monotonic readings for offsets.
    clock: Arc<dyn Clock>,
    /// Where state changes are announced.
    notifier: Notifier,
    /// Audio subsystem availability check.
    probe: ContextProbe,
    state: RecorderState,
    /// Clock reading when the current take started.
    origin_ms: u64,
    /// Events of the take in progress, in capture order.
    events: Vec<PadEvent>,
    /// Upper bound on `events.len()`.
    max_events: usize,
    /// Last completed take.
    current: Option<Arc<Recording>>,
}

impl EventRecorder {
    /// Creates an idle recorder with the default buffer bound.
    ///
    /// # Arguments
    ///
    /// * `clock` - Monotonic time source for event offsets
    /// * `notifier` - Channel for recording-state notifications
    pub fn new(clock: Arc<dyn Clock>, notifier: Notifier) -> Self {
        Self {
            clock,
            notifier,
            probe: Box::new(|| Ok(())),
            state: RecorderState::Idle,
            origin_ms: 0,
            events: Vec::new(),
            max_events: DEFAULT_MAX_EVENTS,
            current: None,
        }
    }

    /// Sets the maximum number of events one take may hold.
    pub fn with_max_events(mut self, max_events: usize) -> Self {
        self.max_events = max_events.max(1);
        self
    }

    /// Installs a check that must pass before a take can start.
    ///
    /// The check typically verifies that an audio output can be opened.
    pub fn with_context_probe<F>(mut self, probe: F) -> Self
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.probe = Box::new(probe);
        self
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        self.state == RecorderState::Recording
    }

    pub fn max_events(&self) -> usize {
        self.max_events
    }

    /// Number of events captured so far in the take in progress.
    pub fn pending_events(&self) -> usize {
        self.events.len()
    }

    /// Starts a new take.
    ///
    /// Resets the event buffer and records the origin reading. Starting while
    /// already recording restarts the take.
    ///
    /// # Returns
    ///
    /// false if the audio context probe failed; the recorder stays idle
    pub fn start(&mut self) -> bool {
        if let Err(e) = (self.probe)() {
            tracing::error!("Recording failed: {:#}", e);
            return false;
        }

        self.events.clear();
        self.origin_ms = self.clock.now_ms();
        self.state = RecorderState::Recording;

        tracing::info!("Recording started");
        self.notifier.emit(PadNotification::RecordingStarted);
        true
    }

    /// Appends a key transition to the take in progress.
    ///
    /// Does nothing when idle.
    ///
    /// # Errors
    ///
    /// Returns [`PadError::BufferOverflow`] when the buffer is already full.
    /// The offending event is dropped and the take is stopped, so everything
    /// captured up to that point becomes the current recording.
    pub fn record_event(&mut self, key: PadKey, kind: EventKind) -> Result<()> {
        if self.state != RecorderState::Recording {
            return Ok(());
        }

        if self.events.len() >= self.max_events {
            let limit = self.max_events;
            tracing::warn!("Event buffer full after {} events, stopping recording", limit);
            self.stop();
            self.notifier
                .emit(PadNotification::RecordingOverflow { limit });
            return Err(PadError::BufferOverflow { limit });
        }

        // A clock that steps backwards must not produce negative offsets
        let offset_ms = self.clock.now_ms().saturating_sub(self.origin_ms);
        self.events.push(PadEvent::new(key, kind, offset_ms));
        Ok(())
    }

    /// Ends the take in progress.
    ///
    /// # Returns
    ///
    /// The new recording, or None if nothing was being recorded or the take
    /// captured no events. An empty take leaves the previous recording in
    /// place.
    pub fn stop(&mut self) -> Option<Arc<Recording>> {
        if self.state != RecorderState::Recording {
            return None;
        }
        self.state = RecorderState::Idle;

        let duration_ms = self.clock.now_ms().saturating_sub(self.origin_ms);
        let events = std::mem::take(&mut self.events);
        self.notifier.emit(PadNotification::RecordingStopped {
            events: events.len(),
        });

        if events.is_empty() {
            tracing::info!("Recording stopped - No events recorded");
            return None;
        }

        tracing::info!(
            "Recording stopped - {} events recorded over {}ms",
            events.len(),
            duration_ms
        );

        let recording = Arc::new(Recording::new(events, duration_ms));
        self.current = Some(Arc::clone(&recording));
        Some(recording)
    }

    /// Returns the last completed recording.
    ///
    /// None while a take is in progress or before the first take finished.
    pub fn current(&self) -> Option<Arc<Recording>> {
        match self.state {
            RecorderState::Recording => None,
            RecorderState::Idle => self.current.clone(),
        }
    }
}
