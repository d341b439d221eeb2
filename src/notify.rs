//! State-change notifications for the presentation layer.
//!
//! The core never touches the screen. Instead the recorder, scheduler and
//! exporter publish [`PadNotification`]s on a broadcast channel, and whatever
//! UI is attached subscribes and lights pads, toggles buttons or shows alerts.

use crate::audio::ExportState;
use crate::playback::LoopCount;
use crate::recording::{PadKey, RecordingId};
use tokio::sync::broadcast;

/// Capacity of the notification channel. Slow subscribers lose the oldest
/// messages rather than stalling playback.
const CHANNEL_CAPACITY: usize = 256;

/// Something the presentation layer may want to show.
#[derive(Debug, Clone, PartialEq)]
pub enum PadNotification {
    RecordingStarted,
    RecordingStopped {
        /// Number of events captured (0 means nothing to show).
        events: usize,
    },
    /// The event buffer filled up and the recorder stopped itself.
    RecordingOverflow { limit: usize },
    PlaybackStarted { recording: RecordingId },
    PlaybackStopped,
    /// A pad fired during playback and should be highlighted.
    PadTriggered { key: PadKey },
    /// A loop cycle is starting (1-based index).
    LoopCycle { index: u32, target: LoopCount },
    LoopComplete,
    ExportStateChanged(ExportState),
    /// Export failed entirely; the message is meant for the user.
    ExportFailed { message: String },
}

/// Cloneable sender side of the notification channel.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: broadcast::Sender<PadNotification>,
}

impl Notifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Publishes a notification. Having no subscribers is fine.
    pub fn emit(&self, notification: PadNotification) {
        let _ = self.tx.send(notification);
    }

    /// Opens a new subscription that sees every later notification.
    pub fn subscribe(&self) -> broadcast::Receiver<PadNotification> {
        self.tx.subscribe()
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Drains everything currently queued on a receiver.
///
/// Handy for tests and for UI loops that poll once per frame.
pub fn drain(rx: &mut broadcast::Receiver<PadNotification>) -> Vec<PadNotification> {
    let mut out = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(n) => out.push(n),
            Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_without_subscribers_is_silent() {
        let notifier = Notifier::new();
        notifier.emit(PadNotification::PlaybackStopped);
    }

    #[test]
    fn test_subscriber_sees_later_notifications() {
        let notifier = Notifier::new();
        notifier.emit(PadNotification::RecordingStarted);

        let mut rx = notifier.subscribe();
        notifier.emit(PadNotification::PadTriggered { key: PadKey(113) });
        notifier.emit(PadNotification::LoopComplete);

        assert_eq!(
            drain(&mut rx),
            vec![
                PadNotification::PadTriggered { key: PadKey(113) },
                PadNotification::LoopComplete,
            ]
        );
    }
}
