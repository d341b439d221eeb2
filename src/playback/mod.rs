//! Timed replay of recordings.
//!
//! The scheduler replays a recording's key-downs at their offsets, once or
//! in a loop, and can cancel everything it scheduled in one step.

mod quantize;
mod scheduler;

pub use quantize::Quantizer;
pub use scheduler::{OnComplete, PlaybackScheduler, DEFAULT_COMPLETION_BUFFER};

use std::fmt;

/// How many times a loop should play.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopCount {
    /// A fixed number of cycles.
    Times(u32),
    /// Until stopped.
    #[default]
    Forever,
}

impl LoopCount {
    /// Returns true if cycle `index` (1-based) should still play.
    pub fn allows(self, index: u32) -> bool {
        match self {
            LoopCount::Times(n) => index <= n,
            LoopCount::Forever => true,
        }
    }
}

impl fmt::Display for LoopCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopCount::Times(n) => write!(f, "{}", n),
            LoopCount::Forever => write!(f, "∞"),
        }
    }
}

/// What the scheduler is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// No session is active.
    Stopped,
    /// A single pass is in progress.
    Playing,
    /// A loop session is in progress.
    Looping,
}
