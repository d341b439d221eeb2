//! Session-based playback scheduling.
//!
//! Every `play_once` or `play_loop` call opens a new session and tears down
//! the previous one first, so at most one timeline is ever live. A session
//! runs as one Tokio task that sleeps until each key-down's offset and then
//! triggers the pad. All of a session's pending work shares one
//! `CancellationToken`; cancelling it invalidates every outstanding trigger
//! at once.

use super::{LoopCount, PlaybackState, Quantizer};
use crate::audio::SoundSource;
use crate::notify::{Notifier, PadNotification};
use crate::recording::{PadKey, Recording, RecordingId};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Silence kept after the recording's end before a pass counts as complete.
pub const DEFAULT_COMPLETION_BUFFER: Duration = Duration::from_millis(100);

/// Callback run when a single pass finishes on its own.
pub type OnComplete = Box<dyn FnOnce() + Send + 'static>;

/// Precomputed trigger times for one pass over a recording.
#[derive(Debug, Clone)]
struct CyclePlan {
    /// Key-down triggers sorted by offset from the start of the pass.
    triggers: Vec<(Duration, PadKey)>,
    /// When the pass is over, buffer included.
    end: Duration,
}

/// The live session.
struct ActiveSession {
    generation: u64,
    recording: RecordingId,
    mode: PlaybackState,
    /// Cancels every pending trigger of this session.
    token: CancellationToken,
    /// Fires once the session has ended, however it ended.
    done: CancellationToken,
    task: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct SessionSlot {
    next_generation: u64,
    active: Option<ActiveSession>,
    /// Loop cycles finished by the current or last loop session.
    completed_loops: u32,
}

/// State shared between the scheduler and its session tasks.
struct Shared {
    sounds: Arc<SoundSource>,
    notifier: Notifier,
    slot: Mutex<SessionSlot>,
}

impl Shared {
    fn slot(&self) -> MutexGuard<'_, SessionSlot> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Ends the session if it is still the active one.
    ///
    /// Returns false if the session was already torn down or replaced.
    fn finish(&self, generation: u64) -> bool {
        let session = {
            let mut slot = self.slot();
            match slot.active.as_ref() {
                Some(s) if s.generation == generation => slot.active.take(),
                _ => None,
            }
        };

        match session {
            Some(session) => {
                session.done.cancel();
                self.notifier.emit(PadNotification::PlaybackStopped);
                true
            }
            None => false,
        }
    }

    fn record_completed_loop(&self, generation: u64, index: u32) {
        let mut slot = self.slot();
        if slot.active.as_ref().map(|s| s.generation) == Some(generation) {
            slot.completed_loops = index;
        }
    }
}

/// Waits for `deadline` unless the session is cancelled first.
///
/// Returns true if the deadline was reached with the session still live.
async fn wait_until(deadline: Instant, token: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = token.cancelled() => false,
        _ = tokio::time::sleep_until(deadline) => !token.is_cancelled(),
    }
}

/// Plays one pass of a plan.
///
/// Returns true if the pass ran to its end, false if it was cancelled.
async fn run_cycle(shared: &Shared, plan: &CyclePlan, token: &CancellationToken) -> bool {
    let start = Instant::now();

    for &(offset, key) in &plan.triggers {
        if !wait_until(start + offset, token).await {
            return false;
        }
        tracing::debug!("Triggering pad {} at {}ms", key, offset.as_millis());
        shared.notifier.emit(PadNotification::PadTriggered { key });

        // Loading may take a while; later triggers must not wait for it
        let sounds = Arc::clone(&shared.sounds);
        let token = token.clone();
        tokio::spawn(async move {
            sounds.play_unless_cancelled(key, &token).await;
        });
    }

    wait_until(start + plan.end, token).await
}

/// Replays recordings against the shared sound source.
pub struct PlaybackScheduler {
    shared: Arc<Shared>,
    /// Extra time after a recording's duration before a pass completes.
    completion_buffer: Duration,
    /// Beat grid applied to new sessions, if enabled.
    quantizer: Option<Quantizer>,
}

impl PlaybackScheduler {
    /// Creates an idle scheduler without quantization.
    pub fn new(sounds: Arc<SoundSource>, notifier: Notifier) -> Self {
        Self {
            shared: Arc::new(Shared {
                sounds,
                notifier,
                slot: Mutex::new(SessionSlot::default()),
            }),
            completion_buffer: DEFAULT_COMPLETION_BUFFER,
            quantizer: None,
        }
    }

    pub fn with_completion_buffer(mut self, buffer: Duration) -> Self {
        self.completion_buffer = buffer;
        self
    }

    pub fn with_quantizer(mut self, quantizer: Option<Quantizer>) -> Self {
        self.quantizer = quantizer;
        self
    }

    /// Enables or disables quantization for sessions started from now on.
    pub fn set_quantizer(&mut self, quantizer: Option<Quantizer>) {
        self.quantizer = quantizer;
    }

    pub fn quantizer(&self) -> Option<Quantizer> {
        self.quantizer
    }

    /// Returns what the scheduler is currently doing.
    pub fn state(&self) -> PlaybackState {
        self.shared
            .slot()
            .active
            .as_ref()
            .map(|s| s.mode)
            .unwrap_or(PlaybackState::Stopped)
    }

    pub fn is_active(&self) -> bool {
        self.shared.slot().active.is_some()
    }

    /// Returns the recording of the live session.
    pub fn active_recording(&self) -> Option<RecordingId> {
        self.shared.slot().active.as_ref().map(|s| s.recording)
    }

    /// Loop cycles completed by the current or most recent loop session.
    pub fn completed_loops(&self) -> u32 {
        self.shared.slot().completed_loops
    }

    /// Plays a recording once.
    ///
    /// Tears down any active session, then schedules every key-down at its
    /// offset. Key-ups are not sounded. After the recording's duration plus
    /// the completion buffer the session ends and `on_complete` runs.
    /// `on_complete` never runs if the session is stopped or replaced.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Returns
    ///
    /// false if there is nothing to play or no runtime is available
    pub fn play_once(&self, recording: Option<Arc<Recording>>, on_complete: Option<OnComplete>) -> bool {
        let Some(recording) = recording.filter(|r| r.is_playable()) else {
            tracing::error!("No valid track to play");
            return false;
        };
        let Ok(runtime) = Handle::try_current() else {
            tracing::error!("Playback needs a running Tokio runtime");
            return false;
        };

        self.stop();
        let plan = self.plan(&recording);
        let (generation, token) = self.begin(&recording, PlaybackState::Playing);

        let shared = Arc::clone(&self.shared);
        let task = runtime.spawn(async move {
            if run_cycle(&shared, &plan, &token).await && shared.finish(generation) {
                if let Some(callback) = on_complete {
                    callback();
                }
            }
        });
        self.attach(generation, task);
        true
    }

    /// Plays a recording repeatedly.
    ///
    /// Each cycle starts when the previous one completes. With
    /// [`LoopCount::Times`] the session ends after that many cycles; with
    /// [`LoopCount::Forever`] it runs until [`stop`](Self::stop).
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Returns
    ///
    /// false if there is nothing to play or no runtime is available
    pub fn play_loop(&self, recording: Option<Arc<Recording>>, times: LoopCount) -> bool {
        let Some(recording) = recording.filter(|r| r.is_playable()) else {
            tracing::error!("No valid track to loop");
            return false;
        };
        let Ok(runtime) = Handle::try_current() else {
            tracing::error!("Playback needs a running Tokio runtime");
            return false;
        };

        self.stop();
        let plan = self.plan(&recording);
        let (generation, token) = self.begin(&recording, PlaybackState::Looping);

        let shared = Arc::clone(&self.shared);
        let task = runtime.spawn(async move {
            let mut index = 0u32;
            loop {
                index = index.saturating_add(1);
                if !times.allows(index) {
                    tracing::info!("Looping complete");
                    shared.notifier.emit(PadNotification::LoopComplete);
                    break;
                }

                tracing::info!("Playing loop {} of {}", index, times);
                shared.notifier.emit(PadNotification::LoopCycle {
                    index,
                    target: times,
                });
                if !run_cycle(&shared, &plan, &token).await {
                    return;
                }
                shared.record_completed_loop(generation, index);
            }
            shared.finish(generation);
        });
        self.attach(generation, task);
        true
    }

    /// Stops the active session.
    ///
    /// Every pending trigger of the session is invalidated before this
    /// returns. Does nothing if no session is active.
    pub fn stop(&self) {
        let Some(session) = self.shared.slot().active.take() else {
            return;
        };

        session.token.cancel();
        session.done.cancel();
        if let Some(task) = session.task {
            task.abort();
        }

        tracing::info!("Playback stopped");
        self.shared.notifier.emit(PadNotification::PlaybackStopped);
    }

    /// Waits until the session active at call time has ended.
    ///
    /// Returns immediately if nothing is playing. Never returns for an
    /// unbounded loop unless it is stopped.
    pub async fn finished(&self) {
        let done = self.shared.slot().active.as_ref().map(|s| s.done.clone());
        if let Some(done) = done {
            done.cancelled().await;
        }
    }

    /// Computes the trigger schedule for a recording.
    fn plan(&self, recording: &Recording) -> CyclePlan {
        let mut triggers: Vec<(Duration, PadKey)> = recording
            .key_downs()
            .map(|e| {
                let offset = match self.quantizer {
                    Some(q) => q.quantize(e.offset_ms),
                    None => e.offset_ms,
                };
                (Duration::from_millis(offset), e.key)
            })
            .collect();
        triggers.sort_by_key(|(offset, _)| *offset);

        let last = triggers.last().map(|(o, _)| *o).unwrap_or_default();
        let end = Duration::from_millis(recording.duration_ms()).max(last) + self.completion_buffer;

        CyclePlan { triggers, end }
    }

    /// Registers a new session as the active one.
    fn begin(&self, recording: &Recording, mode: PlaybackState) -> (u64, CancellationToken) {
        let token = CancellationToken::new();
        let generation = {
            let mut slot = self.shared.slot();
            slot.next_generation += 1;
            let generation = slot.next_generation;
            slot.active = Some(ActiveSession {
                generation,
                recording: recording.id(),
                mode,
                token: token.clone(),
                done: CancellationToken::new(),
                task: None,
            });
            slot.completed_loops = 0;
            generation
        };

        tracing::info!(
            "Playing {} ({} events over {}ms)",
            recording.id(),
            recording.len(),
            recording.duration_ms()
        );
        self.shared.notifier.emit(PadNotification::PlaybackStarted {
            recording: recording.id(),
        });
        (generation, token)
    }

    /// Hands the session task to the slot so `stop` can abort it.
    fn attach(&self, generation: u64, task: JoinHandle<()>) {
        let mut slot = self.shared.slot();
        if let Some(session) = slot.active.as_mut() {
            if session.generation == generation {
                session.task = Some(task);
            }
        }
    }
}

impl Drop for PlaybackScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
