//! The pad engine facade.
//!
//! [`MusicPad`] wires the recorder, the sound source, the playback scheduler
//! and the exporter together around one shared notification channel, and
//! exposes the operations an input layer needs: key handling, recording,
//! playback, looping and export.

use crate::audio::{AssetStore, AudioExporter, ExportedTrack, SoundSink, SoundSource};
use crate::config::PadConfig;
use crate::error::Result;
use crate::notify::{Notifier, PadNotification};
use crate::playback::{LoopCount, OnComplete, PlaybackScheduler, PlaybackState};
use crate::recording::{Clock, EventKind, EventRecorder, PadKey, RecorderState, Recording};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// A sampler pad: live pad sounds plus record, replay and export.
pub struct MusicPad {
    config: PadConfig,
    notifier: Notifier,
    sounds: Arc<SoundSource>,
    recorder: EventRecorder,
    scheduler: PlaybackScheduler,
    exporter: AudioExporter,
    /// Recording that play, loop and export work on.
    recording: Option<Arc<Recording>>,
}

impl MusicPad {
    /// Creates a pad from a config and its I/O seams.
    ///
    /// # Arguments
    ///
    /// * `config` - Engine settings
    /// * `store` - Where `{key}.wav` assets are fetched from
    /// * `sink` - Where live voices are started
    /// * `clock` - Time source for recorded offsets
    pub fn new(
        config: PadConfig,
        store: Arc<dyn AssetStore>,
        sink: Arc<dyn SoundSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let notifier = Notifier::new();

        let sounds = Arc::new(SoundSource::new(store, sink));
        sounds.set_volume(config.volume);

        let recorder =
            EventRecorder::new(clock, notifier.clone()).with_max_events(config.max_events);
        let scheduler = PlaybackScheduler::new(Arc::clone(&sounds), notifier.clone())
            .with_completion_buffer(config.completion_buffer())
            .with_quantizer(config.quantizer());
        let exporter = AudioExporter::new(Arc::clone(&sounds), notifier.clone());

        Self {
            config,
            notifier,
            sounds,
            recorder,
            scheduler,
            exporter,
            recording: None,
        }
    }

    /// Replaces the recorder's audio availability check.
    pub fn with_context_probe<F>(mut self, probe: F) -> Self
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.recorder = self.recorder.with_context_probe(probe);
        self
    }

    pub fn config(&self) -> &PadConfig {
        &self.config
    }

    pub fn sounds(&self) -> &Arc<SoundSource> {
        &self.sounds
    }

    pub fn scheduler(&self) -> &PlaybackScheduler {
        &self.scheduler
    }

    pub fn exporter(&self) -> &AudioExporter {
        &self.exporter
    }

    /// Subscribes to engine notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<PadNotification> {
        self.notifier.subscribe()
    }

    /// Starts the background preload of the configured warm pads.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn warm_up(&self) -> JoinHandle<()> {
        self.sounds
            .spawn_warmup(self.config.warm_keys(), self.config.warm_delay())
    }

    /// Handles a pad key transition from the input layer.
    ///
    /// A key-down sounds the pad immediately. Both directions are recorded
    /// while a take is in progress.
    ///
    /// # Errors
    ///
    /// Returns [`PadError::BufferOverflow`](crate::PadError::BufferOverflow)
    /// if the take was full; the take has been stopped and kept.
    pub fn handle_key(&mut self, key: PadKey, kind: EventKind) -> Result<()> {
        if kind == EventKind::KeyDown {
            self.trigger(key);
        }

        let result = self.recorder.record_event(key, kind);
        if result.is_err() {
            // overflow stopped the take; keep what it captured
            if let Some(recording) = self.recorder.current() {
                self.recording = Some(recording);
            }
        }
        result
    }

    /// Sounds a pad without recording it.
    fn trigger(&self, key: PadKey) {
        self.notifier.emit(PadNotification::PadTriggered { key });

        let Ok(runtime) = Handle::try_current() else {
            tracing::warn!("Cannot play sound {} outside a Tokio runtime", key);
            return;
        };
        let sounds = Arc::clone(&self.sounds);
        runtime.spawn(async move {
            sounds.play(key).await;
        });
    }

    /// Starts a new take, stopping any playback first.
    ///
    /// # Returns
    ///
    /// false if audio is unavailable and nothing is being recorded
    pub fn start_recording(&mut self) -> bool {
        self.scheduler.stop();
        self.recorder.start()
    }

    /// Ends the take in progress.
    ///
    /// # Returns
    ///
    /// The new recording, or None if the take was empty or none was running.
    /// The previous recording stays current in that case.
    pub fn stop_recording(&mut self) -> Option<Arc<Recording>> {
        let recording = self.recorder.stop()?;
        self.recording = Some(Arc::clone(&recording));
        Some(recording)
    }

    pub fn recorder_state(&self) -> RecorderState {
        self.recorder.state()
    }

    pub fn is_recording(&self) -> bool {
        self.recorder.is_recording()
    }

    /// Returns the recording play, loop and export act on.
    ///
    /// None while a take is in progress.
    pub fn current_recording(&self) -> Option<Arc<Recording>> {
        if self.recorder.is_recording() {
            return None;
        }
        self.recording.clone()
    }

    /// Makes a previously saved recording current.
    pub fn load_recording(&mut self, recording: Recording) -> Arc<Recording> {
        let recording = Arc::new(recording);
        self.recording = Some(Arc::clone(&recording));
        recording
    }

    /// Plays the current recording once.
    pub fn play_current(&self, on_complete: Option<OnComplete>) -> bool {
        self.scheduler
            .play_once(self.current_recording(), on_complete)
    }

    /// Loops the current recording.
    pub fn loop_current(&self, times: LoopCount) -> bool {
        self.scheduler.play_loop(self.current_recording(), times)
    }

    /// Stops all scheduled playback.
    pub fn stop_playback(&self) {
        self.scheduler.stop();
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.scheduler.state()
    }

    /// Exports the current recording to WAV.
    pub async fn export_current(&self) -> Option<ExportedTrack> {
        self.exporter.export(self.current_recording()).await
    }

    /// Exports the current recording into the configured output directory.
    ///
    /// # Returns
    ///
    /// The written file, or None if nothing could be exported
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be written
    pub async fn export_to_output_dir(&self) -> Result<Option<PathBuf>> {
        match self.export_current().await {
            Some(track) => Ok(Some(track.write_to_dir(&self.config.output_dir)?)),
            None => Ok(None),
        }
    }

    /// Sets the volume of voices started from now on.
    pub fn set_volume(&self, volume: f32) {
        self.sounds.set_volume(volume);
    }

    pub fn volume(&self) -> f32 {
        self.sounds.volume()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{CaptureSink, MemoryAssetStore};
    use crate::notify::drain;
    use crate::recording::{ManualClock, PadEvent};
    use crate::testing::test_wav;
    use crate::PadError;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Fixture {
        pad: MusicPad,
        clock: Arc<ManualClock>,
        sink: Arc<CaptureSink>,
    }

    fn fixture(config: PadConfig) -> Fixture {
        let store = Arc::new(MemoryAssetStore::new());
        for key in [113, 119] {
            store.insert(PadKey(key), test_wav(441, 8192));
        }
        let sink = Arc::new(CaptureSink::new());
        let clock = Arc::new(ManualClock::new(5_000));
        let pad = MusicPad::new(config, store, sink.clone(), clock.clone());
        Fixture { pad, clock, sink }
    }

    #[tokio::test(start_paused = true)]
    async fn test_handle_key_records_and_plays() {
        let Fixture {
            mut pad,
            clock,
            sink,
        } = fixture(PadConfig::default());

        assert!(pad.start_recording());
        pad.handle_key(PadKey(113), EventKind::KeyDown).unwrap();
        clock.advance(120);
        pad.handle_key(PadKey(113), EventKind::KeyUp).unwrap();
        clock.advance(180);
        pad.handle_key(PadKey(119), EventKind::KeyDown).unwrap();
        clock.advance(200);
        let recording = pad.stop_recording().unwrap();

        assert_eq!(
            recording.events(),
            &[
                PadEvent::down(113, 0),
                PadEvent::up(113, 120),
                PadEvent::down(119, 300),
            ]
        );
        assert_eq!(recording.duration_ms(), 500);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(sink.keys(), vec![PadKey(113), PadKey(119)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_while_idle_play_without_recording() {
        let Fixture { mut pad, sink, .. } = fixture(PadConfig::default());

        pad.handle_key(PadKey(119), EventKind::KeyDown).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(sink.count(), 1);
        assert!(pad.current_recording().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_take_keeps_previous_recording() {
        let Fixture { mut pad, clock, .. } = fixture(PadConfig::default());

        pad.start_recording();
        pad.handle_key(PadKey(113), EventKind::KeyDown).unwrap();
        clock.advance(50);
        let first = pad.stop_recording().unwrap();

        pad.start_recording();
        assert!(pad.current_recording().is_none());
        clock.advance(50);
        assert!(pad.stop_recording().is_none());

        assert_eq!(pad.current_recording().unwrap().id(), first.id());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_recording_stops_playback() {
        let Fixture { mut pad, .. } = fixture(PadConfig::default());
        pad.load_recording(Recording::new(vec![PadEvent::down(113, 0)], 2_000));

        assert!(pad.loop_current(LoopCount::Forever));
        assert_eq!(pad.playback_state(), PlaybackState::Looping);

        pad.start_recording();
        assert_eq!(pad.playback_state(), PlaybackState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_probe_blocks_recording() {
        let Fixture { pad, .. } = fixture(PadConfig::default());
        let mut pad = pad.with_context_probe(|| anyhow::bail!("no audio device"));
        let mut rx = pad.subscribe();

        assert!(!pad.start_recording());
        assert_eq!(pad.recorder_state(), RecorderState::Idle);
        assert!(!drain(&mut rx).contains(&PadNotification::RecordingStarted));
    }

    #[tokio::test(start_paused = true)]
    async fn test_overflow_keeps_captured_take() {
        let Fixture { mut pad, clock, .. } = fixture(PadConfig {
            max_events: 2,
            ..Default::default()
        });

        pad.start_recording();
        pad.handle_key(PadKey(113), EventKind::KeyDown).unwrap();
        clock.advance(10);
        pad.handle_key(PadKey(113), EventKind::KeyUp).unwrap();
        clock.advance(10);
        let err = pad.handle_key(PadKey(119), EventKind::KeyDown).unwrap_err();

        assert!(matches!(err, PadError::BufferOverflow { limit: 2 }));
        assert!(!pad.is_recording());
        assert_eq!(pad.current_recording().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_current_completes() {
        let Fixture { mut pad, sink, .. } = fixture(PadConfig::default());
        let mut rx = pad.subscribe();
        pad.load_recording(Recording::new(
            vec![PadEvent::down(113, 0), PadEvent::down(119, 100)],
            200,
        ));

        assert!(pad.play_current(None));
        pad.scheduler().finished().await;

        assert_eq!(sink.count(), 2);
        let notifications = drain(&mut rx);
        assert!(matches!(
            notifications.first(),
            Some(PadNotification::PlaybackStarted { .. })
        ));
        assert_eq!(notifications.last(), Some(&PadNotification::PlaybackStopped));
    }

    #[tokio::test(start_paused = true)]
    async fn test_nothing_to_play_or_export() {
        let Fixture { pad, .. } = fixture(PadConfig::default());
        assert!(!pad.play_current(None));
        assert!(!pad.loop_current(LoopCount::Times(2)));
        assert!(pad.export_current().await.is_none());
    }

    #[tokio::test]
    async fn test_export_to_output_dir() {
        let dir = TempDir::new().unwrap();
        let Fixture { mut pad, .. } = fixture(PadConfig {
            output_dir: dir.path().to_path_buf(),
            ..Default::default()
        });
        pad.load_recording(Recording::new(vec![PadEvent::down(113, 0)], 1_000));

        let path = pad.export_to_output_dir().await.unwrap().unwrap();
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("musicpad_track_") && name.ends_with(".wav"));

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[0..4], b"RIFF");
        // 2 s of stereo 16-bit audio plus the header
        assert_eq!(bytes.len(), 44 + 88_200 * 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_config_volume_is_applied() {
        let Fixture { pad, .. } = fixture(PadConfig {
            volume: 3.0,
            ..Default::default()
        });
        assert_eq!(pad.volume(), 1.0);
        pad.set_volume(0.25);
        assert_eq!(pad.volume(), 0.25);
    }
}
