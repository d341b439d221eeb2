//! musicpad - A key-driven audio pad for the terminal.
//!
//! Every printable key is a pad that plays `{sound_dir}/{key}.wav`, where
//! `key` is the character code (`q` plays `113.wav`). Performances can be
//! recorded to JSON, replayed, looped and exported as WAV.
//!
//! # Usage
//!
//! ```bash
//! musicpad record --out take.json   # Play pads and record until Esc
//! musicpad play take.json           # Replay once
//! musicpad loop take.json --times 4 # Replay four times in a row
//! musicpad export take.json         # Write musicpad_track_{ms}.wav
//! ```

use musicpad::audio::{CaptureSink, FileAssetStore, RodioSink, SoundSink};
use musicpad::config::PadConfig;
use musicpad::recording::MonotonicClock;
use musicpad::{EventKind, LoopCount, MusicPad, PadKey, Recording};

use anyhow::{bail, Context, Result};
use crossterm::event::{
    self, Event, KeyCode, KeyEventKind, KeyModifiers, KeyboardEnhancementFlags,
    PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags,
};
use crossterm::execute;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, supports_keyboard_enhancement};
use rodio::OutputStream;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;

/// What the program was asked to do.
enum Command {
    /// Play pads live and record them.
    Record,
    /// Replay a saved recording once.
    Play(PathBuf),
    /// Replay a saved recording repeatedly.
    Loop(PathBuf),
    /// Render a saved recording to WAV.
    Export(PathBuf),
}

/// Command-line options for the application.
struct CliOptions {
    command: Command,
    /// Settings file; defaults apply when absent.
    config: Option<PathBuf>,
    /// Overrides the configured sound directory.
    sounds: Option<PathBuf>,
    /// Overrides the configured volume.
    volume: Option<f32>,
    /// Recording file for `record`, output directory for `export`.
    out: Option<PathBuf>,
    /// Loop count for `loop`.
    loops: Option<LoopCount>,
    /// Capture voices instead of opening an audio device.
    dry_run: bool,
}

fn print_help(program: &str) {
    eprintln!("musicpad - Key-driven audio pad");
    eprintln!();
    eprintln!("Usage: {} <COMMAND> [OPTIONS]", program);
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  record                 Play pads and record until Esc");
    eprintln!("  play FILE              Replay a recording once");
    eprintln!("  loop FILE              Replay a recording repeatedly");
    eprintln!("  export FILE            Export a recording as WAV");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -c, --config PATH      Load settings from a JSON file");
    eprintln!("  -s, --sounds DIR       Directory holding {{key}}.wav sounds");
    eprintln!("  -v, --volume LEVEL     Playback volume between 0 and 1");
    eprintln!("  -o, --out PATH         Recording file (record) or output directory (export)");
    eprintln!("  -t, --times N          Number of loop cycles");
    eprintln!("  -f, --forever          Loop until interrupted");
    eprintln!("      --dry-run          Do not open an audio device");
    eprintln!("  -h, --help             Print this help message");
}

impl CliOptions {
    /// Parses command-line arguments.
    fn parse() -> Result<Self> {
        let args: Vec<String> = std::env::args().collect();
        let program = args.first().map(String::as_str).unwrap_or("musicpad");

        let mut command_name: Option<String> = None;
        let mut file: Option<PathBuf> = None;
        let mut config = None;
        let mut sounds = None;
        let mut volume = None;
        let mut out = None;
        let mut loops = None;
        let mut dry_run = false;
        let mut i = 1;

        // Returns the value following a flag
        let value = |i: &mut usize, flag: &str| -> Result<String> {
            *i += 1;
            match args.get(*i) {
                Some(v) => Ok(v.clone()),
                None => bail!("{} requires an argument", flag),
            }
        };

        while i < args.len() {
            match args[i].as_str() {
                "--config" | "-c" => config = Some(PathBuf::from(value(&mut i, "--config")?)),
                "--sounds" | "-s" => sounds = Some(PathBuf::from(value(&mut i, "--sounds")?)),
                "--volume" | "-v" => {
                    let raw = value(&mut i, "--volume")?;
                    volume = Some(
                        raw.parse::<f32>()
                            .with_context(|| format!("Invalid volume: {}", raw))?,
                    );
                }
                "--out" | "-o" => out = Some(PathBuf::from(value(&mut i, "--out")?)),
                "--times" | "-t" => {
                    let raw = value(&mut i, "--times")?;
                    let n = raw
                        .parse::<u32>()
                        .with_context(|| format!("Invalid loop count: {}", raw))?;
                    loops = Some(LoopCount::Times(n));
                }
                "--forever" | "-f" => loops = Some(LoopCount::Forever),
                "--dry-run" => dry_run = true,
                "--help" | "-h" => {
                    print_help(program);
                    std::process::exit(0);
                }
                other if other.starts_with('-') => {
                    eprintln!("Unknown option: {}", other);
                    eprintln!("Use --help for usage information");
                    std::process::exit(1);
                }
                other => {
                    if command_name.is_none() {
                        command_name = Some(other.to_string());
                    } else if file.is_none() {
                        file = Some(PathBuf::from(other));
                    } else {
                        bail!("Unexpected argument: {}", other);
                    }
                }
            }
            i += 1;
        }

        let needs_file = |file: Option<PathBuf>, name: &str| match file {
            Some(f) => Ok(f),
            None => Err(anyhow::anyhow!("{} requires a recording file", name)),
        };
        let command = match command_name.as_deref() {
            Some("record") => Command::Record,
            Some("play") => Command::Play(needs_file(file, "play")?),
            Some("loop") => Command::Loop(needs_file(file, "loop")?),
            Some("export") => Command::Export(needs_file(file, "export")?),
            Some(other) => bail!("Unknown command: {}", other),
            None => {
                print_help(program);
                std::process::exit(1);
            }
        };

        Ok(Self {
            command,
            config,
            sounds,
            volume,
            out,
            loops,
            dry_run,
        })
    }

    /// Applies command-line overrides on top of the loaded settings.
    fn apply(&self, config: &mut PadConfig) {
        if let Some(ref dir) = self.sounds {
            config.sound_dir = dir.clone();
        }
        if let Some(volume) = self.volume {
            config.volume = volume;
        }
        if let (Command::Export(_), Some(dir)) = (&self.command, &self.out) {
            config.output_dir = dir.clone();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = CliOptions::parse()?;

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let mut config = match cli.config {
        Some(ref path) => PadConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => PadConfig::default(),
    };
    cli.apply(&mut config);

    // Export renders offline and never needs the device
    let live = !cli.dry_run && !matches!(cli.command, Command::Export(_));
    let (_stream, sink): (Option<OutputStream>, Arc<dyn SoundSink>) = if live {
        let (stream, sink) = RodioSink::open_default().context("Failed to open audio output")?;
        (Some(stream), Arc::new(sink))
    } else {
        (None, Arc::new(CaptureSink::new()))
    };

    let store = Arc::new(FileAssetStore::new(config.sound_dir.clone()));
    let default_loop = config.default_loop();
    let mut pad = MusicPad::new(config, store, sink, Arc::new(MonotonicClock::new()));

    match cli.command {
        Command::Record => {
            let out = cli.out.unwrap_or_else(|| PathBuf::from("recording.json"));
            run_record(&mut pad, out).await
        }
        Command::Play(path) => {
            pad.load_recording(read_recording(&path)?);
            if !pad.play_current(None) {
                bail!("Nothing to play in {}", path.display());
            }
            wait_for_playback(&pad).await;
            Ok(())
        }
        Command::Loop(path) => {
            pad.load_recording(read_recording(&path)?);
            if !pad.loop_current(cli.loops.unwrap_or(default_loop)) {
                bail!("Nothing to loop in {}", path.display());
            }
            wait_for_playback(&pad).await;
            Ok(())
        }
        Command::Export(path) => {
            pad.load_recording(read_recording(&path)?);
            match pad.export_to_output_dir().await? {
                Some(written) => {
                    eprintln!("Exported {}", written.display());
                    Ok(())
                }
                None => bail!(musicpad::audio::export::EXPORT_FAILED_MESSAGE),
            }
        }
    }
}

fn read_recording(path: &Path) -> Result<Recording> {
    Recording::load_from_file(path)
        .with_context(|| format!("Failed to read recording {}", path.display()))
}

/// Waits for playback to end, stopping it on Ctrl-C.
async fn wait_for_playback(pad: &MusicPad) {
    tokio::select! {
        _ = pad.scheduler().finished() => {}
        _ = tokio::signal::ctrl_c() => pad.stop_playback(),
    }
}

/// Puts the terminal into raw mode and asks for key release events.
///
/// Returns whether release reporting was enabled.
fn setup_terminal() -> Result<bool> {
    enable_raw_mode().context("Failed to enable raw mode")?;
    let releases = supports_keyboard_enhancement().unwrap_or(false);
    if releases {
        execute!(
            io::stdout(),
            PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::REPORT_EVENT_TYPES)
        )
        .context("Failed to enable key release events")?;
    }
    Ok(releases)
}

/// Restores the terminal to its original state.
fn restore_terminal(releases: bool) -> Result<()> {
    if releases {
        execute!(io::stdout(), PopKeyboardEnhancementFlags)
            .context("Failed to restore keyboard mode")?;
    }
    disable_raw_mode().context("Failed to disable raw mode")?;
    Ok(())
}

/// Plays pads from the keyboard and records them until Esc.
async fn run_record(pad: &mut MusicPad, out: PathBuf) -> Result<()> {
    let _warmup = pad.warm_up();

    let releases = setup_terminal()?;
    if !releases {
        tracing::warn!("Terminal does not report key releases; only key presses are recorded");
    }

    // crossterm reads block, so they get their own thread
    let (tx, mut rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        while let Ok(ev) = event::read() {
            if tx.send(ev).is_err() {
                break;
            }
        }
    });

    if !pad.start_recording() {
        restore_terminal(releases)?;
        bail!("Could not start recording");
    }
    eprint!("Recording. Press keys to play pads, Space to silence playback, Esc to stop.\r\n");

    while let Some(ev) = rx.recv().await {
        let Event::Key(key) = ev else { continue };
        let kind = match key.kind {
            KeyEventKind::Press => EventKind::KeyDown,
            KeyEventKind::Release => EventKind::KeyUp,
            KeyEventKind::Repeat => continue,
        };

        match key.code {
            KeyCode::Esc | KeyCode::Enter => break,
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => break,
            KeyCode::Char(' ') => pad.stop_playback(),
            KeyCode::Char(c) => {
                if let Err(e) = pad.handle_key(PadKey::from_char(c), kind) {
                    tracing::warn!("{}", e);
                    break;
                }
            }
            _ => {}
        }
    }

    restore_terminal(releases)?;

    // An overflow has already stopped and kept the take
    pad.stop_recording();
    match pad.current_recording() {
        Some(recording) => {
            recording
                .save_to_file(&out)
                .with_context(|| format!("Failed to save recording {}", out.display()))?;
            eprintln!(
                "Saved {} events ({}ms) to {}",
                recording.len(),
                recording.duration_ms(),
                out.display()
            );
        }
        None => eprintln!("No events recorded"),
    }
    Ok(())
}
