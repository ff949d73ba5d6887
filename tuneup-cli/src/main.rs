//! # Tuneup - Terminal Chromatic Tuner
//!
//! Runs the detection loop against the default microphone (or a
//! synthetic tone) and renders each published reading to the terminal.
//!
//! ## Architecture
//! - **Main Thread**: owns the driver; runs one tick per frame
//! - **Stdin Thread**: turns typed commands into messages
//! - **Communication**: crossbeam channels, `select!` over frame ticker and commands

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::{Receiver, select};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tuneup_core::driver::TunerEvent;
use tuneup_core::source::SyntheticTone;
use tuneup_core::{AudioSource, Driver, DriverState, TunerConfig, TunerDisplay};

/// Chromatic instrument tuner
#[derive(Parser, Debug)]
#[command(name = "tuneup")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Tuning mode to start in (overrides the config)
    #[arg(short, long)]
    mode: Option<String>,

    /// Listen to a generated sine tone of this frequency instead of the microphone
    #[arg(long)]
    tone: Option<f32>,

    /// Print one JSON object per published update
    #[arg(long)]
    json: bool,

    /// Stop after this many frames
    #[arg(long)]
    frames: Option<u64>,

    /// List available tuning modes and exit
    #[arg(long)]
    list_modes: bool,
}

/// Commands typed on stdin while the tuner runs.
#[derive(Debug, Clone, PartialEq)]
enum Command {
    Mode(String),
    Modes,
    Start,
    Stop,
    Quit,
}

impl Command {
    fn parse(line: &str) -> Option<Self> {
        let mut words = line.split_whitespace();
        match (words.next()?, words.next()) {
            ("mode", Some(id)) => Some(Command::Mode(id.to_string())),
            ("modes", None) => Some(Command::Modes),
            ("start", None) => Some(Command::Start),
            ("stop", None) => Some(Command::Stop),
            ("quit" | "q" | "exit", None) => Some(Command::Quit),
            _ => None,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => TunerConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => TunerConfig::default(),
    };
    if let Some(mode) = &cli.mode {
        config.mode = mode.clone();
    }
    let catalog = config.build_catalog()?;

    if cli.list_modes {
        for mode in catalog.modes() {
            let scheme = catalog.lookup(mode)?;
            println!("{:<20} {} ({} notes)", mode, scheme.name(), scheme.len());
        }
        return Ok(());
    }

    match cli.tone {
        Some(frequency) => {
            let source = SyntheticTone::new(frequency, 0.5, config.volume_range());
            run(Driver::new(catalog, config, source)?, &cli)
        }
        None => run_microphone(catalog, config, &cli),
    }
}

#[cfg(feature = "capture")]
fn run_microphone(
    catalog: std::sync::Arc<tuneup_core::TuningCatalog>,
    config: TunerConfig,
    cli: &Cli,
) -> Result<()> {
    let source = tuneup_core::audio::MicrophoneSource::new(config.volume_range());
    run(Driver::new(catalog, config, source)?, cli)
}

#[cfg(not(feature = "capture"))]
fn run_microphone(
    _catalog: std::sync::Arc<tuneup_core::TuningCatalog>,
    _config: TunerConfig,
    _cli: &Cli,
) -> Result<()> {
    anyhow::bail!("built without microphone support; use --tone <hz>")
}

/// Drives the tuner at the configured frame rate until told to quit.
fn run<S: AudioSource>(mut driver: Driver<S>, cli: &Cli) -> Result<()> {
    let events = driver.subscribe();
    let commands = spawn_stdin_reader();
    let mut stdin_open = true;
    let frame = Duration::try_from_secs_f32(1.0 / driver.config().frame_rate_hz)
        .context("frame_rate_hz does not give a usable frame period")?;
    let ticker = crossbeam_channel::tick(frame);
    let capture_range = driver.config().capture_range_cents;

    let mut next = Some(driver.start()?);
    let mut frames_run = 0_u64;
    info!("Type `mode <id>`, `modes`, `stop`, `start` or `quit`");

    loop {
        let command_rx = if stdin_open {
            commands.clone()
        } else {
            crossbeam_channel::never()
        };
        select! {
            recv(ticker) -> _ => {
                if let Some(tick) = next {
                    next = driver.run_tick(tick);
                    frames_run += 1;
                    if next.is_none() && driver.state() == DriverState::Idle {
                        warn!("Input lost; type `start` to listen again");
                    }
                }
                for event in events.try_iter() {
                    render(&event, cli.json, capture_range)?;
                }
                if cli.frames.is_some_and(|limit| frames_run >= limit) {
                    break;
                }
            }
            recv(command_rx) -> msg => match msg {
                Ok(Command::Mode(mode)) => {
                    if let Err(e) = driver.change_mode(&mode) {
                        eprintln!("{e}");
                    }
                }
                Ok(Command::Modes) => {
                    let modes: Vec<_> = driver.catalog().modes().collect();
                    eprintln!("{}", modes.join(", "));
                }
                Ok(Command::Start) => match driver.start() {
                    Ok(tick) => next = Some(tick),
                    Err(e) => eprintln!("{e}"),
                },
                Ok(Command::Stop) => {
                    driver.stop();
                    next = None;
                }
                Ok(Command::Quit) => break,
                // Stdin closed: keep running on the frame ticker alone.
                Err(_) => stdin_open = false,
            },
        }
    }

    driver.stop();
    for event in events.try_iter() {
        render(&event, cli.json, capture_range)?;
    }
    if !cli.json {
        println!();
    }
    Ok(())
}

fn spawn_stdin_reader() -> Receiver<Command> {
    let (tx, rx) = crossbeam_channel::unbounded();
    thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            match Command::parse(&line) {
                Some(command) => {
                    if tx.send(command).is_err() {
                        break;
                    }
                }
                None if line.trim().is_empty() => {}
                None => eprintln!("Unknown command: {}", line.trim()),
            }
        }
    });
    rx
}

fn render(event: &TunerEvent, json: bool, capture_range: f32) -> Result<()> {
    let mut out = std::io::stdout().lock();
    if json {
        serde_json::to_writer(&mut out, event)?;
        writeln!(out)?;
        return Ok(());
    }

    match event {
        TunerEvent::Display(display) => write!(out, "\r{}", status_line(display, capture_range))?,
        TunerEvent::Cleared => write!(out, "\r{:<72}", "stopped")?,
    }
    out.flush()?;
    Ok(())
}

/// One fixed-width status line: note, needle offset, pitch, volume.
fn status_line(display: &TunerDisplay, capture_range: f32) -> String {
    let note = display.note.as_deref().unwrap_or("-");
    let marker = if display.capturing && display.in_tune {
        "in tune"
    } else {
        ""
    };
    format!(
        "{:<4} {:>+4.0} ct {:>8.1} Hz {:<7} vol {:>3.0}% [{}]",
        note,
        display.needle_cents(capture_range),
        display.frequency.unwrap_or(0.0),
        marker,
        display.volume_percent,
        display.mode,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands() {
        assert_eq!(Command::parse("mode drop-d"), Some(Command::Mode("drop-d".into())));
        assert_eq!(Command::parse("  modes "), Some(Command::Modes));
        assert_eq!(Command::parse("q"), Some(Command::Quit));
        assert_eq!(Command::parse("mode"), None);
        assert_eq!(Command::parse("stop now"), None);
        assert_eq!(Command::parse(""), None);
    }

    #[test]
    fn status_line_clamps_needle() {
        let display = TunerDisplay {
            mode: "chromatic".into(),
            note: Some("A4".into()),
            frequency: Some(452.0),
            cents: 62.0,
            capturing: true,
            volume_percent: 40.0,
            ..TunerDisplay::default()
        };
        let line = status_line(&display, 100.0);
        assert!(line.starts_with("A4"), "{line}");
        assert!(line.contains("+50 ct"), "{line}");
        assert!(line.contains("452.0 Hz"), "{line}");
        assert!(line.ends_with("[chromatic]"), "{line}");
    }

    #[test]
    fn cli_arguments_parse() {
        let cli = Cli::try_parse_from(["tuneup", "--mode", "drop-d", "--tone", "73.4", "--json"])
            .unwrap();
        assert_eq!(cli.mode.as_deref(), Some("drop-d"));
        assert_eq!(cli.tone, Some(73.4));
        assert!(cli.json);
        assert!(!cli.list_modes);
    }
}
