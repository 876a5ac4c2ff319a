use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use strum_trainer_core::{
    AppConfig, AudioOutput, Clock, Metronome, StrumDetector, SystemClock,
};
use tracing_subscriber::EnvFilter;

fn main() -> strum_trainer_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Metronome {
            bpm,
            beats,
            duration,
        } => run_metronome(config, bpm, beats, duration),
        Commands::Trainer { duration } => run_trainer(config, duration),
    }
}

fn run_metronome(
    mut config: AppConfig,
    bpm: Option<u32>,
    beats: Option<u32>,
    duration: Option<u64>,
) -> strum_trainer_core::Result<()> {
    if let Some(bpm) = bpm {
        config.metronome.bpm = bpm;
    }
    if let Some(beats) = beats {
        config.metronome.beats_per_bar = beats;
    }
    tracing::info!(
        bpm = config.metronome.bpm,
        beats = config.metronome.beats_per_bar,
        "starting metronome"
    );

    let output = AudioOutput::open()?;
    let clock: Arc<dyn Clock> = Arc::new(output.clock());
    let mut metronome = Metronome::new(clock, output, &config.metronome);
    let events = metronome.events();
    metronome.start()?;

    let tick = Duration::from_secs_f64(config.metronome.tick_interval);
    let deadline = duration.map(|secs| Instant::now() + Duration::from_secs(secs));
    loop {
        metronome.tick()?;
        for beat in events.try_iter() {
            if beat.is_accent() {
                println!("| {}", beat.beat_in_bar + 1);
            } else {
                println!("  {}", beat.beat_in_bar + 1);
            }
        }
        if deadline.is_some_and(|end| Instant::now() >= end) {
            break;
        }
        std::thread::sleep(tick);
    }

    metronome.stop();
    Ok(())
}

fn run_trainer(config: AppConfig, duration: u64) -> strum_trainer_core::Result<()> {
    tracing::info!(duration, "starting practice session");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
    let mut detector = StrumDetector::new(clock, config.detector)?;
    let events = detector.start()?;
    println!("Listening for {duration} seconds; play chord changes.");

    // One detection step per display-refresh interval.
    let tick = Duration::from_millis(16);
    let started = Instant::now();
    let session = Duration::from_secs(duration);
    let mut count: u32 = 0;
    while started.elapsed() < session {
        detector.tick()?;
        for _ in events.try_iter() {
            count += 1;
            println!("strum {count}");
        }
        std::thread::sleep(tick);
    }
    detector.stop();

    let elapsed = started.elapsed().as_secs_f64().max(1.0);
    let changes_per_minute = (f64::from(count) / elapsed * 60.0).round();
    println!("Session complete: {count} changes ({changes_per_minute} per minute).");
    Ok(())
}

fn load_config(path: Option<&Path>) -> strum_trainer_core::Result<AppConfig> {
    match path {
        Some(path) => {
            tracing::info!(?path, "loading configuration overrides");
            AppConfig::from_path(path)
        }
        None => Ok(AppConfig::default()),
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Guitar practice timing engines", long_about = None)]
struct Cli {
    /// Optional JSON file with engine configuration overrides.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the click-track metronome.
    Metronome {
        /// Tempo in beats per minute, clamped to 30-300.
        #[arg(short, long)]
        bpm: Option<u32>,
        /// Beats per bar; beat 1 carries the accent click.
        #[arg(short = 'n', long)]
        beats: Option<u32>,
        /// Run length in seconds; runs until interrupted when omitted.
        #[arg(short, long)]
        duration: Option<u64>,
    },
    /// Count strums from the default input device over one session.
    Trainer {
        /// Session length in seconds.
        #[arg(short, long, default_value_t = 60)]
        duration: u64,
    },
}
