use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::Deserialize;
use tactile_core::{
    ActivityIndicator, AppConfig, Clock, InteractionController, ManualClock, ManualSensors,
    MemoryCatalog, PausablePlayer, PlaybackEngine, SensorDebouncer, SensorId, TactileError,
    TickClock, TrackId, VirtualMixer, VirtualStream, NUM_SENSORS,
};
use tracing_subscriber::EnvFilter;

fn main() -> tactile_core::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate {
            config,
            script,
            tick_ms,
            realtime,
        } => {
            let config = match config {
                Some(path) => AppConfig::load(path)?,
                None => AppConfig::default(),
            };
            init_tracing(&config.runtime.log_filter);
            let pacer = if realtime {
                Pacer::Realtime(TickClock::start())
            } else {
                Pacer::Virtual(ManualClock::new(0))
            };
            run_simulation(&config, &script, tick_ms, pacer)
        }
        Commands::DefaultConfig => {
            println!("{}", AppConfig::default().to_json_pretty()?);
            Ok(())
        }
        Commands::CheckConfig { path } => {
            init_tracing("info");
            let config = AppConfig::load(&path)?;
            tracing::info!(?path, "configuration is valid");
            println!("{}", config.to_json_pretty()?);
            Ok(())
        }
    }
}

/// Timed sensor readings replayed by the simulator.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Script {
    /// Running time per resource name. Others play until stopped.
    durations: HashMap<String, u64>,
    /// Simulation end; defaults to one second after the last frame.
    end_ms: Option<u64>,
    frames: Vec<Frame>,
}

#[derive(Debug, Deserialize)]
struct Frame {
    at_ms: u64,
    raw: [u16; NUM_SENSORS],
}

impl Script {
    fn load(path: &Path) -> tactile_core::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    fn parse(text: &str) -> tactile_core::Result<Self> {
        let mut script: Script = serde_json::from_str(text)?;
        if script.frames.is_empty() {
            return Err(TactileError::msg("script has no sensor frames"));
        }
        script.frames.sort_by_key(|frame| frame.at_ms);
        Ok(script)
    }

    fn end_ms(&self) -> u64 {
        self.end_ms.unwrap_or_else(|| {
            self.frames
                .last()
                .map(|frame| frame.at_ms + 1000)
                .unwrap_or(0)
        })
    }
}

/// Drives simulated time, either instantly or against the wall clock.
#[derive(Debug)]
enum Pacer {
    Virtual(ManualClock),
    Realtime(TickClock),
}

impl Pacer {
    fn now_ms(&self) -> u64 {
        match self {
            Pacer::Virtual(clock) => clock.now_ms(),
            Pacer::Realtime(clock) => clock.now_ms(),
        }
    }

    /// Waits out one tick period.
    fn wait(&mut self, tick_ms: u64) {
        match self {
            Pacer::Virtual(clock) => clock.advance(tick_ms),
            Pacer::Realtime(_) => std::thread::sleep(Duration::from_millis(tick_ms)),
        }
    }
}

/// Stands in for the status LED by logging its transitions.
#[derive(Debug, Default)]
struct LogIndicator {
    lit: bool,
}

impl ActivityIndicator for LogIndicator {
    fn set_lit(&mut self, lit: bool) {
        if lit != self.lit {
            tracing::trace!(lit, "indicator");
            self.lit = lit;
        }
    }
}

fn run_simulation(
    config: &AppConfig,
    script_path: &Path,
    tick_ms: Option<u64>,
    mut pacer: Pacer,
) -> tactile_core::Result<()> {
    let script = Script::load(script_path)?;
    let tick_ms = tick_ms.unwrap_or(config.runtime.tick_ms).max(1);
    let end_ms = script.end_ms();
    tracing::info!(?script_path, tick_ms, end_ms, frames = script.frames.len(), "starting simulation");

    let mut stream = VirtualStream::new();
    for (name, duration) in &script.durations {
        stream.set_duration(name.clone(), *duration);
    }
    let players = std::array::from_fn(|_| PausablePlayer::new(stream.clone()));
    let playback = PlaybackEngine::new(players, VirtualMixer::new(), config.catalog.clone());
    let sensors = SensorDebouncer::new(ManualSensors::new());

    let mut controller = InteractionController::new(sensors, playback, pacer.now_ms());
    controller.apply_config(config);
    controller.set_indicator(Box::new(LogIndicator::default()));

    let mut frames = script.frames.iter().peekable();
    let mut commands = 0usize;
    let mut timeouts = 0usize;
    let mut previous = pacer.now_ms();

    loop {
        let now = pacer.now_ms();
        for player in controller.playback_mut().players_mut() {
            player.render(now.saturating_sub(previous));
        }
        previous = now;

        while let Some(frame) = frames.next_if(|frame| frame.at_ms <= now) {
            controller.sensors_mut().source_mut().set_all(frame.raw);
            tracing::debug!(now, raw = ?frame.raw, "sensor frame");
        }

        let outcome = controller.tick(now);
        for command in &outcome.commands {
            tracing::info!(now, ?command, "command");
        }
        commands += outcome.commands.len();
        if outcome.timed_out.is_some() {
            timeouts += 1;
        }

        if now >= end_ms {
            break;
        }
        pacer.wait(tick_ms);
    }

    tracing::info!(commands, timeouts, "simulation finished");
    print_summary(&controller);
    Ok(())
}

type SimController =
    InteractionController<ManualSensors, PausablePlayer<VirtualStream>, VirtualMixer, MemoryCatalog>;

fn print_summary(controller: &SimController) {
    let playback = controller.playback();
    println!("track  name                 plays  playing  paused  volume  gain");
    for track in TrackId::all() {
        let player = playback.player(track);
        println!(
            "{:<6} {:<20} {:>5}  {:<7}  {:<6}  {:>6}  {:.2}",
            track.to_string(),
            playback.track_name(track).unwrap_or("-"),
            player.stream().plays(),
            playback.is_playing(track),
            playback.is_paused(track),
            playback.actual_volume(track),
            playback.mixer().gain(track),
        );
    }
    for sensor in SensorId::all() {
        if let Some(at) = controller.sensors().last_action_time(sensor) {
            println!("sensor {sensor} last changed at {at} ms");
        }
    }
}

fn init_tracing(default_filter: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Proximity-driven sound installation controller", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay scripted sensor readings through the control loop.
    Simulate {
        /// Configuration file; defaults apply when omitted.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// JSON script of timed raw sensor readings.
        #[arg(short, long)]
        script: PathBuf,
        /// Control loop period, overriding the configuration.
        #[arg(long)]
        tick_ms: Option<u64>,
        /// Pace ticks against the wall clock instead of running flat out.
        #[arg(long)]
        realtime: bool,
    },
    /// Print the default configuration as JSON.
    DefaultConfig,
    /// Validate a configuration file and print it normalized.
    CheckConfig {
        /// Path to the configuration file.
        path: PathBuf,
    },
}
