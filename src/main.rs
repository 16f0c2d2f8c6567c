//! BLM Recorder command line.
//!
//! `replay` runs recorded launch monitor frames through a full session;
//! `check-layout` validates layout files.

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::{error, info, warn};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use blm_recorder::logging::init_logging;
use blm_recorder::minigame::{GameType, MiniGameConfig, ShotFormat};
use blm_recorder::paths::{ensure_directories, get_exports_dir, get_logs_dir};
use blm_recorder::pipeline::{
    create_frame_queue, run_capture, run_pipeline_worker, BoundingBoxGeometry,
    DirectoryFrameSource, Overflow, PipelineSettings, ScreenPipeline,
};
use blm_recorder::screen::{build_extractor, Channel, FieldLayout};
use blm_recorder::simulator::{ConnectionState, DeliveryWorker, SimulatorLink};
use blm_recorder::{EventHub, RecorderConfig, Session};

/// Frames buffered between capture and the pipeline during a replay.
const REPLAY_QUEUE_CAPACITY: usize = 4;

#[derive(Parser)]
#[command(name = "blm-recorder", version, about = "Launch monitor screen recorder")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replay captured frames through the recorder
    Replay(ReplayArgs),
    /// Validate a layout file
    CheckLayout {
        file: PathBuf,
        /// Only check this channel
        #[arg(long, value_enum)]
        channel: Option<ChannelArg>,
    },
}

#[derive(Args)]
struct ReplayArgs {
    /// Directory of frame images, replayed in file name order
    #[arg(long)]
    frames: PathBuf,
    /// Config file (defaults to config.json next to the executable)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Deliver shots to the configured simulator
    #[arg(long)]
    connect: bool,
    /// Override the configured frame interval
    #[arg(long)]
    interval_ms: Option<u64>,
    /// Write the shot table as CSV when the replay ends
    #[arg(long)]
    export: bool,
    /// Export directory (defaults to exports/ next to the executable)
    #[arg(long, requires = "export")]
    export_dir: Option<PathBuf>,
    #[command(flatten)]
    game: GameArgs,
}

#[derive(Args)]
struct GameArgs {
    /// Play a mini-game during the replay
    #[arg(long, value_enum)]
    game: Option<GameArg>,
    #[arg(long, default_value_t = 50, requires = "game")]
    min_distance: u32,
    #[arg(long, default_value_t = 150, requires = "game")]
    max_distance: u32,
    #[arg(long, default_value_t = 9, requires = "game")]
    shots: u32,
    /// Random targets instead of evenly stepped ones
    #[arg(long, requires = "game")]
    random: bool,
    #[arg(long, requires = "game")]
    seed: Option<u64>,
}

impl GameArgs {
    fn to_config(&self) -> Option<MiniGameConfig> {
        let game_type = match self.game? {
            GameArg::Swings => GameType::Swings,
            GameArg::Putting => GameType::Putting,
        };
        let format = if self.random {
            ShotFormat::Random
        } else {
            ShotFormat::Incremental
        };
        let mut config = MiniGameConfig::new(
            game_type,
            self.min_distance,
            self.max_distance,
            format,
            self.shots,
        );
        config.seed = self.seed;
        Some(config)
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum GameArg {
    Swings,
    Putting,
}

#[derive(Clone, Copy, ValueEnum)]
enum ChannelArg {
    Ball,
    Club,
    Screen,
}

impl From<ChannelArg> for Channel {
    fn from(arg: ChannelArg) -> Self {
        match arg {
            ChannelArg::Ball => Channel::Ball,
            ChannelArg::Club => Channel::Club,
            ChannelArg::Screen => Channel::Screen,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Err(e) = ensure_directories() {
        eprintln!("Could not create output directories: {}", e);
    }
    init_logging(Some(&get_logs_dir()));
    std::panic::set_hook(Box::new(|panic_info| {
        error!("[PANIC] {}", panic_info);
    }));

    match cli.command {
        Command::Replay(args) => run_replay(args),
        Command::CheckLayout { file, channel } => check_layout(&file, channel),
    }
}

fn run_replay(args: ReplayArgs) -> Result<()> {
    let config = match &args.config {
        Some(path) => RecorderConfig::load(path)?,
        None => RecorderConfig::load_or_default(),
    };

    let extractor = build_extractor(&config).context("OCR engine unavailable")?;
    let mut pipeline = ScreenPipeline::new(
        extractor,
        Box::new(BoundingBoxGeometry::full_frame()),
        PipelineSettings::from(&config),
    )
    .with_layouts(&config.layouts);
    if !pipeline.is_channel_enabled(Channel::Ball) {
        bail!("ball channel has no usable layout, nothing to record");
    }

    let hub = Arc::new(EventHub::new());
    let mut session = Session::new(Arc::clone(&hub));
    let link = Arc::new(SimulatorLink::new(
        config.simulator.clone(),
        Arc::clone(&hub.connection),
    ));

    let delivery = if args.connect {
        let states = hub.connection.subscribe();
        link.connect_configured();
        let timeout = Duration::from_millis(config.simulator.handshake_timeout_ms);
        match wait_for_connection(&states, timeout) {
            ConnectionState::Connected => info!("Simulator connected"),
            other => warn!("Simulator not connected ({}), shots will not be sent", other),
        }
        let worker = DeliveryWorker::spawn(Arc::clone(&link));
        session.attach_delivery(worker.queue());
        Some(worker)
    } else {
        None
    };

    if let Some(game) = args.game.to_config().or_else(|| config.minigame.clone()) {
        session.start_minigame(game)?;
    }

    let source = DirectoryFrameSource::open(&args.frames)?;
    info!(
        "Replaying {} frames from {}",
        source.remaining(),
        args.frames.display()
    );
    let interval = Duration::from_millis(args.interval_ms.unwrap_or(config.frame_interval_ms));
    let (sender, receiver) = create_frame_queue(REPLAY_QUEUE_CAPACITY, Overflow::Block);
    let stop = AtomicBool::new(false);

    let (capture_stats, worker_stats) = thread::scope(|scope| {
        let capture = scope.spawn(|| run_capture(source, sender, interval, &stop));
        let worker_stats =
            run_pipeline_worker(receiver, &mut pipeline, |event| session.handle_event(event));
        capture
            .join()
            .map(|capture_stats| (capture_stats, worker_stats))
            .map_err(|_| anyhow!("capture thread panicked"))
    })?;

    session.detach_delivery();
    if let Some(worker) = delivery {
        let stats = worker.shutdown();
        info!("Delivery: {} sent, {} failed", stats.sent, stats.failed);
        link.disconnect();
    }

    info!(
        "Replay finished: {} frames read, {} processed, {} events, {} shots",
        capture_stats.captured,
        worker_stats.frames,
        worker_stats.events,
        session.shots().len()
    );
    if let Some(game) = session.minigame() {
        info!(
            "Mini-game: {} shots, score {} ({:+})",
            game.state().shots_taken,
            game.total_score(),
            game.total_to_par()
        );
    }

    if args.export {
        let dir = args.export_dir.unwrap_or_else(get_exports_dir);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("creating {}", dir.display()))?;
        let path = session.export_csv(&dir)?;
        println!("{}", path.display());
    }
    Ok(())
}

/// Waits until the link leaves `Connecting`, or `timeout` passes.
fn wait_for_connection(states: &Receiver<ConnectionState>, timeout: Duration) -> ConnectionState {
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match states.recv_timeout(remaining) {
            Ok(ConnectionState::Connecting) => continue,
            Ok(state) => return state,
            Err(RecvTimeoutError::Timeout) => {
                return ConnectionState::Error("handshake timed out".to_string())
            }
            Err(RecvTimeoutError::Disconnected) => return ConnectionState::Disconnected,
        }
    }
}

fn check_layout(file: &std::path::Path, only: Option<ChannelArg>) -> Result<()> {
    let channels: Vec<Channel> = match only {
        Some(channel) => vec![channel.into()],
        None => Channel::ALL.to_vec(),
    };

    let mut valid = 0;
    for channel in &channels {
        match FieldLayout::load(*channel, file) {
            Ok(layout) => {
                valid += 1;
                let names: Vec<&str> = layout.field_names().collect();
                println!("{}: {} fields ({})", channel, names.len(), names.join(", "));
            }
            Err(e) => println!("{}: {}", channel, e),
        }
    }

    if valid == 0 {
        bail!("{} holds no valid layout", file.display());
    }
    Ok(())
}
