use std::io::Write;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use soundcheck_core::{
    visualizer, AppConfig, CaptureTask, LevelsHandle, MicStream, PlayHooks, PlaybackController,
    PlaybackEngine, PlaybackPhase, StreamEngine, VisualizerConfig,
};
use tracing_subscriber::EnvFilter;

fn main() -> soundcheck_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };

    match cli.command {
        Commands::Visualize { duration } => run_visualize(config, duration),
        Commands::Play {
            url,
            token,
            stop_after,
        } => run_play(config, &url, token, stop_after),
    }
}

fn run_visualize(config: AppConfig, duration: Option<f32>) -> soundcheck_core::Result<()> {
    tracing::info!(
        sample_rate = config.capture.sample_rate,
        channels = config.capture.channels,
        "starting microphone visualizer"
    );

    let levels = LevelsHandle::new();
    let mut task = CaptureTask::spawn(MicStream::open, config.capture.clone(), levels.clone())?;

    let deadline = duration.map(|secs| Instant::now() + Duration::from_secs_f32(secs));
    let mut screen = BarScreen::new(config.visualizer.clone());

    loop {
        if deadline.is_some_and(|at| Instant::now() >= at) {
            break;
        }
        if task.is_finished() {
            tracing::warn!("capture stopped on its own");
            break;
        }

        let snapshot = levels.snapshot()?;
        screen.draw(&snapshot)?;
        std::thread::sleep(Duration::from_millis(33));
    }

    task.stop();
    Ok(())
}

fn run_play(
    config: AppConfig,
    url: &str,
    token: Option<String>,
    stop_after: Option<f32>,
) -> soundcheck_core::Result<()> {
    let mut playback = config.playback.clone();
    if token.is_some() {
        playback.bearer_token = token;
    }

    let mut controller = PlaybackController::new(move || {
        Ok(Box::new(StreamEngine::new(&playback)?) as Box<dyn PlaybackEngine>)
    });

    let hooks = PlayHooks::new(
        || println!("buffering..."),
        || println!("buffering done"),
        || {},
    );

    tracing::info!(%url, "starting playback");
    controller.play(url, hooks)?;

    let deadline = stop_after.map(|secs| Instant::now() + Duration::from_secs_f32(secs));
    let mut reported_start = false;

    loop {
        let session = controller.session()?;

        if session.started && !reported_start {
            if let Some(latency) = session.start_latency {
                println!("time to start playing: {} ms", latency.as_millis());
            }
            reported_start = true;
        }

        match session.phase {
            PlaybackPhase::Ended => {
                println!("playback finished");
                break;
            }
            PlaybackPhase::Failed => {
                match &session.error {
                    Some(message) => println!("playback failed: {message}"),
                    None => println!("playback failed"),
                }
                break;
            }
            _ => {}
        }

        if deadline.is_some_and(|at| Instant::now() >= at) {
            controller.stop()?;
            println!("stopped");
            break;
        }

        std::thread::sleep(Duration::from_millis(50));
    }

    Ok(())
}

/// Renders the bar row as a character grid, redrawn in place each frame.
struct BarScreen {
    config: VisualizerConfig,
    drawn_once: bool,
}

impl BarScreen {
    const ROWS: usize = 14;
    const COLS: usize = 40;
    const CANVAS_WIDTH: f32 = 200.0;

    fn new(config: VisualizerConfig) -> Self {
        Self {
            config,
            drawn_once: false,
        }
    }

    fn draw(&mut self, levels: &[f32; 3]) -> std::io::Result<()> {
        let bars = visualizer::layout(levels, Self::CANVAS_WIDTH, &self.config);
        let cell_width = Self::CANVAS_WIDTH / Self::COLS as f32;
        let cell_height = self.config.max_height / Self::ROWS as f32;

        let mut grid = [[' '; Self::COLS]; Self::ROWS];
        for bar in &bars {
            let col_start = ((bar.x / cell_width).floor().max(0.0)) as usize;
            let col_end = (((bar.x + bar.width) / cell_width).ceil() as usize).min(Self::COLS);
            let row_start = ((bar.y / cell_height).floor().max(0.0)) as usize;
            let row_end =
                (((bar.y + bar.height) / cell_height).ceil() as usize).min(Self::ROWS);

            for row in grid.iter_mut().take(row_end).skip(row_start) {
                for cell in row.iter_mut().take(col_end).skip(col_start) {
                    *cell = '█';
                }
            }
        }

        let mut stdout = std::io::stdout().lock();
        if self.drawn_once {
            write!(stdout, "\x1b[{}A", Self::ROWS)?;
        }
        for row in &grid {
            let line: String = row.iter().collect();
            writeln!(stdout, "{line}")?;
        }
        stdout.flush()?;
        self.drawn_once = true;
        Ok(())
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
#[command(
    author,
    version,
    about = "Microphone level visualizer and stream start-latency checker",
    long_about = None
)]
struct Cli {
    /// Optional JSON configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Capture the microphone and render a live bar visualizer.
    Visualize {
        /// Stop after this many seconds instead of running until interrupted.
        #[arg(short, long)]
        duration: Option<f32>,
    },
    /// Play a streaming audio URL and report buffering and start latency.
    Play {
        /// URL of the audio stream.
        url: String,
        /// Bearer token attached to the stream request.
        #[arg(long)]
        token: Option<String>,
        /// Stop playback after this many seconds.
        #[arg(long)]
        stop_after: Option<f32>,
    },
}
