mod console;

use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser};
use crossterm::{
    execute,
    event::{DisableMouseCapture, EnableMouseCapture},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{Terminal, backend::CrosstermBackend};

use cimwatch_core::acquisition::{self, AcquisitionLoop};
use cimwatch_core::dispatch::{self, Dispatcher};
use cimwatch_core::error::ConfigError;
use cimwatch_core::platform::create_platform;
use cimwatch_core::roi::RoiDetector;
use cimwatch_core::settings::{self, Settings};
use cimwatch_core::source::FrameSource;
use cimwatch_core::types::{CaptureTarget, SessionConfig, StopReason};
use cimwatch_core::logger;

use console::ConsoleFrontEnd;

/// Watch a display or window for color-grid codes and decode them with an external decoder.
#[derive(Parser, Debug)]
#[command(name = "cimwatch", version, about)]
struct Cli {
    #[command(flatten)]
    mode: Mode,

    /// Output directory for decoded files (default: a new temporary directory)
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Path to the decoder executable (default: ./cimbar)
    #[arg(short = 'c', long = "decoder-path", visible_alias = "cimbar", value_name = "PATH")]
    decoder_path: Option<PathBuf>,

    /// Stop monitoring after this many seconds
    #[arg(short, long, value_name = "SECONDS")]
    time: Option<f64>,

    /// Minimum seconds between two decoder runs (default: 0.5)
    #[arg(short, long, value_name = "SECONDS")]
    rate: Option<f64>,

    /// Target capture rate in frames per second (default: 30)
    #[arg(long, value_name = "N")]
    fps: Option<f64>,

    /// Also print failed decodes and session events
    #[arg(short, long)]
    verbose: bool,

    /// Use the synthetic capture platform
    #[arg(long)]
    stub: bool,

    /// Settings file
    #[arg(long, value_name = "PATH", default_value = "settings.json")]
    config: PathBuf,
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct Mode {
    /// Monitor a display (1 = primary)
    #[arg(short, long, value_name = "INDEX")]
    monitor: Option<usize>,

    /// Monitor the window whose title contains TITLE
    #[arg(short, long, value_name = "TITLE")]
    window: Option<String>,

    /// Decode a single image file
    #[arg(short, long, value_name = "PATH")]
    image: Option<PathBuf>,

    /// List capturable windows
    #[arg(long)]
    list_windows: bool,

    /// List displays
    #[arg(long)]
    list_displays: bool,

    /// Interactive terminal UI
    #[arg(long)]
    tui: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let logs_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")).join("logs");
    if let Err(e) = logger::init(&logs_dir) {
        eprintln!("warning: logging disabled ({}): {}", logs_dir.display(), e);
    }

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            logger::error(&format!("{:#}", e));
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let mut settings = Settings::load(&cli.config);
    if let Some(rate) = cli.rate {
        settings.decode_interval_secs = rate;
    }
    if let Some(fps) = cli.fps {
        settings.frame_rate = fps;
    }
    let source = FrameSource::new(create_platform(cli.stub));

    if cli.mode.list_displays {
        for d in source.displays()? {
            println!("display {} ({}x{})", d.index, d.width, d.height);
        }
        return Ok(ExitCode::SUCCESS);
    }
    if cli.mode.list_windows {
        println!("available windows:");
        print_windows(&source)?;
        return Ok(ExitCode::SUCCESS);
    }

    let decoder = cli.decoder_path.clone().unwrap_or_else(|| settings.decoder_path.clone());
    let decoder = dispatch::check_decoder(&decoder)?;
    if cli.verbose {
        println!("✓ decoder found: {}", decoder.display());
    }
    let output_dir = match cli.output.clone().or_else(|| settings.output_dir.clone()) {
        Some(dir) => dir,
        None => tempfile::Builder::new()
            .prefix("cimbar_decode_")
            .tempdir()
            .context("cannot create a temporary output directory")?
            .keep(),
    };
    let dispatcher = Dispatcher::new(&decoder, &output_dir)?;

    if let Some(path) = &cli.mode.image {
        decode_image(path, dispatcher)?;
        return Ok(ExitCode::SUCCESS);
    }

    let max_duration = cli.time.map(|s| settings::seconds("time limit", s)).transpose()?;
    let interval = settings.decode_interval()?;

    if cli.mode.tui {
        run_tui(cli.stub, source, dispatcher, settings, cli.config.clone(), max_duration)?;
        return Ok(ExitCode::SUCCESS);
    }

    let target = if let Some(index) = cli.mode.monitor {
        source.display_target(index)?
    } else if let Some(title) = &cli.mode.window {
        match source.window_target(title) {
            Ok(target) => target,
            Err(e @ ConfigError::WindowNotFound(_)) => {
                eprintln!("error: {}\n\navailable windows:", e);
                print_windows(&source).ok();
                return Ok(ExitCode::FAILURE);
            }
            Err(e) => return Err(e.into()),
        }
    } else {
        return Err(ConfigError::NoCaptureSource.into());
    };

    let mut config = SessionConfig::new(target);
    config.interval = interval;
    config.frame_rate = settings.frame_rate;
    config.max_duration = max_duration;
    monitor(source, dispatcher, config, cli.verbose)
}

fn print_windows(source: &FrameSource) -> Result<()> {
    for w in source.windows()? {
        println!("  {}  ({}x{} at {},{})", w.title, w.rect.w, w.rect.h, w.rect.l, w.rect.t);
    }
    Ok(())
}

/// Detect once and decode the best region, or the whole file when nothing stands out.
fn decode_image(path: &Path, mut dispatcher: Dispatcher) -> Result<()> {
    let frame = FrameSource::load_image(path)?;
    println!("decoding {}", path.display());
    println!("output: {}", dispatcher.output_dir().display());

    let outcome = match RoiDetector::default().detect_best(&frame) {
        Some(candidate) => {
            let b = candidate.bounds;
            println!("code region {}x{} at {},{}", b.w, b.h, b.x, b.y);
            dispatcher.dispatch(&candidate.image)
        }
        None => {
            println!("no code region found, decoding the whole image");
            dispatcher.dispatch_file(path)
        }
    };
    let mark = if outcome.success { "✓" } else { "✗" };
    println!("{} {}", mark, outcome.message.trim_end());
    Ok(())
}

fn monitor(source: FrameSource, dispatcher: Dispatcher, config: SessionConfig, verbose: bool) -> Result<ExitCode> {
    println!("monitoring {}", config.target);
    if let CaptureTarget::Window { rect, .. } = &config.target {
        println!("window at ({}, {}), {}x{}", rect.l, rect.t, rect.w, rect.h);
    }
    println!("output: {}", dispatcher.output_dir().display());
    println!("press Ctrl+C to stop\n");

    let stop = Arc::new(AtomicBool::new(false));
    let flag = stop.clone();
    if let Err(e) = ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst)) {
        logger::warn(&format!("cannot install Ctrl+C handler: {}", e));
    }

    let front = ConsoleFrontEnd::new(verbose, dispatcher.output_dir().to_path_buf());
    let mut lp = AcquisitionLoop::new(source, RoiDetector::default(), dispatcher, front);
    lp.start(config)?;
    match lp.run_blocking(&stop) {
        Some(StopReason::CaptureFailed(_)) => Ok(ExitCode::FAILURE),
        _ => Ok(ExitCode::SUCCESS),
    }
}

fn run_tui(
    force_stub: bool,
    source: FrameSource,
    dispatcher: Dispatcher,
    settings: Settings,
    settings_path: PathBuf,
    max_duration: Option<Duration>,
) -> Result<()> {
    let (log_tx, log_rx) = mpsc::channel::<String>();
    logger::set_tui_sender(log_tx);
    logger::info("cimwatch started");

    // The loop thread owns its own platform; the UI keeps one for enumeration
    let (front, channels) = cimwatch_tui::TuiFrontEnd::new();
    let lp = AcquisitionLoop::new(source, RoiDetector::default(), dispatcher, front);
    let handle = acquisition::spawn(lp).context("cannot start the acquisition thread")?;
    let ui_source = FrameSource::new(create_platform(force_stub));
    let mut app = cimwatch_tui::App::new(handle, ui_source, channels, log_rx, settings, settings_path, max_duration);

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = cimwatch_tui::event::run(&mut terminal, &mut app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
    terminal.show_cursor()?;

    app.handle.stop();
    result
}
