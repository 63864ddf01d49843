//! Activity Recorder CLI
//!
//! Records input activity alongside an OBS screen recording.

use activity_recorder::{
    collector::check_permission,
    config::{Config, SourceConfig},
    metadata::{latest_recording, list_recordings, RecordingSummary},
    window::{active_window, enable_dpi_awareness},
    RecorderController, RecordingToggle, StopReport, CAPTURE_NOTICE, VERSION,
};
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "activity-recorder")]
#[command(version = VERSION)]
#[command(about = "Records input activity in sync with an OBS screen recording", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a recording session (stops on Ctrl+C)
    Record {
        /// Input sources to capture (keyboard, mouse, or all)
        #[arg(long, default_value = "all")]
        sources: String,

        /// Record events only, without driving OBS
        #[arg(long)]
        no_obs: bool,

        /// Override the natural scrolling setting stored in the metadata
        #[arg(long)]
        natural_scrolling: Option<bool>,

        /// Directory to create the session directory in
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Pause a running recorder
    Pause,

    /// Resume a paused recorder
    Resume,

    /// Show permission, configuration and latest recording
    Status,

    /// List recorded sessions, newest first
    List,

    /// Show configuration
    Config,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "activity_recorder=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    // Physical pixel coordinates on scaled displays
    enable_dpi_awareness();

    match cli.command {
        Commands::Record {
            sources,
            no_obs,
            natural_scrolling,
            output,
        } => cmd_record(&sources, no_obs, natural_scrolling, output),
        Commands::Pause => cmd_pause(),
        Commands::Resume => cmd_resume(),
        Commands::Status => cmd_status(),
        Commands::List => cmd_list(),
        Commands::Config => cmd_config(),
    }
}

fn load_config() -> Config {
    match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: Could not load config ({e}), using defaults");
            Config::default()
        }
    }
}

fn enabled(flag: bool) -> &'static str {
    if flag {
        "enabled"
    } else {
        "disabled"
    }
}

fn cmd_record(
    sources: &str,
    no_obs: bool,
    natural_scrolling: Option<bool>,
    output: Option<PathBuf>,
) -> Result<()> {
    println!("Activity Recorder v{VERSION}");
    println!("{CAPTURE_NOTICE}");

    // Check for Input Monitoring permission
    if !check_permission() {
        eprintln!("To grant permission:");
        eprintln!("1. Open System Settings > Privacy & Security");
        eprintln!("2. Select 'Input Monitoring'");
        eprintln!("3. Add this application to the allowed list");
        eprintln!("4. Restart the application");
        bail!("Input Monitoring permission not granted");
    }

    let source_config = SourceConfig::from_csv(sources);
    if !source_config.any_enabled() {
        bail!("At least one source must be enabled (keyboard or mouse)");
    }

    let mut config = load_config();
    config.sources = source_config;
    if no_obs {
        config.obs.enabled = false;
    }
    if let Some(natural) = natural_scrolling {
        config.natural_scrolling = natural;
    }
    if let Some(dir) = output {
        config.recordings_dir = dir;
    }
    config
        .ensure_directories()
        .context("Could not create recordings directory")?;

    println!("  Keyboard: {}", enabled(config.sources.keyboard));
    println!("  Mouse: {}", enabled(config.sources.mouse));
    println!(
        "  OBS: {}",
        if config.obs.enabled {
            config.obs.url()
        } else {
            "disabled".to_string()
        }
    );
    println!("  Natural scrolling: {}", config.natural_scrolling);
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || r.store(false, Ordering::SeqCst))
        .context("Error setting Ctrl+C handler")?;

    let mut controller = RecorderController::from_config(&config);
    if let RecordingToggle::Started { path } = controller
        .toggle_recording()
        .context("Failed to start recording")?
    {
        println!("Recording to {}", path.display());
    }

    if config.paused {
        controller.toggle_pause()?;
        println!("Recording is currently paused.");
        println!("Run `activity-recorder resume` to start capturing.");
    }

    // `activity-recorder pause/resume` flip the flag in the config file
    let mut last_config_check = Instant::now();
    let mut last_focus_poll = Instant::now();

    while running.load(Ordering::SeqCst) {
        if last_config_check.elapsed() >= Duration::from_secs(1) {
            if let Ok(cfg) = Config::load() {
                if cfg.paused != controller.is_paused() {
                    let paused = controller.toggle_pause()?;
                    println!();
                    println!("{}", if paused { "Recording paused." } else { "Recording resumed." });
                }
            }
            last_config_check = Instant::now();
        }

        if last_focus_poll.elapsed() >= config.focus_poll_interval {
            if !controller.is_paused() {
                if let Some(window) = active_window() {
                    controller.submit_focus(&window.app_name, &window.window_title);
                }
            }
            last_focus_poll = Instant::now();
        }

        thread::sleep(Duration::from_millis(50));
    }

    println!();
    println!("Stopping recording...");
    if let Some(report) = controller.stop()? {
        print_report(&report);
    }
    Ok(())
}

fn print_report(report: &StopReport) {
    println!();
    println!("Session: {}", report.path.display());
    println!("Duration: {}s", report.duration.as_secs());
    println!("Events written: {}", report.events_written);
    println!();
    println!("{}", report.stats.summary());
    for e in &report.teardown_errors {
        eprintln!("Warning: {e}");
    }
}

fn cmd_pause() -> Result<()> {
    let mut config = load_config();
    config.paused = true;
    config.save().context("Error saving config")?;
    println!("Recording paused. Use 'activity-recorder resume' to continue.");
    Ok(())
}

fn cmd_resume() -> Result<()> {
    let mut config = load_config();
    config.paused = false;
    config.save().context("Error saving config")?;
    println!("Recording resumed.");
    Ok(())
}

fn cmd_status() -> Result<()> {
    let config = load_config();

    println!("Activity Recorder Status");
    println!("========================");
    println!();

    let has_permission = check_permission();
    println!(
        "Input Monitoring Permission: {}",
        if has_permission {
            "Granted ✓"
        } else {
            "Not Granted ✗"
        }
    );
    println!();

    println!("Configuration:");
    println!("  Keyboard capture: {}", enabled(config.sources.keyboard));
    println!("  Mouse capture: {}", enabled(config.sources.mouse));
    println!("  OBS: {}", enabled(config.obs.enabled));
    println!("  Recordings: {}", config.recordings_dir.display());
    println!("  Paused: {}", config.paused);
    println!();

    match latest_recording(&config.recordings_dir)? {
        Some(recording) => {
            println!("Latest recording:");
            print_recording(&recording);
        }
        None => println!("No recordings found."),
    }
    Ok(())
}

fn cmd_list() -> Result<()> {
    let config = load_config();
    let recordings = list_recordings(&config.recordings_dir)
        .with_context(|| format!("Could not read {}", config.recordings_dir.display()))?;

    if recordings.is_empty() {
        println!("No recordings in {}", config.recordings_dir.display());
        println!("Run 'activity-recorder record' to make one.");
        return Ok(());
    }

    println!(
        "Found {} recording(s) in {}",
        recordings.len(),
        config.recordings_dir.display()
    );
    println!();
    for recording in &recordings {
        print_recording(recording);
    }
    Ok(())
}

fn print_recording(recording: &RecordingSummary) {
    let duration = recording
        .metadata
        .as_ref()
        .and_then(|m| m.duration_secs())
        .map(|s| format!("{s}s"))
        .unwrap_or_else(|| "unfinished".to_string());
    println!(
        "  {}  {:>8} events  {:>10}",
        recording.name, recording.event_count, duration
    );
}

fn cmd_config() -> Result<()> {
    let config = load_config();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}
