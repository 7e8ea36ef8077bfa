//! `panelbot-cli` – panel task command line interface
//!
//! Entry point for the panelbot stack:
//!
//! 1. Loads `~/.panelbot/config.toml` (or `--config <path>`), falling back to
//!    defaults and applying `PANELBOT_*` overrides.
//! 2. `run` executes the whole task against the simulated arm, replaying
//!    recorded frames from a directory.
//! 3. `locate` runs one localization pipeline on a single image and can
//!    write an annotated copy.
//! 4. `state` prints the file-backed shared state.
//! 5. Intercepts **Ctrl-C** to cancel the running task between states.

mod config;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use tracing::warn;

use panelbot_hal::{FileFrameSource, FrameSource, SimArm, SimFrameSource};
use panelbot_memory::SharedState;
use panelbot_perception::LocalizationPipeline;
use panelbot_perception::annotate::annotate;
use panelbot_runtime::{CancelToken, PerceptionRunner, TaskOrchestrator, TaskOutcome, TaskUserdata};

#[derive(Parser)]
#[command(name = "panelbot")]
#[command(about = "Wrench-and-valve panel task runner", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (default: ~/.panelbot/config.toml).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the whole panel task.
    Run {
        /// Skip navigation and stop once the arm reaches the wrench.
        #[arg(long)]
        test_arm: bool,

        /// Start as if the wrench were already in the gripper.
        #[arg(long)]
        have_wrench: bool,

        /// Directory of recorded frames (overrides `frames_dir`).
        #[arg(long)]
        frames: Option<PathBuf>,
    },
    /// Localize one object in a single image.
    Locate {
        image: PathBuf,

        #[arg(long, value_enum)]
        object: ObjectArg,

        /// Distance from the camera to the panel, in meters.
        #[arg(long)]
        standoff: f64,

        /// Write an annotated copy of the image here.
        #[arg(long)]
        annotate: Option<PathBuf>,
    },
    /// Print the shared state held in `state_file`.
    State,
    /// Write a default config file.
    Init,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ObjectArg {
    Wrench,
    Valve,
}

fn main() -> ExitCode {
    // ── Structured logging ────────────────────────────────────────────────
    // RUST_LOG selects the filter (default "info"); PANELBOT_LOG_FORMAT=json
    // switches to newline-delimited JSON.
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    if std::env::var("PANELBOT_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .compact()
            .init();
    }

    let cli = Cli::parse();

    match dispatch(cli.command, cli.config.as_deref()) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("{}: {}", "Error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn dispatch(command: Commands, config_path: Option<&Path>) -> Result<bool, String> {
    match command {
        Commands::Init => init_config(config_path),
        Commands::Run {
            test_arm,
            have_wrench,
            frames,
        } => run_task(&config::load(config_path)?, test_arm, have_wrench, frames),
        Commands::Locate {
            image,
            object,
            standoff,
            annotate,
        } => locate(&config::load(config_path)?, &image, object, standoff, annotate.as_deref()),
        Commands::State => show_state(&config::load(config_path)?),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// run
// ─────────────────────────────────────────────────────────────────────────────

fn run_task(
    cfg: &config::Config,
    test_arm: bool,
    have_wrench: bool,
    frames: Option<PathBuf>,
) -> Result<bool, String> {
    let cancel = CancelToken::new();
    let cancel_ctrlc = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – cancelling after the current state …".yellow().bold());
        cancel_ctrlc.cancel();
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; the task cannot be cancelled");
    }

    let state = open_state(cfg);
    cfg.initial_state.seed(&state)?;

    let camera = cfg.camera.build().map_err(|e| e.to_string())?;
    let wrench = LocalizationPipeline::wrench(camera.clone(), cfg.wrench.clone())
        .map_err(|e| e.to_string())?;
    let valve = LocalizationPipeline::valve(camera, cfg.valve.clone());

    let frames: Box<dyn FrameSource> = match frames.or_else(|| cfg.frames_dir.clone()) {
        Some(dir) => Box::new(FileFrameSource::open(&dir).map_err(|e| e.to_string())?),
        None if test_arm => Box::new(SimFrameSource::new("no_camera", Vec::new())),
        None => {
            return Err("no frames directory; pass --frames or set `frames_dir`".to_string());
        }
    };
    println!("  Frames from {}", frames.id().bold());
    println!("  Motion backend: {}", "simulated arm".dimmed());

    let perception = PerceptionRunner::new(wrench, valve, frames, state.clone(), cancel.clone(), &cfg.task);
    let mut orchestrator =
        TaskOrchestrator::new(SimArm::new("sim_arm"), perception, state, cancel, cfg.task.clone());

    let userdata = TaskUserdata {
        have_wrench,
        ..TaskUserdata::from_config(&cfg.task, test_arm)
    };
    let outcome = orchestrator.run(userdata);
    let commands = orchestrator.motion().history().len();

    match outcome {
        TaskOutcome::Success => {
            println!("\n  {} task finished ({} motion commands)", "✓".green().bold(), commands);
            Ok(true)
        }
        TaskOutcome::Failure => {
            println!("\n  {} task failed ({} motion commands)", "✗".red().bold(), commands);
            Ok(false)
        }
    }
}

fn open_state(cfg: &config::Config) -> SharedState {
    match &cfg.state_file {
        Some(path) => SharedState::open_file(path.clone()),
        None => SharedState::in_memory(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// locate
// ─────────────────────────────────────────────────────────────────────────────

fn locate(
    cfg: &config::Config,
    image_path: &Path,
    object: ObjectArg,
    standoff: f64,
    annotate_to: Option<&Path>,
) -> Result<bool, String> {
    let frame = image::open(image_path)
        .map_err(|e| format!("Failed to read image {}: {}", image_path.display(), e))?
        .to_rgb8();
    let camera = cfg.camera.build().map_err(|e| e.to_string())?;
    let pipeline = match object {
        ObjectArg::Wrench => {
            LocalizationPipeline::wrench(camera, cfg.wrench.clone()).map_err(|e| e.to_string())?
        }
        ObjectArg::Valve => LocalizationPipeline::valve(camera, cfg.valve.clone()),
    };

    let detection = match pipeline.analyze(&frame, standoff) {
        Ok(d) => d,
        Err(e) => {
            println!("  {} {} not found: {}", "✗".red().bold(), pipeline.class(), e);
            return Ok(false);
        }
    };

    let est = detection.estimate;
    println!(
        "  {} {} at pixel ({:.1}, {:.1})",
        "✓".green().bold(),
        detection.class.to_string().bold(),
        est.pixel.x,
        est.pixel.y
    );
    println!(
        "    offset  x={:.3} y={:+.3} z={:+.3} m   confidence {:.2}",
        est.offset.x, est.offset.y, est.offset.z, est.confidence
    );
    for c in &detection.candidates {
        let marker = if c.id == detection.chosen { "→".green().bold() } else { " ".normal() };
        println!(
            "    {} #{} centroid ({:.0}, {:.0}) diameter {:.1} length {:.0} area {:.0} score {:.3}",
            marker, c.id, c.centroid.x, c.centroid.y, c.diameter, c.length, c.area, c.score
        );
    }

    if let Some(out) = annotate_to {
        annotate(&frame, &detection)
            .save(out)
            .map_err(|e| format!("Failed to write {}: {}", out.display(), e))?;
        println!("  Annotated image written to {}", out.display().to_string().bold());
    }
    Ok(true)
}

// ─────────────────────────────────────────────────────────────────────────────
// state / init
// ─────────────────────────────────────────────────────────────────────────────

fn show_state(cfg: &config::Config) -> Result<bool, String> {
    let Some(path) = &cfg.state_file else {
        return Err("no `state_file` configured; the in-memory state does not outlive a run".to_string());
    };
    let entries = SharedState::open_file(path.clone())
        .snapshot()
        .map_err(|e| e.to_string())?;
    if entries.is_empty() {
        println!("  {} is empty", path.display());
        return Ok(true);
    }
    for (key, entry) in entries {
        let value = serde_json::to_string(&entry.value).map_err(|e| e.to_string())?;
        println!(
            "  {:<14} {}  {}",
            key.bold(),
            value,
            entry.updated_at.to_rfc3339().dimmed()
        );
    }
    Ok(true)
}

fn init_config(path: Option<&Path>) -> Result<bool, String> {
    let path = config::init(path)?;
    println!(
        "  {} Config saved to {}",
        "✓".green().bold(),
        path.display().to_string().bold()
    );
    Ok(true)
}
