//! PhysioCoach - Main entry point
//!
//! Runs one prescribed exercise: picks it from today's list, starts the
//! capture loop over a frame directory and narrates pose feedback. The
//! session is controlled from stdin.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use physio_coach::audio::{CpalAudioSink, NarratorAudioChannel};
use physio_coach::capture::{CaptureScheduler, DirectoryFrameSource};
use physio_coach::config::{CoachConfig, ConfigOverrides};
use physio_coach::services::{PoseClient, PoseService, ProgressClient, ProgressStore, TtsClient};
use physio_coach::session::{CompletionOutcome, ExerciseDefinition, ExerciseSession};
use physio_common::config::{load_toml_config, DEFAULT_LOG_LEVEL};
use physio_common::events::{CoachEvent, EventBus};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Event bus capacity
const EVENT_CAPACITY: usize = 256;

/// Command-line arguments for physio-coach
#[derive(Parser, Debug)]
#[command(name = "physio-coach")]
#[command(about = "Exercise capture-and-feedback coach")]
#[command(version)]
struct Args {
    /// Path to config file (default: <config dir>/physio-coach/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Backend base URL
    #[arg(long, env = "API_URL")]
    api_url: Option<String>,

    /// Patient to run exercises for
    #[arg(short, long, env = "PHYSIO_PATIENT_ID")]
    patient_id: Option<u32>,

    /// Exercise to run (default: first pending exercise today)
    #[arg(short, long)]
    exercise_id: Option<u32>,

    /// Directory of JPEG/PNG frames replayed as the camera
    #[arg(short, long, env = "PHYSIO_FRAMES_DIR")]
    frames_dir: PathBuf,

    /// Capture interval in milliseconds
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Disable spoken feedback
    #[arg(long)]
    no_audio: bool,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            api_url: self.api_url.clone(),
            patient_id: self.patient_id,
            interval_ms: self.interval_ms,
            no_audio: self.no_audio,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let toml_config =
        load_toml_config(args.config.as_deref()).context("Failed to load configuration")?;

    // RUST_LOG wins over the configured level
    let level = toml_config
        .logging
        .level
        .as_deref()
        .unwrap_or(DEFAULT_LOG_LEVEL);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("physio_coach={0},physio_common={0}", level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = CoachConfig::resolve(&args.overrides(), &toml_config)
        .context("Invalid configuration")?;

    info!(
        "Starting PhysioCoach v{} for patient {}",
        env!("CARGO_PKG_VERSION"),
        config.patient_id
    );
    info!("Backend: {}", config.api_url);

    let events = Arc::new(EventBus::new(EVENT_CAPACITY));

    let pose: Arc<dyn PoseService> = Arc::new(
        PoseClient::new(config.api_url.clone(), config.capture.request_timeout)
            .context("Failed to create pose client")?,
    );
    let progress: Arc<dyn ProgressStore> = Arc::new(
        ProgressClient::new(config.api_url.clone(), config.capture.request_timeout)
            .context("Failed to create progress client")?,
    );
    let narrator = build_narrator(&config, Arc::clone(&events))?;

    let frames = Arc::new(
        DirectoryFrameSource::open(&args.frames_dir)
            .with_context(|| format!("Failed to open frames in {}", args.frames_dir.display()))?,
    );

    let exercise = select_exercise(progress.as_ref(), config.patient_id, args.exercise_id).await?;
    print_exercise(&exercise);

    let session = Arc::new(ExerciseSession::new(
        Arc::clone(&pose),
        Arc::clone(&progress),
        Arc::clone(&events),
        config.patient_id,
    ));

    let printer = tokio::spawn(log_events(events.subscribe()));

    session
        .start(exercise)
        .await
        .context("Failed to start exercise session")?;

    let mut scheduler = CaptureScheduler::new(
        Arc::clone(&session),
        pose,
        frames,
        config.capture.clone(),
    );
    if let Some(narrator) = &narrator {
        scheduler = scheduler.with_narrator(Arc::clone(narrator));
    }
    let scheduler = Arc::new(scheduler);
    let capture_task = scheduler.spawn();

    println!("Commands: + (rep)  c (complete set)  r (reset)  s (status)  q (quit)");
    run_commands(&session).await?;

    info!("Shutting down");
    scheduler.stop();
    session.stop().await;
    if let Some(narrator) = &narrator {
        narrator.shutdown();
    }
    if let Err(e) = capture_task.await {
        warn!("Capture loop ended abnormally: {}", e);
    }
    printer.abort();

    info!("Shutdown complete");
    Ok(())
}

/// Build the narrator, or None when narration is disabled or no audio
/// device is available
fn build_narrator(
    config: &CoachConfig,
    events: Arc<EventBus>,
) -> Result<Option<Arc<NarratorAudioChannel>>> {
    if !config.narration.enabled {
        info!("Spoken feedback disabled");
        return Ok(None);
    }

    let tts = TtsClient::new(config.api_url.clone(), config.capture.request_timeout)
        .context("Failed to create TTS client")?;

    let sink = match CpalAudioSink::open(None) {
        Ok(sink) => sink,
        Err(e) => {
            warn!("Audio output unavailable, spoken feedback disabled: {}", e);
            return Ok(None);
        }
    };
    info!("Spoken feedback on {}", sink.device_name());

    Ok(Some(Arc::new(
        NarratorAudioChannel::new(Arc::new(tts), Arc::new(sink), config.narration.clone())
            .with_events(events),
    )))
}

/// Pick the requested exercise, or the first one still pending today
async fn select_exercise(
    progress: &dyn ProgressStore,
    patient_id: u32,
    exercise_id: Option<u32>,
) -> Result<ExerciseDefinition> {
    let exercises = progress
        .todays_exercises(patient_id)
        .await
        .context("Failed to load today's exercises")?;

    match exercise_id {
        Some(id) => exercises
            .into_iter()
            .find(|e| e.id == id)
            .with_context(|| format!("Exercise {} is not assigned today", id)),
        None => exercises
            .into_iter()
            .find(|e| !e.completed_today)
            .context("No pending exercises today"),
    }
}

fn print_exercise(exercise: &ExerciseDefinition) {
    println!(
        "{} ({}): {} sets of {} reps",
        exercise.name, exercise.difficulty, exercise.target_sets, exercise.target_reps
    );
    if !exercise.description.is_empty() {
        println!("  {}", exercise.description);
    }
    for (i, step) in exercise.instructions.iter().enumerate() {
        println!("  {}. {}", i + 1, step);
    }
    if exercise.duration_seconds > 0 {
        println!(
            "  Time budget per set: {}s",
            exercise.set_duration().as_secs()
        );
    }
}

/// Read stdin commands until quit, EOF or a shutdown signal
async fn run_commands(session: &ExerciseSession) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    break;
                };
                if !handle_command(line.trim(), session).await {
                    break;
                }
            }
        }
    }
    Ok(())
}

/// Execute one command; false means quit
async fn handle_command(command: &str, session: &ExerciseSession) -> bool {
    match command {
        "" => {}
        "+" => match session.increment_rep().await {
            Ok(reps) => println!("Reps: {}", reps),
            Err(e) => println!("{}", e),
        },
        "c" => match session.request_complete_set().await {
            Ok(CompletionOutcome::NextSet {
                completed_set,
                next_set,
            }) => println!("Set {} complete. Starting set {}.", completed_set, next_set),
            Ok(CompletionOutcome::ExerciseComplete { persisted, .. }) => {
                if persisted {
                    println!("Exercise complete. Press q to quit.");
                } else {
                    println!("Exercise complete (not saved to the server). Press q to quit.");
                }
            }
            Err(e) => println!("{}", e),
        },
        "r" => match session.reset_progress().await {
            Ok(()) => println!("Progress reset."),
            Err(e) => println!("{}", e),
        },
        "s" => match serde_json::to_string_pretty(&session.snapshot().await) {
            Ok(status) => println!("{}", status),
            Err(e) => error!("Failed to render status: {}", e),
        },
        "q" => return false,
        other => println!("Unknown command '{}'. Use + c r s q.", other),
    }
    true
}

/// Log every coach event until the bus closes
async fn log_events(mut rx: broadcast::Receiver<CoachEvent>) {
    loop {
        match rx.recv().await {
            Ok(CoachEvent::FeedbackSpoken { text, .. }) => info!("Coach: {}", text),
            Ok(CoachEvent::RepsChanged {
                current_set,
                current_reps,
                target_reps,
                ..
            }) => info!(
                "Set {}: {}/{} reps",
                current_set, current_reps, target_reps
            ),
            Ok(event) => debug!(event = event.event_type(), ?event, "Coach event"),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Event log lagged, {} events skipped", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
