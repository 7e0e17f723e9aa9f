//! eyeconic-daemon: voice-driven interaction engine for the EyeConic wearable
//!
//! The daemon runs:
//! - the interaction engine, a mode state machine driven by recognized
//!   speech, on its own thread
//! - the configuration reconciler, which polls the credentials file and
//!   battery, on another
//! - an IPC server publishing mode, display channels and events to the
//!   renderer

mod audio;
mod backends;
mod collab;
mod config;
mod credentials;
mod events;
#[cfg(unix)]
mod ipc;
mod language;
mod lifecycle;
mod reconcile;
mod state;
mod supervisor;

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::sync::{broadcast, oneshot};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::audio::AudioRecorder;
use crate::backends::{
    CommandCamera, CommandSpeaker, CommandTranslator, ConsoleRecognizer, CpalSource,
    HttpApiClient, StatusBoard, SysfsBattery, SystemPower, SystemProvisioner, TesseractOcr,
};
use crate::collab::Collaborators;
use crate::config::Config;
use crate::events::EngineEvent;
use crate::lifecycle::{RunFlag, ShutdownSignal};
use crate::reconcile::ConfigReconciler;
use crate::state::{mode_channel, InteractionEngine, ModeReader};
use crate::supervisor::Supervisor;

/// How long shutdown waits for the engine to finish its current cycle
const ENGINE_JOIN_TIMEOUT: Duration = Duration::from_secs(3);

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "eyeconic-daemon starting");

    // Load configuration
    let config = Config::load()?;
    config.ensure_dirs()?;
    info!(?config.data_dir, ?config.credentials_path, "configuration loaded");

    let (event_tx, _event_rx) = broadcast::channel::<EngineEvent>(256);
    let board = Arc::new(StatusBoard::new(event_tx.clone()));

    // Collaborators are built before any async runtime exists: the blocking
    // HTTP client must not be created or dropped inside one
    let camera = CommandCamera::new(&config.programs.camera).map_err(|e| {
        error!(%e, "camera unavailable, refusing to start");
        e
    })?;
    let api = Arc::new(HttpApiClient::new(
        &config.api_base_url,
        config.probe_addr,
        config.probe_timeout,
    )?);

    let collab = Collaborators {
        recognizer: Arc::new(ConsoleRecognizer::stdin()),
        speaker: Arc::new(CommandSpeaker::new(&config.programs.tts)),
        translator: Arc::new(CommandTranslator::new(&config.programs.translator)),
        ocr: Arc::new(TesseractOcr::new(&config.programs.ocr)),
        camera: Arc::new(camera),
        api: api.clone(),
        display: board.clone(),
        power: Arc::new(SystemPower::new(config.allow_os_shutdown)),
    };

    let (mode_writer, mode_reader) = mode_channel();
    let (credential_writer, credential_reader) = credentials::store();
    let running = RunFlag::new();
    let supervisor = Supervisor::new(config.agent_command.clone(), config.grace_period).shared();

    let recorder = AudioRecorder::new(
        Box::new(CpalSource::new(config.input_device.clone())),
        config.recording_path.clone(),
        event_tx.clone(),
    );

    let mut engine = InteractionEngine::new(
        mode_writer,
        collab,
        recorder,
        supervisor.clone(),
        credential_reader,
        running.clone(),
        event_tx.clone(),
        config.capture_path.clone(),
    );

    let mut reconciler = ConfigReconciler::new(
        config.credentials_path.clone(),
        config.poll_interval,
        credential_writer,
        Arc::new(SystemProvisioner::new(config.data_dir.clone())),
        api,
        Arc::new(SysfsBattery::new()),
        board.clone(),
        event_tx.clone(),
    );

    // Start the loops (each on a dedicated thread)
    let (engine_done_tx, engine_done_rx) = oneshot::channel();
    let engine_thread = thread::Builder::new()
        .name("interaction-engine".to_string())
        .spawn(move || {
            engine.run();
            let _ = engine_done_tx.send(());
        })
        .context("failed to spawn interaction engine thread")?;

    let reconciler_flag = running.clone();
    let reconciler_thread = thread::Builder::new()
        .name("config-reconciler".to_string())
        .spawn(move || reconciler.run(reconciler_flag))
        .context("failed to spawn reconciler thread")?;

    info!("daemon initialized, entering main loop");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build async runtime")?;
    let served = runtime.block_on(serve(&config, mode_reader, board, event_tx, engine_done_rx));
    runtime.shutdown_timeout(Duration::from_secs(1));

    // Cleanup
    info!("shutting down...");
    running.stop();
    supervisor
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .request_stop();

    if reconciler_thread.join().is_err() {
        error!("reconciler thread panicked");
    }

    // The engine may be blocked waiting for speech; give it a bounded chance
    let deadline = Instant::now() + ENGINE_JOIN_TIMEOUT;
    while !engine_thread.is_finished() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(50));
    }
    if engine_thread.is_finished() {
        if engine_thread.join().is_err() {
            error!("interaction engine thread panicked");
        }
    } else {
        warn!("interaction engine still waiting for input, exiting without it");
    }

    info!("eyeconic-daemon stopped");
    served
}

/// Serve IPC until the engine exits or a termination signal arrives
#[cfg(unix)]
async fn serve(
    config: &Config,
    mode: ModeReader,
    board: Arc<StatusBoard>,
    events: broadcast::Sender<EngineEvent>,
    engine_done: oneshot::Receiver<()>,
) -> Result<()> {
    let server = ipc::Server::new(&config.socket_path, mode, board, events)?;
    let shutdown = ShutdownSignal::new();

    tokio::select! {
        _ = engine_done => {
            info!("interaction engine exited");
        }

        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "IPC server error");
            }
        }

        _ = shutdown.wait() => {
            info!("shutdown signal received");
        }
    }

    server.shutdown().await;
    Ok(())
}

#[cfg(not(unix))]
async fn serve(
    _config: &Config,
    _mode: ModeReader,
    _board: Arc<StatusBoard>,
    _events: broadcast::Sender<EngineEvent>,
    engine_done: oneshot::Receiver<()>,
) -> Result<()> {
    let shutdown = ShutdownSignal::new();

    tokio::select! {
        _ = engine_done => {
            info!("interaction engine exited");
        }

        _ = shutdown.wait() => {
            info!("shutdown signal received");
        }
    }

    Ok(())
}
