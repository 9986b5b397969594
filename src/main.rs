//! Application entry point: a terminal voice recorder.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] from disk (returns default on first run).
//! 3. Create the [`tokio`] runtime (multi-thread, 2 workers).
//! 4. Spawn the [`Recorder`] on the runtime.
//! 5. Build the playback controller and the recording store.
//! 6. Read commands from stdin until `quit` or end of input.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use voice_capture::{
    app::{ConsoleApp, Outcome, ParseError, UserCommand, HELP},
    audio::{CpalInputDevice, HandleRegistry},
    config::{AppConfig, AppPaths},
    playback::{CpalPlaybackSink, PlaybackController},
    session::{new_shared_state, Recorder, RecorderCommand, SystemClock},
    storage::RecordingStore,
};

fn main() -> Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("voice-capture starting up");

    // 2. Configuration
    let config = AppConfig::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config ({e:#}); using defaults");
        AppConfig::default()
    });

    // 3. Tokio runtime
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    rt.block_on(run(config))
}

async fn run(config: AppConfig) -> Result<()> {
    let paths = AppPaths::new();

    // 4. Recorder task
    let shared_state = new_shared_state();
    let (command_tx, command_rx) = mpsc::channel::<RecorderCommand>(16);
    let (update_tx, mut update_rx) = mpsc::unbounded_channel();

    let recorder = Recorder::new(
        Arc::new(CpalInputDevice::new()),
        config.capture.constraints(),
        Arc::new(SystemClock),
        HandleRegistry::new(),
        Arc::clone(&shared_state),
        update_tx,
    );
    let recorder_task = tokio::spawn(recorder.run(command_rx));

    // 5. Playback + storage
    let mut player =
        PlaybackController::new(CpalPlaybackSink::new(config.playback.output_device.clone()));
    if let Err(e) = player.set_volume(config.playback.volume) {
        log::warn!("Ignoring configured volume: {e}");
    }
    let store = RecordingStore::new(config.recordings_dir(&paths));
    log::info!("Recordings are saved to {}", store.dir().display());

    let mut app = ConsoleApp::new(command_tx, shared_state, player, store);

    // 6. Input loop
    println!("{HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else {
                    break;
                };
                match UserCommand::parse(&line) {
                    Ok(command) => match app.execute(command).await {
                        Outcome::Continue(reply) => println!("{reply}"),
                        Outcome::Quit => break,
                    },
                    Err(ParseError::Empty) => {}
                    Err(e) => println!("{e}"),
                }
            }

            Some(update) = update_rx.recv() => {
                if let Some(line) = app.on_update(update) {
                    println!("{line}");
                }
            }
        }
    }

    // Dropping the app closes the command channel, which stops the recorder.
    app.shutdown();
    drop(app);
    recorder_task.await.context("recorder task failed")?;
    log::info!("voice-capture shut down");
    Ok(())
}
