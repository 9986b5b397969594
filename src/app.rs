//! Terminal front-end.
//!
//! # Architecture
//!
//! [`ConsoleApp`] plays the role of the dashboard UI.  It owns:
//!
//! * `command_tx`:  sends [`RecorderCommand`] to the recorder task.
//! * `state`:       the recorder's [`SharedState`] snapshot, read for `status`.
//! * a [`PlaybackController`] and a [`RecordingStore`] for the artifact it
//!   currently holds.
//!
//! `main` feeds it parsed [`UserCommand`]s from stdin and every
//! [`RecorderUpdate`] from the recorder, and prints whatever it returns.
//!
//! # Commands
//!
//! | Input | Effect |
//! |-------|--------|
//! | `start` / `stop` / `cancel` | Forwarded to the recorder |
//! | `play` / `pause` | Transport of the last recording |
//! | `seek <secs>` | Jump, clamped to the recording length |
//! | `volume <0-1>` | Output level, clamped |
//! | `save` | Export the last recording as WAV |
//! | `list` | Show saved recordings |
//! | `status` | Session state, capture progress and playback position |
//! | `quit` | Exit |

use std::sync::PoisonError;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::audio::RecordingArtifact;
use crate::playback::{PlaybackController, PlaybackSink};
use crate::session::{RecorderCommand, RecorderUpdate, SessionState, SharedState};
use crate::storage::RecordingStore;

pub const HELP: &str = "commands: start | stop | cancel | play | pause | seek <secs> | \
volume <0-1> | save | list | status | help | quit";

// ---------------------------------------------------------------------------
// UserCommand
// ---------------------------------------------------------------------------

/// One line of user input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UserCommand {
    Start,
    Stop,
    Cancel,
    Play,
    Pause,
    Seek(f64),
    Volume(f32),
    Save,
    List,
    Status,
    Help,
    Quit,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty input")]
    Empty,

    #[error("unknown command '{0}' (type 'help')")]
    Unknown(String),

    #[error("'{0}' needs a number")]
    MissingArgument(&'static str),

    #[error("'{0}' is not a number")]
    BadNumber(String),
}

impl UserCommand {
    /// Parse a line such as `seek 2.5`.  Case-insensitive.
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Err(ParseError::Empty);
        };
        let arg = words.next();

        let command = match verb.to_ascii_lowercase().as_str() {
            "start" | "record" => Self::Start,
            "stop" => Self::Stop,
            "cancel" => Self::Cancel,
            "play" => Self::Play,
            "pause" => Self::Pause,
            "seek" => Self::Seek(number(arg, "seek")?),
            "volume" | "vol" => Self::Volume(number(arg, "volume")?),
            "save" => Self::Save,
            "list" | "ls" => Self::List,
            "status" => Self::Status,
            "help" | "?" => Self::Help,
            "quit" | "exit" | "q" => Self::Quit,
            other => return Err(ParseError::Unknown(other.to_string())),
        };
        Ok(command)
    }
}

fn number<T: std::str::FromStr>(arg: Option<&str>, verb: &'static str) -> Result<T, ParseError> {
    let arg = arg.ok_or(ParseError::MissingArgument(verb))?;
    arg.parse()
        .map_err(|_| ParseError::BadNumber(arg.to_string()))
}

// ---------------------------------------------------------------------------
// ConsoleApp
// ---------------------------------------------------------------------------

/// What the input loop should do after a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Continue(String),
    Quit,
}

pub struct ConsoleApp<S: PlaybackSink> {
    command_tx: mpsc::Sender<RecorderCommand>,
    state: SharedState,
    player: PlaybackController<S>,
    store: RecordingStore,
    /// The most recent artifact.  Its access handle is released when a newer
    /// one replaces it or the app shuts down.
    current: Option<RecordingArtifact>,
}

impl<S: PlaybackSink> ConsoleApp<S> {
    pub fn new(
        command_tx: mpsc::Sender<RecorderCommand>,
        state: SharedState,
        player: PlaybackController<S>,
        store: RecordingStore,
    ) -> Self {
        Self {
            command_tx,
            state,
            player,
            store,
            current: None,
        }
    }

    pub fn current(&self) -> Option<&RecordingArtifact> {
        self.current.as_ref()
    }

    pub fn player(&self) -> &PlaybackController<S> {
        &self.player
    }

    pub async fn execute(&mut self, command: UserCommand) -> Outcome {
        let reply = match command {
            UserCommand::Start => self.send(RecorderCommand::Start).await,
            UserCommand::Stop => self.send(RecorderCommand::Stop).await,
            UserCommand::Cancel => self.send(RecorderCommand::Cancel).await,
            UserCommand::Play => match self.player.play() {
                Ok(()) => "playing".to_string(),
                Err(e) => format!("playback: {e}"),
            },
            UserCommand::Pause => match self.player.pause() {
                Ok(()) => format!("paused at {:.1}s", self.player.current_position()),
                Err(e) => format!("playback: {e}"),
            },
            UserCommand::Seek(secs) => match self.player.seek(secs) {
                Ok(at) => format!("at {at:.1}s"),
                Err(e) => format!("playback: {e}"),
            },
            UserCommand::Volume(level) => match self.player.set_volume(level) {
                Ok(level) => format!("volume {level:.2}"),
                Err(e) => format!("playback: {e}"),
            },
            UserCommand::Save => self.save(),
            UserCommand::List => self.list(),
            UserCommand::Status => self.status(),
            UserCommand::Help => HELP.to_string(),
            UserCommand::Quit => return Outcome::Quit,
        };
        Outcome::Continue(reply)
    }

    /// React to a recorder update.  Returns a line to print, if any.
    pub fn on_update(&mut self, update: RecorderUpdate) -> Option<String> {
        match update {
            RecorderUpdate::State(SessionState::Error(kind)) => {
                let detail = self
                    .state
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .error_message
                    .clone();
                Some(match detail {
                    Some(detail) => format!("error: {} ({detail})", kind.label()),
                    None => format!("error: {}", kind.label()),
                })
            }
            RecorderUpdate::State(state) => Some(format!("state: {}", state.label())),
            RecorderUpdate::Ready(artifact) => Some(self.adopt(artifact)),
            RecorderUpdate::Rejected(e) => Some(format!("rejected: {e}")),
        }
    }

    /// Release everything the app still holds.
    pub fn shutdown(&mut self) {
        self.player.unbind();
        if let Some(previous) = self.current.take() {
            previous.release();
        }
    }

    async fn send(&self, command: RecorderCommand) -> String {
        match self.command_tx.send(command).await {
            Ok(()) => format!("{command:?} sent").to_lowercase(),
            Err(_) => "recorder is not running".to_string(),
        }
    }

    /// Bind a new artifact for playback and drop the previous one.
    fn adopt(&mut self, artifact: RecordingArtifact) -> String {
        let mut line = format!(
            "ready: {}s, {} bytes ({})",
            artifact.duration_secs(),
            artifact.data().len(),
            artifact.access_handle().locator()
        );
        if let Err(e) = self.player.bind(&artifact) {
            log::warn!("app: cannot play {}: {e}", artifact.access_handle().locator());
            line.push_str(&format!("; playback unavailable: {e}"));
        }
        if let Some(previous) = self.current.replace(artifact) {
            previous.release();
        }
        line
    }

    fn save(&self) -> String {
        let Some(artifact) = &self.current else {
            return "nothing to save".to_string();
        };
        match self.store.save(artifact) {
            Ok(saved) => format!("saved {}", saved.wav_path.display()),
            Err(e) => format!("save failed: {e}"),
        }
    }

    fn list(&self) -> String {
        match self.store.list() {
            Ok(saved) if saved.is_empty() => {
                format!("no recordings in {}", self.store.dir().display())
            }
            Ok(saved) => saved
                .iter()
                .map(|s| format!("{} ({}s)", s.wav_path.display(), s.duration_secs))
                .collect::<Vec<_>>()
                .join("\n"),
            Err(e) => format!("list failed: {e}"),
        }
    }

    fn status(&self) -> String {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let mut line = format!("session: {}", state.session.label());
        if let SessionState::Error(kind) = state.session {
            line.push_str(&format!(" ({})", kind.label()));
        }
        if state.is_recording() {
            line.push_str(&format!(
                ", {} fragments / {} bytes",
                state.fragment_count, state.captured_bytes
            ));
        }
        if let Some(rejection) = state.last_rejection {
            line.push_str(&format!(", last rejected: {rejection}"));
        }
        drop(state);

        match (self.player.bound_locator(), self.player.duration_secs()) {
            (Some(locator), Some(duration)) => line.push_str(&format!(
                "; player: {locator} {:.1}/{duration}s, volume {:.2}",
                self.player.current_position(),
                self.player.volume()
            )),
            _ => line.push_str("; player: empty"),
        }
        line
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
