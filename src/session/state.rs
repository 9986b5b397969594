//! Session states, sequencing errors and the shared snapshot read by the UI.
//!
//! [`SessionState`] is the single source of truth for which operations are
//! legal.  The UI reads it via [`SharedState`] (to render controls and the
//! cosmetic "is recording" animation) and never keeps its own flag.

use std::sync::{Arc, Mutex};

use thiserror::Error;

use crate::audio::CaptureError;

// ---------------------------------------------------------------------------
// SessionErrorKind
// ---------------------------------------------------------------------------

/// Why a session ended up in [`SessionState::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionErrorKind {
    /// The user or OS refused device access.  Retry with `start`.
    PermissionDenied,
    /// No usable capture device.  Retry once one is available.
    DeviceUnavailable,
    /// The device failed mid-recording; partial audio was discarded.
    StreamInterrupted,
}

impl SessionErrorKind {
    pub fn label(&self) -> &'static str {
        match self {
            SessionErrorKind::PermissionDenied => "permission denied",
            SessionErrorKind::DeviceUnavailable => "device unavailable",
            SessionErrorKind::StreamInterrupted => "stream interrupted",
        }
    }
}

impl From<&CaptureError> for SessionErrorKind {
    fn from(err: &CaptureError) -> Self {
        match err {
            CaptureError::PermissionDenied(_) => SessionErrorKind::PermissionDenied,
            CaptureError::StreamInterrupted(_) => SessionErrorKind::StreamInterrupted,
            CaptureError::DeviceUnavailable(_) | CaptureError::AlreadyOpen => {
                SessionErrorKind::DeviceUnavailable
            }
        }
    }
}

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// States of the recording session.
///
/// ```text
/// Idle ──start──▶ Acquiring ──granted──▶ Recording ──stop──▶ Finalizing ──▶ Ready
///                   │   │                    │
///                   │   └─cancel──▶ Idle     └─device error──▶ Error(StreamInterrupted)
///                   └─denied/unavailable──▶ Error(PermissionDenied | DeviceUnavailable)
///
/// Ready / Error ──start──▶ Acquiring
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing recorded yet.
    Idle,
    /// Waiting for the platform to grant the input device.
    Acquiring,
    /// The device is open and fragments are being collected.
    Recording,
    /// Stop was processed; the artifact is being built.
    Finalizing,
    /// An artifact was handed out.  `start` begins a new session.
    Ready,
    /// A recoverable failure.  `start` retries.
    Error(SessionErrorKind),
}

impl SessionState {
    /// Returns `true` only while fragments are being collected.
    ///
    /// ```
    /// use voice_capture::session::SessionState;
    ///
    /// assert!(SessionState::Recording.is_recording());
    /// assert!(!SessionState::Acquiring.is_recording());
    /// assert!(!SessionState::Ready.is_recording());
    /// ```
    pub fn is_recording(&self) -> bool {
        matches!(self, SessionState::Recording)
    }

    /// Returns `true` while a session is in progress and `start` must be
    /// rejected.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SessionState::Acquiring | SessionState::Recording | SessionState::Finalizing
        )
    }

    /// A short human-readable label suitable for a status line.
    pub fn label(&self) -> &'static str {
        match self {
            SessionState::Idle => "Idle",
            SessionState::Acquiring => "Acquiring",
            SessionState::Recording => "Recording",
            SessionState::Finalizing => "Finalizing",
            SessionState::Ready => "Ready",
            SessionState::Error(_) => "Error",
        }
    }
}

impl Default for SessionState {
    fn default() -> Self {
        SessionState::Idle
    }
}

// ---------------------------------------------------------------------------
// SessionError
// ---------------------------------------------------------------------------

/// A call that is illegal in the current state.
///
/// These never change the state; they are reported back to the caller only.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("a recording session is already in progress")]
    AlreadyActive,

    #[error("not recording")]
    NotRecording,

    #[error("no device request is pending")]
    NotAcquiring,
}

// ---------------------------------------------------------------------------
// RecorderState
// ---------------------------------------------------------------------------

/// Snapshot of the recorder for the UI.
///
/// Held behind [`SharedState`].  The recorder mutates it; the UI reads it
/// whenever it redraws.  Finished artifacts are not kept here; they are
/// delivered once through the recorder's update channel.
#[derive(Debug, Default)]
pub struct RecorderState {
    /// Current session state.
    pub session: SessionState,

    /// Detail of the failure when `session` is `Error`.
    pub error_message: Option<String>,

    /// The most recent rejected call, cleared by the next accepted one.
    pub last_rejection: Option<SessionError>,

    /// Bytes collected so far in the current recording.
    pub captured_bytes: usize,

    /// Fragments collected so far in the current recording.
    pub fragment_count: usize,
}

impl RecorderState {
    /// Drives the cosmetic recording indicator.
    pub fn is_recording(&self) -> bool {
        self.session.is_recording()
    }
}

/// Thread-safe handle to [`RecorderState`].
///
/// Cheap to clone (`Arc` clone).  Lock for a short critical section; do
/// **not** hold the lock across `.await` points.
pub type SharedState = Arc<Mutex<RecorderState>>;

/// Construct a new [`SharedState`] in the `Idle` state.
pub fn new_shared_state() -> SharedState {
    Arc::new(Mutex::new(RecorderState::default()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_recording_is_recording() {
        assert!(SessionState::Recording.is_recording());
        for state in [
            SessionState::Idle,
            SessionState::Acquiring,
            SessionState::Finalizing,
            SessionState::Ready,
            SessionState::Error(SessionErrorKind::PermissionDenied),
        ] {
            assert!(!state.is_recording(), "{state:?}");
        }
    }

    #[test]
    fn active_states_block_start() {
        assert!(SessionState::Acquiring.is_active());
        assert!(SessionState::Recording.is_active());
        assert!(SessionState::Finalizing.is_active());

        assert!(!SessionState::Idle.is_active());
        assert!(!SessionState::Ready.is_active());
        assert!(!SessionState::Error(SessionErrorKind::StreamInterrupted).is_active());
    }

    #[test]
    fn labels() {
        assert_eq!(SessionState::Idle.label(), "Idle");
        assert_eq!(SessionState::Finalizing.label(), "Finalizing");
        assert_eq!(
            SessionState::Error(SessionErrorKind::DeviceUnavailable).label(),
            "Error"
        );
        assert_eq!(SessionErrorKind::StreamInterrupted.label(), "stream interrupted");
    }

    #[test]
    fn default_state_is_idle() {
        assert_eq!(SessionState::default(), SessionState::Idle);
    }

    #[test]
    fn capture_errors_map_to_kinds() {
        assert_eq!(
            SessionErrorKind::from(&CaptureError::PermissionDenied("x".into())),
            SessionErrorKind::PermissionDenied
        );
        assert_eq!(
            SessionErrorKind::from(&CaptureError::DeviceUnavailable("x".into())),
            SessionErrorKind::DeviceUnavailable
        );
        assert_eq!(
            SessionErrorKind::from(&CaptureError::StreamInterrupted("x".into())),
            SessionErrorKind::StreamInterrupted
        );
    }

    #[test]
    fn session_error_messages() {
        assert_eq!(SessionError::NotRecording.to_string(), "not recording");
        assert_eq!(
            SessionError::AlreadyActive.to_string(),
            "a recording session is already in progress"
        );
    }

    #[test]
    fn shared_state_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SharedState>();
    }

    #[test]
    fn shared_state_can_be_cloned_and_mutated() {
        let state = new_shared_state();
        let state2 = Arc::clone(&state);

        state.lock().unwrap().session = SessionState::Recording;
        assert!(state2.lock().unwrap().is_recording());
    }
}
