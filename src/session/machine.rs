//! The recording session state machine.
//!
//! [`SessionStateMachine`] owns the [`CaptureSession`] and the
//! [`ChunkAggregator`] and is the only thing that mutates them.  UI calls,
//! device events and device-request resolutions each go through one
//! `&mut self` method, so callers that dispatch from a single queue get
//! serialized transitions.
//!
//! Device events are tagged with the generation of the session they were
//! produced for.  Events from an older generation, or arriving when the
//! machine is not `Recording`, are dropped rather than queued.  The one
//! exception is a failure reported while `Acquiring`: it is held until the
//! grant is applied, which then lands in `Error(StreamInterrupted)`.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;

use crate::audio::{
    elapsed_whole_secs, CaptureConstraints, CaptureError, CaptureSession, ChunkAggregator,
    DeviceEvent, DeviceEventKind, FragmentSink, HandleRegistry, InputDevice, RecordingArtifact,
    StreamFormat,
};

use super::clock::Clock;
use super::state::{SessionError, SessionErrorKind, SessionState};

/// Bookkeeping for the recording in progress.
#[derive(Debug, Clone, Copy)]
struct ActiveRecording {
    started_at: Instant,
    format: StreamFormat,
}

// ---------------------------------------------------------------------------
// SessionStateMachine
// ---------------------------------------------------------------------------

pub struct SessionStateMachine {
    state: SessionState,
    capture: CaptureSession,
    aggregator: ChunkAggregator,
    registry: HandleRegistry,
    clock: Arc<dyn Clock>,
    constraints: CaptureConstraints,
    events_tx: mpsc::UnboundedSender<DeviceEvent>,
    generation: u64,
    active: Option<ActiveRecording>,
    last_failure: Option<String>,
    /// Stream failure reported before the grant was applied.
    pending_failure: Option<String>,
}

impl SessionStateMachine {
    /// Create a machine in the `Idle` state.
    ///
    /// * `device`:       input device to acquire on `start`.
    /// * `constraints`:  capture mode requested on every acquisition.
    /// * `clock`:        time source for recording durations.
    /// * `registry`:     allocator for artifact access handles.
    /// * `events_tx`:    queue the device pushes fragments and failures into;
    ///   the owner feeds them back through [`on_device_event`](Self::on_device_event).
    pub fn new(
        device: Arc<dyn InputDevice>,
        constraints: CaptureConstraints,
        clock: Arc<dyn Clock>,
        registry: HandleRegistry,
        events_tx: mpsc::UnboundedSender<DeviceEvent>,
    ) -> Self {
        Self {
            state: SessionState::Idle,
            capture: CaptureSession::new(device),
            aggregator: ChunkAggregator::new(),
            registry,
            clock,
            constraints,
            events_tx,
            generation: 0,
            active: None,
            last_failure: None,
            pending_failure: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        self.state.is_recording()
    }

    /// Number of the current (or most recent) session.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Detail of the failure that put the machine in `Error`.
    pub fn last_failure(&self) -> Option<&str> {
        self.last_failure.as_deref()
    }

    pub fn captured_bytes(&self) -> usize {
        self.aggregator.byte_len()
    }

    pub fn fragment_count(&self) -> usize {
        self.aggregator.fragment_count()
    }

    /// Returns `true` while an input device handle is open.
    pub fn device_open(&self) -> bool {
        self.capture.is_open()
    }

    // -----------------------------------------------------------------------
    // Start / acquisition
    // -----------------------------------------------------------------------

    /// Begin a new session: `Idle | Ready | Error → Acquiring`.
    ///
    /// The device request is only started here; drive it to completion with
    /// [`acquisition`](Self::acquisition).
    ///
    /// # Errors
    ///
    /// [`SessionError::AlreadyActive`] while `Acquiring`, `Recording` or
    /// `Finalizing`.  Nothing is touched in that case.
    pub fn start(&mut self) -> Result<(), SessionError> {
        if self.state.is_active() {
            log::debug!("session: start rejected while {}", self.state.label());
            return Err(SessionError::AlreadyActive);
        }

        let generation = self.generation + 1;
        let sink = FragmentSink::new(generation, self.events_tx.clone());
        if let Err(e) = self.capture.request(self.constraints.clone(), sink) {
            log::warn!("session: device still held while {}: {e}", self.state.label());
            return Err(SessionError::AlreadyActive);
        }

        log::info!("session {generation}: {} → Acquiring", self.state.label());
        self.generation = generation;
        self.last_failure = None;
        self.pending_failure = None;
        self.state = SessionState::Acquiring;
        Ok(())
    }

    /// Wait for the pending device request and apply its outcome:
    /// `Acquiring → Recording` or `Acquiring → Error`.
    ///
    /// Never completes when no request is pending, so it can sit in a
    /// `select!` next to the event queue.  Cancel-safe.
    pub async fn acquisition(&mut self) -> SessionState {
        let result = self.capture.granted().await;
        self.apply_acquisition(result);
        self.state
    }

    fn apply_acquisition(&mut self, result: Result<StreamFormat, CaptureError>) {
        if self.state != SessionState::Acquiring {
            log::warn!(
                "session {}: device answered while {}, releasing",
                self.generation,
                self.state.label()
            );
            self.capture.release();
            return;
        }

        match (result, self.pending_failure.take()) {
            (Ok(_), Some(reason)) => {
                self.capture.release();
                self.aggregator.discard();
                self.active = None;
                log::warn!(
                    "session {}: Acquiring → Error (stream failed before grant: {reason})",
                    self.generation
                );
                self.last_failure = Some(CaptureError::StreamInterrupted(reason).to_string());
                self.state = SessionState::Error(SessionErrorKind::StreamInterrupted);
            }
            (Ok(format), None) => {
                self.aggregator.discard();
                self.active = Some(ActiveRecording {
                    started_at: self.clock.now(),
                    format,
                });
                self.state = SessionState::Recording;
                log::info!(
                    "session {}: Acquiring → Recording ({} Hz, {} ch)",
                    self.generation,
                    format.sample_rate,
                    format.channels
                );
            }
            (Err(e), _) => {
                let kind = SessionErrorKind::from(&e);
                self.capture.release();
                self.last_failure = Some(e.to_string());
                self.state = SessionState::Error(kind);
                log::warn!("session {}: Acquiring → Error ({e})", self.generation);
            }
        }
    }

    /// Abandon a pending device request: `Acquiring → Idle`.
    ///
    /// # Errors
    ///
    /// [`SessionError::NotAcquiring`] in any other state.
    pub fn cancel(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Acquiring {
            log::debug!("session: cancel rejected while {}", self.state.label());
            return Err(SessionError::NotAcquiring);
        }

        self.capture.abandon();
        self.capture.release();
        self.pending_failure = None;
        self.state = SessionState::Idle;
        log::info!("session {}: Acquiring → Idle (cancelled)", self.generation);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Device events
    // -----------------------------------------------------------------------

    /// Apply one event pushed by the device.
    ///
    /// Returns `true` when the event was accepted, `false` when it was
    /// dropped (stale generation or not recording).  A failure for the
    /// current generation that arrives while `Acquiring` is accepted and held
    /// until the grant is applied.
    pub fn on_device_event(&mut self, event: DeviceEvent) -> bool {
        if event.generation == self.generation && self.state == SessionState::Acquiring {
            if let DeviceEventKind::Failed(reason) = event.kind {
                log::warn!(
                    "session {}: stream failed while acquiring: {reason}",
                    self.generation
                );
                self.pending_failure.get_or_insert(reason);
                return true;
            }
        }

        if event.generation != self.generation || self.state != SessionState::Recording {
            log::debug!(
                "session {}: dropping device event from generation {} while {}",
                self.generation,
                event.generation,
                self.state.label()
            );
            return false;
        }

        match event.kind {
            DeviceEventKind::Fragment(bytes) => self.aggregator.append(bytes),
            DeviceEventKind::Failed(reason) => self.interrupt(reason),
        }
        true
    }

    /// `Recording → Error(StreamInterrupted)`: release the device and throw
    /// away the partial recording.
    fn interrupt(&mut self, reason: String) {
        self.capture.release();
        self.aggregator.discard();
        self.active = None;
        log::warn!(
            "session {}: Recording → Error (stream interrupted: {reason})",
            self.generation
        );
        self.last_failure = Some(CaptureError::StreamInterrupted(reason).to_string());
        self.state = SessionState::Error(SessionErrorKind::StreamInterrupted);
    }

    // -----------------------------------------------------------------------
    // Stop
    // -----------------------------------------------------------------------

    /// `Recording → Finalizing → Ready`, returning the finished artifact.
    ///
    /// The device is closed before the aggregator is frozen, so the artifact
    /// holds exactly the fragments applied before this call.  The machine
    /// keeps no reference to the returned artifact.
    ///
    /// # Errors
    ///
    /// [`SessionError::NotRecording`] in any state other than `Recording`.
    pub fn stop(&mut self) -> Result<RecordingArtifact, SessionError> {
        let stopped_at = self.clock.now();

        let active = match (self.state, self.active.take()) {
            (SessionState::Recording, Some(active)) => active,
            (_, active) => {
                self.active = active;
                log::debug!("session: stop rejected while {}", self.state.label());
                return Err(SessionError::NotRecording);
            }
        };

        self.state = SessionState::Finalizing;
        self.capture.release();

        let data = self.aggregator.freeze();
        let duration_secs = elapsed_whole_secs(active.started_at, stopped_at);
        let artifact = RecordingArtifact::new(data, duration_secs, active.format, &self.registry);

        self.state = SessionState::Ready;
        log::info!(
            "session {}: Recording → Ready ({} bytes, {}s, {})",
            self.generation,
            artifact.data().len(),
            duration_secs,
            artifact.access_handle().locator()
        );
        Ok(artifact)
    }

    /// Release the device and drop any partial recording.  Used on
    /// shutdown; the state is left as is.
    pub fn shutdown(&mut self) {
        self.capture.release();
        self.aggregator.discard();
        self.active = None;
        self.pending_failure = None;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
