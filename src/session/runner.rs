//! Recorder: the single event queue in front of the session state machine.
//!
//! [`Recorder`] owns the [`SessionStateMachine`] and dispatches, one at a
//! time, everything that can change it:
//!
//! ```text
//! device events (FragmentSink, unbounded) ─┐
//! device request resolution ───────────────┼─▶ select! ─▶ SessionStateMachine
//! RecorderCommand (UI, mpsc) ──────────────┘                │
//!                                                           ├─▶ SharedState snapshot
//!                                                           └─▶ RecorderUpdate (UI)
//! ```
//!
//! Device events are polled first, so fragments that were already delivered
//! when a `Stop` arrives are still included in the artifact.  Finished
//! artifacts leave through [`RecorderUpdate::Ready`]; the recorder keeps no
//! copy.

use std::sync::{Arc, MutexGuard, PoisonError};

use tokio::sync::mpsc;

use crate::audio::{CaptureConstraints, DeviceEvent, HandleRegistry, InputDevice, RecordingArtifact};

use super::clock::Clock;
use super::machine::SessionStateMachine;
use super::state::{RecorderState, SessionError, SessionState, SharedState};

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// Commands sent from the UI to the recorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderCommand {
    /// Begin a new recording session.
    Start,
    /// Finish the current recording and emit an artifact.
    Stop,
    /// Abandon a device request that has not been granted yet.
    Cancel,
}

/// Progress delivered from the recorder to the UI.
#[derive(Debug, Clone)]
pub enum RecorderUpdate {
    /// The session moved to a new state.
    State(SessionState),
    /// A recording finished.  Ownership of the artifact passes to the
    /// receiver.
    Ready(RecordingArtifact),
    /// A command was illegal in the current state and was ignored.
    Rejected(SessionError),
}

// ---------------------------------------------------------------------------
// Recorder
// ---------------------------------------------------------------------------

/// Drives a [`SessionStateMachine`] from a command channel.
///
/// Create with [`Recorder::new`], then call [`run`](Self::run) inside a tokio
/// task.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use tokio::sync::mpsc;
/// use voice_capture::audio::{CaptureConstraints, CpalInputDevice, HandleRegistry};
/// use voice_capture::session::{new_shared_state, Recorder, RecorderCommand, SystemClock};
///
/// # async fn example() {
/// let (command_tx, command_rx) = mpsc::channel(16);
/// let (update_tx, mut update_rx) = mpsc::unbounded_channel();
/// let recorder = Recorder::new(
///     Arc::new(CpalInputDevice::new()),
///     CaptureConstraints::default(),
///     Arc::new(SystemClock),
///     HandleRegistry::new(),
///     new_shared_state(),
///     update_tx,
/// );
/// tokio::spawn(recorder.run(command_rx));
///
/// command_tx.send(RecorderCommand::Start).await.unwrap();
/// while let Some(update) = update_rx.recv().await {
///     println!("{update:?}");
/// }
/// # }
/// ```
pub struct Recorder {
    machine: SessionStateMachine,
    events_rx: mpsc::UnboundedReceiver<DeviceEvent>,
    state: SharedState,
    updates: mpsc::UnboundedSender<RecorderUpdate>,
    published: SessionState,
}

impl Recorder {
    /// Create a recorder.
    ///
    /// # Arguments
    ///
    /// * `device`:       input device acquired on every `Start`.
    /// * `constraints`:  requested capture mode.
    /// * `clock`:        time source for artifact durations.
    /// * `registry`:     allocator for artifact access handles.
    /// * `state`:        snapshot shared with the UI.
    /// * `updates`:      channel for state changes and finished artifacts.
    pub fn new(
        device: Arc<dyn InputDevice>,
        constraints: CaptureConstraints,
        clock: Arc<dyn Clock>,
        registry: HandleRegistry,
        state: SharedState,
        updates: mpsc::UnboundedSender<RecorderUpdate>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let machine = SessionStateMachine::new(device, constraints, clock, registry, events_tx);
        Self {
            machine,
            events_rx,
            state,
            updates,
            published: SessionState::Idle,
        }
    }

    // -----------------------------------------------------------------------
    // Main async loop
    // -----------------------------------------------------------------------

    /// Run until `commands` is closed, then release the device.
    pub async fn run(mut self, mut commands: mpsc::Receiver<RecorderCommand>) {
        loop {
            tokio::select! {
                biased;

                Some(event) = self.events_rx.recv() => {
                    self.handle_device_event(event);
                }

                _ = self.machine.acquisition() => {
                    self.publish();
                }

                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
            }
        }

        self.machine.shutdown();
        log::info!("recorder: command channel closed, shutting down");
    }

    // -----------------------------------------------------------------------
    // Event handlers
    // -----------------------------------------------------------------------

    fn handle_command(&mut self, command: RecorderCommand) {
        log::debug!("recorder: {command:?} while {}", self.machine.state().label());

        let result = match command {
            RecorderCommand::Start => self.machine.start(),
            RecorderCommand::Cancel => self.machine.cancel(),
            RecorderCommand::Stop => match self.machine.stop() {
                Ok(artifact) => {
                    self.publish();
                    let _ = self.updates.send(RecorderUpdate::Ready(artifact));
                    Ok(())
                }
                Err(e) => Err(e),
            },
        };

        match result {
            Ok(()) => {
                self.lock_state().last_rejection = None;
                self.publish();
            }
            Err(e) => {
                log::debug!("recorder: {command:?} rejected: {e}");
                self.lock_state().last_rejection = Some(e);
                let _ = self.updates.send(RecorderUpdate::Rejected(e));
            }
        }
    }

    fn handle_device_event(&mut self, event: DeviceEvent) {
        if self.machine.on_device_event(event) {
            self.publish();
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn lock_state(&self) -> MutexGuard<'_, RecorderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy the machine's state into the shared snapshot and announce a
    /// state change, if any.
    fn publish(&mut self) {
        let current = self.machine.state();
        {
            let mut st = self.lock_state();
            st.session = current;
            st.error_message = self.machine.last_failure().map(str::to_owned);
            st.captured_bytes = self.machine.captured_bytes();
            st.fragment_count = self.machine.fragment_count();
        }

        if current != self.published {
            self.published = current;
            let _ = self.updates.send(RecorderUpdate::State(current));
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
