//! Recording session: state machine, event queue and the UI snapshot.
//!
//! # Architecture
//!
//! ```text
//! RecorderCommand (mpsc)          DeviceEvent (FragmentSink)
//!        │                                │
//!        └──────────▶ Recorder::run() ◀───┘   ← async tokio task
//!                          │
//!                          ▼
//!                 SessionStateMachine
//!                   ├─ CaptureSession   (device handle)
//!                   ├─ ChunkAggregator  (fragments)
//!                   └─ HandleRegistry   (artifact access handles)
//!                          │
//!        ┌─────────────────┴──────────────────┐
//!        ▼                                    ▼
//! SharedState (Arc<Mutex<RecorderState>>)   RecorderUpdate (mpsc)
//!   read by the UI on redraw                  State / Ready(artifact) / Rejected
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tokio::sync::mpsc;
//! use voice_capture::audio::{CaptureConstraints, CpalInputDevice, HandleRegistry};
//! use voice_capture::session::{
//!     new_shared_state, Recorder, RecorderCommand, RecorderUpdate, SystemClock,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let shared_state = new_shared_state();
//!     let (command_tx, command_rx) = mpsc::channel(16);
//!     let (update_tx, mut update_rx) = mpsc::unbounded_channel();
//!
//!     let recorder = Recorder::new(
//!         Arc::new(CpalInputDevice::new()),
//!         CaptureConstraints::default(),
//!         Arc::new(SystemClock),
//!         HandleRegistry::new(),
//!         shared_state.clone(),
//!         update_tx,
//!     );
//!     tokio::spawn(recorder.run(command_rx));
//!
//!     command_tx.send(RecorderCommand::Start).await.unwrap();
//!     // ... later
//!     command_tx.send(RecorderCommand::Stop).await.unwrap();
//!
//!     while let Some(update) = update_rx.recv().await {
//!         if let RecorderUpdate::Ready(artifact) = update {
//!             println!("{} bytes, {}s", artifact.data().len(), artifact.duration_secs());
//!             break;
//!         }
//!     }
//! }
//! ```

pub mod clock;
pub mod machine;
pub mod runner;
pub mod state;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use clock::{Clock, SystemClock};
#[cfg(test)]
pub use clock::ManualClock;
pub use machine::SessionStateMachine;
pub use runner::{Recorder, RecorderCommand, RecorderUpdate};
pub use state::{
    new_shared_state, RecorderState, SessionError, SessionErrorKind, SessionState, SharedState,
};
