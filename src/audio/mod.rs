//! Audio capture primitives: device seam, fragment aggregation and the
//! finished-recording artifact.
//!
//! # Pipeline
//!
//! ```text
//! InputDevice::acquire ─▶ DeviceHandle (cpal callback thread)
//!                           │ FragmentSink::deliver(bytes)
//!                           ▼
//!                    session event queue ─▶ ChunkAggregator::append
//!                                              │ freeze() on stop
//!                                              ▼
//!                    RecordingArtifact { data, AccessHandle, duration }
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tokio::sync::mpsc;
//! use voice_capture::audio::{
//!     CaptureConstraints, CaptureSession, CpalInputDevice, FragmentSink,
//! };
//!
//! # async fn example() {
//! let (tx, mut rx) = mpsc::unbounded_channel();
//! let mut capture = CaptureSession::new(Arc::new(CpalInputDevice::new()));
//! capture
//!     .acquire(CaptureConstraints::default(), FragmentSink::new(1, tx))
//!     .await
//!     .unwrap();
//!
//! while let Some(event) = rx.recv().await {
//!     println!("{:?}", event.kind);
//! }
//! # }
//! ```

pub mod aggregator;
pub mod artifact;
pub mod capture;
pub mod cpal_input;
pub mod device;
pub mod handle;
pub mod pcm;

#[cfg(test)]
mod scripted;

pub use aggregator::ChunkAggregator;
pub use artifact::{elapsed_whole_secs, RecordingArtifact};
pub use capture::CaptureSession;
pub use cpal_input::CpalInputDevice;
pub use device::{
    CaptureConstraints, CaptureError, DeviceClaim, DeviceEvent, DeviceEventKind, DeviceHandle,
    DeviceLock, FragmentSink, InputDevice, SampleEncoding, StreamFormat,
};
pub use handle::{AccessHandle, HandleRegistry};

// test-only re-export so the session tests can script a device without
// reaching into `audio::scripted`.
#[cfg(test)]
pub use scripted::ScriptedDevice;
