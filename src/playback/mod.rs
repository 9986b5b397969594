//! Playback of finished recordings.
//!
//! [`PlaybackController`] owns a [`PlaybackSink`] and at most one bound
//! artifact.  Playback failures stay here; they never change the recording
//! session's state.
//!
//! ```rust
//! use std::sync::Arc;
//! use voice_capture::audio::{HandleRegistry, RecordingArtifact, StreamFormat};
//! use voice_capture::playback::{MemorySink, PlaybackController};
//! use voice_capture::session::SystemClock;
//!
//! let registry = HandleRegistry::new();
//! let artifact = RecordingArtifact::new(
//!     vec![0u8; 64_000],
//!     2,
//!     StreamFormat::pcm16(16_000, 1),
//!     &registry,
//! );
//!
//! let mut player = PlaybackController::new(MemorySink::new(Arc::new(SystemClock)));
//! player.bind(&artifact).unwrap();
//! assert_eq!(player.seek(10.0).unwrap(), 2.0);
//! ```

pub mod controller;
pub mod cpal_output;
pub mod sink;

pub use controller::PlaybackController;
pub use cpal_output::CpalPlaybackSink;
pub use sink::{MemorySink, PlaybackError, PlaybackSink};
