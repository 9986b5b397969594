//! Persistence of finished recordings.
//!
//! The recording core never writes to disk.  The front-end hands an artifact
//! to [`RecordingStore::save`] when the user asks to keep it.

pub mod store;

pub use store::{RecordingStore, SavedRecording, StoreError};
