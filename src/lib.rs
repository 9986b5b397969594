//! Audio recording core for a voice-note dashboard.
//!
//! * [`audio`]:     device seam, fragment aggregation, artifacts and access handles.
//! * [`session`]:   the recording state machine and its event loop.
//! * [`playback`]:  transport controls over a finished recording.
//! * [`storage`]:   WAV export with JSON metadata.
//! * [`config`]:    `settings.toml` and platform paths.
//! * [`app`]:       the terminal front-end used by the binary.

pub mod app;
pub mod audio;
pub mod config;
pub mod playback;
pub mod session;
pub mod storage;
