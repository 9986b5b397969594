//! The immutable value produced when a recording session finishes.

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use super::device::StreamFormat;
use super::handle::{AccessHandle, HandleRegistry};

// ---------------------------------------------------------------------------
// RecordingArtifact
// ---------------------------------------------------------------------------

/// A finished recording.
///
/// The artifact is immutable: its bytes are shared behind an `Arc` and never
/// written again, so clones can be handed to the UI, a playback controller
/// and the store at the same time.  The [`AccessHandle`] is the revocable
/// part; whoever holds the artifact decides when to release it.
#[derive(Debug, Clone)]
pub struct RecordingArtifact {
    data: Arc<[u8]>,
    access_handle: AccessHandle,
    duration_secs: u64,
    created_at: SystemTime,
    format: StreamFormat,
}

impl RecordingArtifact {
    /// Freeze `data` into an artifact and allocate a fresh access handle for
    /// it from `registry`.
    pub fn new(
        data: Vec<u8>,
        duration_secs: u64,
        format: StreamFormat,
        registry: &HandleRegistry,
    ) -> Self {
        let data: Arc<[u8]> = Arc::from(data);
        let access_handle = registry.allocate(Arc::clone(&data));
        Self {
            data,
            access_handle,
            duration_secs,
            created_at: SystemTime::now(),
            format,
        }
    }

    /// The recorded bytes.  May be empty.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn access_handle(&self) -> &AccessHandle {
        &self.access_handle
    }

    /// Whole seconds between entering `Recording` and the stop request.
    pub fn duration_secs(&self) -> u64 {
        self.duration_secs
    }

    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    /// Milliseconds since the Unix epoch at construction.
    pub fn created_at_unix_ms(&self) -> u64 {
        self.created_at
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_millis() as u64
    }

    pub fn format(&self) -> StreamFormat {
        self.format
    }

    /// Returns `true` when no audio bytes were captured.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Release the access handle.  Safe to call more than once.
    pub fn release(&self) -> bool {
        self.access_handle.release()
    }
}

/// Elapsed time between `start` and `stop`, floored to whole seconds.
///
/// A `stop` earlier than `start` counts as zero.
pub fn elapsed_whole_secs(start: Instant, stop: Instant) -> u64 {
    stop.saturating_duration_since(start).as_secs()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
