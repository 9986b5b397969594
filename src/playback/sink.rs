//! Playback sink seam and the silent in-memory sink.

use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;

use crate::audio::{SampleEncoding, StreamFormat};
use crate::session::Clock;

// ---------------------------------------------------------------------------
// PlaybackError
// ---------------------------------------------------------------------------

/// Failures local to playback.  They never reach the recording session.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PlaybackError {
    #[error("no recording is bound to the player")]
    NothingBound,

    #[error("access handle {0} has been released")]
    HandleRevoked(String),

    #[error("recording cannot be played: {0}")]
    Unreadable(String),

    #[error("playback device error: {0}")]
    Sink(String),

    #[error("invalid volume level {0}")]
    InvalidVolume(f32),
}

// ---------------------------------------------------------------------------
// PlaybackSink
// ---------------------------------------------------------------------------

/// Something that can render recorded bytes.
///
/// Positions are in seconds from the start of the loaded buffer.
pub trait PlaybackSink: Send {
    /// Prepare `data` for playback, replacing anything loaded before.
    fn load(&mut self, data: Arc<[u8]>, format: StreamFormat) -> Result<(), PlaybackError>;

    /// Drop everything derived from the loaded buffer.
    fn unload(&mut self);

    fn play(&mut self) -> Result<(), PlaybackError>;

    fn pause(&mut self);

    fn seek(&mut self, position_secs: f64) -> Result<(), PlaybackError>;

    fn position_secs(&self) -> f64;

    /// `level` is already clamped to `0.0..=1.0` by the controller.
    fn set_volume(&mut self, level: f32);
}

/// Reject buffers that cannot be 16-bit PCM.
pub(crate) fn check_readable(data: &[u8], format: &StreamFormat) -> Result<(), PlaybackError> {
    match format.encoding {
        SampleEncoding::Pcm16Le => match format.frame_bytes() {
            Some(frame) if frame > 0 && format.sample_rate > 0 => {
                if data.len() % frame != 0 {
                    return Err(PlaybackError::Unreadable(format!(
                        "{} bytes is not a whole number of {frame}-byte frames",
                        data.len()
                    )));
                }
                Ok(())
            }
            _ => Err(PlaybackError::Unreadable(format!(
                "invalid stream format {} Hz / {} ch",
                format.sample_rate, format.channels
            ))),
        },
        SampleEncoding::Opaque => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// MemorySink
// ---------------------------------------------------------------------------

/// Sink that renders nothing and advances its position with a [`Clock`].
///
/// Used for headless operation and tests.  Opaque buffers have no known
/// length, so their position is not capped.
pub struct MemorySink {
    clock: Arc<dyn Clock>,
    /// Buffer length in seconds; `None` for opaque data.
    length_secs: Option<f64>,
    is_loaded: bool,
    /// Position at the moment playback last started or paused.
    anchor_secs: f64,
    playing_since: Option<Instant>,
    volume: f32,
}

impl MemorySink {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            length_secs: None,
            is_loaded: false,
            anchor_secs: 0.0,
            playing_since: None,
            volume: 1.0,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.is_loaded
    }

    pub fn is_playing(&self) -> bool {
        self.playing_since.is_some() && !self.at_end()
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    fn at_end(&self) -> bool {
        self.length_secs
            .is_some_and(|len| self.raw_position() >= len)
    }

    fn raw_position(&self) -> f64 {
        match self.playing_since {
            Some(since) => {
                self.anchor_secs
                    + self.clock.now().saturating_duration_since(since).as_secs_f64()
            }
            None => self.anchor_secs,
        }
    }
}

impl PlaybackSink for MemorySink {
    fn load(&mut self, data: Arc<[u8]>, format: StreamFormat) -> Result<(), PlaybackError> {
        check_readable(&data, &format)?;
        self.length_secs = format.seconds_for(data.len());
        self.is_loaded = true;
        self.anchor_secs = 0.0;
        self.playing_since = None;
        Ok(())
    }

    fn unload(&mut self) {
        self.length_secs = None;
        self.is_loaded = false;
        self.anchor_secs = 0.0;
        self.playing_since = None;
    }

    fn play(&mut self) -> Result<(), PlaybackError> {
        if !self.is_loaded {
            return Err(PlaybackError::NothingBound);
        }
        // Like a speaker sink, play from the end starts over.
        if self.at_end() {
            self.anchor_secs = 0.0;
            self.playing_since = None;
        }
        if self.playing_since.is_none() {
            self.playing_since = Some(self.clock.now());
        }
        Ok(())
    }

    fn pause(&mut self) {
        self.anchor_secs = self.position_secs();
        self.playing_since = None;
    }

    fn seek(&mut self, position_secs: f64) -> Result<(), PlaybackError> {
        if !self.is_loaded {
            return Err(PlaybackError::NothingBound);
        }
        self.anchor_secs = match self.length_secs {
            Some(len) => position_secs.min(len),
            None => position_secs,
        };
        if self.playing_since.is_some() {
            self.playing_since = Some(self.clock.now());
        }
        Ok(())
    }

    fn position_secs(&self) -> f64 {
        let raw = self.raw_position();
        match self.length_secs {
            Some(len) => raw.min(len),
            None => raw,
        }
    }

    fn set_volume(&mut self, level: f32) {
        self.volume = level;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ManualClock;
    use std::time::Duration;

    fn one_second_pcm() -> Arc<[u8]> {
        Arc::from(vec![0u8; 32_000])
    }

    #[test]
    fn position_advances_only_while_playing() {
        let clock = ManualClock::new();
        let mut sink = MemorySink::new(Arc::new(clock.clone()));
        sink.load(one_second_pcm(), StreamFormat::pcm16(16_000, 1))
            .unwrap();

        clock.advance(Duration::from_millis(300));
        assert_eq!(sink.position_secs(), 0.0);

        sink.play().unwrap();
        clock.advance(Duration::from_millis(250));
        assert!((sink.position_secs() - 0.25).abs() < 1e-9);

        sink.pause();
        clock.advance(Duration::from_secs(1));
        assert!((sink.position_secs() - 0.25).abs() < 1e-9);
    }

    #[test]
    fn position_stops_at_end_of_buffer() {
        let clock = ManualClock::new();
        let mut sink = MemorySink::new(Arc::new(clock.clone()));
        sink.load(one_second_pcm(), StreamFormat::pcm16(16_000, 1))
            .unwrap();
        sink.play().unwrap();
        clock.advance(Duration::from_secs(3));

        assert_eq!(sink.position_secs(), 1.0);
        assert!(!sink.is_playing());
    }

    #[test]
    fn play_after_the_end_starts_over() {
        let clock = ManualClock::new();
        let mut sink = MemorySink::new(Arc::new(clock.clone()));
        sink.load(one_second_pcm(), StreamFormat::pcm16(16_000, 1))
            .unwrap();
        sink.play().unwrap();
        clock.advance(Duration::from_secs(2));
        assert_eq!(sink.position_secs(), 1.0);

        sink.play().unwrap();
        assert_eq!(sink.position_secs(), 0.0);
        clock.advance(Duration::from_millis(400));
        assert!((sink.position_secs() - 0.4).abs() < 1e-9);
        assert!(sink.is_playing());
    }

    #[test]
    fn odd_pcm_buffer_is_unreadable() {
        let mut sink = MemorySink::new(Arc::new(ManualClock::new()));
        let err = sink
            .load(Arc::from(vec![0u8; 3]), StreamFormat::pcm16(16_000, 1))
            .unwrap_err();

        assert!(matches!(err, PlaybackError::Unreadable(_)));
        assert!(!sink.is_loaded());
    }

    #[test]
    fn zero_rate_format_is_unreadable() {
        let err = check_readable(&[0, 0], &StreamFormat::pcm16(0, 1)).unwrap_err();
        assert!(matches!(err, PlaybackError::Unreadable(_)));
    }

    #[test]
    fn play_without_load_fails() {
        let mut sink = MemorySink::new(Arc::new(ManualClock::new()));
        assert_eq!(sink.play(), Err(PlaybackError::NothingBound));
    }

    #[test]
    fn unload_resets_position() {
        let clock = ManualClock::new();
        let mut sink = MemorySink::new(Arc::new(clock.clone()));
        sink.load(one_second_pcm(), StreamFormat::pcm16(16_000, 1))
            .unwrap();
        sink.seek(0.5).unwrap();
        sink.unload();

        assert_eq!(sink.position_secs(), 0.0);
        assert!(!sink.is_loaded());
    }
}
