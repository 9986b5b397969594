//! Transport controls over one bound recording.

use super::sink::{PlaybackError, PlaybackSink};
use crate::audio::{AccessHandle, RecordingArtifact};

struct Binding {
    handle: AccessHandle,
    duration_secs: u64,
}

/// Binds at most one [`RecordingArtifact`] to a [`PlaybackSink`].
///
/// The controller borrows the artifact's access handle but never releases
/// it; rebinding or unbinding only unloads what the sink derived from the
/// bytes.  A handle released elsewhere makes later transport calls fail with
/// [`PlaybackError::HandleRevoked`].
pub struct PlaybackController<S: PlaybackSink> {
    sink: S,
    binding: Option<Binding>,
    volume: f32,
}

impl<S: PlaybackSink> PlaybackController<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            binding: None,
            volume: 1.0,
        }
    }

    /// Load `artifact` into the sink, replacing any previous binding.
    pub fn bind(&mut self, artifact: &RecordingArtifact) -> Result<(), PlaybackError> {
        self.unbind();

        let handle = artifact.access_handle().clone();
        let data = handle
            .resolve()
            .ok_or_else(|| PlaybackError::HandleRevoked(handle.locator()))?;
        self.sink.load(data, artifact.format())?;
        self.sink.set_volume(self.volume);

        log::info!(
            "playback: bound {} ({}s)",
            handle.locator(),
            artifact.duration_secs()
        );
        self.binding = Some(Binding {
            handle,
            duration_secs: artifact.duration_secs(),
        });
        Ok(())
    }

    /// Stop playback and drop the sink's copy of the bound recording.
    pub fn unbind(&mut self) {
        if let Some(binding) = self.binding.take() {
            self.sink.pause();
            self.sink.unload();
            log::debug!("playback: unbound {}", binding.handle.locator());
        }
    }

    pub fn is_bound(&self) -> bool {
        self.binding.is_some()
    }

    /// Locator of the bound artifact's access handle.
    pub fn bound_locator(&self) -> Option<String> {
        self.binding.as_ref().map(|b| b.handle.locator())
    }

    /// Duration of the bound recording in whole seconds.
    pub fn duration_secs(&self) -> Option<u64> {
        self.binding.as_ref().map(|b| b.duration_secs)
    }

    pub fn play(&mut self) -> Result<(), PlaybackError> {
        self.live_binding()?;
        self.sink.play()
    }

    pub fn pause(&mut self) -> Result<(), PlaybackError> {
        self.live_binding()?;
        self.sink.pause();
        Ok(())
    }

    /// Move to `second`, clamped to `[0, duration_secs]`.  Returns the
    /// position actually applied.
    pub fn seek(&mut self, second: f64) -> Result<f64, PlaybackError> {
        let end = self.live_binding()?.duration_secs as f64;
        let target = if second.is_nan() {
            0.0
        } else {
            second.clamp(0.0, end)
        };
        self.sink.seek(target)?;
        Ok(target)
    }

    /// Seconds from the start of the bound recording; `0.0` when unbound.
    pub fn current_position(&self) -> f64 {
        match &self.binding {
            Some(binding) => self
                .sink
                .position_secs()
                .clamp(0.0, binding.duration_secs as f64),
            None => 0.0,
        }
    }

    /// Set the output level, clamped to `0.0..=1.0`.  Applies to later
    /// bindings too.
    pub fn set_volume(&mut self, level: f32) -> Result<f32, PlaybackError> {
        if level.is_nan() {
            return Err(PlaybackError::InvalidVolume(level));
        }
        let level = level.clamp(0.0, 1.0);
        self.volume = level;
        self.sink.set_volume(level);
        Ok(level)
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// The current binding, unbinding first if its handle was revoked.
    fn live_binding(&mut self) -> Result<&Binding, PlaybackError> {
        let revoked = match &self.binding {
            None => return Err(PlaybackError::NothingBound),
            Some(binding) if binding.handle.is_valid() => None,
            Some(binding) => Some(binding.handle.locator()),
        };
        if let Some(revoked) = revoked {
            log::warn!("playback: {revoked} was released while bound");
            self.unbind();
            return Err(PlaybackError::HandleRevoked(revoked));
        }
        self.binding.as_ref().ok_or(PlaybackError::NothingBound)
    }
}

impl<S: PlaybackSink> Drop for PlaybackController<S> {
    fn drop(&mut self) {
        self.unbind();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{HandleRegistry, StreamFormat};
    use crate::playback::MemorySink;
    use crate::session::ManualClock;
    use std::sync::Arc;
    use std::time::Duration;

    struct Fixture {
        clock: ManualClock,
        registry: HandleRegistry,
        player: PlaybackController<MemorySink>,
    }

    fn fixture() -> Fixture {
        let clock = ManualClock::new();
        Fixture {
            player: PlaybackController::new(MemorySink::new(Arc::new(clock.clone()))),
            clock,
            registry: HandleRegistry::new(),
        }
    }

    /// `secs` seconds of 16 kHz mono silence.
    fn artifact(registry: &HandleRegistry, secs: u64) -> RecordingArtifact {
        RecordingArtifact::new(
            vec![0u8; 32_000 * secs as usize],
            secs,
            StreamFormat::pcm16(16_000, 1),
            registry,
        )
    }

    #[test]
    fn transport_requires_a_binding() {
        let mut f = fixture();
        assert_eq!(f.player.play(), Err(PlaybackError::NothingBound));
        assert_eq!(f.player.pause(), Err(PlaybackError::NothingBound));
        assert_eq!(f.player.seek(1.0), Err(PlaybackError::NothingBound));
        assert_eq!(f.player.current_position(), 0.0);
    }

    #[test]
    fn play_advances_position() {
        let mut f = fixture();
        let a = artifact(&f.registry, 5);
        f.player.bind(&a).unwrap();

        f.player.play().unwrap();
        f.clock.advance(Duration::from_secs(2));
        assert_eq!(f.player.current_position(), 2.0);

        f.player.pause().unwrap();
        f.clock.advance(Duration::from_secs(2));
        assert_eq!(f.player.current_position(), 2.0);
    }

    #[test]
    fn seek_clamps_to_duration() {
        let mut f = fixture();
        let a = artifact(&f.registry, 5);
        f.player.bind(&a).unwrap();

        assert_eq!(f.player.seek(12.0), Ok(5.0));
        assert_eq!(f.player.current_position(), 5.0);
        assert_eq!(f.player.seek(-3.0), Ok(0.0));
        assert_eq!(f.player.seek(f64::NAN), Ok(0.0));
        assert_eq!(f.player.seek(2.5), Ok(2.5));
        assert_eq!(f.player.current_position(), 2.5);
    }

    #[test]
    fn volume_is_clamped_and_nan_rejected() {
        let mut f = fixture();
        assert_eq!(f.player.set_volume(1.7), Ok(1.0));
        assert_eq!(f.player.set_volume(-0.2), Ok(0.0));
        assert_eq!(f.player.set_volume(0.4), Ok(0.4));
        assert!(matches!(
            f.player.set_volume(f32::NAN),
            Err(PlaybackError::InvalidVolume(_))
        ));
        assert_eq!(f.player.volume(), 0.4);
    }

    #[test]
    fn volume_carries_over_to_new_bindings() {
        let mut f = fixture();
        f.player.set_volume(0.3).unwrap();
        let a = artifact(&f.registry, 1);
        f.player.bind(&a).unwrap();

        assert_eq!(f.player.sink().volume(), 0.3);
    }

    #[test]
    fn rebinding_never_releases_the_previous_handle() {
        let mut f = fixture();
        let first = artifact(&f.registry, 2);
        let second = artifact(&f.registry, 3);

        f.player.bind(&first).unwrap();
        f.player.bind(&second).unwrap();

        assert!(first.access_handle().is_valid());
        assert!(second.access_handle().is_valid());
        assert_eq!(
            f.player.bound_locator(),
            Some(second.access_handle().locator())
        );
        assert_eq!(f.player.duration_secs(), Some(3));

        f.player.unbind();
        assert!(second.access_handle().is_valid());
        assert!(!f.player.sink().is_loaded());
    }

    #[test]
    fn binding_a_released_artifact_fails() {
        let mut f = fixture();
        let a = artifact(&f.registry, 1);
        a.release();

        let err = f.player.bind(&a).unwrap_err();
        assert_eq!(err, PlaybackError::HandleRevoked(a.access_handle().locator()));
        assert!(!f.player.is_bound());
    }

    #[test]
    fn release_while_bound_revokes_transport() {
        let mut f = fixture();
        let a = artifact(&f.registry, 4);
        f.player.bind(&a).unwrap();

        a.release();

        assert!(matches!(
            f.player.play(),
            Err(PlaybackError::HandleRevoked(_))
        ));
        assert!(!f.player.is_bound());
        assert_eq!(f.player.play(), Err(PlaybackError::NothingBound));
    }

    #[test]
    fn empty_recording_binds_and_stays_at_zero() {
        let mut f = fixture();
        let a = artifact(&f.registry, 0);
        f.player.bind(&a).unwrap();
        f.player.play().unwrap();
        f.clock.advance(Duration::from_secs(1));

        assert_eq!(f.player.current_position(), 0.0);
    }

    #[test]
    fn unreadable_buffer_leaves_player_unbound() {
        let mut f = fixture();
        let a = RecordingArtifact::new(
            vec![0u8; 3],
            1,
            StreamFormat::pcm16(16_000, 1),
            &f.registry,
        );

        assert!(matches!(
            f.player.bind(&a),
            Err(PlaybackError::Unreadable(_))
        ));
        assert!(!f.player.is_bound());
        assert!(a.access_handle().is_valid());
    }
}
