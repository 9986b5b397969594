//! Input-device abstraction and push-based fragment delivery.
//!
//! [`InputDevice`] is the seam between the recording core and the platform
//! audio stack.  Acquisition is asynchronous (it may wait on an OS permission
//! prompt); once granted, the device pushes every captured fragment into the
//! [`FragmentSink`] it was given, in real time, until its [`DeviceHandle`] is
//! released.  A mid-stream failure is pushed through the same sink so it is
//! processed on the session's event queue in order with the fragments.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// CaptureError
// ---------------------------------------------------------------------------

/// Failures reported by an input device.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CaptureError {
    /// The user or the OS refused access to the input device.
    #[error("microphone access denied: {0}")]
    PermissionDenied(String),

    /// No capture device is present, or it cannot be opened.
    #[error("no usable input device: {0}")]
    DeviceUnavailable(String),

    /// The device failed or disconnected while streaming.
    #[error("audio stream interrupted: {0}")]
    StreamInterrupted(String),

    /// A handle on this device is already open, or being acquired.
    #[error("an input device handle is already open")]
    AlreadyOpen,
}

// ---------------------------------------------------------------------------
// StreamFormat
// ---------------------------------------------------------------------------

/// How fragment bytes are laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleEncoding {
    /// Interleaved signed 16-bit little-endian PCM.
    Pcm16Le,
    /// Bytes the core cannot interpret (already-encoded audio).
    Opaque,
}

/// Stream format negotiated with the device at grant time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamFormat {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Number of interleaved channels.
    pub channels: u16,
    pub encoding: SampleEncoding,
}

impl StreamFormat {
    /// 16-bit PCM at the given rate and channel count.
    pub fn pcm16(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            encoding: SampleEncoding::Pcm16Le,
        }
    }

    /// Bytes per interleaved frame, or `None` for opaque streams.
    pub fn frame_bytes(&self) -> Option<usize> {
        match self.encoding {
            SampleEncoding::Pcm16Le => Some(2 * self.channels as usize),
            SampleEncoding::Opaque => None,
        }
    }

    /// Number of seconds of audio contained in `byte_len` bytes, if known.
    pub fn seconds_for(&self, byte_len: usize) -> Option<f64> {
        let frame = self.frame_bytes()?;
        if frame == 0 || self.sample_rate == 0 {
            return None;
        }
        Some((byte_len / frame) as f64 / self.sample_rate as f64)
    }
}

// ---------------------------------------------------------------------------
// CaptureConstraints
// ---------------------------------------------------------------------------

/// Desired capture mode passed to [`InputDevice::acquire`].
///
/// Every field is a preference; `None` lets the device pick its default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaptureConstraints {
    /// Input device name; `None` means the system default.
    pub device_name: Option<String>,
    /// Preferred sample rate in Hz.
    pub sample_rate: Option<u32>,
    /// Preferred channel count.
    pub channels: Option<u16>,
}

// ---------------------------------------------------------------------------
// DeviceEvent / FragmentSink
// ---------------------------------------------------------------------------

/// Something the device pushed onto the session's event queue.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEventKind {
    /// One captured fragment.
    Fragment(Vec<u8>),
    /// The stream failed; no further fragments will follow.
    Failed(String),
}

/// A device event tagged with the session generation it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceEvent {
    pub generation: u64,
    pub kind: DeviceEventKind,
}

/// Callback target handed to a device on acquisition.
///
/// Backed by an unbounded channel so that the audio callback never blocks.
/// Sends after the session's receiver is gone are ignored.
#[derive(Debug, Clone)]
pub struct FragmentSink {
    generation: u64,
    tx: mpsc::UnboundedSender<DeviceEvent>,
}

impl FragmentSink {
    pub fn new(generation: u64, tx: mpsc::UnboundedSender<DeviceEvent>) -> Self {
        Self { generation, tx }
    }

    /// Session generation this sink was created for.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Push one fragment.  Returns `false` when the session is gone.
    pub fn deliver(&self, fragment: Vec<u8>) -> bool {
        self.send(DeviceEventKind::Fragment(fragment))
    }

    /// Report an asynchronous stream failure.
    pub fn fail(&self, reason: impl Into<String>) -> bool {
        self.send(DeviceEventKind::Failed(reason.into()))
    }

    fn send(&self, kind: DeviceEventKind) -> bool {
        self.tx
            .send(DeviceEvent {
                generation: self.generation,
                kind,
            })
            .is_ok()
    }
}

// ---------------------------------------------------------------------------
// DeviceLock
// ---------------------------------------------------------------------------

/// In-use flag shared by every clone of one device.
///
/// A device takes a [`DeviceClaim`] before it grants and moves it into the
/// handle; the flag clears when the claim is dropped.
#[derive(Debug, Clone, Default)]
pub struct DeviceLock {
    in_use: Arc<AtomicBool>,
}

impl DeviceLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the device, or `AlreadyOpen` if another handle holds it.
    pub fn claim(&self) -> Result<DeviceClaim, CaptureError> {
        self.in_use
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| CaptureError::AlreadyOpen)?;
        Ok(DeviceClaim {
            in_use: Arc::clone(&self.in_use),
        })
    }

    pub fn is_claimed(&self) -> bool {
        self.in_use.load(Ordering::Acquire)
    }
}

/// Proof of exclusive use; frees the device on drop.
#[derive(Debug)]
pub struct DeviceClaim {
    in_use: Arc<AtomicBool>,
}

impl Drop for DeviceClaim {
    fn drop(&mut self) {
        self.in_use.store(false, Ordering::Release);
    }
}

// ---------------------------------------------------------------------------
// InputDevice / DeviceHandle
// ---------------------------------------------------------------------------

/// An open capture stream.
///
/// Implementations must make [`release`](Self::release) idempotent and should
/// release on drop as well.
pub trait DeviceHandle: Send {
    /// Format of the bytes this handle delivers.
    fn format(&self) -> StreamFormat;

    /// Close the device and stop fragment delivery.
    fn release(&mut self);

    /// Returns `true` until [`release`](Self::release) has been called.
    fn is_open(&self) -> bool;
}

/// A platform audio-input capability.
#[async_trait]
pub trait InputDevice: Send + Sync {
    /// Request the device.
    ///
    /// Suspends until the platform grants or refuses access.  On success the
    /// device starts pushing fragments into `sink` immediately.
    ///
    /// At most one handle per device is open at a time; a request while one
    /// is held fails with [`CaptureError::AlreadyOpen`].
    async fn acquire(
        &self,
        constraints: &CaptureConstraints,
        sink: FragmentSink,
    ) -> Result<Box<dyn DeviceHandle>, CaptureError>;

    /// Human-readable backend name for logging.
    fn name(&self) -> &str;
}

// Compile-time assertion: Box<dyn InputDevice> must be constructible.
const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn InputDevice>) {}
};

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sink_tags_events_with_generation() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = FragmentSink::new(7, tx);

        assert!(sink.deliver(vec![1, 2]));
        assert!(sink.fail("unplugged"));

        assert_eq!(
            rx.try_recv().unwrap(),
            DeviceEvent {
                generation: 7,
                kind: DeviceEventKind::Fragment(vec![1, 2]),
            }
        );
        assert_eq!(
            rx.try_recv().unwrap().kind,
            DeviceEventKind::Failed("unplugged".into())
        );
    }

    #[test]
    fn sink_reports_closed_receiver() {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = FragmentSink::new(1, tx);
        drop(rx);

        assert!(!sink.deliver(vec![0]));
    }

    #[test]
    fn pcm16_seconds_for_bytes() {
        let format = StreamFormat::pcm16(16_000, 1);
        assert_eq!(format.frame_bytes(), Some(2));
        assert_eq!(format.seconds_for(32_000), Some(1.0));

        let stereo = StreamFormat::pcm16(48_000, 2);
        assert_eq!(stereo.seconds_for(96_000), Some(0.5));
    }

    #[test]
    fn opaque_format_has_no_duration() {
        let format = StreamFormat {
            sample_rate: 48_000,
            channels: 1,
            encoding: SampleEncoding::Opaque,
        };
        assert_eq!(format.seconds_for(1_000), None);
    }

    #[test]
    fn lock_admits_one_claim_at_a_time() {
        let lock = DeviceLock::new();
        let shared = lock.clone();

        let claim = lock.claim().unwrap();
        assert!(shared.is_claimed());
        assert_eq!(shared.claim().unwrap_err(), CaptureError::AlreadyOpen);

        drop(claim);
        assert!(!lock.is_claimed());
        assert!(shared.claim().is_ok());
    }

    #[test]
    fn capture_error_messages() {
        assert_eq!(
            CaptureError::PermissionDenied("user said no".into()).to_string(),
            "microphone access denied: user said no"
        );
        assert_eq!(
            CaptureError::AlreadyOpen.to_string(),
            "an input device handle is already open"
        );
    }
}
