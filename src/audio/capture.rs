//! Device acquisition and the open/closed capture lifecycle.
//!
//! [`CaptureSession`] owns at most one [`DeviceHandle`] at a time.  A new
//! acquisition is refused while a handle is open or a previous request is
//! still pending, so the previous handle is always released before another
//! one is requested.  The device itself refuses a second handle with
//! `AlreadyOpen`, so two sessions over the same device cannot both hold it.
//!
//! Acquisition is split in two so the event loop can keep dispatching while
//! the platform permission prompt is up:
//!
//! ```text
//! request(constraints, sink) ──▶ pending
//! granted().await            ──▶ open   (or Err, back to closed)
//! abandon()                  ──▶ closed (pending request dropped)
//! release()                  ──▶ closed (from anywhere, idempotent)
//! ```
//!
//! [`acquire`](CaptureSession::acquire) chains the first two for callers that
//! simply want to wait.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use super::device::{
    CaptureConstraints, CaptureError, DeviceHandle, FragmentSink, InputDevice, StreamFormat,
};

type PendingAcquire =
    Pin<Box<dyn Future<Output = Result<Box<dyn DeviceHandle>, CaptureError>> + Send>>;

// ---------------------------------------------------------------------------
// CaptureSession
// ---------------------------------------------------------------------------

/// Exclusive owner of the active input-device handle.
pub struct CaptureSession {
    device: Arc<dyn InputDevice>,
    handle: Option<Box<dyn DeviceHandle>>,
    pending: Option<PendingAcquire>,
}

impl CaptureSession {
    pub fn new(device: Arc<dyn InputDevice>) -> Self {
        Self {
            device,
            handle: None,
            pending: None,
        }
    }

    /// Request the device and wait for the answer.
    ///
    /// # Errors
    ///
    /// [`CaptureError::AlreadyOpen`] when a handle is open or pending here or
    /// in another session on the same device, or the device's own `PermissionDenied` / `DeviceUnavailable` refusal.
    pub async fn acquire(
        &mut self,
        constraints: CaptureConstraints,
        sink: FragmentSink,
    ) -> Result<StreamFormat, CaptureError> {
        self.request(constraints, sink)?;
        self.granted().await
    }

    /// Start an acquisition without waiting for it.
    pub fn request(
        &mut self,
        constraints: CaptureConstraints,
        sink: FragmentSink,
    ) -> Result<(), CaptureError> {
        if self.handle.is_some() || self.pending.is_some() {
            return Err(CaptureError::AlreadyOpen);
        }

        log::debug!(
            "capture: requesting '{}' device (generation {})",
            self.device.name(),
            sink.generation()
        );

        let device = Arc::clone(&self.device);
        self.pending = Some(Box::pin(async move {
            device.acquire(&constraints, sink).await
        }));
        Ok(())
    }

    /// Wait for the pending request to resolve.
    ///
    /// Never completes when nothing is pending.  Cancel-safe: dropping the
    /// returned future leaves the request pending.
    pub async fn granted(&mut self) -> Result<StreamFormat, CaptureError> {
        let result = match self.pending.as_mut() {
            Some(pending) => pending.await,
            None => return std::future::pending().await,
        };
        self.pending = None;

        let handle = result?;
        let format = handle.format();
        self.handle = Some(handle);
        Ok(format)
    }

    /// Drop a pending request.  Returns `true` if one was pending.
    ///
    /// A device that had already produced a handle inside the dropped request
    /// closes it as part of the drop.
    pub fn abandon(&mut self) -> bool {
        self.pending.take().is_some()
    }

    /// Close the device, if open, and drop any pending request.  Idempotent.
    pub fn release(&mut self) {
        self.pending = None;
        if let Some(mut handle) = self.handle.take() {
            handle.release();
            log::debug!("capture: '{}' device released", self.device.name());
        }
    }

    /// Returns `true` while a handle is open.
    pub fn is_open(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| h.is_open())
    }

    /// Returns `true` while a request is pending.
    pub fn is_acquiring(&self) -> bool {
        self.pending.is_some()
    }

    /// Format of the open handle.
    pub fn format(&self) -> Option<StreamFormat> {
        self.handle.as_ref().map(|h| h.format())
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.release();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::ScriptedDevice;
    use tokio::sync::mpsc;

    fn sink(generation: u64) -> FragmentSink {
        let (tx, _rx) = mpsc::unbounded_channel();
        FragmentSink::new(generation, tx)
    }

    fn session(device: &ScriptedDevice) -> CaptureSession {
        CaptureSession::new(Arc::new(device.clone()))
    }

    #[tokio::test]
    async fn acquire_opens_handle() {
        let device = ScriptedDevice::granting();
        let mut capture = session(&device);

        let format = capture
            .acquire(CaptureConstraints::default(), sink(1))
            .await
            .unwrap();

        assert_eq!(format, StreamFormat::pcm16(16_000, 1));
        assert!(capture.is_open());
        assert_eq!(device.open_handles(), 1);
    }

    #[tokio::test]
    async fn acquire_refused_leaves_nothing_open() {
        let device = ScriptedDevice::refusing(CaptureError::PermissionDenied("no".into()));
        let mut capture = session(&device);

        let err = capture
            .acquire(CaptureConstraints::default(), sink(1))
            .await
            .unwrap_err();

        assert!(matches!(err, CaptureError::PermissionDenied(_)));
        assert!(!capture.is_open());
        assert!(!capture.is_acquiring());
        assert_eq!(device.open_handles(), 0);
    }

    #[tokio::test]
    async fn second_acquire_while_open_is_refused() {
        let device = ScriptedDevice::granting();
        let mut capture = session(&device);
        capture
            .acquire(CaptureConstraints::default(), sink(1))
            .await
            .unwrap();

        let err = capture
            .acquire(CaptureConstraints::default(), sink(2))
            .await
            .unwrap_err();

        assert_eq!(err, CaptureError::AlreadyOpen);
        assert_eq!(device.acquire_calls(), 1);
        assert_eq!(device.open_handles(), 1);
    }

    #[tokio::test]
    async fn two_sessions_cannot_hold_one_device() {
        let device = ScriptedDevice::granting();
        let mut first = session(&device);
        let mut second = session(&device);

        first
            .acquire(CaptureConstraints::default(), sink(1))
            .await
            .unwrap();
        let err = second
            .acquire(CaptureConstraints::default(), sink(2))
            .await
            .unwrap_err();

        assert_eq!(err, CaptureError::AlreadyOpen);
        assert!(!second.is_open());
        assert!(!second.is_acquiring());
        assert_eq!(device.open_handles(), 1);

        first.release();
        second
            .acquire(CaptureConstraints::default(), sink(3))
            .await
            .unwrap();
        assert_eq!(device.open_handles(), 1);
    }

    #[tokio::test]
    async fn release_is_idempotent() {
        let device = ScriptedDevice::granting();
        let mut capture = session(&device);
        capture
            .acquire(CaptureConstraints::default(), sink(1))
            .await
            .unwrap();

        capture.release();
        capture.release();

        assert!(!capture.is_open());
        assert_eq!(device.open_handles(), 0);

        // A fresh acquisition is allowed once the old handle is gone.
        capture
            .acquire(CaptureConstraints::default(), sink(2))
            .await
            .unwrap();
        assert_eq!(device.open_handles(), 1);
    }

    #[tokio::test]
    async fn release_without_handle_is_safe() {
        let device = ScriptedDevice::granting();
        let mut capture = session(&device);
        capture.release();
        assert!(!capture.is_open());
    }

    #[tokio::test]
    async fn abandon_drops_pending_request() {
        let device = ScriptedDevice::gated();
        let mut capture = session(&device);
        capture
            .request(CaptureConstraints::default(), sink(1))
            .unwrap();
        assert!(capture.is_acquiring());

        // Poll once so the device is actually waiting on its gate.
        let waited =
            tokio::time::timeout(std::time::Duration::from_millis(10), capture.granted()).await;
        assert!(waited.is_err());
        assert!(capture.is_acquiring());

        assert!(capture.abandon());
        device.open_gate();

        assert!(!capture.is_acquiring());
        assert!(!capture.is_open());
        assert_eq!(device.open_handles(), 0);
    }

    #[tokio::test]
    async fn drop_releases_handle() {
        let device = ScriptedDevice::granting();
        {
            let mut capture = session(&device);
            capture
                .acquire(CaptureConstraints::default(), sink(1))
                .await
                .unwrap();
            assert_eq!(device.open_handles(), 1);
        }
        assert_eq!(device.open_handles(), 0);
    }
}
