//! Scripted [`InputDevice`] for exercising the recording core without audio
//! hardware.
//!
//! The test keeps a clone of the [`ScriptedDevice`] and drives it: push
//! fragments, simulate a disconnect, or hold a grant open to test
//! cancellation while the session is still acquiring.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use super::device::{
    CaptureConstraints, CaptureError, DeviceClaim, DeviceHandle, DeviceLock, FragmentSink,
    InputDevice, StreamFormat,
};

#[derive(Debug, Clone)]
enum Outcome {
    Grant(StreamFormat),
    Refuse(CaptureError),
}

struct Shared {
    outcome: Mutex<Outcome>,
    /// When set, `acquire` waits on `gate` before answering.
    gated: bool,
    gate: Notify,
    sink: Mutex<Option<FragmentSink>>,
    /// Failure pushed through the sink of the next request before it grants.
    fail_on_open: Mutex<Option<String>>,
    lock: DeviceLock,
    acquire_calls: AtomicUsize,
    open_handles: AtomicUsize,
}

/// Cheap-to-clone scripted input device.
#[derive(Clone)]
pub struct ScriptedDevice {
    shared: Arc<Shared>,
}

impl ScriptedDevice {
    fn with(outcome: Outcome, gated: bool) -> Self {
        Self {
            shared: Arc::new(Shared {
                outcome: Mutex::new(outcome),
                gated,
                gate: Notify::new(),
                sink: Mutex::new(None),
                fail_on_open: Mutex::new(None),
                lock: DeviceLock::new(),
                acquire_calls: AtomicUsize::new(0),
                open_handles: AtomicUsize::new(0),
            }),
        }
    }

    /// Grants every request immediately with 16 kHz mono PCM.
    pub fn granting() -> Self {
        Self::with(Outcome::Grant(StreamFormat::pcm16(16_000, 1)), false)
    }

    /// Refuses every request with `error`.
    pub fn refusing(error: CaptureError) -> Self {
        Self::with(Outcome::Refuse(error), false)
    }

    /// Grants, but only after [`open_gate`](Self::open_gate) is called.
    pub fn gated() -> Self {
        Self::with(Outcome::Grant(StreamFormat::pcm16(16_000, 1)), true)
    }

    /// Change the answer given to later requests.
    pub fn set_refusal(&self, error: Option<CaptureError>) {
        let mut outcome = self.shared.outcome.lock().unwrap();
        *outcome = match error {
            Some(e) => Outcome::Refuse(e),
            None => Outcome::Grant(StreamFormat::pcm16(16_000, 1)),
        };
    }

    /// Let one pending gated request through.
    pub fn open_gate(&self) {
        self.shared.gate.notify_one();
    }

    /// Make the next request report a stream failure before its grant
    /// resolves, as a stream that dies right after opening would.
    pub fn fail_next_open(&self, reason: &str) {
        *self.shared.fail_on_open.lock().unwrap() = Some(reason.to_owned());
    }

    /// Push a fragment through the sink of the most recent request.
    pub fn push(&self, fragment: &[u8]) -> bool {
        match self.shared.sink.lock().unwrap().as_ref() {
            Some(sink) => sink.deliver(fragment.to_vec()),
            None => false,
        }
    }

    /// Simulate a mid-stream disconnect.
    pub fn disconnect(&self, reason: &str) -> bool {
        match self.shared.sink.lock().unwrap().as_ref() {
            Some(sink) => sink.fail(reason),
            None => false,
        }
    }

    pub fn acquire_calls(&self) -> usize {
        self.shared.acquire_calls.load(Ordering::SeqCst)
    }

    pub fn open_handles(&self) -> usize {
        self.shared.open_handles.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InputDevice for ScriptedDevice {
    async fn acquire(
        &self,
        _constraints: &CaptureConstraints,
        sink: FragmentSink,
    ) -> Result<Box<dyn DeviceHandle>, CaptureError> {
        self.shared.acquire_calls.fetch_add(1, Ordering::SeqCst);

        let early_failure = self.shared.fail_on_open.lock().unwrap().take();
        if let Some(reason) = early_failure {
            sink.fail(reason);
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        // The stream is considered live from here on, grant or not.
        *self.shared.sink.lock().unwrap() = Some(sink);

        if self.shared.gated {
            self.shared.gate.notified().await;
        }

        let outcome = self.shared.outcome.lock().unwrap().clone();
        match outcome {
            Outcome::Refuse(e) => Err(e),
            Outcome::Grant(format) => {
                let claim = self.shared.lock.claim()?;
                self.shared.open_handles.fetch_add(1, Ordering::SeqCst);
                Ok(Box::new(ScriptedHandle {
                    format,
                    claim: Some(claim),
                    shared: Arc::clone(&self.shared),
                }))
            }
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

struct ScriptedHandle {
    format: StreamFormat,
    claim: Option<DeviceClaim>,
    shared: Arc<Shared>,
}

impl DeviceHandle for ScriptedHandle {
    fn format(&self) -> StreamFormat {
        self.format
    }

    fn release(&mut self) {
        if self.claim.take().is_some() {
            self.shared.open_handles.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn is_open(&self) -> bool {
        self.claim.is_some()
    }
}

impl Drop for ScriptedHandle {
    fn drop(&mut self) {
        self.release();
    }
}
