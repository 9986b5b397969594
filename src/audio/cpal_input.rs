//! Microphone capture via `cpal`.
//!
//! [`CpalInputDevice`] implements [`InputDevice`] on top of the cpal
//! host/device/stream lifecycle.  `cpal::Stream` is not `Send` on every
//! platform, so each acquisition opens its stream on a dedicated
//! `audio-capture` thread and parks that thread until the handle is
//! released.  The cpal data callback packs each buffer as 16-bit PCM and
//! pushes it straight into the session's [`FragmentSink`]; the error callback
//! reports through the same sink.
//!
//! Only one input stream is open per process: every `CpalInputDevice` shares
//! one [`DeviceLock`].  Closing a stream never joins its thread on a tokio
//! worker; see [`join_off_runtime`].

use std::sync::mpsc as std_mpsc;
use std::sync::OnceLock;
use std::thread::JoinHandle;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tokio::sync::oneshot;

use super::device::{
    CaptureConstraints, CaptureError, DeviceClaim, DeviceHandle, DeviceLock, FragmentSink,
    InputDevice, StreamFormat,
};
use super::pcm::{f32_to_pcm16le, i16_to_pcm16le};

// ---------------------------------------------------------------------------
// CpalInputDevice
// ---------------------------------------------------------------------------

/// Input device backed by the default cpal host.
#[derive(Debug, Clone)]
pub struct CpalInputDevice {
    lock: DeviceLock,
}

impl CpalInputDevice {
    pub fn new() -> Self {
        static INPUT_LOCK: OnceLock<DeviceLock> = OnceLock::new();
        Self {
            lock: INPUT_LOCK.get_or_init(DeviceLock::new).clone(),
        }
    }

    /// Names of every input device on the default host.
    pub fn device_names() -> Vec<String> {
        let host = cpal::default_host();
        match host.input_devices() {
            Ok(devices) => devices.filter_map(|d| d.name().ok()).collect(),
            Err(e) => {
                log::warn!("cpal: failed to enumerate input devices: {e}");
                Vec::new()
            }
        }
    }
}

impl Default for CpalInputDevice {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InputDevice for CpalInputDevice {
    async fn acquire(
        &self,
        constraints: &CaptureConstraints,
        sink: FragmentSink,
    ) -> Result<Box<dyn DeviceHandle>, CaptureError> {
        // Held from here so a second request is refused while this one opens.
        let claim = self.lock.claim()?;
        let constraints = constraints.clone();
        let (ready_tx, ready_rx) = oneshot::channel::<Result<StreamFormat, CaptureError>>();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();

        let thread = std::thread::Builder::new()
            .name("audio-capture".into())
            .spawn(move || {
                let (stream, format) = match open_stream(&constraints, sink) {
                    Ok(opened) => opened,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                if ready_tx.send(Ok(format)).is_err() {
                    // The request was abandoned while the stream was opening.
                    log::debug!("cpal: acquisition abandoned, closing stream");
                    return;
                }

                // Parked until release() signals or the handle is dropped.
                let _ = stop_rx.recv();
                drop(stream);
                log::debug!("cpal: input stream closed");
            })
            .map_err(|e| {
                CaptureError::DeviceUnavailable(format!("failed to spawn capture thread: {e}"))
            })?;

        let format = match ready_rx.await {
            Ok(result) => result?,
            Err(_) => {
                return Err(CaptureError::DeviceUnavailable(
                    "capture thread exited before opening the stream".into(),
                ))
            }
        };

        log::info!(
            "cpal: input stream open ({} Hz, {} ch)",
            format.sample_rate,
            format.channels
        );

        Ok(Box::new(CpalInputHandle {
            format,
            stop_tx: Some(stop_tx),
            thread: Some(thread),
            claim: Some(claim),
        }))
    }

    fn name(&self) -> &str {
        "cpal"
    }
}

// ---------------------------------------------------------------------------
// CpalInputHandle
// ---------------------------------------------------------------------------

struct CpalInputHandle {
    format: StreamFormat,
    stop_tx: Option<std_mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
    claim: Option<DeviceClaim>,
}

impl DeviceHandle for CpalInputHandle {
    fn format(&self) -> StreamFormat {
        self.format
    }

    fn release(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            join_off_runtime(thread, "capture");
        }
        self.claim = None;
    }

    fn is_open(&self) -> bool {
        self.stop_tx.is_some()
    }
}

impl Drop for CpalInputHandle {
    fn drop(&mut self) {
        self.release();
    }
}

/// Join a stream thread that has already been told to stop.
///
/// Inside a tokio runtime the join is handed to the blocking pool so the
/// calling worker never waits on a closing cpal stream; outside one it
/// happens inline.
pub(crate) fn join_off_runtime(thread: JoinHandle<()>, what: &'static str) {
    let join = move || {
        if thread.join().is_err() {
            log::warn!("cpal: {what} thread panicked during shutdown");
        }
    };
    match tokio::runtime::Handle::try_current() {
        Ok(runtime) => {
            runtime.spawn_blocking(join);
        }
        Err(_) => join(),
    }
}

// ---------------------------------------------------------------------------
// Stream setup (runs on the capture thread)
// ---------------------------------------------------------------------------

fn open_stream(
    constraints: &CaptureConstraints,
    sink: FragmentSink,
) -> Result<(cpal::Stream, StreamFormat), CaptureError> {
    let host = cpal::default_host();
    let device = find_input_device(&host, constraints.device_name.as_deref())?;

    let supported = device.default_input_config().map_err(|e| match e {
        cpal::DefaultStreamConfigError::DeviceNotAvailable => {
            CaptureError::DeviceUnavailable("input device not available".into())
        }
        other => CaptureError::DeviceUnavailable(other.to_string()),
    })?;

    let sample_format = supported.sample_format();
    let mut config: cpal::StreamConfig = supported.into();
    if let Some(rate) = constraints.sample_rate {
        config.sample_rate = cpal::SampleRate(rate);
    }
    if let Some(channels) = constraints.channels {
        config.channels = channels;
    }

    let err_sink = sink.clone();
    let on_error = move |err: cpal::StreamError| {
        log::error!("cpal stream error: {err}");
        err_sink.fail(err.to_string());
    };

    let stream = match sample_format {
        cpal::SampleFormat::F32 => device.build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                sink.deliver(f32_to_pcm16le(data));
            },
            on_error,
            None,
        ),
        cpal::SampleFormat::I16 => device.build_input_stream(
            &config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                sink.deliver(i16_to_pcm16le(data));
            },
            on_error,
            None,
        ),
        other => {
            return Err(CaptureError::DeviceUnavailable(format!(
                "unsupported input sample format {other:?}"
            )))
        }
    }
    .map_err(map_build_error)?;

    stream
        .play()
        .map_err(|e| CaptureError::DeviceUnavailable(format!("failed to start stream: {e}")))?;

    let format = StreamFormat::pcm16(config.sample_rate.0, config.channels);
    Ok((stream, format))
}

fn find_input_device(host: &cpal::Host, name: Option<&str>) -> Result<cpal::Device, CaptureError> {
    let Some(wanted) = name else {
        return host
            .default_input_device()
            .ok_or_else(|| CaptureError::DeviceUnavailable("no default input device".into()));
    };

    let devices = host
        .input_devices()
        .map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))?;
    for device in devices {
        if device.name().is_ok_and(|n| n == wanted) {
            return Ok(device);
        }
    }
    Err(CaptureError::DeviceUnavailable(format!(
        "input device '{wanted}' not found"
    )))
}

fn map_build_error(err: cpal::BuildStreamError) -> CaptureError {
    match err {
        cpal::BuildStreamError::DeviceNotAvailable => {
            CaptureError::DeviceUnavailable("input device not available".into())
        }
        cpal::BuildStreamError::BackendSpecific { err } if is_permission_message(&err.description) => {
            CaptureError::PermissionDenied(err.description)
        }
        other => CaptureError::DeviceUnavailable(other.to_string()),
    }
}

/// Backends report permission refusals only as free text.
fn is_permission_message(description: &str) -> bool {
    let lower = description.to_lowercase();
    ["permission", "denied", "not authorized", "unauthorized"]
        .iter()
        .any(|needle| lower.contains(needle))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
