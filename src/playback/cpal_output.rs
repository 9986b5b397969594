//! Speaker playback via `cpal`.
//!
//! The loaded recording is decoded once into `f32` samples.  The output
//! stream lives on a dedicated `audio-playback` thread (for the same
//! `cpal::Stream: !Send` reason as capture) and reads a shared
//! [`Transport`] of atomics, so play/pause/seek/volume never block on the
//! audio callback.
//!
//! Opening and closing that thread never blocks the caller either.  `play`
//! spawns it and returns; the thread reports readiness on a oneshot that
//! later calls check, so an output device that fails to open surfaces as
//! [`PlaybackError::Sink`] on the next `play` or `seek`.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tokio::sync::oneshot::{self, error::TryRecvError};

use super::sink::{check_readable, PlaybackError, PlaybackSink};
use crate::audio::cpal_input::join_off_runtime;
use crate::audio::pcm::pcm16le_to_f32;
use crate::audio::{SampleEncoding, StreamFormat};

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// State shared between the controller thread and the cpal callback.
struct Transport {
    /// Index of the next interleaved sample to render.
    cursor: AtomicUsize,
    playing: AtomicBool,
    volume_bits: AtomicU32,
}

impl Transport {
    fn new() -> Self {
        Self {
            cursor: AtomicUsize::new(0),
            playing: AtomicBool::new(false),
            volume_bits: AtomicU32::new(1.0f32.to_bits()),
        }
    }

    fn volume(&self) -> f32 {
        f32::from_bits(self.volume_bits.load(Ordering::Relaxed))
    }

    /// Fill `out` from `samples`, advancing the cursor while playing.
    fn render(&self, samples: &[f32], out: &mut [f32]) {
        if !self.playing.load(Ordering::Relaxed) {
            out.fill(0.0);
            return;
        }

        let volume = self.volume();
        let start = self.cursor.load(Ordering::Acquire);
        let mut cursor = start;
        for slot in out.iter_mut() {
            *slot = match samples.get(cursor) {
                Some(sample) => {
                    cursor += 1;
                    sample * volume
                }
                None => 0.0,
            };
        }

        // A seek that landed while this buffer was rendered wins.
        let _ = self
            .cursor
            .compare_exchange(start, cursor, Ordering::AcqRel, Ordering::Relaxed);
        if cursor >= samples.len() {
            self.playing.store(false, Ordering::Release);
        }
    }
}

// ---------------------------------------------------------------------------
// CpalPlaybackSink
// ---------------------------------------------------------------------------

struct Loaded {
    samples: Arc<[f32]>,
    format: StreamFormat,
}

struct OutputThread {
    stop_tx: std_mpsc::Sender<()>,
    thread: JoinHandle<()>,
    /// Open result, until it has been seen.
    ready: Option<oneshot::Receiver<Result<(), PlaybackError>>>,
}

/// [`PlaybackSink`] that renders 16-bit PCM recordings to an output device.
pub struct CpalPlaybackSink {
    output_device: Option<String>,
    loaded: Option<Loaded>,
    transport: Arc<Transport>,
    output: Option<OutputThread>,
}

impl CpalPlaybackSink {
    /// `output_device` selects a device by name; `None` uses the default.
    pub fn new(output_device: Option<String>) -> Self {
        Self {
            output_device,
            loaded: None,
            transport: Arc::new(Transport::new()),
            output: None,
        }
    }

    /// Names of every output device on the default host.
    pub fn device_names() -> Vec<String> {
        let host = cpal::default_host();
        match host.output_devices() {
            Ok(devices) => devices.filter_map(|d| d.name().ok()).collect(),
            Err(e) => {
                log::warn!("cpal: failed to enumerate output devices: {e}");
                Vec::new()
            }
        }
    }

    pub fn is_playing(&self) -> bool {
        self.transport.playing.load(Ordering::Acquire)
    }

    fn start_output(&mut self, loaded: &Loaded) -> Result<(), PlaybackError> {
        let (ready_tx, ready_rx) = oneshot::channel::<Result<(), PlaybackError>>();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
        let samples = Arc::clone(&loaded.samples);
        let format = loaded.format;
        let transport = Arc::clone(&self.transport);
        let device_name = self.output_device.clone();

        let thread = std::thread::Builder::new()
            .name("audio-playback".into())
            .spawn(move || {
                let stream = match open_output(
                    device_name.as_deref(),
                    format,
                    samples,
                    Arc::clone(&transport),
                ) {
                    Ok(stream) => stream,
                    Err(e) => {
                        log::error!("cpal: failed to open output stream: {e}");
                        transport.playing.store(false, Ordering::Release);
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                log::info!(
                    "cpal: output stream open ({} Hz, {} ch)",
                    format.sample_rate,
                    format.channels
                );
                if ready_tx.send(Ok(())).is_err() {
                    return;
                }
                let _ = stop_rx.recv();
                drop(stream);
                log::debug!("cpal: output stream closed");
            })
            .map_err(|e| PlaybackError::Sink(format!("failed to spawn playback thread: {e}")))?;

        self.output = Some(OutputThread {
            stop_tx,
            thread,
            ready: Some(ready_rx),
        });
        Ok(())
    }

    /// Surface the open result of the output thread once it is known.
    ///
    /// A failed open tears the thread down so the next `play` retries.
    fn check_output(&mut self) -> Result<(), PlaybackError> {
        let Some(output) = self.output.as_mut() else {
            return Ok(());
        };
        let Some(ready) = output.ready.as_mut() else {
            return Ok(());
        };

        let failure = match ready.try_recv() {
            Err(TryRecvError::Empty) => return Ok(()),
            Ok(Ok(())) => {
                output.ready = None;
                return Ok(());
            }
            Ok(Err(e)) => e,
            Err(TryRecvError::Closed) => {
                PlaybackError::Sink("playback thread exited before opening the stream".into())
            }
        };

        self.transport.playing.store(false, Ordering::Release);
        self.stop_output();
        Err(failure)
    }

    fn stop_output(&mut self) {
        if let Some(output) = self.output.take() {
            let _ = output.stop_tx.send(());
            join_off_runtime(output.thread, "playback");
        }
    }
}

impl PlaybackSink for CpalPlaybackSink {
    fn load(&mut self, data: Arc<[u8]>, format: StreamFormat) -> Result<(), PlaybackError> {
        check_readable(&data, &format)?;
        if format.encoding == SampleEncoding::Opaque {
            return Err(PlaybackError::Unreadable(
                "speaker output needs 16-bit PCM".into(),
            ));
        }
        let samples = pcm16le_to_f32(&data)
            .ok_or_else(|| PlaybackError::Unreadable("truncated 16-bit sample".into()))?;

        self.unload();
        self.loaded = Some(Loaded {
            samples: Arc::from(samples),
            format,
        });
        Ok(())
    }

    fn unload(&mut self) {
        self.transport.playing.store(false, Ordering::Release);
        self.stop_output();
        self.transport.cursor.store(0, Ordering::Release);
        self.loaded = None;
    }

    fn play(&mut self) -> Result<(), PlaybackError> {
        self.check_output()?;
        let Some(loaded) = self.loaded.take() else {
            return Err(PlaybackError::NothingBound);
        };

        if self.transport.cursor.load(Ordering::Acquire) >= loaded.samples.len() {
            self.transport.cursor.store(0, Ordering::Release);
        }
        let started = match self.output {
            Some(_) => Ok(()),
            None => self.start_output(&loaded),
        };
        self.loaded = Some(loaded);
        started?;

        self.transport.playing.store(true, Ordering::Release);
        Ok(())
    }

    fn pause(&mut self) {
        self.transport.playing.store(false, Ordering::Release);
    }

    fn seek(&mut self, position_secs: f64) -> Result<(), PlaybackError> {
        self.check_output()?;
        let loaded = self.loaded.as_ref().ok_or(PlaybackError::NothingBound)?;
        let cursor = cursor_for(position_secs, loaded.format).min(loaded.samples.len());
        self.transport.cursor.store(cursor, Ordering::Release);
        Ok(())
    }

    fn position_secs(&self) -> f64 {
        match &self.loaded {
            Some(loaded) => {
                seconds_for_cursor(self.transport.cursor.load(Ordering::Acquire), loaded.format)
            }
            None => 0.0,
        }
    }

    fn set_volume(&mut self, level: f32) {
        self.transport
            .volume_bits
            .store(level.to_bits(), Ordering::Relaxed);
    }
}

impl Drop for CpalPlaybackSink {
    fn drop(&mut self) {
        self.unload();
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Interleaved sample index at the start of the frame containing `secs`.
fn cursor_for(secs: f64, format: StreamFormat) -> usize {
    let frame = (secs.max(0.0) * format.sample_rate as f64).floor() as usize;
    frame * format.channels as usize
}

fn seconds_for_cursor(cursor: usize, format: StreamFormat) -> f64 {
    if format.sample_rate == 0 || format.channels == 0 {
        return 0.0;
    }
    (cursor / format.channels as usize) as f64 / format.sample_rate as f64
}

/// Runs on the playback thread.
fn open_output(
    device_name: Option<&str>,
    format: StreamFormat,
    samples: Arc<[f32]>,
    transport: Arc<Transport>,
) -> Result<cpal::Stream, PlaybackError> {
    let host = cpal::default_host();
    let device = match device_name {
        None => host
            .default_output_device()
            .ok_or_else(|| PlaybackError::Sink("no default output device".into()))?,
        Some(wanted) => host
            .output_devices()
            .map_err(|e| PlaybackError::Sink(e.to_string()))?
            .find(|d| d.name().is_ok_and(|n| n == wanted))
            .ok_or_else(|| PlaybackError::Sink(format!("output device '{wanted}' not found")))?,
    };

    let config = cpal::StreamConfig {
        channels: format.channels,
        sample_rate: cpal::SampleRate(format.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let stream = device
        .build_output_stream(
            &config,
            move |out: &mut [f32], _: &cpal::OutputCallbackInfo| {
                transport.render(&samples, out);
            },
            |err| log::error!("cpal output stream error: {err}"),
            None,
        )
        .map_err(|e| PlaybackError::Sink(e.to_string()))?;

    stream
        .play()
        .map_err(|e| PlaybackError::Sink(format!("failed to start output stream: {e}")))?;
    Ok(stream)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
