//! WAV export of finished recordings plus a JSON metadata sidecar.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::audio::pcm::pcm16le_to_i16;
use crate::audio::{RecordingArtifact, SampleEncoding, StreamFormat};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("access handle {0} has been released")]
    HandleRevoked(String),

    #[error("cannot export recording: {0}")]
    UnsupportedFormat(String),

    #[error("recording store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WAV encoding error: {0}")]
    Wav(#[from] hound::Error),

    #[error("recording metadata error: {0}")]
    Metadata(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// SavedRecording
// ---------------------------------------------------------------------------

/// Metadata written next to each exported WAV file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedRecording {
    /// Access-handle locator the bytes were read through.
    pub locator: String,
    pub wav_path: PathBuf,
    pub duration_secs: u64,
    pub created_at_unix_ms: u64,
    pub sample_rate: u32,
    pub channels: u16,
    /// Size of the raw PCM payload.
    pub byte_len: usize,
}

// ---------------------------------------------------------------------------
// RecordingStore
// ---------------------------------------------------------------------------

/// Writes recordings as `recording-<unix_ms>.wav` + `.json` pairs in one
/// directory.
#[derive(Debug, Clone)]
pub struct RecordingStore {
    dir: PathBuf,
}

impl RecordingStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Export `artifact`.  The bytes are read through its access handle, so
    /// a released artifact cannot be saved.
    pub fn save(&self, artifact: &RecordingArtifact) -> Result<SavedRecording, StoreError> {
        let handle = artifact.access_handle();
        let data = handle
            .resolve()
            .ok_or_else(|| StoreError::HandleRevoked(handle.locator()))?;

        let format = artifact.format();
        check_exportable(&format)?;
        let samples = pcm16le_to_i16(&data).ok_or_else(|| {
            StoreError::UnsupportedFormat(format!("{} bytes is not whole 16-bit samples", data.len()))
        })?;

        fs::create_dir_all(&self.dir)?;
        let stem = self.free_stem(artifact.created_at_unix_ms());
        let wav_path = self.dir.join(format!("{stem}.wav"));

        let spec = hound::WavSpec {
            channels: format.channels,
            sample_rate: format.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&wav_path, spec)?;
        for sample in samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;

        let saved = SavedRecording {
            locator: handle.locator(),
            wav_path,
            duration_secs: artifact.duration_secs(),
            created_at_unix_ms: artifact.created_at_unix_ms(),
            sample_rate: format.sample_rate,
            channels: format.channels,
            byte_len: data.len(),
        };
        let mut sidecar = BufWriter::new(File::create(self.dir.join(format!("{stem}.json")))?);
        serde_json::to_writer_pretty(&mut sidecar, &saved)?;
        sidecar.flush()?;

        log::info!(
            "store: saved {} to {} ({}s)",
            saved.locator,
            saved.wav_path.display(),
            saved.duration_secs
        );
        Ok(saved)
    }

    /// Every readable sidecar in the directory, oldest first.  A missing
    /// directory lists as empty.
    pub fn list(&self) -> Result<Vec<SavedRecording>, StoreError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut saved = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match read_sidecar(&path) {
                Ok(recording) => saved.push(recording),
                Err(e) => log::warn!("store: skipping {}: {e}", path.display()),
            }
        }
        saved.sort_by(|a, b| {
            a.created_at_unix_ms
                .cmp(&b.created_at_unix_ms)
                .then_with(|| a.wav_path.cmp(&b.wav_path))
        });
        Ok(saved)
    }

    /// `recording-<ms>`, suffixed when two recordings share a millisecond.
    fn free_stem(&self, unix_ms: u64) -> String {
        let base = format!("recording-{unix_ms}");
        let taken = |stem: &str| {
            self.dir.join(format!("{stem}.wav")).exists()
                || self.dir.join(format!("{stem}.json")).exists()
        };
        if !taken(&base) {
            return base;
        }
        (1u32..)
            .map(|n| format!("{base}-{n}"))
            .find(|stem| !taken(stem))
            .unwrap_or(base)
    }
}

fn check_exportable(format: &StreamFormat) -> Result<(), StoreError> {
    if format.encoding != SampleEncoding::Pcm16Le {
        return Err(StoreError::UnsupportedFormat(
            "only 16-bit PCM recordings can be written as WAV".into(),
        ));
    }
    if format.sample_rate == 0 || format.channels == 0 {
        return Err(StoreError::UnsupportedFormat(format!(
            "invalid stream format {} Hz / {} ch",
            format.sample_rate, format.channels
        )));
    }
    Ok(())
}

fn read_sidecar(path: &Path) -> Result<SavedRecording, StoreError> {
    let file = File::open(path)?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
