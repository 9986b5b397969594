//! Conversions between cpal sample buffers and 16-bit little-endian PCM bytes.
//!
//! Fragments travel through the recording core as opaque bytes.  The cpal
//! input device packs each callback buffer with [`f32_to_pcm16le`] /
//! [`i16_to_pcm16le`]; the playback sink and the WAV exporter unpack them
//! again with [`pcm16le_to_f32`] / [`pcm16le_to_i16`].
//!
//! ```rust
//! use voice_capture::audio::pcm::{f32_to_pcm16le, pcm16le_to_i16};
//!
//! let bytes = f32_to_pcm16le(&[0.0, 1.0, -1.0]);
//! assert_eq!(bytes.len(), 6);
//! assert_eq!(pcm16le_to_i16(&bytes), Some(vec![0, i16::MAX, -i16::MAX]));
//! ```

// ---------------------------------------------------------------------------
// Packing
// ---------------------------------------------------------------------------

/// Pack `f32` samples in `[-1.0, 1.0]` as 16-bit PCM.  Out-of-range values
/// are clamped.
pub fn f32_to_pcm16le(samples: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for &s in samples {
        let v = (s.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16;
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

/// Pack `i16` samples as little-endian bytes.
pub fn i16_to_pcm16le(samples: &[i16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for &s in samples {
        out.extend_from_slice(&s.to_le_bytes());
    }
    out
}

// ---------------------------------------------------------------------------
// Unpacking
// ---------------------------------------------------------------------------

/// Unpack 16-bit PCM bytes.  Returns `None` for an odd byte count.
pub fn pcm16le_to_i16(bytes: &[u8]) -> Option<Vec<i16>> {
    if bytes.len() % 2 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect(),
    )
}

/// Unpack 16-bit PCM bytes into `f32` samples in `[-1.0, 1.0]`.
pub fn pcm16le_to_f32(bytes: &[u8]) -> Option<Vec<f32>> {
    pcm16le_to_i16(bytes).map(|samples| {
        samples
            .into_iter()
            .map(|s| (s as f32 / i16::MAX as f32).max(-1.0))
            .collect()
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn f32_is_clamped() {
        let bytes = f32_to_pcm16le(&[2.0, -3.0]);
        assert_eq!(pcm16le_to_i16(&bytes), Some(vec![i16::MAX, -i16::MAX]));
    }

    #[test]
    fn i16_little_endian_layout() {
        assert_eq!(i16_to_pcm16le(&[0x0102, -1]), vec![0x02, 0x01, 0xff, 0xff]);
    }

    #[test]
    fn odd_length_is_rejected() {
        assert_eq!(pcm16le_to_i16(&[1, 2, 3]), None);
        assert_eq!(pcm16le_to_f32(&[1]), None);
    }

    #[test]
    fn empty_input_is_empty_output() {
        assert_eq!(pcm16le_to_f32(&[]), Some(Vec::new()));
        assert!(f32_to_pcm16le(&[]).is_empty());
    }

    #[test]
    fn f32_values_survive_within_quantisation() {
        let input = [0.25_f32, -0.5, 0.75];
        let output = pcm16le_to_f32(&f32_to_pcm16le(&input)).unwrap();
        for (a, b) in input.iter().zip(&output) {
            assert!((a - b).abs() < 1e-4, "{a} vs {b}");
        }
    }

    #[test]
    fn min_sample_maps_to_minus_one() {
        let bytes = i16_to_pcm16le(&[i16::MIN]);
        assert_eq!(pcm16le_to_f32(&bytes), Some(vec![-1.0]));
    }
}
