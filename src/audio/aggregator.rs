//! Ordered accumulation of captured byte fragments.
//!
//! The device driver pushes opaque fragments while a session is recording;
//! [`ChunkAggregator`] keeps them in arrival order and concatenates them into
//! one buffer when the session stops.  Arrival order is the only order; the
//! aggregator never reorders or deduplicates.
//!
//! # Example
//!
//! ```rust
//! use voice_capture::audio::ChunkAggregator;
//!
//! let mut agg = ChunkAggregator::new();
//! agg.append(b"ab".to_vec());
//! agg.append(b"cd".to_vec());
//! assert_eq!(agg.freeze(), b"abcd".to_vec());
//! assert!(agg.is_empty()); // ready for the next session
//! ```

// ---------------------------------------------------------------------------
// ChunkAggregator
// ---------------------------------------------------------------------------

/// Append-only sequence of byte fragments.
///
/// The owning state machine only calls [`append`](Self::append) while it is
/// `Recording` and [`freeze`](Self::freeze) on the way out of `Recording`, so
/// the aggregator itself does not track session state.
#[derive(Debug, Default)]
pub struct ChunkAggregator {
    fragments: Vec<Vec<u8>>,
    /// Running total of bytes across all fragments.
    byte_len: usize,
}

impl ChunkAggregator {
    /// Create an empty aggregator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `fragment` to the tail of the sequence.
    ///
    /// Empty fragments are kept; they contribute nothing to the frozen buffer
    /// but still count towards [`fragment_count`](Self::fragment_count).
    pub fn append(&mut self, fragment: Vec<u8>) {
        self.byte_len += fragment.len();
        self.fragments.push(fragment);
    }

    /// Concatenate every fragment in arrival order and reset the aggregator.
    ///
    /// Freezing an empty aggregator yields an empty buffer.
    pub fn freeze(&mut self) -> Vec<u8> {
        let mut data = Vec::with_capacity(self.byte_len);
        for fragment in self.fragments.drain(..) {
            data.extend_from_slice(&fragment);
        }
        self.byte_len = 0;
        data
    }

    /// Drop all collected fragments without producing a buffer.
    pub fn discard(&mut self) {
        self.fragments.clear();
        self.byte_len = 0;
    }

    /// Number of fragments received since the last reset.
    pub fn fragment_count(&self) -> usize {
        self.fragments.len()
    }

    /// Total number of bytes received since the last reset.
    pub fn byte_len(&self) -> usize {
        self.byte_len
    }

    /// Returns `true` when no fragment has been appended since the last reset.
    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
