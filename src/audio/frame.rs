//! Fixed-size PCM16 frames.
//!
//! Samples arrive as `f32` in `[-1, 1]` and are stored as signed 16-bit
//! integers. A [`FrameBuffer`] hands out an [`AudioFrame`] the instant it
//! fills and starts over at index zero.

// ============================================================================
// Imports
// ============================================================================

use std::num::NonZeroUsize;

use crate::error::{Error, Result};

// ============================================================================
// Conversion
// ============================================================================

/// Converts one float sample to PCM16.
///
/// `round(clamp(v, -1, 1) * 32767)`; NaN maps to silence.
#[inline]
#[must_use]
pub fn sample_to_pcm(sample: f32) -> i16 {
    if sample.is_nan() {
        return 0;
    }
    (f64::from(sample.clamp(-1.0, 1.0)) * f64::from(i16::MAX)).round() as i16
}

// ============================================================================
// FrameCapacity
// ============================================================================

/// Number of samples per frame. Always a positive integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameCapacity(NonZeroUsize);

impl FrameCapacity {
    /// Default frame size in samples.
    pub const DEFAULT: Self = Self(NonZeroUsize::MIN.saturating_add(4095));

    /// Validates a sample count.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] if `samples` is zero.
    pub fn new(samples: usize) -> Result<Self> {
        NonZeroUsize::new(samples)
            .map(Self)
            .ok_or_else(|| Error::config("audio frame capacity must be positive"))
    }

    /// Returns the capacity in samples.
    #[inline]
    #[must_use]
    pub const fn get(&self) -> usize {
        self.0.get()
    }

    /// Returns the encoded frame size in bytes.
    #[inline]
    #[must_use]
    pub const fn byte_len(&self) -> usize {
        self.0.get() * 2
    }
}

impl Default for FrameCapacity {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<usize> for FrameCapacity {
    type Error = Error;

    fn try_from(samples: usize) -> Result<Self> {
        Self::new(samples)
    }
}

impl TryFrom<i64> for FrameCapacity {
    type Error = Error;

    fn try_from(samples: i64) -> Result<Self> {
        let samples = usize::try_from(samples)
            .map_err(|_| Error::config(format!("audio frame capacity must be positive, got {samples}")))?;
        Self::new(samples)
    }
}

impl TryFrom<f64> for FrameCapacity {
    type Error = Error;

    fn try_from(samples: f64) -> Result<Self> {
        if !samples.is_finite() || samples.fract() != 0.0 {
            return Err(Error::config(format!(
                "audio frame capacity must be an integer, got {samples}"
            )));
        }
        if samples < 1.0 || samples > usize::MAX as f64 {
            return Err(Error::config(format!(
                "audio frame capacity must be positive, got {samples}"
            )));
        }
        Self::new(samples as usize)
    }
}

// ============================================================================
// AudioFrame
// ============================================================================

/// One complete frame of PCM16 samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    samples: Vec<i16>,
}

impl AudioFrame {
    /// Wraps already-converted samples.
    #[inline]
    #[must_use]
    pub fn new(samples: Vec<i16>) -> Self {
        Self { samples }
    }

    /// Converts float samples into a frame.
    #[must_use]
    pub fn from_f32(samples: &[f32]) -> Self {
        Self::new(samples.iter().copied().map(sample_to_pcm).collect())
    }

    /// Returns the samples.
    #[inline]
    #[must_use]
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    /// Returns the number of samples.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns `true` if the frame has no samples.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Encodes the frame as little-endian PCM16.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        self.samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }
}

// ============================================================================
// FrameBuffer
// ============================================================================

/// Fixed-capacity accumulator.
#[derive(Debug)]
pub struct FrameBuffer {
    samples: Box<[i16]>,
    index: usize,
}

impl FrameBuffer {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new(capacity: FrameCapacity) -> Self {
        Self {
            samples: vec![0; capacity.get()].into_boxed_slice(),
            index: 0,
        }
    }

    /// Appends one sample; returns the full frame when this sample fills it.
    pub fn push(&mut self, sample: f32) -> Option<AudioFrame> {
        self.samples[self.index] = sample_to_pcm(sample);
        self.index += 1;

        if self.index < self.samples.len() {
            return None;
        }

        self.index = 0;
        Some(AudioFrame::new(self.samples.to_vec()))
    }

    /// Appends many samples, collecting every frame they complete.
    pub fn extend(&mut self, samples: &[f32]) -> Vec<AudioFrame> {
        samples.iter().filter_map(|s| self.push(*s)).collect()
    }

    /// Number of samples waiting in the current frame.
    #[inline]
    #[must_use]
    pub fn pending(&self) -> usize {
        self.index
    }

    /// Returns the configured capacity in samples.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.samples.len()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    #[test]
    fn test_sample_mapping_edges() {
        assert_eq!(sample_to_pcm(0.0), 0);
        assert_eq!(sample_to_pcm(1.0), 32767);
        assert_eq!(sample_to_pcm(-1.0), -32767);
        assert_eq!(sample_to_pcm(2.5), 32767);
        assert_eq!(sample_to_pcm(-7.0), -32767);
        assert_eq!(sample_to_pcm(0.5), 16384);
        assert_eq!(sample_to_pcm(f32::NAN), 0);
    }

    #[test]
    fn test_capacity_rejects_zero() {
        assert!(FrameCapacity::new(0).is_err());
        assert_eq!(FrameCapacity::new(3).expect("positive").byte_len(), 6);
        assert_eq!(FrameCapacity::default().get(), 4096);
    }

    #[test]
    fn test_capacity_from_float() {
        assert_eq!(FrameCapacity::try_from(128.0_f64).expect("integral").get(), 128);
        assert!(FrameCapacity::try_from(12.5_f64).is_err());
        assert!(FrameCapacity::try_from(f64::NAN).is_err());
        assert!(FrameCapacity::try_from(f64::INFINITY).is_err());
        assert!(FrameCapacity::try_from(-0.0_f64).is_err());
    }

    #[test]
    fn test_buffer_flushes_exactly_at_capacity() {
        let mut buffer = FrameBuffer::new(FrameCapacity::new(4).expect("capacity"));

        assert!(buffer.push(0.1).is_none());
        assert!(buffer.push(0.2).is_none());
        assert!(buffer.push(0.3).is_none());
        let frame = buffer.push(0.4).expect("full frame");

        assert_eq!(frame.len(), 4);
        assert_eq!(frame.to_bytes().len(), 8);
        assert_eq!(buffer.pending(), 0);
    }

    #[test]
    fn test_extend_carries_remainder() {
        let mut buffer = FrameBuffer::new(FrameCapacity::new(3).expect("capacity"));
        let frames = buffer.extend(&[0.0; 7]);

        assert_eq!(frames.len(), 2);
        assert_eq!(buffer.pending(), 1);
    }

    #[test]
    fn test_frame_bytes_little_endian() {
        let frame = AudioFrame::new(vec![1, -2]);
        assert_eq!(frame.to_bytes(), vec![0x01, 0x00, 0xFE, 0xFF]);
    }

    proptest! {
        #[test]
        fn prop_mapping_matches_formula(v in -4.0f32..4.0) {
            let expected = (f64::from(v.clamp(-1.0, 1.0)) * 32767.0).round() as i16;
            prop_assert_eq!(sample_to_pcm(v), expected);
        }

        #[test]
        fn prop_non_positive_capacity_rejected(n in i64::MIN..=0) {
            prop_assert!(FrameCapacity::try_from(n).is_err());
        }

        #[test]
        fn prop_non_integral_capacity_rejected(n in 1u32..100_000, frac in 0.01f64..0.99) {
            prop_assert!(FrameCapacity::try_from(f64::from(n) + frac).is_err());
        }

        #[test]
        fn prop_full_capacity_yields_one_frame(capacity in 1usize..2048) {
            let mut buffer = FrameBuffer::new(FrameCapacity::new(capacity).unwrap());
            let frames = buffer.extend(&vec![0.25; capacity]);

            prop_assert_eq!(frames.len(), 1);
            prop_assert_eq!(frames[0].to_bytes().len(), capacity * 2);
            prop_assert_eq!(buffer.pending(), 0);
        }
    }
}
