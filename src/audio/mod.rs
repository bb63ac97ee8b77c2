//! Audio capture pipeline.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`AudioCapture`] | Packs float samples into PCM16 frames |
//! | [`SampleSender`] | Non-blocking producer handle for the audio thread |
//! | [`FrameSink`] | Destination for packed frames |
//! | [`FrameBuffer`] | Fixed-capacity accumulator |
//! | [`FrameCapacity`] | Validated samples-per-frame |

// ============================================================================
// Submodules
// ============================================================================

/// Producer/consumer pipeline.
pub mod capture;

/// PCM16 frame types and conversion.
pub mod frame;

// ============================================================================
// Re-exports
// ============================================================================

pub use capture::{AudioCapture, CaptureStats, Delivery, FrameSink, SampleSender};
pub use frame::{AudioFrame, FrameBuffer, FrameCapacity, sample_to_pcm};
