//! Microphone sample pipeline.
//!
//! The real-time audio callback runs on its own thread and must never
//! block. It hands sample chunks to a [`SampleSender`], which forwards them
//! over an unbounded channel. A tokio task owns the [`FrameBuffer`], packs
//! frames and hands each full frame to a [`FrameSink`].
//!
//! ```text
//! audio thread ──push()──► unbounded channel ──► AudioCapture task ──► FrameSink
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};

use super::frame::{AudioFrame, FrameBuffer, FrameCapacity};

// ============================================================================
// Delivery
// ============================================================================

/// How the renderer should schedule a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Append to the playback queue.
    Queued,
    /// Play out of order, bypassing the queue.
    Immediate,
}

// ============================================================================
// FrameSink
// ============================================================================

/// Destination for packed frames.
pub trait FrameSink: Send + Sync {
    /// Sends one frame.
    fn send_frame(&self, frame: &AudioFrame, delivery: Delivery) -> Result<()>;
}

// ============================================================================
// SampleSender
// ============================================================================

/// Messages from the audio thread.
#[derive(Debug)]
enum CaptureMessage {
    /// Samples to accumulate.
    Samples(Vec<f32>),
    /// Samples to send at once as one immediate frame.
    Immediate(Vec<f32>),
}

/// Producer handle used from the real-time audio callback.
///
/// Fire-and-forget: no backpressure, never blocks.
#[derive(Clone)]
pub struct SampleSender {
    tx: mpsc::UnboundedSender<CaptureMessage>,
}

impl SampleSender {
    /// Queues samples for accumulation.
    ///
    /// Returns `false` once the capture task has stopped.
    pub fn push(&self, samples: &[f32]) -> bool {
        self.tx.send(CaptureMessage::Samples(samples.to_vec())).is_ok()
    }

    /// Queues samples to be sent as one frame marked for immediate playback.
    ///
    /// Returns `false` once the capture task has stopped.
    pub fn push_immediate(&self, samples: &[f32]) -> bool {
        self.tx
            .send(CaptureMessage::Immediate(samples.to_vec()))
            .is_ok()
    }

    /// Returns `true` once the capture task has stopped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl fmt::Debug for SampleSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampleSender")
            .field("closed", &self.is_closed())
            .finish()
    }
}

// ============================================================================
// CaptureStats
// ============================================================================

/// Counters reported when the capture task ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    /// Frames accepted by the sink.
    pub frames_sent: u64,
    /// Frames the sink rejected.
    pub frames_failed: u64,
}

// ============================================================================
// AudioCapture
// ============================================================================

/// Converts float samples into PCM16 frames and forwards them.
pub struct AudioCapture {
    buffer: FrameBuffer,
    sink: Arc<dyn FrameSink>,
    stats: CaptureStats,
}

impl AudioCapture {
    /// Creates a capture pipeline.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] if `capacity` is non-positive or non-integral.
    pub fn new<C>(capacity: C, sink: Arc<dyn FrameSink>) -> Result<Self>
    where
        C: TryInto<FrameCapacity, Error = Error>,
    {
        let capacity = capacity.try_into()?;
        debug!(capacity = capacity.get(), "Audio capture created");

        Ok(Self {
            buffer: FrameBuffer::new(capacity),
            sink,
            stats: CaptureStats::default(),
        })
    }

    /// Creates a pipeline and runs it on a tokio task.
    ///
    /// The task ends when every [`SampleSender`] clone is dropped.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] if `capacity` is non-positive or non-integral.
    pub fn spawn<C>(
        capacity: C,
        sink: Arc<dyn FrameSink>,
    ) -> Result<(SampleSender, JoinHandle<CaptureStats>)>
    where
        C: TryInto<FrameCapacity, Error = Error>,
    {
        let capture = Self::new(capacity, sink)?;
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(capture.run(rx));

        Ok((SampleSender { tx }, handle))
    }

    /// Accumulates samples, flushing every frame they complete.
    pub fn process(&mut self, samples: &[f32]) {
        for sample in samples {
            if let Some(frame) = self.buffer.push(*sample) {
                self.deliver(&frame, Delivery::Queued);
            }
        }
    }

    /// Sends `samples` as one frame marked for immediate playback.
    ///
    /// The accumulation buffer is left untouched.
    pub fn send_immediate(&mut self, samples: &[f32]) {
        if samples.is_empty() {
            return;
        }
        let frame = AudioFrame::from_f32(samples);
        self.deliver(&frame, Delivery::Immediate);
    }

    /// Returns counters so far.
    #[inline]
    #[must_use]
    pub fn stats(&self) -> CaptureStats {
        self.stats
    }

    /// Returns the frame capacity in samples.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    fn deliver(&mut self, frame: &AudioFrame, delivery: Delivery) {
        match self.sink.send_frame(frame, delivery) {
            Ok(()) => {
                self.stats.frames_sent += 1;
                trace!(samples = frame.len(), ?delivery, "Audio frame sent");
            }
            Err(e) => {
                self.stats.frames_failed += 1;
                warn!(error = %e, ?delivery, "Audio frame not sent");
            }
        }
    }

    /// Consumer loop.
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<CaptureMessage>) -> CaptureStats {
        while let Some(message) = rx.recv().await {
            match message {
                CaptureMessage::Samples(samples) => self.process(&samples),
                CaptureMessage::Immediate(samples) => self.send_immediate(&samples),
            }
        }

        debug!(
            sent = self.stats.frames_sent,
            failed = self.stats.frames_failed,
            "Audio capture stopped"
        );
        self.stats
    }
}

// ============================================================================
// Tests
// ============================================================================
