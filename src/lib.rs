//! Avatar Stream - connection orchestration for live avatar sessions.
//!
//! This library connects a client to a remote avatar renderer: it opens a
//! signaling channel, negotiates a media path, streams microphone audio up
//! and routes the rendered audio/video back to caller-provided sinks.
//!
//! # Architecture
//!
//! - **Session**: [`SessionController`] owns the active transport, retries
//!   transient failures and falls back from direct to relay
//! - **Transport**: a signaling channel plus one media path, either a direct
//!   peer connection or a relay session
//! - **Media**: the peer stack, relay client and render sinks are injected
//!   through [`MediaBackend`] and [`MediaSink`]
//!
//! Key design principles:
//!
//! - One transport per attempt, never reused
//! - Caller subscriptions survive transport replacement
//! - Audio is gated on the remote `ACK`
//! - Event-driven dispatch, one listener's panic never reaches another
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use avatar_stream::{MediaBackend, MediaSinks, Result, SessionConfig, SessionController};
//!
//! async fn run(backend: Arc<dyn MediaBackend>, sinks: MediaSinks) -> Result<()> {
//!     let config = SessionConfig::builder()
//!         .token("session-token")
//!         .signaling_url("wss://api.example.com/v1")
//!         .build()?;
//!
//!     let session = SessionController::new(config, backend, sinks);
//!     session.start().await?;
//!
//!     let (microphone, _task) = session.start_audio()?;
//!     microphone.push(&[0.0; 4096]);
//!
//!     session.stop().await;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`api`] | Session-creation and ICE server payloads |
//! | [`audio`] | Microphone capture and PCM16 framing |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`events`] | Event catalog and listener registry |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | Signaling message types |
//! | [`session`] | Session controller and configuration |
//! | [`transport`] | Signaling channel and transport variants |

// ============================================================================
// Modules
// ============================================================================

/// Session-creation and ICE server payloads.
pub mod api;

/// Microphone capture and PCM16 framing.
pub mod audio;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Event catalog and listener registry.
pub mod events;

/// Type-safe identifiers.
pub mod identifiers;

/// Signaling protocol message types.
pub mod protocol;

/// Session orchestration.
///
/// Use [`SessionConfig::builder()`] to create a configured session.
pub mod session;

/// Signaling channel and transport variants.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// API payloads
pub use api::{IceServer, SessionRequest, SessionTokenResponse};

// Audio types
pub use audio::{
    AudioCapture, AudioFrame, CaptureStats, Delivery, FrameBuffer, FrameCapacity, FrameSink,
    SampleSender,
};

// Error types
pub use error::{Error, Result};

// Event types
pub use events::{Event, EventBus, EventKind, Listener};

// Identifier types
pub use identifiers::{SessionId, SessionToken};

// Protocol types
pub use protocol::{ControlSignal, JoinInfo, SessionDescription};

// Session types
pub use session::{SessionConfig, SessionConfigBuilder, SessionController, SessionState};

// Transport types
pub use transport::{
    ChannelState, MediaBackend, MediaContext, MediaEvent, MediaHandler, MediaSink, MediaSinks,
    PeerConnection, RelayRoom, RemoteTrack, SignalingChannel, TrackKind, Transport, TransportMode,
};
