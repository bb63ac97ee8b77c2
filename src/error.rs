//! Error types for avatar-stream.
//!
//! Every failure in the crate, from configuration to remote shutdown, is one
//! [`Error`] variant; the controller decides retry versus abort by variant.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use avatar_stream::{Result, SessionController};
//!
//! async fn example(session: &SessionController) -> Result<()> {
//!     session.start().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants | Retried |
//! |----------|----------|---------|
//! | Configuration | [`Error::Config`], [`Error::UnknownEvent`] | never reaches network |
//! | Transient | [`Error::Connection`], [`Error::ConnectionTimeout`], [`Error::ConnectionClosed`], [`Error::Timeout`], [`Error::WebSocket`], [`Error::Media`] | yes |
//! | Protocol | [`Error::Protocol`], [`Error::Json`] | no |
//! | Remote | [`Error::Remote`] | no |
//! | Lifecycle | [`Error::NotOpen`], [`Error::SessionStopped`], [`Error::RetriesExhausted`] | no |
//! | External | [`Error::Io`], [`Error::Url`] | no |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;
use std::time::Duration;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned synchronously when session or capture configuration is
    /// invalid. Never reaches the network.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Event name not in the catalog.
    #[error("Unknown event: {name}")]
    UnknownEvent {
        /// The unrecognized event name.
        name: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Signaling or media connection failed.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Connection attempt exceeded its deadline.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Signaling connection closed unexpectedly.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Send attempted while the signaling channel is not open.
    #[error("Signaling channel is not open")]
    NotOpen,

    /// Injected media collaborator failed.
    #[error("Media error: {message}")]
    Media {
        /// Description of the media failure.
        message: String,
    },

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Malformed negotiation payload (answer or join info).
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    /// Remote end declared a fatal condition.
    #[error("Remote error: {reason}")]
    Remote {
        /// Raw message or reason reported by the remote.
        reason: String,
    },

    // ========================================================================
    // Execution Errors
    // ========================================================================
    /// Bounded wait expired.
    #[error("Timeout after {timeout_ms}ms: {operation}")]
    Timeout {
        /// Description of the operation that timed out.
        operation: String,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // Lifecycle Errors
    // ========================================================================
    /// Session was stopped and cannot be reused.
    #[error("Cannot reuse a stopped session")]
    SessionStopped,

    /// Retry budget exhausted.
    #[error("Connection failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        /// Number of attempts made.
        attempts: u32,
        /// Description of the last failure.
        last_error: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// URL parse error.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an unknown event error.
    #[inline]
    pub fn unknown_event(name: impl Into<String>) -> Self {
        Self::UnknownEvent { name: name.into() }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates a connection timeout error from the elapsed limit.
    ///
    /// Saturates at `u64::MAX` milliseconds.
    #[inline]
    pub fn connection_timeout_after(limit: Duration) -> Self {
        Self::connection_timeout(saturating_millis(limit))
    }

    /// Creates a media error.
    #[inline]
    pub fn media(message: impl Into<String>) -> Self {
        Self::Media {
            message: message.into(),
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a remote error.
    #[inline]
    pub fn remote(reason: impl Into<String>) -> Self {
        Self::Remote {
            reason: reason.into(),
        }
    }

    /// Creates a timeout error.
    #[inline]
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Creates a timeout error from the elapsed limit.
    ///
    /// Saturates at `u64::MAX` milliseconds.
    #[inline]
    pub fn timeout_after(operation: impl Into<String>, limit: Duration) -> Self {
        Self::timeout(operation, saturating_millis(limit))
    }

    /// Creates a retries exhausted error.
    #[inline]
    pub fn retries_exhausted(attempts: u32, last_error: impl Into<String>) -> Self {
        Self::RetriesExhausted {
            attempts,
            last_error: last_error.into(),
        }
    }
}

fn saturating_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::ConnectionTimeout { .. } | Self::Timeout { .. })
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
                | Self::NotOpen
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if the failure must end the session attempt without retry.
    ///
    /// Protocol violations and remote-declared failures are never masked by
    /// a subsequent retry.
    #[inline]
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Protocol { .. }
                | Self::Json(_)
                | Self::Remote { .. }
                | Self::Config { .. }
                | Self::UnknownEvent { .. }
                | Self::SessionStopped
                | Self::RetriesExhausted { .. }
                | Self::Url(_)
        )
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors may succeed on retry.
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !self.is_fatal()
    }
}

// ============================================================================
// Tests
// ============================================================================
