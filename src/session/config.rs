//! Session configuration and its builder.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use avatar_stream::{SessionConfig, TransportMode};
//!
//! # fn example() -> avatar_stream::Result<()> {
//! let config = SessionConfig::builder()
//!     .token("session-token")
//!     .signaling_url("wss://api.example.com/v1")
//!     .mode(TransportMode::Direct)
//!     .max_retries(5)
//!     .retry_delay(Duration::from_secs(1))
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use url::Url;

use crate::api::{IceServer, default_ice_servers};
use crate::audio::FrameCapacity;
use crate::error::{Error, Result};
use crate::identifiers::SessionToken;
use crate::transport::TransportMode;

// ============================================================================
// Constants
// ============================================================================

/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Default fixed delay between attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Default global bound on one connection attempt.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Default microphone sample rate.
pub const DEFAULT_SAMPLE_RATE: u32 = 16_000;

// ============================================================================
// SessionConfig
// ============================================================================

/// Validated session configuration.
///
/// Use [`SessionConfig::builder()`] to create one.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Server-issued session credential.
    pub token: SessionToken,
    /// Signaling base URL (mode path and query are appended).
    pub signaling_url: Url,
    /// Initially configured transport variant.
    pub mode: TransportMode,
    /// ICE servers for direct connections.
    pub ice_servers: Vec<IceServer>,
    /// Retries allowed after the first attempt.
    pub max_retries: u32,
    /// Fixed delay between attempts.
    pub retry_delay: Duration,
    /// Global bound on one connection attempt.
    pub connect_timeout: Duration,
    /// Samples per outbound audio frame.
    pub frame_capacity: FrameCapacity,
    /// Microphone sample rate in Hz.
    pub sample_rate: u32,
}

impl SessionConfig {
    /// Creates a new builder.
    #[inline]
    #[must_use]
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::new()
    }

    /// Duration of one audio frame at the configured sample rate.
    #[must_use]
    pub fn frame_duration(&self) -> Duration {
        Duration::from_secs_f64(self.frame_capacity.get() as f64 / f64::from(self.sample_rate))
    }
}

// ============================================================================
// SessionConfigBuilder
// ============================================================================

/// Builder for [`SessionConfig`].
#[derive(Debug, Clone)]
pub struct SessionConfigBuilder {
    token: Option<String>,
    signaling_url: Option<String>,
    mode: TransportMode,
    ice_servers: Option<Vec<IceServer>>,
    max_retries: u32,
    retry_delay: Duration,
    connect_timeout: Duration,
    frame_capacity: Option<f64>,
    sample_rate: u32,
}

impl Default for SessionConfigBuilder {
    fn default() -> Self {
        Self {
            token: None,
            signaling_url: None,
            mode: TransportMode::default(),
            ice_servers: None,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            frame_capacity: None,
            sample_rate: DEFAULT_SAMPLE_RATE,
        }
    }
}

impl SessionConfigBuilder {
    /// Creates a builder with defaults.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the session token.
    #[inline]
    #[must_use]
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Sets the signaling base URL.
    #[inline]
    #[must_use]
    pub fn signaling_url(mut self, url: impl Into<String>) -> Self {
        self.signaling_url = Some(url.into());
        self
    }

    /// Sets the initial transport variant.
    #[inline]
    #[must_use]
    pub fn mode(mut self, mode: TransportMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the ICE servers. An empty list falls back to public STUN.
    #[inline]
    #[must_use]
    pub fn ice_servers(mut self, servers: Vec<IceServer>) -> Self {
        self.ice_servers = Some(servers);
        self
    }

    /// Sets the retries allowed after the first attempt.
    #[inline]
    #[must_use]
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Sets the fixed delay between attempts.
    #[inline]
    #[must_use]
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Sets the global bound on one connection attempt.
    #[inline]
    #[must_use]
    pub fn connect_timeout(mut self, limit: Duration) -> Self {
        self.connect_timeout = limit;
        self
    }

    /// Sets samples per audio frame. Validated by [`build`](Self::build).
    #[inline]
    #[must_use]
    pub fn frame_capacity(mut self, samples: f64) -> Self {
        self.frame_capacity = Some(samples);
        self
    }

    /// Sets the microphone sample rate in Hz.
    #[inline]
    #[must_use]
    pub fn sample_rate(mut self, hz: u32) -> Self {
        self.sample_rate = hz;
        self
    }

    /// Builds the configuration with validation.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the token is missing or blank
    /// - [`Error::Config`] if the signaling URL is missing, malformed or not
    ///   `ws`/`wss`/`http`/`https`
    /// - [`Error::Config`] if the frame capacity is non-positive or
    ///   non-integral
    /// - [`Error::Config`] if the sample rate or connect timeout is zero
    pub fn build(self) -> Result<SessionConfig> {
        let token = self.validate_token()?;
        let signaling_url = self.validate_signaling_url()?;
        let frame_capacity = match self.frame_capacity {
            Some(samples) => FrameCapacity::try_from(samples)?,
            None => FrameCapacity::default(),
        };

        if self.sample_rate == 0 {
            return Err(Error::config("sample rate must be positive"));
        }
        if self.connect_timeout.is_zero() {
            return Err(Error::config("connect timeout must be positive"));
        }

        let ice_servers = match self.ice_servers {
            Some(servers) if !servers.is_empty() => servers,
            _ => default_ice_servers(),
        };

        Ok(SessionConfig {
            token,
            signaling_url,
            mode: self.mode,
            ice_servers,
            max_retries: self.max_retries,
            retry_delay: self.retry_delay,
            connect_timeout: self.connect_timeout,
            frame_capacity,
            sample_rate: self.sample_rate,
        })
    }
}

// ============================================================================
// Validation
// ============================================================================

impl SessionConfigBuilder {
    fn validate_token(&self) -> Result<SessionToken> {
        let raw = self.token.clone().ok_or_else(|| {
            Error::config("session token is required. Use .token() to set it.")
        })?;
        SessionToken::new(raw).ok_or_else(|| Error::config("session token must not be blank"))
    }

    fn validate_signaling_url(&self) -> Result<Url> {
        let raw = self.signaling_url.as_deref().ok_or_else(|| {
            Error::config(
                "signaling URL is required. Use .signaling_url() to set it.\n\
                 Example: SessionConfig::builder().signaling_url(\"wss://api.example.com/v1\")",
            )
        })?;

        let url = Url::parse(raw)
            .map_err(|e| Error::config(format!("malformed signaling URL {raw:?}: {e}")))?;

        if !matches!(url.scheme(), "ws" | "wss" | "http" | "https") {
            return Err(Error::config(format!(
                "signaling URL must use ws, wss, http or https: {raw}"
            )));
        }
        if url.cannot_be_a_base() {
            return Err(Error::config(format!(
                "signaling URL cannot carry a path: {raw}"
            )));
        }

        Ok(url)
    }
}

// ============================================================================
// Tests
// ============================================================================
