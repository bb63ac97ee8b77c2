//! Session lifecycle states.
//!
//! ```text
//! Idle → Connecting → Connected → (Reconnecting ⇄ Connecting) → Disconnected
//!   └──────────────── stop() from anywhere ────────────────→ Terminal
//! ```

use std::fmt;

/// Lifecycle state of a [`SessionController`](crate::SessionController).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Constructed, `start()` not called yet.
    #[default]
    Idle,
    /// A connection attempt is in flight.
    Connecting,
    /// First video frame presented.
    Connected,
    /// Waiting out the retry delay after a transient failure.
    Reconnecting,
    /// Failed fatally, exhausted retries, or ended by the remote.
    Disconnected,
    /// Stopped by the caller.
    Terminal,
}

impl SessionState {
    /// Returns the state name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Disconnected => "disconnected",
            Self::Terminal => "terminal",
        }
    }

    /// Returns `true` while an attempt or its retry delay is pending.
    #[inline]
    #[must_use]
    pub const fn is_connecting(&self) -> bool {
        matches!(self, Self::Connecting | Self::Reconnecting)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_idle() {
        assert_eq!(SessionState::default(), SessionState::Idle);
    }

    #[test]
    fn test_is_connecting() {
        assert!(SessionState::Connecting.is_connecting());
        assert!(SessionState::Reconnecting.is_connecting());
        assert!(!SessionState::Connected.is_connecting());
        assert_eq!(SessionState::Terminal.to_string(), "terminal");
    }
}
