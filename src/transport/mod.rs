//! Transport layer: signaling channel plus one media path.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────┐                     ┌──────────────────────┐
//! │  Transport            │      WebSocket      │  Control endpoint    │
//! │                       │◄───────────────────►│                      │
//! │  SignalingChannel     │  tokens, offer,     │                      │
//! │  EventBus             │  PCM frames         │                      │
//! │                       │                     └──────────────────────┘
//! │  PeerConnection  ─────┼──── direct media ──►  Avatar renderer
//! │   or RelayRoom   ─────┼──── relay session ─►  Relay (SFU)
//! └───────────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. [`Transport::new`] - create the media-path handle, no I/O
//! 2. [`Transport::connect`] - signaling, negotiation, first video frame
//! 3. Audio frames flow through [`Transport::signaling`]
//! 4. [`Transport::disconnect`] - `DONE`, close signaling, release media
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `core` | State shared by both variants |
//! | `direct` | Peer-to-peer variant |
//! | `media` | Injected media collaborators |
//! | `relay` | Relay session variant |
//! | `signaling` | WebSocket channel and dispatch |

// ============================================================================
// Submodules
// ============================================================================

mod core;

/// Direct peer-to-peer transport.
pub mod direct;

/// Media-path collaborator traits.
pub mod media;

/// Relay session transport.
pub mod relay;

/// WebSocket signaling channel.
pub mod signaling;

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use tracing::debug;
use url::Url;

use crate::api::IceServer;
use crate::error::{Error, Result};
use crate::events::{Event, EventKind, Listener};
use crate::identifiers::SessionToken;

use self::core::TransportCore;

// ============================================================================
// Re-exports
// ============================================================================

pub use direct::DirectTransport;
pub use media::{
    GatheringState, MediaBackend, MediaEvent, MediaHandler, MediaSink, MediaSinks,
    PeerConnection, RelayRoom, RemoteTrack, TrackKind,
};
pub use relay::RelayTransport;
pub use signaling::{ChannelState, SignalingChannel};

// ============================================================================
// TransportMode
// ============================================================================

/// Which transport variant to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportMode {
    /// Lower-latency direct peer connection.
    #[default]
    Direct,
    /// NAT/firewall-robust relay session.
    Relay,
}

impl TransportMode {
    /// Returns the mode name.
    #[inline]
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Relay => "relay",
        }
    }

    /// Path segments appended to the signaling base URL.
    #[inline]
    #[must_use]
    pub const fn path_segments(&self) -> &'static [&'static str] {
        match self {
            Self::Direct => &["ws"],
            Self::Relay => &["ws", "sfu"],
        }
    }

    /// Builds `<base>/<mode-path>?session_token=<token>[&enableSFU=true]`.
    ///
    /// `http`/`https` bases are mapped to `ws`/`wss`.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] if the base URL cannot carry a path or has an
    /// unsupported scheme.
    pub fn signaling_url(&self, base: &Url, token: &SessionToken) -> Result<Url> {
        let mut url = base.clone();

        let scheme = match base.scheme() {
            "ws" | "http" => "ws",
            "wss" | "https" => "wss",
            other => {
                return Err(Error::config(format!(
                    "unsupported signaling scheme: {other}"
                )));
            }
        };
        url.set_scheme(scheme)
            .map_err(|()| Error::config(format!("cannot use scheme {scheme} for {base}")))?;

        url.path_segments_mut()
            .map_err(|()| Error::config(format!("signaling URL cannot be a base: {base}")))?
            .pop_if_empty()
            .extend(self.path_segments());

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("session_token", token.as_str());
            if *self == Self::Relay {
                query.append_pair("enableSFU", "true");
            }
        }

        Ok(url)
    }
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// MediaContext
// ============================================================================

/// Collaborators every transport is built with.
#[derive(Clone)]
pub struct MediaContext {
    /// Factory for media-path handles.
    pub backend: Arc<dyn MediaBackend>,
    /// Output sinks for inbound tracks.
    pub sinks: MediaSinks,
    /// ICE servers for direct connections.
    pub ice_servers: Vec<IceServer>,
}

impl fmt::Debug for MediaContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaContext")
            .field("ice_servers", &self.ice_servers)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Transport
// ============================================================================

/// One connection attempt's transport, tagged by variant.
pub enum Transport {
    /// Direct peer connection.
    Direct(DirectTransport),
    /// Relay session.
    Relay(RelayTransport),
}

impl Transport {
    /// Builds the variant for `mode`. No network I/O.
    ///
    /// # Errors
    ///
    /// Whatever the media backend reports.
    pub fn new(mode: TransportMode, signaling_url: Url, media: &MediaContext) -> Result<Self> {
        debug!(%mode, "Building transport");
        match mode {
            TransportMode::Direct => Ok(Self::Direct(DirectTransport::new(signaling_url, media)?)),
            TransportMode::Relay => Ok(Self::Relay(RelayTransport::new(signaling_url, media)?)),
        }
    }

    /// Returns the variant's mode.
    #[inline]
    #[must_use]
    pub const fn mode(&self) -> TransportMode {
        match self {
            Self::Direct(_) => TransportMode::Direct,
            Self::Relay(_) => TransportMode::Relay,
        }
    }

    /// Establishes signaling, negotiates and waits for the first video frame.
    ///
    /// # Errors
    ///
    /// See [`DirectTransport::connect`] and [`RelayTransport::connect`].
    pub async fn connect(&self) -> Result<()> {
        match self {
            Self::Direct(transport) => transport.connect().await,
            Self::Relay(transport) => transport.connect().await,
        }
    }

    /// Best-effort teardown. Always completes.
    pub async fn disconnect(&self) {
        match self {
            Self::Direct(transport) => transport.disconnect().await,
            Self::Relay(transport) => transport.disconnect().await,
        }
    }

    /// Registers a listener on this transport's registry.
    pub fn on(&self, kind: EventKind, listener: Listener) -> bool {
        self.core().events().on(kind, listener)
    }

    /// Removes a listener from this transport's registry.
    pub fn off(&self, kind: EventKind, listener: &Listener) -> bool {
        self.core().events().off(kind, listener)
    }

    /// Emits an event on this transport's registry.
    pub fn emit(&self, event: &Event) {
        self.core().events().emit(event);
    }

    /// Returns the owned signaling channel.
    #[inline]
    #[must_use]
    pub fn signaling(&self) -> &SignalingChannel {
        self.core().signaling()
    }

    /// Returns `true` once the first video frame was presented.
    #[inline]
    #[must_use]
    pub fn is_video_started(&self) -> bool {
        self.core().video_started()
    }

    fn core(&self) -> &TransportCore {
        match self {
            Self::Direct(transport) => transport.core(),
            Self::Relay(transport) => transport.core(),
        }
    }
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("mode", &self.mode())
            .field("signaling", &self.signaling().state())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
