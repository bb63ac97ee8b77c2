//! Media-path collaborators injected into transports.
//!
//! The crate orchestrates connections; it does not implement a WebRTC stack
//! or a relay client. Those are supplied by the caller through
//! [`MediaBackend`], and output sinks through [`MediaSinks`].

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::api::IceServer;
use crate::error::Result;
use crate::protocol::SessionDescription;

// ============================================================================
// Types
// ============================================================================

/// Callback receiving media-path notifications.
pub type MediaHandler = Arc<dyn Fn(MediaEvent) + Send + Sync>;

/// Kind of media carried by a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    /// Audio track.
    Audio,
    /// Video track.
    Video,
}

/// An inbound track offered by the remote renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTrack {
    /// Media kind.
    pub kind: TrackKind,
    /// Backend-assigned track identifier.
    pub id: String,
}

impl RemoteTrack {
    /// Creates a track descriptor.
    #[must_use]
    pub fn new(kind: TrackKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

/// ICE candidate gathering state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GatheringState {
    /// Gathering not started.
    #[default]
    New,
    /// Candidates are being collected.
    Gathering,
    /// Backend reports gathering finished.
    Complete,
}

/// Notification from a media path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaEvent {
    /// Remote track became available.
    Track(RemoteTrack),
    /// First inbound video frame was presented.
    FirstVideoFrame,
    /// Media path dropped.
    Disconnected(String),
}

// ============================================================================
// MediaSink
// ============================================================================

/// Output for an inbound track (video surface, audio device).
///
/// Sinks are opaque: the crate only ever attaches tracks to them.
pub trait MediaSink: Send + Sync {
    /// Attaches an inbound track.
    fn attach(&self, track: &RemoteTrack);
}

/// The pair of output sinks passed at construction.
#[derive(Clone)]
pub struct MediaSinks {
    /// Receives video tracks.
    pub video: Arc<dyn MediaSink>,
    /// Receives audio tracks.
    pub audio: Arc<dyn MediaSink>,
}

impl MediaSinks {
    /// Creates a sink pair.
    #[must_use]
    pub fn new(video: Arc<dyn MediaSink>, audio: Arc<dyn MediaSink>) -> Self {
        Self { video, audio }
    }

    /// Routes a track to the sink of its kind.
    pub fn attach(&self, track: &RemoteTrack) {
        match track.kind {
            TrackKind::Video => self.video.attach(track),
            TrackKind::Audio => self.audio.attach(track),
        }
    }
}

impl fmt::Debug for MediaSinks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaSinks").finish_non_exhaustive()
    }
}

// ============================================================================
// PeerConnection
// ============================================================================

/// A direct peer media path.
#[async_trait]
pub trait PeerConnection: Send + Sync {
    /// Adds a receive-only transceiver.
    fn add_recv_only(&self, kind: TrackKind) -> Result<()>;

    /// Creates a local offer.
    async fn create_offer(&self) -> Result<SessionDescription>;

    /// Applies the local description and starts gathering.
    async fn set_local_description(&self, description: SessionDescription) -> Result<()>;

    /// Current local description, including gathered candidates.
    fn local_description(&self) -> Option<SessionDescription>;

    /// Current gathering state.
    fn gathering_state(&self) -> GatheringState;

    /// Number of local candidates observed so far.
    fn candidate_count(&self) -> usize;

    /// Applies the remote answer.
    async fn set_remote_description(&self, description: SessionDescription) -> Result<()>;

    /// Installs the media notification callback.
    fn set_media_handler(&self, handler: MediaHandler);

    /// Releases the connection.
    async fn close(&self) -> Result<()>;
}

// ============================================================================
// RelayRoom
// ============================================================================

/// A relay (SFU) session client.
#[async_trait]
pub trait RelayRoom: Send + Sync {
    /// Installs the media notification callback.
    fn set_media_handler(&self, handler: MediaHandler);

    /// Joins the relay session.
    async fn join(&self, url: &str, token: &str) -> Result<()>;

    /// Leaves the relay session.
    async fn leave(&self) -> Result<()>;
}

// ============================================================================
// MediaBackend
// ============================================================================

/// Factory for media-path handles, one per transport instance.
pub trait MediaBackend: Send + Sync {
    /// Creates a peer connection configured with `ice_servers`.
    fn create_peer(&self, ice_servers: &[IceServer]) -> Result<Arc<dyn PeerConnection>>;

    /// Creates a relay session client.
    fn create_relay_room(&self) -> Result<Arc<dyn RelayRoom>>;
}

// ============================================================================
// Tests
// ============================================================================
