//! Direct peer-to-peer transport.
//!
//! # Negotiation
//!
//! 1. Create a local offer and apply it
//! 2. Wait for candidate gathering to settle (see [`wait_for_gathering`])
//! 3. Open signaling, send the local description as offer
//! 4. Apply the first `connection_info` payload as remote answer
//! 5. Resolve on the first presented video frame

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::protocol::SessionDescription;

use super::core::TransportCore;
use super::media::{GatheringState, PeerConnection, TrackKind};
use super::{MediaContext, TransportMode};

// ============================================================================
// Constants
// ============================================================================

/// Candidate count polling interval.
pub const CANDIDATE_POLL_INTERVAL: Duration = Duration::from_millis(150);

/// Upper bound on candidate gathering.
pub const GATHERING_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound on waiting for the remote answer.
pub const ANSWER_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// DirectTransport
// ============================================================================

/// Transport over a direct peer connection.
pub struct DirectTransport {
    core: TransportCore,
    peer: Arc<dyn PeerConnection>,
}

impl DirectTransport {
    /// Creates the peer connection with receive-only audio and video legs.
    ///
    /// # Errors
    ///
    /// Whatever the backend reports when creating or configuring the peer.
    pub fn new(signaling_url: Url, media: &MediaContext) -> Result<Self> {
        let peer = media.backend.create_peer(&media.ice_servers)?;
        peer.add_recv_only(TrackKind::Audio)?;
        peer.add_recv_only(TrackKind::Video)?;

        let core = TransportCore::new(TransportMode::Direct, signaling_url, media.sinks.clone());
        peer.set_media_handler(core.media_handler());

        debug!(ice_servers = media.ice_servers.len(), "Direct transport created");
        Ok(Self { core, peer })
    }

    /// Negotiates the peer connection and waits for video.
    ///
    /// # Errors
    ///
    /// - [`Error::Timeout`] if gathering or the answer exceeds 10s
    /// - [`Error::Protocol`] if the answer is malformed
    /// - [`Error::Remote`] if the remote reports a failure
    /// - connection errors from the signaling channel
    pub async fn connect(&self) -> Result<()> {
        let offer = self.peer.create_offer().await?;
        self.peer.set_local_description(offer.clone()).await?;

        wait_for_gathering(self.peer.as_ref(), CANDIDATE_POLL_INTERVAL, GATHERING_TIMEOUT).await?;
        debug!(
            candidates = self.peer.candidate_count(),
            "Candidate gathering settled"
        );

        self.core.signaling().connect().await?;

        let local = self.peer.local_description().unwrap_or(offer);
        self.core.signaling().send_offer(&local)?;

        let raw = self
            .core
            .wait_connection_info(ANSWER_TIMEOUT, "waiting for answer")
            .await?;
        let answer = SessionDescription::parse_answer(&raw).map_err(|e| self.core.fail_protocol(e))?;

        self.peer.set_remote_description(answer).await?;
        info!("Remote answer applied");

        self.core.wait_video_started().await
    }

    /// Best-effort teardown; never fails.
    pub async fn disconnect(&self) {
        self.core.teardown_signaling();

        if let Err(e) = self.peer.close().await {
            warn!(error = %e, "Failed to close peer connection");
        }
    }

    /// Returns the shared transport state.
    #[inline]
    pub(crate) fn core(&self) -> &TransportCore {
        &self.core
    }
}

// ============================================================================
// Gathering
// ============================================================================

/// Waits for local candidate gathering to settle.
///
/// Settled means the backend reports [`GatheringState::Complete`], or the
/// candidate count did not change across one `interval`, whichever comes
/// first.
///
/// # Errors
///
/// [`Error::Timeout`] if not settled within `limit`.
pub async fn wait_for_gathering(
    peer: &dyn PeerConnection,
    interval: Duration,
    limit: Duration,
) -> Result<()> {
    let settle = async {
        loop {
            if peer.gathering_state() == GatheringState::Complete {
                return;
            }

            let before = peer.candidate_count();
            sleep(interval).await;

            if peer.candidate_count() == before {
                return;
            }
        }
    };

    timeout(limit, settle)
        .await
        .map_err(|_| Error::timeout_after("ICE gathering", limit))
}

// ============================================================================
// Tests
// ============================================================================
