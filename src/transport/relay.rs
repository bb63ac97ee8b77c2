//! Relay (SFU) transport.
//!
//! The control endpoint assigns a relay session by sending its URL and an
//! access credential as `connection_info`. The transport joins that session
//! and resolves on the first subscribed video frame. A relay-side disconnect
//! before that point fails the attempt like any local transient error.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::protocol::JoinInfo;

use super::core::TransportCore;
use super::media::RelayRoom;
use super::{MediaContext, TransportMode};

// ============================================================================
// Constants
// ============================================================================

/// Upper bound on waiting for join info.
pub const JOIN_INFO_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound on joining the relay session.
pub const JOIN_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// RelayTransport
// ============================================================================

/// Transport through a server-assigned relay session.
pub struct RelayTransport {
    core: TransportCore,
    room: Arc<dyn RelayRoom>,
}

impl RelayTransport {
    /// Creates the relay session client.
    ///
    /// # Errors
    ///
    /// Whatever the backend reports when creating the client.
    pub fn new(signaling_url: Url, media: &MediaContext) -> Result<Self> {
        let room = media.backend.create_relay_room()?;
        let core = TransportCore::new(TransportMode::Relay, signaling_url, media.sinks.clone());
        room.set_media_handler(core.media_handler());

        debug!("Relay transport created");
        Ok(Self { core, room })
    }

    /// Joins the assigned relay session and waits for video.
    ///
    /// # Errors
    ///
    /// - [`Error::Timeout`] if join info or the join exceeds 10s
    /// - [`Error::Protocol`] if the join info is malformed
    /// - [`Error::Media`] if the relay session drops before video
    /// - [`Error::Remote`] if the remote reports a failure
    pub async fn connect(&self) -> Result<()> {
        self.core.signaling().connect().await?;

        let raw = self
            .core
            .wait_connection_info(JOIN_INFO_TIMEOUT, "waiting for join info")
            .await?;
        let info = JoinInfo::parse(&raw).map_err(|e| self.core.fail_protocol(e))?;

        debug!(relay = %info.url, "Joining relay session");
        timeout(JOIN_TIMEOUT, self.room.join(&info.url, &info.token))
            .await
            .map_err(|_| Error::timeout_after("joining relay session", JOIN_TIMEOUT))??;
        info!(relay = %info.url, "Relay session joined");

        self.core.wait_video_started().await
    }

    /// Best-effort teardown; never fails.
    pub async fn disconnect(&self) {
        self.core.teardown_signaling();

        if let Err(e) = self.room.leave().await {
            warn!(error = %e, "Failed to leave relay session");
        }
    }

    /// Returns the shared transport state.
    #[inline]
    pub(crate) fn core(&self) -> &TransportCore {
        &self.core
    }
}

// ============================================================================
// Tests
// ============================================================================
