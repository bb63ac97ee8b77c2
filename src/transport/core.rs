//! State shared by both transport variants.
//!
//! Each transport owns one [`TransportCore`]: its event registry, its
//! signaling channel, the output sinks and the negotiation milestones that
//! `connect()` waits on.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tokio::time::timeout;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::events::{Event, EventBus, EventKind, Listener};
use crate::protocol::ControlSignal;

use super::TransportMode;
use super::media::{MediaEvent, MediaHandler, MediaSinks};
use super::signaling::SignalingChannel;

// ============================================================================
// Constants
// ============================================================================

/// Message emitted when a negotiation payload is malformed.
pub(crate) const INVALID_JOIN_INFO: &str = "invalid join info";

// ============================================================================
// Milestone
// ============================================================================

/// Progress notifications observed while connecting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Milestone {
    /// Raw `connection_info` payload.
    ConnectionInfo(String),
    /// First video frame presented.
    VideoStarted,
    /// Media path dropped before video.
    MediaLost(String),
    /// Remote declared a fatal condition.
    RemoteError(String),
    /// Remote ended the session.
    RemoteStopped,
}

// ============================================================================
// TransportCore
// ============================================================================

/// Event registry, signaling channel and milestone queue of one transport.
pub(crate) struct TransportCore {
    /// Variant this core belongs to.
    mode: TransportMode,
    /// Transport-level event registry.
    events: EventBus,
    /// Owned signaling channel.
    signaling: SignalingChannel,
    /// Output sinks for inbound tracks.
    sinks: MediaSinks,
    /// Set once the first video frame is presented.
    video_started: Arc<AtomicBool>,
    /// Producer side of the milestone queue.
    milestone_tx: mpsc::UnboundedSender<Milestone>,
    /// Consumer side, used by `connect()` only.
    milestone_rx: AsyncMutex<mpsc::UnboundedReceiver<Milestone>>,
}

impl TransportCore {
    /// Creates the core and wires signaling events into the milestone queue.
    pub(crate) fn new(mode: TransportMode, signaling_url: Url, sinks: MediaSinks) -> Self {
        let events = EventBus::new();
        let signaling = SignalingChannel::new(signaling_url, events.clone());
        let (milestone_tx, milestone_rx) = mpsc::unbounded_channel();

        let core = Self {
            mode,
            events,
            signaling,
            sinks,
            video_started: Arc::new(AtomicBool::new(false)),
            milestone_tx,
            milestone_rx: AsyncMutex::new(milestone_rx),
        };
        core.track_milestones();
        core
    }

    /// Registers internal listeners feeding the milestone queue.
    fn track_milestones(&self) {
        let tx = self.milestone_tx.clone();
        let on_info: Listener = Arc::new(move |event: &Event| {
            if let Event::ConnectionInfo(raw) = event {
                let _ = tx.send(Milestone::ConnectionInfo(raw.clone()));
            }
        });
        self.events.on(EventKind::ConnectionInfo, on_info);

        let tx = self.milestone_tx.clone();
        let on_error: Listener = Arc::new(move |event: &Event| {
            if let Event::Error(reason) = event {
                let _ = tx.send(Milestone::RemoteError(reason.clone()));
            }
        });
        self.events.on(EventKind::Error, on_error);

        let tx = self.milestone_tx.clone();
        let on_stop: Listener = Arc::new(move |_: &Event| {
            let _ = tx.send(Milestone::RemoteStopped);
        });
        self.events.on(EventKind::Stop, on_stop);
    }

    /// Builds the callback installed on the media-path handle.
    pub(crate) fn media_handler(&self) -> MediaHandler {
        let mode = self.mode;
        let events = self.events.clone();
        let sinks = self.sinks.clone();
        let video_started = Arc::clone(&self.video_started);
        let tx = self.milestone_tx.clone();

        Arc::new(move |event: MediaEvent| match event {
            MediaEvent::Track(track) => {
                debug!(%mode, kind = ?track.kind, id = %track.id, "Attaching inbound track");
                sinks.attach(&track);
            }
            MediaEvent::FirstVideoFrame => {
                if !video_started.swap(true, Ordering::SeqCst) {
                    info!(%mode, "First video frame presented");
                    events.emit(&Event::Start);
                    let _ = tx.send(Milestone::VideoStarted);
                }
            }
            MediaEvent::Disconnected(reason) => {
                if video_started.load(Ordering::SeqCst) {
                    warn!(%mode, %reason, "Media path dropped");
                    events.emit(&Event::Error(format!("media disconnected: {reason}")));
                } else {
                    debug!(%mode, %reason, "Media path dropped before video");
                    let _ = tx.send(Milestone::MediaLost(reason));
                }
            }
        })
    }

    /// Returns the transport-level event registry.
    #[inline]
    pub(crate) fn events(&self) -> &EventBus {
        &self.events
    }

    /// Returns the owned signaling channel.
    #[inline]
    pub(crate) fn signaling(&self) -> &SignalingChannel {
        &self.signaling
    }

    /// Returns `true` once the first video frame was presented.
    #[inline]
    pub(crate) fn video_started(&self) -> bool {
        self.video_started.load(Ordering::SeqCst)
    }

    /// Waits for the next milestone, or for the channel to close.
    ///
    /// Milestones already queued win over a close observed at the same time.
    async fn next_milestone(&self) -> Result<Milestone> {
        let mut milestone_rx = self.milestone_rx.lock().await;

        tokio::select! {
            biased;

            milestone = milestone_rx.recv() => milestone.ok_or(Error::ConnectionClosed),
            () = self.signaling.closed() => Err(Error::ConnectionClosed),
        }
    }

    /// Maps a terminal milestone to its error.
    fn milestone_error(milestone: Milestone) -> Error {
        match milestone {
            Milestone::RemoteError(reason) => Error::remote(reason),
            Milestone::RemoteStopped => Error::remote("session stopped by remote"),
            Milestone::MediaLost(reason) => Error::media(format!("media path lost: {reason}")),
            other => Error::protocol(format!("unexpected milestone {other:?}")),
        }
    }

    /// Waits for the first `connection_info` payload.
    ///
    /// # Errors
    ///
    /// - [`Error::Timeout`] if nothing arrives within `limit`
    /// - [`Error::Remote`] if the remote reports a failure first
    /// - [`Error::ConnectionClosed`] if signaling closes first
    pub(crate) async fn wait_connection_info(
        &self,
        limit: Duration,
        operation: &str,
    ) -> Result<String> {
        let wait = async {
            loop {
                match self.next_milestone().await? {
                    Milestone::ConnectionInfo(raw) => return Ok(raw),
                    Milestone::VideoStarted => continue,
                    other => return Err(Self::milestone_error(other)),
                }
            }
        };

        timeout(limit, wait)
            .await
            .map_err(|_| Error::timeout_after(operation, limit))?
    }

    /// Waits until the first video frame is presented.
    pub(crate) async fn wait_video_started(&self) -> Result<()> {
        if self.video_started() {
            return Ok(());
        }

        loop {
            match self.next_milestone().await? {
                Milestone::VideoStarted => return Ok(()),
                Milestone::ConnectionInfo(_) => continue,
                other => return Err(Self::milestone_error(other)),
            }
        }
    }

    /// Handles a malformed negotiation payload.
    ///
    /// Disconnects, emits `error("invalid join info")` and returns the
    /// protocol error for the caller to propagate.
    pub(crate) fn fail_protocol(&self, cause: Error) -> Error {
        warn!(mode = %self.mode, error = %cause, "Rejecting negotiation payload");
        self.signaling.disconnect();
        self.events.emit(&Event::Error(INVALID_JOIN_INFO.to_string()));
        Error::protocol(format!("{INVALID_JOIN_INFO}: {cause}"))
    }

    /// Signaling half of teardown: `DONE`, then close.
    ///
    /// Never fails; each step's failure is logged.
    pub(crate) fn teardown_signaling(&self) {
        if self.signaling.is_open()
            && let Err(e) = self.signaling.send_signal(ControlSignal::Done)
        {
            warn!(mode = %self.mode, error = %e, "Failed to send DONE");
        }
        self.signaling.disconnect();
    }
}
