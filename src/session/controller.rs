//! Session façade: transport lifecycle, retry and fallback.
//!
//! A [`SessionController`] owns at most one active [`Transport`]. Each
//! attempt builds a fresh transport; caller subscriptions live in the
//! controller's own registry and are re-attached to every new transport, so
//! they survive transport replacement.
//!
//! # Retry Policy
//!
//! | Outcome | Action |
//! |---------|--------|
//! | success | retry counter reset to zero |
//! | fatal error (protocol, remote) | tear down, reject, no retry |
//! | transient error or global timeout | tear down, wait fixed delay, retry |
//! | retry counter > 2 | mode forced to relay for the rest of the session |
//! | retry counter > `max_retries` | terminal, `error` emitted, reject |
//! | remote end after connect | `Disconnected`; the next `start()` tears the old transport down first |
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use avatar_stream::{Event, Listener, MediaBackend, MediaSinks, SessionConfig, SessionController};
//!
//! # async fn example(backend: Arc<dyn MediaBackend>, sinks: MediaSinks) -> avatar_stream::Result<()> {
//! let config = SessionConfig::builder()
//!     .token("session-token")
//!     .signaling_url("wss://api.example.com/v1")
//!     .build()?;
//!
//! let session = SessionController::new(config, backend, sinks);
//! let on_start: Listener = Arc::new(|_: &Event| println!("video is live"));
//! session.on("connected", on_start)?;
//!
//! session.start().await?;
//! let (microphone, _task) = session.start_audio()?;
//! microphone.push(&[0.0; 160]);
//!
//! session.stop().await;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, trace, warn};

use crate::audio::{AudioCapture, AudioFrame, CaptureStats, Delivery, FrameSink, SampleSender};
use crate::error::{Error, Result};
use crate::events::{Event, EventBus, EventKind, Listener};
use crate::identifiers::SessionId;
use crate::protocol::ControlSignal;
use crate::transport::{MediaBackend, MediaContext, MediaSinks, Transport, TransportMode};

use super::config::SessionConfig;
use super::state::SessionState;

// ============================================================================
// Constants
// ============================================================================

/// Retry count above which the relay transport is forced.
pub const FORCE_RELAY_AFTER: u32 = 2;

// ============================================================================
// SessionInner
// ============================================================================

/// Shared state of a session.
struct SessionInner {
    /// Local identity for logs.
    id: SessionId,
    /// Validated configuration.
    config: SessionConfig,
    /// Collaborators handed to each transport.
    media: MediaContext,
    /// Lifecycle state.
    state: Mutex<SessionState>,
    /// Current transport variant; may be forced to relay.
    mode: Mutex<TransportMode>,
    /// Consecutive failed attempts.
    retries: AtomicU32,
    /// Set by `stop()` or retry exhaustion.
    terminal: AtomicBool,
    /// Set once the active transport has seen `ack`.
    acknowledged: AtomicBool,
    /// The active transport.
    transport: Mutex<Option<Arc<Transport>>>,
    /// Caller subscriptions, independent of any transport.
    subscriptions: EventBus,
    /// Serializes connection attempts.
    attempt: AsyncMutex<()>,
}

// ============================================================================
// SessionController
// ============================================================================

/// Façade over one streaming session.
///
/// Cloning yields another handle to the same session.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<SessionInner>,
}

impl fmt::Debug for SessionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionController")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .field("mode", &self.mode())
            .field("retries", &self.retry_count())
            .finish()
    }
}

// ============================================================================
// SessionController - Constructor
// ============================================================================

impl SessionController {
    /// Creates an idle session. No network I/O.
    #[must_use]
    pub fn new(config: SessionConfig, backend: Arc<dyn MediaBackend>, sinks: MediaSinks) -> Self {
        let media = MediaContext {
            backend,
            sinks,
            ice_servers: config.ice_servers.clone(),
        };
        let id = SessionId::new();
        debug!(session_id = %id, mode = %config.mode, "Session created");

        Self {
            inner: Arc::new(SessionInner {
                id,
                mode: Mutex::new(config.mode),
                config,
                media,
                state: Mutex::new(SessionState::Idle),
                retries: AtomicU32::new(0),
                terminal: AtomicBool::new(false),
                acknowledged: AtomicBool::new(false),
                transport: Mutex::new(None),
                subscriptions: EventBus::new(),
                attempt: AsyncMutex::new(()),
            }),
        }
    }
}

// ============================================================================
// SessionController - Lifecycle
// ============================================================================

impl SessionController {
    /// Connects, retrying transient failures per the session policy.
    ///
    /// Resolves once the first video frame is presented. Returns at once if
    /// the session is already connected.
    ///
    /// # Errors
    ///
    /// - [`Error::SessionStopped`] if the session is or becomes terminal
    /// - [`Error::RetriesExhausted`] once the retry budget is spent
    /// - the fatal error (protocol, remote, startup) that ended the attempt
    pub async fn start(&self) -> Result<()> {
        self.ensure_live()?;
        let _attempt = self.inner.attempt.lock().await;

        loop {
            self.ensure_live()?;
            if self.state() == SessionState::Connected {
                debug!(session_id = %self.inner.id, "Session already connected");
                return Ok(());
            }

            self.retire_previous().await;
            let transport = self.install_transport()?;
            let mode = transport.mode();
            let attempt = self.retry_count() + 1;
            info!(session_id = %self.inner.id, attempt, %mode, "Connecting");

            let limit = self.inner.config.connect_timeout;
            let outcome = match timeout(limit, transport.connect()).await {
                Ok(result) => result,
                Err(_) => Err(Error::connection_timeout_after(limit)),
            };

            let error = match outcome {
                Ok(()) if !self.is_terminal() => {
                    self.inner.retries.store(0, Ordering::SeqCst);
                    self.set_state(SessionState::Connected);
                    info!(session_id = %self.inner.id, attempt, %mode, "Session connected");
                    return Ok(());
                }
                Ok(()) => Error::SessionStopped,
                Err(e) => e,
            };

            self.release_transport(&transport).await;

            if self.is_terminal() {
                debug!(session_id = %self.inner.id, "Attempt aborted by stop");
                return Err(Error::SessionStopped);
            }

            if error.is_fatal() {
                warn!(session_id = %self.inner.id, attempt, %mode, error = %error, "Fatal connection error");
                self.set_state(SessionState::Disconnected);
                return Err(error);
            }

            warn!(session_id = %self.inner.id, attempt, %mode, error = %error, "Connection attempt failed");
            self.set_state(SessionState::Reconnecting);

            sleep(self.inner.config.retry_delay).await;
            if self.is_terminal() {
                debug!(session_id = %self.inner.id, "Retry aborted by stop");
                return Err(Error::SessionStopped);
            }

            let retries = self.inner.retries.fetch_add(1, Ordering::SeqCst) + 1;
            if retries > FORCE_RELAY_AFTER {
                self.force_relay();
            }

            if retries > self.inner.config.max_retries {
                return Err(self.exhaust(retries, &error));
            }
        }
    }

    /// Ends the session for good.
    ///
    /// Sets the terminal flag before anything else, then disconnects the
    /// active transport if any. Always succeeds.
    pub async fn stop(&self) {
        self.inner.terminal.store(true, Ordering::SeqCst);
        self.set_state(SessionState::Terminal);
        self.inner.acknowledged.store(false, Ordering::SeqCst);

        let transport = self.inner.transport.lock().take();
        if let Some(transport) = transport {
            transport.disconnect().await;
            self.inner.subscriptions.emit(&Event::Stop);
        }

        info!(session_id = %self.inner.id, "Session stopped");
    }

    /// Sends a control signal over the active transport.
    ///
    /// # Errors
    ///
    /// [`Error::NotOpen`] if no transport is active or its channel is closed.
    pub fn send_signal(&self, signal: ControlSignal) -> Result<()> {
        let transport = self.active_transport().ok_or(Error::NotOpen)?;
        transport.signaling().send_signal(signal)
    }

    /// Returns a frame sink routed to the active transport.
    ///
    /// Frames are dropped until the active transport has seen `ack`.
    #[must_use]
    pub fn audio_sink(&self) -> Arc<dyn FrameSink> {
        Arc::new(SessionAudioSink {
            inner: Arc::downgrade(&self.inner),
        })
    }

    /// Spawns an [`AudioCapture`] feeding [`audio_sink`](Self::audio_sink)
    /// with the configured frame capacity.
    ///
    /// # Errors
    ///
    /// [`Error::SessionStopped`] if the session is terminal.
    pub fn start_audio(&self) -> Result<(SampleSender, JoinHandle<CaptureStats>)> {
        self.ensure_live()?;
        AudioCapture::spawn(self.inner.config.frame_capacity.get(), self.audio_sink())
    }
}

// ============================================================================
// SessionController - Events
// ============================================================================

impl SessionController {
    /// Subscribes `listener` to the event called `name`.
    ///
    /// The subscription survives transport replacement.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownEvent`] if `name` is not in the catalog.
    pub fn on(&self, name: &str, listener: Listener) -> Result<()> {
        let kind: EventKind = name.parse()?;

        self.inner.subscriptions.on(kind, Arc::clone(&listener));
        if let Some(transport) = self.active_transport() {
            transport.on(kind, listener);
        }
        Ok(())
    }

    /// Unsubscribes `listener` from the event called `name`.
    ///
    /// Removing a listener that is not subscribed is not an error.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownEvent`] if `name` is not in the catalog.
    pub fn off(&self, name: &str, listener: &Listener) -> Result<()> {
        let kind: EventKind = name.parse()?;

        self.inner.subscriptions.off(kind, listener);
        if let Some(transport) = self.active_transport() {
            transport.off(kind, listener);
        }
        Ok(())
    }
}

// ============================================================================
// SessionController - Accessors
// ============================================================================

impl SessionController {
    /// Returns the local session identity.
    #[inline]
    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.inner.id
    }

    /// Returns the lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.inner.state.lock()
    }

    /// Returns the transport variant the next attempt will use.
    #[must_use]
    pub fn mode(&self) -> TransportMode {
        *self.inner.mode.lock()
    }

    /// Returns the current retry counter.
    #[must_use]
    pub fn retry_count(&self) -> u32 {
        self.inner.retries.load(Ordering::SeqCst)
    }

    /// Returns `true` once the session can no longer start.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.inner.terminal.load(Ordering::SeqCst)
    }

    /// Returns `true` once the active transport has seen `ack`.
    #[must_use]
    pub fn is_acknowledged(&self) -> bool {
        self.inner.acknowledged.load(Ordering::SeqCst)
    }

    /// Returns the session configuration.
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }
}

// ============================================================================
// SessionController - Internals
// ============================================================================

impl SessionController {
    fn ensure_live(&self) -> Result<()> {
        if self.is_terminal() {
            return Err(Error::SessionStopped);
        }
        Ok(())
    }

    fn set_state(&self, next: SessionState) {
        let mut state = self.inner.state.lock();
        if *state != next {
            trace!(session_id = %self.inner.id, from = state.as_str(), to = next.as_str(), "State change");
            *state = next;
        }
    }

    fn active_transport(&self) -> Option<Arc<Transport>> {
        self.inner.transport.lock().clone()
    }

    /// Tears down a transport left behind by a remote end.
    async fn retire_previous(&self) {
        let previous = self.inner.transport.lock().take();
        if let Some(previous) = previous {
            debug!(session_id = %self.inner.id, mode = %previous.mode(), "Releasing previous transport");
            self.inner.acknowledged.store(false, Ordering::SeqCst);
            previous.disconnect().await;
        }
    }

    /// Builds a transport for the current mode and makes it active.
    fn install_transport(&self) -> Result<Arc<Transport>> {
        let mode = self.mode();
        let config = &self.inner.config;

        let transport = mode
            .signaling_url(&config.signaling_url, &config.token)
            .and_then(|url| Transport::new(mode, url, &self.inner.media))
            .map(Arc::new);
        let transport = match transport {
            Ok(transport) => transport,
            Err(e) => {
                warn!(session_id = %self.inner.id, %mode, error = %e, "Transport construction failed");
                self.set_state(SessionState::Disconnected);
                self.inner
                    .subscriptions
                    .emit(&Event::StartupError(e.to_string()));
                return Err(e);
            }
        };

        for (kind, listener) in self.inner.subscriptions.listeners() {
            transport.on(kind, listener);
        }
        self.track_transport(&transport);

        let mut slot = self.inner.transport.lock();
        if self.is_terminal() {
            return Err(Error::SessionStopped);
        }
        self.inner.acknowledged.store(false, Ordering::SeqCst);
        *slot = Some(Arc::clone(&transport));
        drop(slot);

        self.set_state(SessionState::Connecting);
        Ok(transport)
    }

    /// Internal listeners tracking acknowledgment and remote shutdown.
    fn track_transport(&self, transport: &Transport) {
        let weak = Arc::downgrade(&self.inner);
        let on_ack: Listener = Arc::new(move |_: &Event| {
            if let Some(inner) = weak.upgrade() {
                inner.acknowledged.store(true, Ordering::SeqCst);
                debug!(session_id = %inner.id, "Session start acknowledged");
            }
        });
        transport.on(EventKind::Ack, on_ack);

        let weak = Arc::downgrade(&self.inner);
        let on_end: Listener = Arc::new(move |event: &Event| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            inner.acknowledged.store(false, Ordering::SeqCst);

            let mut state = inner.state.lock();
            if *state == SessionState::Connected {
                info!(session_id = %inner.id, event = %event.kind(), "Session ended by remote");
                *state = SessionState::Disconnected;
            }
        });
        transport.on(EventKind::Stop, Arc::clone(&on_end));
        transport.on(EventKind::Error, on_end);
    }

    /// Disconnects `transport` and clears it if it is still the active one.
    async fn release_transport(&self, transport: &Arc<Transport>) {
        {
            let mut slot = self.inner.transport.lock();
            if slot.as_ref().is_some_and(|active| Arc::ptr_eq(active, transport)) {
                *slot = None;
            }
        }
        self.inner.acknowledged.store(false, Ordering::SeqCst);
        transport.disconnect().await;
    }

    /// Forces the relay variant for the rest of the session.
    fn force_relay(&self) {
        let mut mode = self.inner.mode.lock();
        if *mode != TransportMode::Relay {
            info!(session_id = %self.inner.id, from = mode.as_str(), "Falling back to relay transport");
            *mode = TransportMode::Relay;
        }
    }

    /// Marks the session terminal after the retry budget is spent.
    fn exhaust(&self, retries: u32, last_error: &Error) -> Error {
        self.inner.terminal.store(true, Ordering::SeqCst);
        self.set_state(SessionState::Disconnected);

        let error = Error::retries_exhausted(retries, last_error.to_string());
        warn!(session_id = %self.inner.id, retries, error = %error, "Giving up");
        self.inner
            .subscriptions
            .emit(&Event::Error(format!("failed: {last_error}")));
        error
    }
}

// ============================================================================
// SessionAudioSink
// ============================================================================

/// Routes capture frames to the active transport's signaling channel.
struct SessionAudioSink {
    inner: Weak<SessionInner>,
}

impl FrameSink for SessionAudioSink {
    fn send_frame(&self, frame: &AudioFrame, delivery: Delivery) -> Result<()> {
        let inner = self.inner.upgrade().ok_or(Error::SessionStopped)?;

        if !inner.acknowledged.load(Ordering::SeqCst) {
            trace!(session_id = %inner.id, samples = frame.len(), "Dropping frame before ack");
            return Ok(());
        }

        let transport = inner.transport.lock().clone().ok_or(Error::NotOpen)?;
        let bytes = frame.to_bytes();
        match delivery {
            Delivery::Queued => transport.signaling().send_audio_data(&bytes),
            Delivery::Immediate => transport.signaling().send_audio_data_immediate(&bytes),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::AtomicUsize;

    use crate::api::IceServer;
    use crate::transport::{MediaSink, PeerConnection, RelayRoom, RemoteTrack};

    /// Backend that counts construction calls and refuses to build anything.
    #[derive(Default)]
    struct CountingBackend {
        calls: AtomicUsize,
    }

    impl MediaBackend for CountingBackend {
        fn create_peer(&self, _ice_servers: &[IceServer]) -> Result<Arc<dyn PeerConnection>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::media("no peer stack"))
        }

        fn create_relay_room(&self) -> Result<Arc<dyn RelayRoom>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::media("no relay client"))
        }
    }

    struct NullSink;

    impl MediaSink for NullSink {
        fn attach(&self, _track: &RemoteTrack) {}
    }

    fn session(backend: Arc<CountingBackend>) -> SessionController {
        let config = SessionConfig::builder()
            .token("tok")
            .signaling_url("ws://127.0.0.1:9")
            .build()
            .expect("config");
        let sinks = MediaSinks::new(Arc::new(NullSink), Arc::new(NullSink));
        SessionController::new(config, backend, sinks)
    }

    #[test]
    fn test_constants() {
        assert_eq!(FORCE_RELAY_AFTER, 2);
    }

    #[tokio::test]
    async fn test_stop_before_start_rejects_without_network() {
        let backend = Arc::new(CountingBackend::default());
        let session = session(Arc::clone(&backend));

        session.stop().await;
        let err = session.start().await.unwrap_err();

        assert!(matches!(err, Error::SessionStopped));
        assert!(session.is_terminal());
        assert_eq!(session.state(), SessionState::Terminal);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let session = session(Arc::new(CountingBackend::default()));
        session.stop().await;
        session.stop().await;
        assert!(session.is_terminal());
    }

    #[tokio::test]
    async fn test_startup_error_emitted_and_not_retried() {
        let backend = Arc::new(CountingBackend::default());
        let session = session(Arc::clone(&backend));

        let reasons = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&reasons);
        let listener: Listener = Arc::new(move |event: &Event| {
            sink.lock().push(event.payload().unwrap_or_default().to_string());
        });
        session.on("startup_error", listener).expect("known event");

        let err = session.start().await.unwrap_err();

        assert!(matches!(err, Error::Media { .. }));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        assert_eq!(reasons.lock().len(), 1);
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[test]
    fn test_unknown_event_names_rejected() {
        let session = session(Arc::new(CountingBackend::default()));
        let listener: Listener = Arc::new(|_: &Event| {});

        assert!(matches!(
            session.on("bogus", Arc::clone(&listener)),
            Err(Error::UnknownEvent { .. })
        ));
        assert!(matches!(
            session.off("bogus", &listener),
            Err(Error::UnknownEvent { .. })
        ));
        assert!(session.off("speaking", &listener).is_ok());
    }

    #[test]
    fn test_audio_dropped_before_ack() {
        let session = session(Arc::new(CountingBackend::default()));
        let sink = session.audio_sink();

        let frame = AudioFrame::new(vec![0; 4]);
        assert!(sink.send_frame(&frame, Delivery::Queued).is_ok());
        assert!(!session.is_acknowledged());
    }

    #[test]
    fn test_send_signal_without_transport() {
        let session = session(Arc::new(CountingBackend::default()));
        assert!(matches!(
            session.send_signal(ControlSignal::Skip),
            Err(Error::NotOpen)
        ));
    }
}
