//! WebSocket signaling channel and inbound dispatch.
//!
//! The channel is the persistent, ordered control connection to the
//! rendering service. Inbound text frames are classified by
//! [`Inbound::classify`] and turned into events on the owning transport's
//! [`EventBus`]; outbound traffic is control tokens, the offer description
//! and binary audio frames.
//!
//! # Event Loop
//!
//! [`SignalingChannel::connect`] spawns a tokio task that handles:
//!
//! - Incoming text frames (classification, event emission, remote close)
//! - Outgoing messages queued by the send methods
//! - Shutdown requested by [`SignalingChannel::disconnect`]
//!
//! # States
//!
//! ```text
//! Idle → Connecting → Open → (Closing) → Closed
//! ```
//!
//! Sends are only accepted in `Open`.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::events::EventBus;
use crate::protocol::{ControlSignal, Inbound, SessionDescription, immediate_frame};

// ============================================================================
// Constants
// ============================================================================

/// Timeout for the WebSocket handshake.
const OPEN_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// Types
// ============================================================================

/// Client WebSocket stream.
type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Write half of the client stream.
type WsWrite = SplitSink<WsStream, Message>;

// ============================================================================
// ChannelState
// ============================================================================

/// Lifecycle of a signaling channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Created, never connected.
    Idle,
    /// Handshake in progress.
    Connecting,
    /// Writable.
    Open,
    /// Remote-initiated close in progress; no longer writable.
    Closing,
    /// Closed for good.
    Closed,
}

// ============================================================================
// ChannelCommand
// ============================================================================

/// Internal commands for the event loop.
enum ChannelCommand {
    /// Send a text frame.
    Text(String),
    /// Send a binary frame.
    Binary(Vec<u8>),
    /// Close the socket.
    Shutdown,
}

// ============================================================================
// SignalingChannel
// ============================================================================

/// WebSocket connection to the control endpoint.
///
/// One channel is owned by each transport instance and is never reused.
pub struct SignalingChannel {
    /// Endpoint including session query parameters.
    url: Url,
    /// Bus receiving classified inbound events.
    events: EventBus,
    /// Shared with the event loop.
    state: Arc<watch::Sender<ChannelState>>,
    /// Channel for sending commands to the event loop.
    command_tx: Mutex<Option<mpsc::UnboundedSender<ChannelCommand>>>,
}

impl SignalingChannel {
    /// Creates an idle channel. No I/O happens until [`connect`](Self::connect).
    #[must_use]
    pub fn new(url: Url, events: EventBus) -> Self {
        Self {
            url,
            events,
            state: Arc::new(watch::Sender::new(ChannelState::Idle)),
            command_tx: Mutex::new(None),
        }
    }

    /// Opens the connection.
    ///
    /// Resolves exactly once, when the channel becomes writable.
    ///
    /// # Errors
    ///
    /// - [`Error::Connection`] if the channel was already used or the
    ///   handshake fails
    /// - [`Error::ConnectionTimeout`] if the handshake exceeds 10s
    /// - [`Error::ConnectionClosed`] if [`disconnect`](Self::disconnect) ran
    ///   during the handshake
    pub async fn connect(&self) -> Result<()> {
        let began = self.state.send_if_modified(|state| {
            if *state == ChannelState::Idle {
                *state = ChannelState::Connecting;
                true
            } else {
                false
            }
        });
        if !began {
            return Err(Error::connection("signaling channel cannot be reopened"));
        }

        let endpoint = self.endpoint();
        debug!(%endpoint, "Opening signaling channel");

        let ws_stream = match timeout(OPEN_TIMEOUT, connect_async(self.url.as_str())).await {
            Ok(Ok((ws_stream, _response))) => ws_stream,
            Ok(Err(e)) => {
                self.state.send_replace(ChannelState::Closed);
                return Err(Error::connection(format!("signaling open failed: {e}")));
            }
            Err(_) => {
                self.state.send_replace(ChannelState::Closed);
                return Err(Error::connection_timeout_after(OPEN_TIMEOUT));
            }
        };

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        *self.command_tx.lock() = Some(command_tx);

        let opened = self.state.send_if_modified(|state| {
            if *state == ChannelState::Connecting {
                *state = ChannelState::Open;
                true
            } else {
                false
            }
        });
        if !opened {
            self.command_tx.lock().take();
            let mut ws_stream = ws_stream;
            if let Err(e) = ws_stream.close(None).await {
                debug!(error = %e, "Close after aborted handshake failed");
            }
            return Err(Error::ConnectionClosed);
        }

        tokio::spawn(Self::run_event_loop(
            ws_stream,
            command_rx,
            self.events.clone(),
            Arc::clone(&self.state),
        ));

        info!(%endpoint, "Signaling channel open");
        Ok(())
    }

    /// Closes the connection.
    ///
    /// Idempotent; a channel that is already closed is left alone.
    pub fn disconnect(&self) {
        let previous = self.state.send_replace(ChannelState::Closed);

        if let Some(command_tx) = self.command_tx.lock().take()
            && command_tx.send(ChannelCommand::Shutdown).is_err()
        {
            debug!("Signaling event loop already stopped");
        }

        if previous != ChannelState::Closed {
            debug!(?previous, "Signaling channel disconnected");
        }
    }

    /// Sends a control token.
    ///
    /// # Errors
    ///
    /// [`Error::NotOpen`] unless the channel is open.
    pub fn send_signal(&self, signal: ControlSignal) -> Result<()> {
        trace!(%signal, "Sending control signal");
        self.enqueue(ChannelCommand::Text(signal.as_str().to_string()))
    }

    /// Sends a JSON-serialized session description.
    ///
    /// # Errors
    ///
    /// - [`Error::NotOpen`] unless the channel is open
    /// - [`Error::Json`] if serialization fails
    pub fn send_offer(&self, description: &SessionDescription) -> Result<()> {
        let json = serde_json::to_string(description)?;
        debug!(bytes = json.len(), "Sending offer");
        self.enqueue(ChannelCommand::Text(json))
    }

    /// Sends a raw binary audio frame.
    ///
    /// # Errors
    ///
    /// [`Error::NotOpen`] unless the channel is open.
    pub fn send_audio_data(&self, frame: &[u8]) -> Result<()> {
        self.enqueue(ChannelCommand::Binary(frame.to_vec()))
    }

    /// Sends a binary audio frame marked for immediate playback.
    ///
    /// # Errors
    ///
    /// [`Error::NotOpen`] unless the channel is open.
    pub fn send_audio_data_immediate(&self, frame: &[u8]) -> Result<()> {
        self.enqueue(ChannelCommand::Binary(immediate_frame(frame)))
    }

    /// Returns the current state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ChannelState {
        *self.state.borrow()
    }

    /// Returns `true` if sends are currently accepted.
    #[inline]
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state() == ChannelState::Open
    }

    /// Resolves once the channel reaches [`ChannelState::Closed`].
    pub async fn closed(&self) {
        let mut state_rx = self.state.subscribe();
        let _ = state_rx.wait_for(|state| *state == ChannelState::Closed).await;
    }

    /// Endpoint without query parameters, safe to log.
    fn endpoint(&self) -> Url {
        let mut endpoint = self.url.clone();
        endpoint.set_query(None);
        endpoint
    }

    /// Queues a command if the channel is open.
    fn enqueue(&self, command: ChannelCommand) -> Result<()> {
        if !self.is_open() {
            return Err(Error::NotOpen);
        }

        let guard = self.command_tx.lock();
        let command_tx = guard.as_ref().ok_or(Error::NotOpen)?;
        command_tx
            .send(command)
            .map_err(|_| Error::ConnectionClosed)
    }
}

// ============================================================================
// SignalingChannel - Event Loop
// ============================================================================

impl SignalingChannel {
    /// Event loop that handles WebSocket I/O.
    async fn run_event_loop(
        ws_stream: WsStream,
        mut command_rx: mpsc::UnboundedReceiver<ChannelCommand>,
        events: EventBus,
        state: Arc<watch::Sender<ChannelState>>,
    ) {
        let (mut ws_write, mut ws_read) = ws_stream.split();

        loop {
            tokio::select! {
                // Incoming messages from the control endpoint
                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            if !Self::dispatch(&text, &events, &state, &mut ws_write).await {
                                break;
                            }
                        }

                        Some(Ok(Message::Binary(data))) => {
                            trace!(bytes = data.len(), "Ignoring inbound binary frame");
                        }

                        Some(Ok(Message::Close(_))) => {
                            debug!("Signaling closed by remote");
                            break;
                        }

                        Some(Err(e)) => {
                            warn!(error = %e, "Signaling socket error");
                            break;
                        }

                        None => {
                            debug!("Signaling stream ended");
                            break;
                        }

                        // Ignore Ping, Pong, Frame
                        _ => {}
                    }
                }

                // Outgoing traffic
                command = command_rx.recv() => {
                    match command {
                        Some(ChannelCommand::Text(text)) => {
                            if let Err(e) = ws_write.send(Message::Text(text.into())).await {
                                warn!(error = %e, "Failed to send text frame");
                                break;
                            }
                        }

                        Some(ChannelCommand::Binary(data)) => {
                            if let Err(e) = ws_write.send(Message::Binary(data.into())).await {
                                warn!(error = %e, "Failed to send binary frame");
                                break;
                            }
                        }

                        Some(ChannelCommand::Shutdown) | None => {
                            Self::close_socket(&mut ws_write).await;
                            break;
                        }
                    }
                }
            }
        }

        state.send_replace(ChannelState::Closed);
        debug!("Signaling event loop terminated");
    }

    /// Classifies one inbound text frame and acts on it.
    ///
    /// Returns `false` once the channel must stop.
    async fn dispatch(
        text: &str,
        events: &EventBus,
        state: &watch::Sender<ChannelState>,
        ws_write: &mut WsWrite,
    ) -> bool {
        let inbound = Inbound::classify(text);
        trace!(?inbound, "Inbound signaling message");

        if inbound.closes_before_emit() {
            Self::begin_close(state);
            Self::close_socket(ws_write).await;
        }

        if let Some(event) = inbound.to_event() {
            events.emit(&event);
        }

        if inbound.closes_after_emit() {
            Self::begin_close(state);
            Self::close_socket(ws_write).await;
        }

        !(inbound.closes_before_emit() || inbound.closes_after_emit())
    }

    /// Moves an open channel to `Closing` so sends are refused.
    fn begin_close(state: &watch::Sender<ChannelState>) {
        state.send_if_modified(|state| {
            if *state == ChannelState::Open {
                *state = ChannelState::Closing;
                true
            } else {
                false
            }
        });
    }

    /// Closes the socket, ignoring errors from an already-closed connection.
    async fn close_socket(ws_write: &mut WsWrite) {
        if let Err(e) = ws_write.close().await {
            debug!(error = %e, "Signaling close failed (already closed)");
        }
    }
}

impl Drop for SignalingChannel {
    fn drop(&mut self) {
        self.disconnect();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::net::TcpListener;

    use crate::events::{Event, EventKind, Listener};

    /// Accepts one client and hands back its server-side stream.
    async fn serve_once() -> (Url, tokio::task::JoinHandle<WebSocketStream<TcpStream>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        let url = Url::parse(&format!("ws://127.0.0.1:{port}/ws?session_token=t")).expect("url");

        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            tokio_tungstenite::accept_async(stream)
                .await
                .expect("upgrade")
        });

        (url, handle)
    }

    fn counter(bus: &EventBus, kind: EventKind) -> Arc<AtomicUsize> {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&count);
        let listener: Listener = Arc::new(move |_: &Event| {
            inner.fetch_add(1, Ordering::SeqCst);
        });
        bus.on(kind, listener);
        count
    }

    #[test]
    fn test_constants() {
        assert_eq!(OPEN_TIMEOUT.as_secs(), 10);
    }

    #[tokio::test]
    async fn test_send_before_open_fails() {
        let url = Url::parse("ws://127.0.0.1:9/ws").expect("url");
        let channel = SignalingChannel::new(url, EventBus::new());

        assert!(matches!(
            channel.send_signal(ControlSignal::Done),
            Err(Error::NotOpen)
        ));
        assert!(matches!(channel.send_audio_data(&[0, 0]), Err(Error::NotOpen)));
        assert_eq!(channel.state(), ChannelState::Idle);
    }

    #[tokio::test]
    async fn test_outbound_frames() {
        let (url, server) = serve_once().await;
        let channel = SignalingChannel::new(url, EventBus::new());

        channel.connect().await.expect("connect");
        assert!(channel.is_open());

        channel.send_signal(ControlSignal::Skip).expect("signal");
        channel.send_audio_data(&[1, 2]).expect("audio");
        channel.send_audio_data_immediate(&[3, 4]).expect("immediate");

        let mut server = server.await.expect("server");

        let first = server.next().await.expect("frame").expect("ok");
        assert_eq!(first.into_text().expect("text").as_str(), "SKIP");

        let second = server.next().await.expect("frame").expect("ok");
        assert_eq!(second.into_data().as_ref(), &[1, 2]);

        let third = server.next().await.expect("frame").expect("ok");
        assert_eq!(third.into_data().as_ref(), b"PLAY_IMMEDIATE\x03\x04");

        channel.disconnect();
    }

    #[tokio::test]
    async fn test_speak_emits_once_and_stays_open() {
        let (url, server) = serve_once().await;
        let bus = EventBus::new();
        let speaking = counter(&bus, EventKind::Speaking);
        let stops = counter(&bus, EventKind::Stop);
        let channel = SignalingChannel::new(url, bus);

        channel.connect().await.expect("connect");
        let mut server = server.await.expect("server");
        server.send(Message::Text("SPEAK".into())).await.expect("send");
        server.send(Message::Text("SILENT".into())).await.expect("send");

        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(speaking.load(Ordering::SeqCst), 1);
        assert_eq!(stops.load(Ordering::SeqCst), 0);
        assert!(channel.is_open());
    }

    #[tokio::test]
    async fn test_stop_closes_then_emits() {
        let (url, server) = serve_once().await;
        let bus = EventBus::new();
        let stops = counter(&bus, EventKind::Stop);
        let channel = SignalingChannel::new(url, bus);

        channel.connect().await.expect("connect");
        let mut server = server.await.expect("server");
        server.send(Message::Text("STOP".into())).await.expect("send");

        tokio::time::timeout(Duration::from_secs(2), channel.closed())
            .await
            .expect("channel closes");

        assert_eq!(stops.load(Ordering::SeqCst), 1);
        assert!(matches!(
            channel.send_signal(ControlSignal::Done),
            Err(Error::NotOpen)
        ));
    }

    #[tokio::test]
    async fn test_fatal_token_emits_error_only() {
        let (url, server) = serve_once().await;
        let bus = EventBus::new();
        let errors = counter(&bus, EventKind::Error);
        let speaking = counter(&bus, EventKind::Speaking);
        let channel = SignalingChannel::new(url, bus);

        channel.connect().await.expect("connect");
        let mut server = server.await.expect("server");
        server
            .send(Message::Text("RATE limit".into()))
            .await
            .expect("send");

        tokio::time::timeout(Duration::from_secs(2), channel.closed())
            .await
            .expect("channel closes");

        assert_eq!(errors.load(Ordering::SeqCst), 1);
        assert_eq!(speaking.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let (url, server) = serve_once().await;
        let channel = SignalingChannel::new(url, EventBus::new());

        channel.connect().await.expect("connect");
        let _server = server.await.expect("server");

        channel.disconnect();
        channel.disconnect();

        assert_eq!(channel.state(), ChannelState::Closed);
        assert!(channel.connect().await.is_err());
    }

    #[tokio::test]
    async fn test_open_failure_is_transient() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        drop(listener);

        let url = Url::parse(&format!("ws://127.0.0.1:{port}/ws")).expect("url");
        let channel = SignalingChannel::new(url, EventBus::new());

        let err = channel.connect().await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(channel.state(), ChannelState::Closed);
    }
}
