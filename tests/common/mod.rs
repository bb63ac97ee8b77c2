//! Shared fixtures: a scripted signaling server and an in-memory media stack.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::{Notify, mpsc};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

use avatar_stream::transport::GatheringState;
use avatar_stream::{
    Error, Event, IceServer, Listener, MediaBackend, MediaEvent, MediaHandler, MediaSink,
    MediaSinks, PeerConnection, RelayRoom, RemoteTrack, Result, SessionConfig,
    SessionConfigBuilder, SessionController,
    SessionDescription, TrackKind, TransportMode,
};

// ============================================================================
// Logging
// ============================================================================

/// Installs a test subscriber honoring `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ============================================================================
// Signaling server
// ============================================================================

/// How the server treats each accepted connection.
#[derive(Clone)]
pub enum Script {
    /// Completes the handshake, then closes.
    CloseImmediately,
    /// Answers the offer, then sends `ACK` once `ack` is notified.
    Answer { ack: Arc<Notify> },
    /// Replies to the offer with `reply` and keeps the socket open.
    ReplyToOffer(String),
    /// Sends join info, then `ACK`.
    Join,
    /// Reads everything and never replies.
    Silent,
    /// Answers the offer with `ACK` and `SPEAK`.
    AnswerThenSpeak,
    /// Answers the offer with `ACK`, then sends `STOP` once `stop` is notified.
    AnswerThenStop { stop: Arc<Notify> },
    /// One script per connection; the last one repeats.
    Sequence(Vec<Script>),
}

impl Script {
    /// Script for the `index`-th accepted connection.
    fn for_connection(&self, index: usize) -> Script {
        match self {
            Self::Sequence(scripts) => scripts
                .get(index)
                .or_else(|| scripts.last())
                .cloned()
                .unwrap_or(Self::Silent),
            other => other.clone(),
        }
    }
}

/// A scripted signaling endpoint on a random local port.
pub struct SignalingServer {
    /// Base URL to configure the session with.
    pub base_url: String,
    /// Request paths with query, in accept order.
    pub requests: Arc<Mutex<Vec<String>>>,
    /// Binary frames received from clients.
    pub frames: mpsc::UnboundedReceiver<Vec<u8>>,
    /// Text frames received from clients.
    pub texts: Arc<Mutex<Vec<String>>>,
}

impl SignalingServer {
    /// Binds and starts serving `script` to every client.
    pub async fn start(script: Script) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let texts = Arc::new(Mutex::new(Vec::new()));
        let (frame_tx, frames) = mpsc::unbounded_channel();

        let seen = Arc::clone(&requests);
        let text_log = Arc::clone(&texts);
        tokio::spawn(async move {
            let mut index = 0;
            while let Ok((stream, _)) = listener.accept().await {
                let seen = Arc::clone(&seen);
                let text_log = Arc::clone(&text_log);
                let frame_tx = frame_tx.clone();
                let script = script.for_connection(index);
                index += 1;

                tokio::spawn(async move {
                    let record = move |request: &Request, response: Response| {
                        let uri = request.uri();
                        let target = match uri.query() {
                            Some(query) => format!("{}?{query}", uri.path()),
                            None => uri.path().to_string(),
                        };
                        seen.lock().push(target);
                        Ok::<_, ErrorResponse>(response)
                    };
                    let Ok(ws) = tokio_tungstenite::accept_hdr_async(stream, record).await else {
                        return;
                    };
                    serve(ws, script, text_log, frame_tx).await;
                });
            }
        });

        Self {
            base_url: format!("ws://127.0.0.1:{port}/v1"),
            requests,
            frames,
            texts,
        }
    }

    /// Request paths without queries.
    pub fn paths(&self) -> Vec<String> {
        self.requests
            .lock()
            .iter()
            .map(|target| target.split('?').next().unwrap_or_default().to_string())
            .collect()
    }
}

/// Well-formed answer description.
const ANSWER: &str = r#"{"type":"answer","sdp":"v=0 remote"}"#;

async fn serve(
    mut ws: tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
    script: Script,
    texts: Arc<Mutex<Vec<String>>>,
    frames: mpsc::UnboundedSender<Vec<u8>>,
) {
    match &script {
        Script::CloseImmediately => {
            let _ = ws.close(None).await;
            return;
        }
        Script::Join => {
            let join = r#"{"livekit_url":"wss://relay.example.com","livekit_token":"jt"}"#;
            let _ = ws.send(Message::Text(join.into())).await;
            let _ = ws.send(Message::Text("ACK".into())).await;
        }
        _ => {}
    }

    let (mut write, mut read) = ws.split();
    while let Some(Ok(message)) = read.next().await {
        match message {
            Message::Text(text) => {
                let text = text.as_str().to_string();
                let is_offer = text.contains(r#""type":"offer""#);
                texts.lock().push(text);
                if !is_offer {
                    continue;
                }
                match &script {
                    Script::Answer { ack } => {
                        let _ = write.send(Message::Text(ANSWER.into())).await;
                        let ack = Arc::clone(ack);
                        ack.notified().await;
                        let _ = write.send(Message::Text("ACK".into())).await;
                    }
                    Script::ReplyToOffer(reply) => {
                        let _ = write.send(Message::Text(reply.clone().into())).await;
                    }
                    Script::AnswerThenSpeak => {
                        for text in [ANSWER, "ACK", "SPEAK"] {
                            let _ = write.send(Message::Text(text.into())).await;
                        }
                    }
                    Script::AnswerThenStop { stop } => {
                        for text in [ANSWER, "ACK"] {
                            let _ = write.send(Message::Text(text.into())).await;
                        }
                        let stop = Arc::clone(stop);
                        stop.notified().await;
                        let _ = write.send(Message::Text("STOP".into())).await;
                    }
                    _ => {}
                }
            }
            Message::Binary(bytes) => {
                let _ = frames.send(bytes.to_vec());
            }
            Message::Close(_) => break,
            _ => {}
        }
    }
}

// ============================================================================
// Media stack
// ============================================================================

/// Counts attached tracks by kind.
#[derive(Default)]
pub struct CountingSink {
    pub attached: AtomicUsize,
}

impl MediaSink for CountingSink {
    fn attach(&self, _track: &RemoteTrack) {
        self.attached.fetch_add(1, Ordering::SeqCst);
    }
}

/// Presents tracks and a first video frame as soon as media is negotiated.
#[derive(Default)]
struct LoopbackPeer {
    handler: Mutex<Option<MediaHandler>>,
    local: Mutex<Option<SessionDescription>>,
    closes: Arc<AtomicUsize>,
}

impl LoopbackPeer {
    fn present(&self) {
        let handler = self.handler.lock().clone();
        if let Some(handler) = handler {
            handler(MediaEvent::Track(RemoteTrack::new(TrackKind::Video, "v0")));
            handler(MediaEvent::Track(RemoteTrack::new(TrackKind::Audio, "a0")));
            handler(MediaEvent::FirstVideoFrame);
        }
    }
}

#[async_trait]
impl PeerConnection for LoopbackPeer {
    fn add_recv_only(&self, _kind: TrackKind) -> Result<()> {
        Ok(())
    }

    async fn create_offer(&self) -> Result<SessionDescription> {
        Ok(SessionDescription::offer("v=0 local"))
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<()> {
        *self.local.lock() = Some(description);
        Ok(())
    }

    fn local_description(&self) -> Option<SessionDescription> {
        self.local.lock().clone()
    }

    fn gathering_state(&self) -> GatheringState {
        GatheringState::Complete
    }

    fn candidate_count(&self) -> usize {
        1
    }

    async fn set_remote_description(&self, _description: SessionDescription) -> Result<()> {
        self.present();
        Ok(())
    }

    fn set_media_handler(&self, handler: MediaHandler) {
        *self.handler.lock() = Some(handler);
    }

    async fn close(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct LoopbackRoom {
    handler: Mutex<Option<MediaHandler>>,
    joins: Arc<Mutex<Vec<(String, String)>>>,
    leaves: Arc<AtomicUsize>,
    /// Drop the media path instead of presenting video.
    drop_media: bool,
}

#[async_trait]
impl RelayRoom for LoopbackRoom {
    fn set_media_handler(&self, handler: MediaHandler) {
        *self.handler.lock() = Some(handler);
    }

    async fn join(&self, url: &str, token: &str) -> Result<()> {
        self.joins.lock().push((url.to_string(), token.to_string()));
        let handler = self.handler.lock().clone();
        match handler {
            Some(handler) if self.drop_media => {
                handler(MediaEvent::Disconnected("relay link lost".into()));
            }
            Some(handler) => {
                handler(MediaEvent::Track(RemoteTrack::new(TrackKind::Video, "v0")));
                handler(MediaEvent::FirstVideoFrame);
            }
            None => {}
        }
        Ok(())
    }

    async fn leave(&self) -> Result<()> {
        self.leaves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Backend building loopback peers and rooms.
#[derive(Default)]
pub struct LoopbackBackend {
    pub peers: AtomicUsize,
    pub rooms: AtomicUsize,
    pub joins: Arc<Mutex<Vec<(String, String)>>>,
    /// `close()` calls across all peers.
    pub peer_closes: Arc<AtomicUsize>,
    /// `leave()` calls across all rooms.
    pub room_leaves: Arc<AtomicUsize>,
    /// Rooms still to be built whose media path drops before video.
    pub relay_drops: AtomicUsize,
}

impl LoopbackBackend {
    /// Backend whose first `count` relay rooms lose media before video.
    pub fn with_relay_drops(count: usize) -> Self {
        Self {
            relay_drops: AtomicUsize::new(count),
            ..Self::default()
        }
    }
}

impl MediaBackend for LoopbackBackend {
    fn create_peer(&self, ice_servers: &[IceServer]) -> Result<Arc<dyn PeerConnection>> {
        if ice_servers.is_empty() {
            return Err(Error::media("no ICE servers"));
        }
        self.peers.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(LoopbackPeer {
            closes: Arc::clone(&self.peer_closes),
            ..LoopbackPeer::default()
        }))
    }

    fn create_relay_room(&self) -> Result<Arc<dyn RelayRoom>> {
        self.rooms.fetch_add(1, Ordering::SeqCst);
        let drop_media = self
            .relay_drops
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        Ok(Arc::new(LoopbackRoom {
            handler: Mutex::new(None),
            joins: Arc::clone(&self.joins),
            leaves: Arc::clone(&self.room_leaves),
            drop_media,
        }))
    }
}

// ============================================================================
// Session helpers
// ============================================================================

/// Media sinks plus a handle on the video sink's counter.
pub fn sinks() -> (MediaSinks, Arc<CountingSink>) {
    let video = Arc::new(CountingSink::default());
    let audio = Arc::new(CountingSink::default());
    let sinks = MediaSinks::new(Arc::clone(&video) as Arc<dyn MediaSink>, audio);
    (sinks, video)
}

/// Config builder against `server` with short timings.
pub fn config(
    server: &SignalingServer,
    mode: TransportMode,
    max_retries: u32,
    retry_delay: Duration,
) -> SessionConfigBuilder {
    SessionConfig::builder()
        .token("test-token")
        .signaling_url(server.base_url.as_str())
        .mode(mode)
        .max_retries(max_retries)
        .retry_delay(retry_delay)
        .connect_timeout(Duration::from_secs(5))
        .frame_capacity(64.0)
}

/// Builds a session from `config` with throwaway sinks.
pub fn controller(config: SessionConfigBuilder, backend: Arc<LoopbackBackend>) -> SessionController {
    let (sinks, _) = sinks();
    SessionController::new(config.build().expect("config"), backend, sinks)
}

/// Builds a session against `server` with short timings.
pub fn session(
    server: &SignalingServer,
    mode: TransportMode,
    max_retries: u32,
    retry_delay: Duration,
    backend: Arc<LoopbackBackend>,
) -> SessionController {
    controller(config(server, mode, max_retries, retry_delay), backend)
}

/// Records every payload of the events it is subscribed to.
pub fn recorder() -> (Listener, Arc<Mutex<Vec<Event>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let listener: Listener = Arc::new(move |event: &Event| sink.lock().push(event.clone()));
    (listener, events)
}

/// Polls `check` until it holds or two seconds pass.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
