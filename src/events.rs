//! Typed publish/subscribe registry for session lifecycle events.
//!
//! Every component notifies callers through an [`EventBus`]. Listeners are
//! stored per [`EventKind`] in registration order and identified by their
//! `Arc` pointer, so registering the same listener twice is a no-op and
//! removal needs the original handle.
//!
//! # Event Catalog
//!
//! | Kind | Payload | Aliases |
//! |------|---------|---------|
//! | `start` | - | `connected` |
//! | `stop` | - | `disconnected` |
//! | `error` | reason | `failed` |
//! | `ack` | - | |
//! | `connection_info` | raw message | |
//! | `video_info` | raw message | |
//! | `destination` | raw message | |
//! | `speaking` | - | |
//! | `silent` | - | |
//! | `unknown` | raw message | |
//! | `startup_error` | reason | |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::{error, trace};

use crate::error::{Error, Result};

// ============================================================================
// Types
// ============================================================================

/// Event listener callback.
///
/// Identity is the `Arc` allocation: keep a clone to unsubscribe later.
pub type Listener = Arc<dyn Fn(&Event) + Send + Sync>;

/// Per-kind listener lists.
type Registry = FxHashMap<EventKind, Vec<Listener>>;

// ============================================================================
// EventKind
// ============================================================================

/// Name of an event in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// First video frame presented.
    Start,
    /// Session ended (remote STOP, end of frames, or local stop).
    Stop,
    /// Fatal failure with a reason.
    Error,
    /// Remote acknowledged session start.
    Ack,
    /// Negotiation payload (answer description or relay join info).
    ConnectionInfo,
    /// Video metadata from the renderer.
    VideoInfo,
    /// Destination notice from the renderer.
    Destination,
    /// Avatar started speaking.
    Speaking,
    /// Avatar went silent.
    Silent,
    /// Unclassified inbound message.
    Unknown,
    /// Transport could not be constructed.
    StartupError,
}

impl EventKind {
    /// Every kind in catalog order.
    pub const ALL: [EventKind; 11] = [
        Self::Start,
        Self::Stop,
        Self::Error,
        Self::Ack,
        Self::ConnectionInfo,
        Self::VideoInfo,
        Self::Destination,
        Self::Speaking,
        Self::Silent,
        Self::Unknown,
        Self::StartupError,
    ];

    /// Returns the canonical event name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Error => "error",
            Self::Ack => "ack",
            Self::ConnectionInfo => "connection_info",
            Self::VideoInfo => "video_info",
            Self::Destination => "destination",
            Self::Speaking => "speaking",
            Self::Silent => "silent",
            Self::Unknown => "unknown",
            Self::StartupError => "startup_error",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self> {
        let kind = match name {
            "start" | "connected" => Self::Start,
            "stop" | "disconnected" => Self::Stop,
            "error" | "failed" => Self::Error,
            "ack" => Self::Ack,
            "connection_info" => Self::ConnectionInfo,
            "video_info" => Self::VideoInfo,
            "destination" => Self::Destination,
            "speaking" => Self::Speaking,
            "silent" => Self::Silent,
            "unknown" => Self::Unknown,
            "startup_error" => Self::StartupError,
            other => return Err(Error::unknown_event(other)),
        };
        Ok(kind)
    }
}

// ============================================================================
// Event
// ============================================================================

/// An emitted event with its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// First video frame presented.
    Start,
    /// Session ended.
    Stop,
    /// Fatal failure.
    Error(String),
    /// Start acknowledged.
    Ack,
    /// Raw negotiation message.
    ConnectionInfo(String),
    /// Raw video metadata message.
    VideoInfo(String),
    /// Raw destination message.
    Destination(String),
    /// Avatar speaking.
    Speaking,
    /// Avatar silent.
    Silent,
    /// Raw unclassified message.
    Unknown(String),
    /// Transport construction failure.
    StartupError(String),
}

impl Event {
    /// Returns the kind this event is delivered under.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Start => EventKind::Start,
            Self::Stop => EventKind::Stop,
            Self::Error(_) => EventKind::Error,
            Self::Ack => EventKind::Ack,
            Self::ConnectionInfo(_) => EventKind::ConnectionInfo,
            Self::VideoInfo(_) => EventKind::VideoInfo,
            Self::Destination(_) => EventKind::Destination,
            Self::Speaking => EventKind::Speaking,
            Self::Silent => EventKind::Silent,
            Self::Unknown(_) => EventKind::Unknown,
            Self::StartupError(_) => EventKind::StartupError,
        }
    }

    /// Returns the payload, if this event carries one.
    #[must_use]
    pub fn payload(&self) -> Option<&str> {
        match self {
            Self::Error(s)
            | Self::ConnectionInfo(s)
            | Self::VideoInfo(s)
            | Self::Destination(s)
            | Self::Unknown(s)
            | Self::StartupError(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

// ============================================================================
// EventBus
// ============================================================================

/// Publish/subscribe registry.
///
/// Cloning yields another handle to the same registry.
#[derive(Clone, Default)]
pub struct EventBus {
    registry: Arc<Mutex<Registry>>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.len())
            .finish()
    }
}

impl EventBus {
    /// Creates an empty bus.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener for `kind`.
    ///
    /// Returns `false` if this exact listener was already registered.
    pub fn on(&self, kind: EventKind, listener: Listener) -> bool {
        let mut registry = self.registry.lock();
        let listeners = registry.entry(kind).or_default();

        if listeners.iter().any(|l| Arc::ptr_eq(l, &listener)) {
            return false;
        }

        listeners.push(listener);
        true
    }

    /// Removes a listener for `kind`.
    ///
    /// Returns `false` if it was not registered.
    pub fn off(&self, kind: EventKind, listener: &Listener) -> bool {
        let mut registry = self.registry.lock();
        let Some(listeners) = registry.get_mut(&kind) else {
            return false;
        };

        let before = listeners.len();
        listeners.retain(|l| !Arc::ptr_eq(l, listener));
        before != listeners.len()
    }

    /// Delivers `event` to every listener of its kind, in registration order.
    ///
    /// The registry is not locked during delivery. A panicking listener is
    /// logged and skipped.
    pub fn emit(&self, event: &Event) {
        let kind = event.kind();
        let listeners: Vec<Listener> = self
            .registry
            .lock()
            .get(&kind)
            .cloned()
            .unwrap_or_default();

        trace!(event = %kind, listeners = listeners.len(), "Emitting event");

        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                error!(event = %kind, "Event listener panicked");
            }
        }
    }

    /// Snapshot of every registration, in catalog then registration order.
    #[must_use]
    pub fn listeners(&self) -> Vec<(EventKind, Listener)> {
        let registry = self.registry.lock();
        EventKind::ALL
            .iter()
            .filter_map(|kind| registry.get(kind).map(|ls| (*kind, ls)))
            .flat_map(|(kind, ls)| ls.iter().map(move |l| (kind, Arc::clone(l))))
            .collect()
    }

    /// Returns the number of listeners for `kind`.
    #[must_use]
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.registry.lock().get(&kind).map_or(0, Vec::len)
    }

    /// Returns the total number of registrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.registry.lock().values().map(Vec::len).sum()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every registration.
    pub fn clear(&self) {
        self.registry.lock().clear();
    }
}

// ============================================================================
// Tests
// ============================================================================
