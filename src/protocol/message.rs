//! Signaling message classification and control signals.
//!
//! Inbound text frames are classified by their first whitespace-delimited
//! token, compared case-insensitively. Messages without a known token fall
//! back to content inspection.
//!
//! # Token Table
//!
//! | Token | Classification | Closes channel |
//! |-------|----------------|----------------|
//! | `START` | [`Inbound::Start`] | no |
//! | `ACK` | [`Inbound::Ack`] | no |
//! | `STOP` | [`Inbound::Stop`] | yes, before emitting |
//! | `CLOSING` / `RATE` / `ERROR` | [`Inbound::Fatal`] | yes, before emitting |
//! | `SPEAK` | [`Inbound::Speak`] | no |
//! | `SILENT` | [`Inbound::Silent`] | no |
//!
//! # Content Fallback
//!
//! | Contains | Classification |
//! |----------|----------------|
//! | `SDP` or `LIVEKIT` | [`Inbound::ConnectionInfo`] |
//! | `VIDEO_METADATA` | [`Inbound::VideoInfo`] |
//! | `ENDFRAME` | [`Inbound::EndFrame`] (closes after emitting) |
//! | `DESTINATION` | [`Inbound::Destination`] |
//! | anything else | [`Inbound::Unknown`] |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use crate::events::Event;

// ============================================================================
// Constants
// ============================================================================

/// ASCII prefix asking the renderer to bypass its playback queue.
pub const PLAY_IMMEDIATE_MARKER: &[u8] = b"PLAY_IMMEDIATE";

// ============================================================================
// ControlSignal
// ============================================================================

/// Short outbound control tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    /// Client is done with the session.
    Done,
    /// Skip the utterance currently being rendered.
    Skip,
}

impl ControlSignal {
    /// Returns the wire token.
    #[inline]
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Done => "DONE",
            Self::Skip => "SKIP",
        }
    }
}

impl fmt::Display for ControlSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Inbound
// ============================================================================

/// Classification of an inbound text frame.
///
/// Payload-carrying variants hold the raw message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Renderer started; informational.
    Start,
    /// Session start acknowledged.
    Ack,
    /// Remote ended the session.
    Stop,
    /// Remote-declared fatal condition (`CLOSING`, `RATE`, `ERROR`).
    Fatal(String),
    /// Avatar started speaking.
    Speak,
    /// Avatar went silent.
    Silent,
    /// Negotiation payload.
    ConnectionInfo(String),
    /// Video metadata.
    VideoInfo(String),
    /// Last frame rendered.
    EndFrame,
    /// Destination notice.
    Destination(String),
    /// Anything else.
    Unknown(String),
}

impl Inbound {
    /// Classifies a raw inbound text message.
    #[must_use]
    pub fn classify(text: &str) -> Self {
        let token = text
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_ascii_uppercase();

        match token.as_str() {
            "START" => return Self::Start,
            "ACK" => return Self::Ack,
            "STOP" => return Self::Stop,
            "CLOSING" | "RATE" | "ERROR" => return Self::Fatal(text.to_string()),
            "SPEAK" => return Self::Speak,
            "SILENT" => return Self::Silent,
            _ => {}
        }

        let upper = text.to_ascii_uppercase();
        if upper.contains("SDP") || upper.contains("LIVEKIT") {
            Self::ConnectionInfo(text.to_string())
        } else if upper.contains("VIDEO_METADATA") {
            Self::VideoInfo(text.to_string())
        } else if upper.contains("ENDFRAME") {
            Self::EndFrame
        } else if upper.contains("DESTINATION") {
            Self::Destination(text.to_string())
        } else {
            Self::Unknown(text.to_string())
        }
    }

    /// Returns `true` if the channel must close before the event is emitted.
    #[inline]
    #[must_use]
    pub const fn closes_before_emit(&self) -> bool {
        matches!(self, Self::Stop | Self::Fatal(_))
    }

    /// Returns `true` if the channel must close after the event is emitted.
    #[inline]
    #[must_use]
    pub const fn closes_after_emit(&self) -> bool {
        matches!(self, Self::EndFrame)
    }

    /// Returns the event this message produces, if any.
    #[must_use]
    pub fn to_event(&self) -> Option<Event> {
        match self {
            Self::Start => None,
            Self::Ack => Some(Event::Ack),
            Self::Stop | Self::EndFrame => Some(Event::Stop),
            Self::Fatal(raw) => Some(Event::Error(raw.clone())),
            Self::Speak => Some(Event::Speaking),
            Self::Silent => Some(Event::Silent),
            Self::ConnectionInfo(raw) => Some(Event::ConnectionInfo(raw.clone())),
            Self::VideoInfo(raw) => Some(Event::VideoInfo(raw.clone())),
            Self::Destination(raw) => Some(Event::Destination(raw.clone())),
            Self::Unknown(raw) => Some(Event::Unknown(raw.clone())),
        }
    }
}

/// Prefixes an audio frame with [`PLAY_IMMEDIATE_MARKER`].
#[must_use]
pub fn immediate_frame(frame: &[u8]) -> Vec<u8> {
    let mut data = Vec::with_capacity(PLAY_IMMEDIATE_MARKER.len() + frame.len());
    data.extend_from_slice(PLAY_IMMEDIATE_MARKER);
    data.extend_from_slice(frame);
    data
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_table() {
        assert_eq!(Inbound::classify("START"), Inbound::Start);
        assert_eq!(Inbound::classify("ACK"), Inbound::Ack);
        assert_eq!(Inbound::classify("STOP now"), Inbound::Stop);
        assert_eq!(Inbound::classify("SPEAK"), Inbound::Speak);
        assert_eq!(Inbound::classify("SILENT"), Inbound::Silent);
    }

    #[test]
    fn test_token_is_case_insensitive() {
        assert_eq!(Inbound::classify("ack"), Inbound::Ack);
        assert_eq!(Inbound::classify("  Speak  "), Inbound::Speak);
    }

    #[test]
    fn test_fatal_tokens_keep_raw_message() {
        for raw in ["CLOSING idle", "RATE limit exceeded", "error bad token"] {
            let inbound = Inbound::classify(raw);
            assert_eq!(inbound, Inbound::Fatal(raw.to_string()));
            assert!(inbound.closes_before_emit());
        }
    }

    #[test]
    fn test_fatal_token_emits_only_error() {
        let event = Inbound::classify("ERROR boom").to_event();
        assert_eq!(event, Some(Event::Error("ERROR boom".into())));
    }

    #[test]
    fn test_speak_emits_speaking() {
        let inbound = Inbound::classify("SPEAK");
        assert_eq!(inbound.to_event(), Some(Event::Speaking));
        assert!(!inbound.closes_before_emit());
        assert!(!inbound.closes_after_emit());
    }

    #[test]
    fn test_start_is_informational() {
        assert_eq!(Inbound::classify("START").to_event(), None);
    }

    #[test]
    fn test_content_fallback() {
        let answer = r#"{"type":"answer","sdp":"v=0"}"#;
        assert_eq!(
            Inbound::classify(answer),
            Inbound::ConnectionInfo(answer.to_string())
        );

        let join = r#"{"livekit_url":"wss://relay","livekit_token":"t"}"#;
        assert!(matches!(Inbound::classify(join), Inbound::ConnectionInfo(_)));

        assert!(matches!(
            Inbound::classify(r#"{"VIDEO_METADATA":{"w":512}}"#),
            Inbound::VideoInfo(_)
        ));
        assert!(matches!(
            Inbound::classify(r#"{"destination":"x"}"#),
            Inbound::Destination(_)
        ));
        assert!(matches!(Inbound::classify("hello"), Inbound::Unknown(_)));
    }

    #[test]
    fn test_endframe_closes_after_emit() {
        let inbound = Inbound::classify(r#"{"event":"ENDFRAME"}"#);
        assert_eq!(inbound, Inbound::EndFrame);
        assert!(inbound.closes_after_emit());
        assert_eq!(inbound.to_event(), Some(Event::Stop));
    }

    #[test]
    fn test_empty_message_is_unknown() {
        assert_eq!(Inbound::classify(""), Inbound::Unknown(String::new()));
    }

    #[test]
    fn test_immediate_frame_prefix() {
        let data = immediate_frame(&[1, 2]);
        assert!(data.starts_with(b"PLAY_IMMEDIATE"));
        assert_eq!(&data[PLAY_IMMEDIATE_MARKER.len()..], &[1, 2]);
    }

    #[test]
    fn test_control_signal_tokens() {
        assert_eq!(ControlSignal::Done.as_str(), "DONE");
        assert_eq!(ControlSignal::Skip.to_string(), "SKIP");
    }
}
