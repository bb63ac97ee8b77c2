//! Negotiation payloads carried over the signaling channel.
//!
//! # Format
//!
//! Session descriptions (offer sent, answer received):
//!
//! ```json
//! { "type": "answer", "sdp": "v=0\r\n..." }
//! ```
//!
//! Relay join info:
//!
//! ```json
//! { "livekit_url": "wss://relay.example.com", "livekit_token": "..." }
//! ```
//!
//! Inbound payloads may carry a leading token before the JSON body; parsing
//! starts at the first `{`.

// ============================================================================
// Imports
// ============================================================================

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ============================================================================
// SdpType
// ============================================================================

/// Role of a session description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    /// Local proposal.
    Offer,
    /// Remote acceptance.
    Answer,
    /// Provisional answer.
    Pranswer,
    /// Roll back to the last stable state.
    Rollback,
}

// ============================================================================
// SessionDescription
// ============================================================================

/// A typed SDP blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    /// Description role.
    #[serde(rename = "type")]
    pub sdp_type: SdpType,

    /// Raw SDP text.
    pub sdp: String,
}

impl SessionDescription {
    /// Creates an offer.
    #[inline]
    #[must_use]
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    /// Creates an answer.
    #[inline]
    #[must_use]
    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }

    /// Parses a raw `connection_info` message as a remote answer.
    ///
    /// # Errors
    ///
    /// [`Error::Protocol`] if the payload is not JSON, not a description, is
    /// not of type `answer`, or carries empty SDP.
    pub fn parse_answer(raw: &str) -> Result<Self> {
        let description: Self = parse_embedded_json(raw)?;

        if description.sdp_type != SdpType::Answer {
            return Err(Error::protocol(format!(
                "expected answer description, got {:?}",
                description.sdp_type
            )));
        }
        if description.sdp.trim().is_empty() {
            return Err(Error::protocol("answer description has empty sdp"));
        }

        Ok(description)
    }
}

// ============================================================================
// JoinInfo
// ============================================================================

/// Relay session coordinates delivered in `connection_info`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct JoinInfo {
    /// Relay server URL.
    #[serde(alias = "livekit_url", alias = "livekitUrl")]
    pub url: String,

    /// Access credential for the relay room.
    #[serde(alias = "livekit_token", alias = "livekitToken", alias = "access_token")]
    pub token: String,
}

impl JoinInfo {
    /// Parses a raw `connection_info` message as relay join info.
    ///
    /// # Errors
    ///
    /// [`Error::Protocol`] if the payload is malformed or has empty fields.
    pub fn parse(raw: &str) -> Result<Self> {
        let info: Self = parse_embedded_json(raw)?;

        if info.url.trim().is_empty() || info.token.trim().is_empty() {
            return Err(Error::protocol("join info has empty url or token"));
        }

        Ok(info)
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Deserializes the first JSON value starting at the first `{` of `raw`.
///
/// Text after that value is ignored.
fn parse_embedded_json<T: DeserializeOwned>(raw: &str) -> Result<T> {
    let start = raw
        .find('{')
        .ok_or_else(|| Error::protocol("payload contains no JSON object"))?;

    serde_json::Deserializer::from_str(&raw[start..])
        .into_iter::<T>()
        .next()
        .ok_or_else(|| Error::protocol("payload contains no JSON object"))?
        .map_err(|e| Error::protocol(format!("invalid payload: {e}")))
}

// ============================================================================
// Tests
// ============================================================================
