//! Request and response types for the session HTTP endpoints.
//!
//! The HTTP calls themselves belong to the caller; this module fixes the
//! payload shapes and the ICE fallback policy so every caller agrees on them.
//!
//! | Endpoint | Method | Body | Response |
//! |----------|--------|------|----------|
//! | `…/session` | `POST` | [`SessionRequest`] | [`SessionTokenResponse`] |
//! | `…/ice` | `GET` | - | `[IceServer]` |
//!
//! Both endpoints authenticate with the [`API_KEY_HEADER`] header.

// ============================================================================
// Imports
// ============================================================================

use std::fmt::Display;

use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;

use crate::identifiers::SessionToken;

// ============================================================================
// Constants
// ============================================================================

/// Header carrying the API key on both endpoints.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Public STUN server used when ICE discovery fails.
pub const FALLBACK_STUN_URL: &str = "stun:stun.l.google.com:19302";

// ============================================================================
// Token Issuance
// ============================================================================

/// Body of the token-issuance request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRequest {
    /// Avatar face to render.
    pub face_id: String,
    /// Let the renderer animate during silence.
    pub handle_silence: bool,
    /// Hard cap on session length, in seconds.
    pub max_session_length: u32,
    /// Idle time before the server closes the session, in seconds.
    pub max_idle_time: u32,
    /// Rendering model name.
    pub model: String,
}

/// Response of the token-issuance request.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionTokenResponse {
    /// Issued session credential.
    pub session_token: SessionToken,
}

// ============================================================================
// IceServer
// ============================================================================

/// One ICE server descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServer {
    /// Server URLs; a single string is accepted on input.
    #[serde(deserialize_with = "one_or_many")]
    pub urls: Vec<String>,

    /// TURN username.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// TURN credential.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl IceServer {
    /// Creates a credential-less server entry.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            username: None,
            credential: None,
        }
    }

    /// Adds TURN credentials.
    #[must_use]
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        credential: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.credential = Some(credential.into());
        self
    }
}

/// Returns the single public STUN entry.
#[must_use]
pub fn default_ice_servers() -> Vec<IceServer> {
    vec![IceServer::new(FALLBACK_STUN_URL)]
}

/// Applies the ICE discovery fallback policy.
///
/// Any failure, or an empty list, yields [`default_ice_servers`].
pub fn resolve_ice_servers<E: Display>(result: Result<Vec<IceServer>, E>) -> Vec<IceServer> {
    match result {
        Ok(servers) if !servers.is_empty() => servers,
        Ok(_) => {
            warn!("ICE discovery returned no servers, using public STUN");
            default_ice_servers()
        }
        Err(e) => {
            warn!(error = %e, "ICE discovery failed, using public STUN");
            default_ice_servers()
        }
    }
}

/// Accepts `"url"` or `["url", ...]`.
fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(url) => vec![url],
        OneOrMany::Many(urls) => urls,
    })
}

// ============================================================================
// Tests
// ============================================================================
