//! Signaling protocol message types.
//!
//! This module defines the messages exchanged with the control endpoint
//! over the signaling channel.
//!
//! # Protocol Overview
//!
//! | Message | Direction | Encoding |
//! |---------|-----------|----------|
//! | Control signal (`DONE`, `SKIP`) | Local → Remote | text |
//! | Offer description | Local → Remote | JSON text |
//! | Audio frame | Local → Remote | binary PCM16 LE |
//! | Immediate audio frame | Local → Remote | binary, `PLAY_IMMEDIATE` prefix |
//! | Status tokens, negotiation payloads | Remote → Local | text |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `description` | Session description and relay join info |
//! | `message` | Inbound classification and control signals |

// ============================================================================
// Submodules
// ============================================================================

/// Session description and relay join payloads.
pub mod description;

/// Inbound message classification and outbound control signals.
pub mod message;

// ============================================================================
// Re-exports
// ============================================================================

pub use description::{JoinInfo, SdpType, SessionDescription};
pub use message::{ControlSignal, Inbound, PLAY_IMMEDIATE_MARKER, immediate_frame};
