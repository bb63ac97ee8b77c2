//! Session orchestration.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`SessionController`] | Public façade, retry and fallback |
//! | [`SessionConfig`] | Validated configuration |
//! | [`SessionState`] | Lifecycle state |

// ============================================================================
// Submodules
// ============================================================================

/// Configuration and builder.
pub mod config;

/// Controller façade.
pub mod controller;

/// Lifecycle states.
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use config::{SessionConfig, SessionConfigBuilder};
pub use controller::SessionController;
pub use state::SessionState;
