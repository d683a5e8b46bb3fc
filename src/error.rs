//! Crate error type.
//!
//! Counter operations never fail; errors only come from starting or joining a
//! flush scheduler and, with the `json` feature, from encoding snapshots.

use thiserror::Error;

/// Errors reported by this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// A flush interval of zero was requested.
    #[error("flush interval must be greater than zero")]
    ZeroInterval,

    /// A bounded flush lifetime of zero was requested.
    #[error("flush lifetime must be greater than zero")]
    ZeroLifetime,

    /// The background flush thread could not be spawned.
    #[error("failed to spawn flush thread: {0}")]
    Spawn(#[from] std::io::Error),

    /// The flush callback panicked; the scheduler stopped ticking.
    #[error("flush callback panicked")]
    CallbackPanicked,

    /// Error from the JSON encoder.
    #[cfg(feature = "json")]
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for fallible operations in this crate.
pub type Result<T> = std::result::Result<T, Error>;
