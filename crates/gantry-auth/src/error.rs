//! Error types for reader authentication.

use thiserror::Error;

/// Errors that can occur during reader authentication.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Reader is not present in the registry.
    #[error("unknown reader: {0}")]
    UnknownReader(String),

    /// Reader exists but its credential has been revoked.
    #[error("reader revoked: {0}")]
    ReaderRevoked(String),

    /// A reader with this id is already registered.
    #[error("reader already registered: {0}")]
    DuplicateReader(String),

    /// Presented key version does not match the reader's active version.
    #[error("stale key version: presented {presented}, active {active}")]
    StaleKeyVersion {
        /// Version the event was signed under.
        presented: u32,
        /// Version currently active for the reader.
        active: u32,
    },

    /// HMAC signature did not match.
    #[error("signature mismatch")]
    SignatureMismatch,

    /// Event timestamp falls outside the freshness window.
    #[error("timestamp drift {drift_secs}s exceeds allowed {max_secs}s")]
    StaleTimestamp {
        /// Absolute drift between event and server clock, in seconds.
        drift_secs: i64,
        /// Maximum allowed drift, in seconds.
        max_secs: i64,
    },

    /// Nonce has already been recorded for this reader.
    #[error("nonce already used")]
    NonceReused,
}

/// Result type for authentication operations.
pub type Result<T> = std::result::Result<T, AuthError>;
