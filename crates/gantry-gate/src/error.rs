//! Unified error type for engine operations.

use thiserror::Error;

/// Errors surfaced by [`crate::TrustEngine`] operations.
///
/// Admission rejections are *not* errors; they are
/// [`crate::AdmissionDecision::Rejected`] outcomes. This type covers the
/// administrative and restoration-path operations.
#[derive(Error, Debug)]
pub enum GateError {
    /// Authentication or registry failure.
    #[error(transparent)]
    Auth(#[from] gantry_auth::AuthError),

    /// Trust, probation, consensus or restoration failure.
    #[error(transparent)]
    Trust(#[from] gantry_trust::TrustError),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, GateError>;
