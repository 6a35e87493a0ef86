//! # gantry-auth
//!
//! Reader authentication for the Gantry toll network.
//!
//! This crate provides:
//! - **ReaderRegistry**: field reader credentials with versioned, rotating secrets
//! - **Event signatures**: HMAC-SHA256 over reported toll events
//! - **NonceLedger**: replay detection over (reader, nonce) pairs
//!
//! ## Security Properties
//!
//! - Signature comparison is constant-time via `subtle`
//! - Verification fails closed: unknown or revoked readers are rejected
//! - Nonce pruning is time-bucketed, and the retention window is strictly
//!   wider than the clock-drift window, so a nonce still inside the
//!   freshness check can never be resurrected by pruning

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod nonce;
pub mod registry;
pub mod signature;

pub use error::{AuthError, Result};
pub use nonce::{validate_freshness, NonceLedger};
pub use registry::{Reader, ReaderId, ReaderRegistry, ReaderSecret, ReaderState};
pub use signature::{sign_challenge, sign_event, verify_challenge, verify_event};
