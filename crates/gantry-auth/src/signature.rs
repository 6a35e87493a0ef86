//! HMAC-SHA256 signatures over reported toll events.
//!
//! A reader signs the concatenation `tag_hash ∥ reader_id ∥ timestamp ∥ nonce`
//! (timestamp as decimal Unix seconds) with its current secret and sends the
//! hex digest alongside the event. Verification recomputes the MAC and
//! compares in constant time.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{AuthError, Result};
use crate::registry::ReaderSecret;

type HmacSha256 = Hmac<Sha256>;

fn mac_hex(secret: &ReaderSecret, message: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(message);
    hex::encode(mac.finalize().into_bytes())
}

/// Compute the hex-encoded event signature a reader is expected to present.
#[must_use]
pub fn sign_event(
    secret: &ReaderSecret,
    tag_hash: &str,
    reader_id: &str,
    timestamp: i64,
    nonce: &str,
) -> String {
    let message = format!("{tag_hash}{reader_id}{timestamp}{nonce}");
    mac_hex(secret, message.as_bytes())
}

/// Compute the signature expected for a probation `SignatureVerify` challenge.
///
/// The challenge message is `reader_id ∥ nonce`.
#[must_use]
pub fn sign_challenge(secret: &ReaderSecret, reader_id: &str, nonce: &str) -> String {
    let message = format!("{reader_id}{nonce}");
    mac_hex(secret, message.as_bytes())
}

/// Verify a probation challenge signature.
///
/// Unlike [`verify_event`], this returns a plain `bool`: a wrong answer to
/// a challenge is a graded outcome, not an error.
#[must_use]
pub fn verify_challenge(
    secret: &ReaderSecret,
    reader_id: &str,
    nonce: &str,
    presented: &str,
) -> bool {
    let expected = sign_challenge(secret, reader_id, nonce);
    let expected_bytes = hex::decode(&expected).expect("own digest is valid hex");
    match hex::decode(presented) {
        Ok(bytes) if bytes.len() == expected_bytes.len() => {
            bool::from(expected_bytes.ct_eq(bytes.as_slice()))
        }
        _ => false,
    }
}

/// Verify a presented event signature against the reader's active secret.
///
/// # Errors
///
/// Returns [`AuthError::SignatureMismatch`] when the MAC does not match
/// (including a presented value that is not valid hex or has the wrong
/// length); no detail about which byte differed ever leaks.
pub fn verify_event(
    secret: &ReaderSecret,
    tag_hash: &str,
    reader_id: &str,
    timestamp: i64,
    nonce: &str,
    presented: &str,
) -> Result<()> {
    let expected = sign_event(secret, tag_hash, reader_id, timestamp, nonce);
    let expected_bytes = hex::decode(&expected).expect("own digest is valid hex");
    let presented_bytes = match hex::decode(presented) {
        Ok(bytes) => bytes,
        Err(_) => return Err(AuthError::SignatureMismatch),
    };
    if presented_bytes.len() != expected_bytes.len() {
        return Err(AuthError::SignatureMismatch);
    }
    if bool::from(expected_bytes.ct_eq(presented_bytes.as_slice())) {
        Ok(())
    } else {
        Err(AuthError::SignatureMismatch)
    }
}
