//! Field reader credentials with versioned, rotating secrets.
//!
//! Every reader authenticates with a shared secret that can be rotated
//! without disrupting operation: the server installs the new secret and
//! bumps the key version, and the reader must present the matching version
//! from then on. Revocation is irreversible for admission purposes; the
//! record (and its last secret) is retained so an abused credential can
//! still be audited.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{AuthError, Result};

/// Identifier of a field reader.
pub type ReaderId = String;

/// A reader's shared secret. Wiped from memory on drop.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct ReaderSecret(String);

impl ReaderSecret {
    /// Wrap an existing secret string.
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Generate a fresh random secret (32 bytes, hex-encoded).
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    /// Key bytes for MAC computation.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl std::fmt::Debug for ReaderSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material.
        f.write_str("ReaderSecret(..)")
    }
}

/// Operational state of a reader credential.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReaderState {
    /// Reader may authenticate events.
    Active,
    /// Credential permanently withdrawn; all events are rejected.
    Revoked,
}

/// A registered field reader.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Reader {
    /// Reader identifier.
    pub id: ReaderId,
    /// Current shared secret.
    secret: ReaderSecret,
    /// Version of the current secret; bumped on every rotation.
    pub key_version: u32,
    /// Operational state.
    pub state: ReaderState,
    /// When the reader was registered.
    pub registered_at: DateTime<Utc>,
    /// When the secret was last rotated, if ever.
    pub rotated_at: Option<DateTime<Utc>>,
}

impl Reader {
    /// The reader's current secret.
    #[must_use]
    pub fn secret(&self) -> &ReaderSecret {
        &self.secret
    }

    /// Whether this reader may authenticate events.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state == ReaderState::Active
    }
}

/// Registry of all known readers.
#[derive(Clone, Debug, Default)]
pub struct ReaderRegistry {
    readers: HashMap<ReaderId, Reader>,
}

impl ReaderRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new reader with the given secret at key version 1.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::DuplicateReader`] if the id is already taken.
    pub fn register(&mut self, id: impl Into<ReaderId>, secret: ReaderSecret) -> Result<()> {
        let id = id.into();
        if self.readers.contains_key(&id) {
            return Err(AuthError::DuplicateReader(id));
        }
        self.readers.insert(
            id.clone(),
            Reader {
                id,
                secret,
                key_version: 1,
                state: ReaderState::Active,
                registered_at: Utc::now(),
                rotated_at: None,
            },
        );
        Ok(())
    }

    /// Look up a reader by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Reader> {
        self.readers.get(id)
    }

    /// Look up a reader, failing closed on unknown or revoked credentials.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::UnknownReader`] or [`AuthError::ReaderRevoked`].
    pub fn require_active(&self, id: &str) -> Result<&Reader> {
        match self.readers.get(id) {
            None => Err(AuthError::UnknownReader(id.to_string())),
            Some(r) if !r.is_active() => Err(AuthError::ReaderRevoked(id.to_string())),
            Some(r) => Ok(r),
        }
    }

    /// Install a new secret and advance the key version.
    ///
    /// Returns the new key version. Clients presenting the old version are
    /// treated as stale from this point on.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::UnknownReader`] or [`AuthError::ReaderRevoked`];
    /// a revoked credential cannot be rotated back into service.
    pub fn rotate_key(&mut self, id: &str, new_secret: ReaderSecret) -> Result<u32> {
        let reader = match self.readers.get_mut(id) {
            None => return Err(AuthError::UnknownReader(id.to_string())),
            Some(r) if !r.is_active() => return Err(AuthError::ReaderRevoked(id.to_string())),
            Some(r) => r,
        };
        reader.secret = new_secret;
        reader.key_version += 1;
        reader.rotated_at = Some(Utc::now());
        Ok(reader.key_version)
    }

    /// Permanently revoke a reader's credential.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::UnknownReader`] if the id is unknown, or
    /// [`AuthError::ReaderRevoked`] if the reader is already revoked.
    pub fn revoke(&mut self, id: &str) -> Result<()> {
        let reader = self
            .readers
            .get_mut(id)
            .ok_or_else(|| AuthError::UnknownReader(id.to_string()))?;
        if reader.state == ReaderState::Revoked {
            return Err(AuthError::ReaderRevoked(id.to_string()));
        }
        reader.state = ReaderState::Revoked;
        Ok(())
    }

    /// Ids of all active readers.
    pub fn active_ids(&self) -> impl Iterator<Item = &ReaderId> {
        self.readers.values().filter(|r| r.is_active()).map(|r| &r.id)
    }

    /// Number of registered readers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.readers.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.readers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_lookup() {
        let mut registry = ReaderRegistry::new();
        registry
            .register("RDR-001", ReaderSecret::new("s1"))
            .unwrap();

        let reader = registry.require_active("RDR-001").unwrap();
        assert_eq!(reader.key_version, 1);
        assert!(reader.is_active());
        assert!(reader.rotated_at.is_none());
    }

    #[test]
    fn duplicate_registration_rejected() {
        let mut registry = ReaderRegistry::new();
        registry
            .register("RDR-001", ReaderSecret::new("s1"))
            .unwrap();
        let err = registry
            .register("RDR-001", ReaderSecret::new("s2"))
            .unwrap_err();
        assert!(matches!(err, AuthError::DuplicateReader(_)));
    }

    #[test]
    fn unknown_reader_fails_closed() {
        let registry = ReaderRegistry::new();
        assert!(matches!(
            registry.require_active("RDR-404"),
            Err(AuthError::UnknownReader(_))
        ));
    }

    #[test]
    fn rotate_bumps_version() {
        let mut registry = ReaderRegistry::new();
        registry
            .register("RDR-001", ReaderSecret::new("s1"))
            .unwrap();

        let v = registry
            .rotate_key("RDR-001", ReaderSecret::new("s2"))
            .unwrap();
        assert_eq!(v, 2);

        let reader = registry.get("RDR-001").unwrap();
        assert_eq!(reader.key_version, 2);
        assert_eq!(reader.secret().as_bytes(), b"s2");
        assert!(reader.rotated_at.is_some());
    }

    #[test]
    fn revoked_reader_rejected() {
        let mut registry = ReaderRegistry::new();
        registry
            .register("RDR-001", ReaderSecret::new("s1"))
            .unwrap();
        registry.revoke("RDR-001").unwrap();

        assert!(matches!(
            registry.require_active("RDR-001"),
            Err(AuthError::ReaderRevoked(_))
        ));
        // Revocation is irreversible: no rotation back into service.
        assert!(matches!(
            registry.rotate_key("RDR-001", ReaderSecret::new("s2")),
            Err(AuthError::ReaderRevoked(_))
        ));
        // Double revocation is an error, not a silent no-op.
        assert!(matches!(
            registry.revoke("RDR-001"),
            Err(AuthError::ReaderRevoked(_))
        ));
    }

    #[test]
    fn active_ids_excludes_revoked() {
        let mut registry = ReaderRegistry::new();
        registry.register("A", ReaderSecret::generate()).unwrap();
        registry.register("B", ReaderSecret::generate()).unwrap();
        registry.revoke("B").unwrap();

        let active: Vec<_> = registry.active_ids().collect();
        assert_eq!(active, vec!["A"]);
    }

    #[test]
    fn generated_secrets_are_unique() {
        let a = ReaderSecret::generate();
        let b = ReaderSecret::generate();
        assert_ne!(a.as_bytes(), b.as_bytes());
        assert_eq!(a.as_bytes().len(), 64); // 32 bytes hex-encoded
    }

    #[test]
    fn secret_debug_does_not_leak() {
        let secret = ReaderSecret::new("super-secret");
        let debug = format!("{:?}", secret);
        assert!(!debug.contains("super-secret"));
    }
}
