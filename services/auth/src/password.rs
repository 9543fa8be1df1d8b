//! Password hashing using Argon2id with a process-wide pepper

use argon2::{
    Argon2, PasswordHash, PasswordHasher as _, PasswordVerifier, password_hash::SaltString,
};
use sha2::{Digest, Sha512};
use std::fmt::Write as _;

use crate::error::{AuthError, AuthResult};

/// Prefix of every PHC string produced by the argon2 crate
const ARGON2_PREFIX: &str = "$argon2";

#[derive(Clone)]
pub struct PasswordHasher {
    pepper: String,
}

impl PasswordHasher {
    pub fn new(pepper: impl Into<String>) -> Self {
        Self {
            pepper: pepper.into(),
        }
    }

    fn peppered(&self, clear: &str) -> String {
        format!("{clear}{}", self.pepper)
    }

    /// Hash a password with a fresh random salt
    pub fn hash(&self, clear: &str) -> AuthResult<String> {
        let salt = SaltString::generate(&mut rand::thread_rng());
        let hash = Argon2::default()
            .hash_password(self.peppered(clear).as_bytes(), &salt)
            .map_err(|e| AuthError::Internal(format!("Failed to hash password: {e}")))?;

        Ok(hash.to_string())
    }

    /// Unsalted hex SHA-512 digest of the peppered password, as stored by older deployments
    pub fn legacy_digest(&self, clear: &str) -> String {
        let digest = Sha512::digest(self.peppered(clear).as_bytes());
        digest.iter().fold(String::with_capacity(128), |mut out, b| {
            let _ = write!(out, "{b:02x}");
            out
        })
    }

    pub fn is_legacy(stored: &str) -> bool {
        !stored.starts_with(ARGON2_PREFIX)
    }

    /// Check a clear password against a stored digest of either format
    pub fn verify(&self, clear: &str, stored: &str) -> AuthResult<bool> {
        if Self::is_legacy(stored) {
            return Ok(self.legacy_digest(clear) == stored);
        }

        let parsed = PasswordHash::new(stored)
            .map_err(|e| AuthError::Internal(format!("Failed to parse password hash: {e}")))?;

        match Argon2::default().verify_password(self.peppered(clear).as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(AuthError::Internal(format!("Failed to verify password: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher() -> PasswordHasher {
        PasswordHasher::new("test-pepper")
    }

    #[test]
    fn test_hash_verifies_only_its_input() {
        let hasher = hasher();
        let stored = hasher.hash("Secret123").unwrap();

        assert!(stored.starts_with(ARGON2_PREFIX));
        assert!(!PasswordHasher::is_legacy(&stored));
        assert!(hasher.verify("Secret123", &stored).unwrap());
        assert!(!hasher.verify("Secret124", &stored).unwrap());
    }

    #[test]
    fn test_hash_salts_every_call() {
        let hasher = hasher();
        let a = hasher.hash("Secret123").unwrap();
        let b = hasher.hash("Secret123").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_pepper_is_part_of_the_hash() {
        let stored = hasher().hash("Secret123").unwrap();
        let other = PasswordHasher::new("other-pepper");
        assert!(!other.verify("Secret123", &stored).unwrap());
    }

    #[test]
    fn test_legacy_digest_is_deterministic() {
        let hasher = hasher();
        let a = hasher.legacy_digest("Secret123");

        assert_eq!(a, hasher.legacy_digest("Secret123"));
        assert_ne!(a, hasher.legacy_digest("Secret124"));
        assert_eq!(a.len(), 128);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(PasswordHasher::is_legacy(&a));
    }

    #[test]
    fn test_legacy_digest_verifies() {
        let hasher = hasher();
        let stored = hasher.legacy_digest("Secret123");
        assert!(hasher.verify("Secret123", &stored).unwrap());
        assert!(!hasher.verify("secret123", &stored).unwrap());
    }

    #[test]
    fn test_malformed_phc_string_is_an_error() {
        assert!(hasher().verify("Secret123", "$argon2id$garbage").is_err());
    }
}
