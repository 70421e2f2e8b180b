//! # ta-auth-simple
//!
//! Argon2-based implementation of `AuthProvider`.
//! Handles password hashing for trail agents and the per-session nonce
//! that write requests echo back.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use ta_core::traits::AuthProvider;

/// Hex characters in an issued nonce.
const NONCE_LEN: usize = 20;

pub struct SimpleAuthProvider {
    /// Mixed into every nonce; a random one is used when empty
    nonce_salt: String,
}

impl SimpleAuthProvider {
    /// Accepts a salt string (e.g., from the `auth.nonce_salt` setting)
    pub fn new(salt: &str) -> Self {
        let nonce_salt = if salt.is_empty() {
            uuid::Uuid::new_v4().to_string()
        } else {
            salt.to_string()
        };
        Self { nonce_salt }
    }
}

#[async_trait]
impl AuthProvider for SimpleAuthProvider {
    fn hash_password(&self, password: &str) -> anyhow::Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| anyhow::anyhow!("password hashing failed: {e}"))?;
        Ok(hash.to_string())
    }

    /// Verifies if a provided password matches a stored Argon2 hash.
    async fn verify_password(&self, password: &str, hash: &str) -> bool {
        let parsed_hash = match PasswordHash::new(hash) {
            Ok(p) => p,
            Err(_) => return false,
        };
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok()
    }

    fn issue_nonce(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.nonce_salt.as_bytes());
        hasher.update(uuid::Uuid::new_v4().as_bytes());
        let hash = hex::encode(hasher.finalize());
        hash[..NONCE_LEN].to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hashes_verify_only_the_right_password() {
        let auth = SimpleAuthProvider::new("pepper");
        let hash = auth.hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(auth.verify_password("correct horse", &hash).await);
        assert!(!auth.verify_password("battery staple", &hash).await);
        assert!(!auth.verify_password("correct horse", "not-a-hash").await);
    }

    #[test]
    fn nonces_are_fresh_hex() {
        let auth = SimpleAuthProvider::new("");
        let a = auth.issue_nonce();
        let b = auth.issue_nonce();
        assert_eq!(a.len(), NONCE_LEN);
        assert!(a.bytes().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}
