/// Password Hashing and Verification
///
/// bcrypt with a configurable cost, used for user passwords and for refresh
/// token fingerprints. bcrypt compares in constant time.

use bcrypt::{hash, verify};
use sha2::{Digest, Sha256};

use crate::error::AppError;

pub const MIN_COST: u32 = 4;
pub const MAX_COST: u32 = 31;

#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    cost: u32,
}

impl PasswordHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    /// Hash a secret with a fresh salt
    ///
    /// # Errors
    /// Returns error if bcrypt hashing fails (e.g. cost out of range)
    pub fn hash(&self, secret: &str) -> Result<String, AppError> {
        hash(secret, self.cost)
            .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
    }

    /// Verify a secret against a stored bcrypt hash
    ///
    /// # Errors
    /// Returns error if the stored hash is malformed
    pub fn verify(&self, secret: &str, hashed: &str) -> Result<bool, AppError> {
        verify(secret, hashed)
            .map_err(|e| AppError::Internal(format!("Password verification failed: {}", e)))
    }

    /// One-way fingerprint of a refresh token for storage.
    ///
    /// bcrypt only reads the first 72 bytes, and every token shares its JOSE
    /// header, so the token is digested with SHA-256 first.
    pub fn fingerprint(&self, token: &str) -> Result<String, AppError> {
        self.hash(&digest_token(token))
    }

    pub fn verify_fingerprint(&self, token: &str, fingerprint: &str) -> Result<bool, AppError> {
        self.verify(&digest_token(token), fingerprint)
    }
}

fn digest_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}
