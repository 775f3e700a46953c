//! Password hashing module
//!
//! Secure password hashing and verification using Argon2id.
//!
//! # Security
//!
//! - Argon2id variant (hybrid of Argon2i and Argon2d)
//! - Memory, time and parallelism costs come from `PasswordConfig`
//! - A random salt from the OS RNG for each hash
//! - Verification is constant-time in the position of the first mismatch

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};

use crate::config::PasswordConfig;
use crate::services::error::AuthError;

/// Hashes and checks passwords. Holds no state besides the cost parameters.
#[derive(Clone)]
pub struct CredentialVerifier {
    argon2: Argon2<'static>,
}

impl CredentialVerifier {
    /// Build a verifier from configured Argon2id costs.
    ///
    /// # Errors
    ///
    /// Returns `HashingFailure` if the parameters are out of range.
    pub fn new(config: &PasswordConfig) -> Result<Self, AuthError> {
        let params = Params::new(
            config.memory_kib,
            config.iterations,
            config.parallelism,
            None,
        )
        .map_err(|e| AuthError::HashingFailure(format!("Invalid Argon2 parameters: {}", e)))?;

        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    /// Hash a password into a PHC string (algorithm, parameters, salt and hash).
    ///
    /// ```ignore
    /// let hash = verifier.hash("my_secure_password")?;
    /// assert!(hash.starts_with("$argon2id$"));
    /// ```
    pub fn hash(&self, password: &str) -> Result<String, AuthError> {
        let salt = SaltString::generate(&mut OsRng);

        let password_hash = self
            .argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AuthError::HashingFailure(format!("Failed to hash password: {}", e)))?;

        Ok(password_hash.to_string())
    }

    /// Verify a password against a stored hash.
    ///
    /// Never fails: a mismatch and an unreadable stored hash both yield `false`.
    /// The cost parameters are read from the stored hash, so hashes made with
    /// older settings keep verifying.
    pub fn verify(&self, password: &str, hash: &str) -> bool {
        let parsed_hash = match PasswordHash::new(hash) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!("Stored password hash is unreadable: {}", e);
                return false;
            }
        };

        match self.argon2.verify_password(password.as_bytes(), &parsed_hash) {
            Ok(()) => true,
            Err(argon2::password_hash::Error::Password) => false,
            Err(e) => {
                tracing::warn!("Password verification error: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
pub(crate) fn test_verifier() -> CredentialVerifier {
    CredentialVerifier::new(&PasswordConfig {
        memory_kib: 1024,
        iterations: 1,
        parallelism: 1,
    })
    .expect("Test Argon2 parameters are valid")
}
