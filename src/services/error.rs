//! Authentication error taxonomy
//!
//! One error type shared by the session manager, the user service and the
//! authentication gate. The HTTP layer maps each kind to a status code.

/// Errors raised by authentication and profile operations
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Password did not match the stored hash
    #[error("Invalid username or password")]
    InvalidCredentials,

    /// No user with this username
    #[error("User not found")]
    UserNotFound,

    /// Username already taken at registration
    #[error("Username already exists")]
    UsernameInUse,

    /// Email already registered
    #[error("Email already exists")]
    EmailInUse,

    /// No token, or a token the store does not know
    #[error("Unauthorized")]
    Unauthenticated,

    /// Token found but past its expiry
    #[error("Session expired")]
    SessionExpired,

    /// Malformed client input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Store unreachable or errored
    #[error("Persistence failure: {0}")]
    PersistenceFailure(#[from] anyhow::Error),

    /// Password hashing algorithm error
    #[error("Hashing failure: {0}")]
    HashingFailure(String),
}

impl AuthError {
    /// Infrastructure faults are reported to clients without detail.
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, Self::PersistenceFailure(_) | Self::HashingFailure(_))
    }
}
