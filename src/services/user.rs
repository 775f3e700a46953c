//! User service
//!
//! Sign-up and profile management. Login lives in the session manager; this
//! service only owns the user records.
//!
//! Input validation happens here rather than in the handlers:
//! - username: 3 to 50 characters
//! - email: `local@domain.tld` shape
//! - password: 6 to 100 characters
//! - birthdate: `YYYY-MM-DD`

use crate::db::repositories::UserRepository;
use crate::models::{NewUser, UpdateUserInput, User, UserPublic};
use crate::services::error::AuthError;
use crate::services::password::CredentialVerifier;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::sync::Arc;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid")
});

const USERNAME_LEN: (usize, usize) = (3, 50);
const PASSWORD_LEN: (usize, usize) = (6, 100);

/// Input for user registration
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterInput {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl RegisterInput {
    /// Create a new registration input
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            password: password.into(),
        }
    }
}

/// User service for registration and profiles
pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
    verifier: CredentialVerifier,
}

impl UserService {
    /// Create a new user service
    pub fn new(user_repo: Arc<dyn UserRepository>, verifier: CredentialVerifier) -> Self {
        Self {
            user_repo,
            verifier,
        }
    }

    /// Register a new user
    ///
    /// # Errors
    ///
    /// - `Validation` if a field is malformed
    /// - `UsernameInUse` / `EmailInUse` if the username or email is taken
    /// - `HashingFailure` / `PersistenceFailure` on infrastructure errors
    pub async fn register(&self, input: RegisterInput) -> Result<User, AuthError> {
        validate_register_input(&input)?;

        if self.user_repo.exists(&input.username).await? {
            return Err(AuthError::UsernameInUse);
        }

        if self.user_repo.email_exists(&input.email).await? {
            return Err(AuthError::EmailInUse);
        }

        let password_hash = self.verifier.hash(&input.password)?;

        let user = self
            .user_repo
            .create(&NewUser {
                username: input.username,
                password_hash,
                email: input.email,
            })
            .await?;

        tracing::info!(username = %user.username, "User registered");

        Ok(user)
    }

    /// Full profile of `username`, for its owner
    pub async fn get_profile(&self, username: &str) -> Result<User, AuthError> {
        self.user_repo
            .get_by_username(username)
            .await?
            .ok_or(AuthError::UserNotFound)
    }

    /// Public projection of a profile, visible to anyone
    pub async fn get_public_profile(&self, username: &str) -> Result<UserPublic, AuthError> {
        Ok(self.get_profile(username).await?.public())
    }

    /// Apply a partial update; absent or empty fields keep their value.
    ///
    /// # Errors
    ///
    /// - `UserNotFound` if the user disappeared
    /// - `Validation` for a malformed email or birthdate
    /// - `EmailInUse` if the new email belongs to another account
    pub async fn update_profile(
        &self,
        username: &str,
        input: UpdateUserInput,
    ) -> Result<User, AuthError> {
        let mut user = self.get_profile(username).await?;

        if let Some(name) = non_empty(input.name) {
            user.name = name;
        }
        if let Some(surname) = non_empty(input.surname) {
            user.surname = surname;
        }
        if let Some(email) = non_empty(input.email) {
            if email != user.email {
                validate_email(&email)?;
                if self.user_repo.email_exists(&email).await? {
                    return Err(AuthError::EmailInUse);
                }
                user.email = email;
            }
        }
        if let Some(phone_number) = non_empty(input.phone_number) {
            user.phone_number = phone_number;
        }
        if let Some(birthdate) = non_empty(input.birthdate) {
            user.birthdate = Some(parse_birthdate(&birthdate)?);
        }

        let updated = self.user_repo.update(&user).await?;
        tracing::info!(username, "Profile updated");

        Ok(updated)
    }

    /// Check whether a username is taken
    pub async fn exists(&self, username: &str) -> Result<bool, AuthError> {
        Ok(self.user_repo.exists(username).await?)
    }

    /// Check whether an email is registered
    pub async fn email_exists(&self, email: &str) -> Result<bool, AuthError> {
        Ok(self.user_repo.email_exists(email).await?)
    }
}

/// Both login fields are required; their content is checked by the login itself.
pub fn validate_login_input(username: &str, password: &str) -> Result<(), AuthError> {
    if username.is_empty() || password.is_empty() {
        return Err(AuthError::Validation(
            "Username and password are required".to_string(),
        ));
    }
    Ok(())
}

fn validate_register_input(input: &RegisterInput) -> Result<(), AuthError> {
    let username_len = input.username.chars().count();
    if username_len < USERNAME_LEN.0 || username_len > USERNAME_LEN.1 {
        return Err(AuthError::Validation(format!(
            "Username must be between {} and {} characters",
            USERNAME_LEN.0, USERNAME_LEN.1
        )));
    }

    validate_email(&input.email)?;

    let password_len = input.password.chars().count();
    if password_len < PASSWORD_LEN.0 || password_len > PASSWORD_LEN.1 {
        return Err(AuthError::Validation(format!(
            "Password must be between {} and {} characters",
            PASSWORD_LEN.0, PASSWORD_LEN.1
        )));
    }

    Ok(())
}

fn validate_email(email: &str) -> Result<(), AuthError> {
    if !EMAIL_RE.is_match(email) {
        return Err(AuthError::Validation("Invalid email format".to_string()));
    }
    Ok(())
}

fn parse_birthdate(value: &str) -> Result<NaiveDate, AuthError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| {
        AuthError::Validation("Invalid birthdate format, expected YYYY-MM-DD".to_string())
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
