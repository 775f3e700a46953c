//! Session manager
//!
//! Orchestrates login (verify credentials, then issue a session), logout,
//! logout-everywhere and token validation. The manager is stateless; all
//! session state lives in the session store.
//!
//! Validation deletes an expired session as soon as it is seen. The sweeper
//! only keeps the table small; expiry is enforced here regardless of when it
//! last ran.

use crate::db::repositories::{SessionRepository, UserRepository};
use crate::models::Session;
use crate::services::error::AuthError;
use crate::services::password::CredentialVerifier;
use chrono::{Duration, Utc};
use std::sync::Arc;

/// Session manager for issuing, revoking and validating sessions
pub struct SessionManager {
    user_repo: Arc<dyn UserRepository>,
    session_repo: Arc<dyn SessionRepository>,
    verifier: CredentialVerifier,
    default_ttl: Duration,
}

impl SessionManager {
    /// Create a new session manager
    pub fn new(
        user_repo: Arc<dyn UserRepository>,
        session_repo: Arc<dyn SessionRepository>,
        verifier: CredentialVerifier,
        default_ttl: Duration,
    ) -> Self {
        Self {
            user_repo,
            session_repo,
            verifier,
            default_ttl,
        }
    }

    /// Lifetime given to sessions issued through the HTTP login
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Verify credentials and issue a session living for `ttl`.
    ///
    /// # Errors
    ///
    /// - `UserNotFound` if no user has this username
    /// - `InvalidCredentials` if the password does not match
    /// - `PersistenceFailure` if the lookup or the insert fails
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        ttl: Duration,
    ) -> Result<Session, AuthError> {
        let user = match self.user_repo.get_by_username(username).await? {
            Some(user) => user,
            None => {
                tracing::info!(username, "Login failed: user not found");
                return Err(AuthError::UserNotFound);
            }
        };

        if !self.verifier.verify(password, &user.password_hash) {
            tracing::info!(username, "Login failed: invalid password");
            return Err(AuthError::InvalidCredentials);
        }

        let session = self
            .session_repo
            .create(user.id, &user.username, ttl)
            .await?;

        tracing::info!(
            username = %session.username,
            session_id = session.id,
            expires_at = %session.expires_at,
            "Session issued"
        );

        Ok(session)
    }

    /// Revoke one session. Unknown tokens are not an error.
    pub async fn logout(&self, token: &str) -> Result<(), AuthError> {
        self.session_repo.delete_by_token(token).await?;
        tracing::debug!("Session revoked");
        Ok(())
    }

    /// Revoke every session owned by `username`.
    pub async fn logout_all(&self, username: &str) -> Result<(), AuthError> {
        let revoked = self.session_repo.delete_all_for_user(username).await?;
        tracing::info!(username, revoked, "All sessions revoked");
        Ok(())
    }

    /// Resolve a token to its live session.
    ///
    /// # Errors
    ///
    /// - `Unauthenticated` if the token is empty or unknown
    /// - `SessionExpired` if the session is at or past its expiry; the session
    ///   is deleted before returning
    /// - `PersistenceFailure` on store errors
    pub async fn validate(&self, token: &str) -> Result<Session, AuthError> {
        if token.is_empty() {
            return Err(AuthError::Unauthenticated);
        }

        let session = self
            .session_repo
            .get_by_token(token)
            .await?
            .ok_or(AuthError::Unauthenticated)?;

        if session.is_expired_at(Utc::now()) {
            self.session_repo.delete_by_token(token).await?;
            tracing::info!(
                username = %session.username,
                session_id = session.id,
                "Expired session removed on access"
            );
            return Err(AuthError::SessionExpired);
        }

        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxSessionRepository, SqlxUserRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::NewUser;
    use crate::services::password::test_verifier;
    use proptest::prelude::*;

    struct Fixture {
        manager: SessionManager,
        user_repo: Arc<dyn UserRepository>,
        session_repo: Arc<dyn SessionRepository>,
    }

    async fn setup() -> Fixture {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let user_repo = SqlxUserRepository::boxed(pool.clone());
        let session_repo = SqlxSessionRepository::boxed(pool);
        let manager = SessionManager::new(
            user_repo.clone(),
            session_repo.clone(),
            test_verifier(),
            Duration::hours(24),
        );

        Fixture {
            manager,
            user_repo,
            session_repo,
        }
    }

    async fn create_user(fixture: &Fixture, username: &str, password: &str) -> i64 {
        let password_hash = test_verifier().hash(password).unwrap();
        fixture
            .user_repo
            .create(&NewUser {
                username: username.to_string(),
                password_hash,
                email: format!("{}@example.com", username),
            })
            .await
            .expect("Failed to create user")
            .id
    }

    #[tokio::test]
    async fn test_login_then_validate() {
        let fixture = setup().await;
        create_user(&fixture, "alice", "secret123").await;

        let before = Utc::now();
        let session = fixture
            .manager
            .login("alice", "secret123", Duration::hours(1))
            .await
            .expect("Login should succeed");

        assert!(!session.token.is_empty());
        assert_eq!(session.username, "alice");
        assert!(session.expires_at >= before + Duration::hours(1));
        assert!(session.expires_at <= Utc::now() + Duration::hours(1));

        let validated = fixture.manager.validate(&session.token).await.unwrap();
        assert_eq!(validated.username, "alice");
        assert_eq!(validated.id, session.id);
    }

    #[tokio::test]
    async fn test_login_wrong_password() {
        let fixture = setup().await;
        create_user(&fixture, "alice", "secret123").await;

        let result = fixture.manager.login("alice", "wrong", Duration::hours(1)).await;

        assert!(matches!(result, Err(AuthError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn test_login_unknown_user() {
        let fixture = setup().await;

        let result = fixture.manager.login("nobody", "secret123", Duration::hours(1)).await;

        assert!(matches!(result, Err(AuthError::UserNotFound)));
    }

    #[tokio::test]
    async fn test_login_with_unrepresentable_ttl_fails_cleanly() {
        let fixture = setup().await;
        create_user(&fixture, "alice", "secret123").await;

        let result = fixture
            .manager
            .login("alice", "secret123", Duration::seconds(9_000_000_000_000))
            .await;

        assert!(matches!(result, Err(AuthError::PersistenceFailure(_))));
    }

    #[tokio::test]
    async fn test_validate_unknown_token() {
        let fixture = setup().await;

        let result = fixture.manager.validate("never-issued").await;
        assert!(matches!(result, Err(AuthError::Unauthenticated)));

        let result = fixture.manager.validate("").await;
        assert!(matches!(result, Err(AuthError::Unauthenticated)));
    }

    #[tokio::test]
    async fn test_negative_ttl_session_is_expired_and_removed() {
        let fixture = setup().await;
        let bob = create_user(&fixture, "bob", "password1").await;

        let session = fixture
            .session_repo
            .create(bob, "bob", Duration::seconds(-1))
            .await
            .unwrap();

        let result = fixture.manager.validate(&session.token).await;
        assert!(matches!(result, Err(AuthError::SessionExpired)));

        let stored = fixture.session_repo.get_by_token(&session.token).await.unwrap();
        assert!(stored.is_none(), "Expired session must be deleted on access");

        // Second attempt no longer finds it at all
        let result = fixture.manager.validate(&session.token).await;
        assert!(matches!(result, Err(AuthError::Unauthenticated)));
    }

    #[tokio::test]
    async fn test_zero_ttl_session_is_expired() {
        let fixture = setup().await;
        create_user(&fixture, "zed", "password1").await;

        let session = fixture
            .manager
            .login("zed", "password1", Duration::zero())
            .await
            .unwrap();

        let result = fixture.manager.validate(&session.token).await;
        assert!(matches!(result, Err(AuthError::SessionExpired)));
    }

    #[tokio::test]
    async fn test_logout_is_idempotent() {
        let fixture = setup().await;
        create_user(&fixture, "alice", "secret123").await;
        let session = fixture
            .manager
            .login("alice", "secret123", Duration::hours(1))
            .await
            .unwrap();

        fixture.manager.logout(&session.token).await.expect("First logout");
        assert!(matches!(
            fixture.manager.validate(&session.token).await,
            Err(AuthError::Unauthenticated)
        ));

        fixture.manager.logout(&session.token).await.expect("Second logout");
        assert!(matches!(
            fixture.manager.validate(&session.token).await,
            Err(AuthError::Unauthenticated)
        ));
    }

    #[tokio::test]
    async fn test_logout_all_only_touches_one_user() {
        let fixture = setup().await;
        create_user(&fixture, "carol", "password1").await;
        create_user(&fixture, "dave", "password2").await;

        let ttl = Duration::hours(1);
        let dave_before = fixture.manager.login("dave", "password2", ttl).await.unwrap();
        let carol1 = fixture.manager.login("carol", "password1", ttl).await.unwrap();
        let carol2 = fixture.manager.login("carol", "password1", ttl).await.unwrap();

        fixture.manager.logout_all("carol").await.unwrap();
        let dave_after = fixture.manager.login("dave", "password2", ttl).await.unwrap();

        for token in [&carol1.token, &carol2.token] {
            assert!(matches!(
                fixture.manager.validate(token).await,
                Err(AuthError::Unauthenticated)
            ));
        }
        assert!(fixture.manager.validate(&dave_before.token).await.is_ok());
        assert!(fixture.manager.validate(&dave_after.token).await.is_ok());
    }

    #[tokio::test]
    async fn test_multiple_sessions_per_user() {
        let fixture = setup().await;
        create_user(&fixture, "alice", "secret123").await;

        let first = fixture.manager.login("alice", "secret123", Duration::hours(1)).await.unwrap();
        let second = fixture.manager.login("alice", "secret123", Duration::hours(1)).await.unwrap();

        assert_ne!(first.token, second.token);
        assert!(fixture.manager.validate(&first.token).await.is_ok());
        assert!(fixture.manager.validate(&second.token).await.is_ok());
    }

    #[tokio::test]
    async fn test_default_ttl() {
        let fixture = setup().await;
        assert_eq!(fixture.manager.default_ttl(), Duration::hours(24));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(20))]

        #[test]
        fn prop_unissued_tokens_are_unauthenticated(token in "[a-zA-Z0-9-]{1,64}") {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let result: Result<(), TestCaseError> = rt.block_on(async {
                let fixture = setup().await;
                create_user(&fixture, "alice", "secret123").await;
                let issued = fixture
                    .manager
                    .login("alice", "secret123", Duration::hours(1))
                    .await
                    .unwrap();
                prop_assume!(token != issued.token);

                let result = fixture.manager.validate(&token).await;
                prop_assert!(matches!(result, Err(AuthError::Unauthenticated)));
                Ok(())
            });
            result?;
        }
    }
}
