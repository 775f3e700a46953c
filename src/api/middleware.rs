//! API middleware
//!
//! Contains:
//! - Shared application state
//! - The JSON error envelope and its mapping from `AuthError`
//! - The authentication gate: token extraction, session validation and the
//!   `require_session` middleware that attaches an `AuthenticatedUser`

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use data_encoding::BASE64;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::Config;
use crate::db::repositories::{SqlxSessionRepository, SqlxUserRepository};
use crate::db::DynDatabasePool;
use crate::models::Session;
use crate::services::{AuthError, CredentialVerifier, SessionManager, UserService};

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub pool: DynDatabasePool,
    pub config: Arc<Config>,
    pub session_manager: Arc<SessionManager>,
    pub user_service: Arc<UserService>,
}

impl AppState {
    /// Wire repositories and services over one shared pool
    pub fn new(pool: DynDatabasePool, config: Config) -> Result<Self, AuthError> {
        let verifier = CredentialVerifier::new(&config.password)?;
        let user_repo = SqlxUserRepository::boxed(pool.clone());
        let session_repo = SqlxSessionRepository::boxed(pool.clone());

        let session_manager = Arc::new(SessionManager::new(
            user_repo.clone(),
            session_repo,
            verifier.clone(),
            config.session.ttl(),
        ));
        let user_service = Arc::new(UserService::new(user_repo, verifier));

        Ok(Self {
            pool,
            config: Arc::new(config),
            session_manager,
            user_service,
        })
    }
}

/// Identity resolved by the authentication gate.
///
/// Inserted into request extensions by `require_session`; handlers take it
/// as an extractor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: i64,
    pub username: String,
}

impl From<&Session> for AuthenticatedUser {
    fn from(session: &Session) -> Self {
        Self {
            user_id: session.user_id,
            username: session.username.clone(),
        }
    }
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self::new("BAD_GATEWAY", message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }

    pub fn status(&self) -> StatusCode {
        match self.error.code.as_str() {
            "UNAUTHORIZED" | "SESSION_EXPIRED" => StatusCode::UNAUTHORIZED,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "CONFLICT" => StatusCode::CONFLICT,
            "BAD_GATEWAY" => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        if err.is_infrastructure() {
            tracing::error!("Request failed: {:#}", anyhow::Error::from(err));
            return Self::internal_error("Internal server error");
        }

        match err {
            AuthError::InvalidCredentials => Self::unauthorized("Invalid username or password"),
            AuthError::UserNotFound => Self::not_found("User not found"),
            AuthError::UsernameInUse => Self::conflict("Username already exists"),
            AuthError::EmailInUse => Self::conflict("Email already exists"),
            AuthError::Unauthenticated => Self::unauthorized("Unauthorized"),
            AuthError::SessionExpired => Self::new("SESSION_EXPIRED", "Session expired"),
            AuthError::Validation(msg) => Self::validation_error(msg),
            AuthError::PersistenceFailure(_) | AuthError::HashingFailure(_) => {
                Self::internal_error("Internal server error")
            }
        }
    }
}

/// Read the session token from the cookie named `cookie_name`.
///
/// Every `Cookie` header is searched; an empty value counts as absent.
pub fn extract_session_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|cookie| cookie.trim().split_once('='))
        .find(|(name, _)| *name == cookie_name)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Decode `Authorization: Basic base64(username:password)`.
///
/// Only used as a login credential transport, never for session tokens.
pub fn extract_basic_auth(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }

    let decoded = BASE64.decode(encoded.trim().as_bytes()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;

    Some((username.to_string(), password.to_string()))
}

/// Resolve the request's session. A missing token is treated like an
/// unknown one.
pub async fn authenticate(
    manager: &SessionManager,
    headers: &HeaderMap,
    cookie_name: &str,
) -> Result<Session, AuthError> {
    let token = extract_session_token(headers, cookie_name).ok_or(AuthError::Unauthenticated)?;
    manager.validate(&token).await
}

/// Authentication middleware
///
/// Rejects the request before the handler runs unless it carries a live
/// session.
pub async fn require_session(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let session = authenticate(
        &state.session_manager,
        request.headers(),
        &state.config.session.cookie_name,
    )
    .await
    .map_err(|e| {
        tracing::debug!("Request rejected by session gate: {}", e);
        ApiError::from(e)
    })?;

    request
        .extensions_mut()
        .insert(AuthenticatedUser::from(&session));
    Ok(next.run(request).await)
}
