//! Authentication API endpoints
//!
//! Handles HTTP requests for user authentication:
//! - POST /auth/signin - User registration
//! - POST /auth/login - User login (JSON body or Basic-Auth header)
//! - POST /auth/logout - Revoke the presented session
//! - POST /auth/logout-all - Revoke every session of the caller

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{
    extract_basic_auth, extract_session_token, ApiError, AppState, AuthenticatedUser,
};
use crate::models::Session;
use crate::services::{validate_login_input, AuthError, RegisterInput};

/// Request body for user login
#[derive(Debug, Default, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// Response for successful registration
#[derive(Debug, Serialize)]
pub struct SignInResponse {
    pub username: String,
    pub message: String,
}

/// Response for successful login
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub username: String,
    pub message: String,
    pub token: String,
    /// RFC 3339
    pub expires_at: String,
}

/// Response carrying only a status message
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Build public auth routes (no auth required)
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/auth/signin", post(signin))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
}

/// Build protected auth routes (requires the session middleware)
pub fn protected_router() -> Router<AppState> {
    Router::new().route("/auth/logout-all", post(logout_all))
}

/// POST /auth/signin - User registration
async fn signin(
    State(state): State<AppState>,
    Json(body): Json<RegisterInput>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state.user_service.register(body).await?;

    Ok((
        StatusCode::CREATED,
        Json(SignInResponse {
            username: user.username,
            message: "User created successfully".to_string(),
        }),
    ))
}

/// POST /auth/login - User login
///
/// Credentials come from a JSON body, or from a Basic-Auth header when the
/// body is empty.
async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let credentials = read_login_credentials(&headers, &body)?;
    validate_login_input(&credentials.username, &credentials.password)?;

    let manager = &state.session_manager;
    let session = manager
        .login(
            &credentials.username,
            &credentials.password,
            manager.default_ttl(),
        )
        .await
        .map_err(|e| match e {
            AuthError::UserNotFound if state.config.session.generic_login_errors => {
                AuthError::InvalidCredentials
            }
            other => other,
        })?;

    let cookie = session_cookie(&state.config.session.cookie_name, &session, Utc::now());
    let mut response_headers = HeaderMap::new();
    response_headers.insert(header::SET_COOKIE, cookie_header(&cookie)?);

    Ok((
        response_headers,
        Json(LoginResponse {
            username: session.username.clone(),
            message: "Login successful".to_string(),
            token: session.token.clone(),
            expires_at: session.expires_at.to_rfc3339(),
        }),
    ))
}

/// POST /auth/logout - Revoke the presented session
///
/// Without a session cookie this is a successful no-op.
async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let cookie_name = &state.config.session.cookie_name;

    let Some(token) = extract_session_token(&headers, cookie_name) else {
        return Ok((HeaderMap::new(), Json(MessageResponse::new("Already logged out"))));
    };

    state.session_manager.logout(&token).await?;

    let mut response_headers = HeaderMap::new();
    response_headers.insert(header::SET_COOKIE, cookie_header(&clear_session_cookie(cookie_name))?);

    Ok((response_headers, Json(MessageResponse::new("Logged out successfully"))))
}

/// POST /auth/logout-all - Revoke every session of the caller
async fn logout_all(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, ApiError> {
    state.session_manager.logout_all(&user.username).await?;

    let cookie_name = &state.config.session.cookie_name;
    let mut response_headers = HeaderMap::new();
    response_headers.insert(header::SET_COOKIE, cookie_header(&clear_session_cookie(cookie_name))?);

    Ok((response_headers, Json(MessageResponse::new("All sessions revoked"))))
}

fn read_login_credentials(headers: &HeaderMap, body: &Bytes) -> Result<LoginRequest, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(extract_basic_auth(headers)
            .map(|(username, password)| LoginRequest { username, password })
            .unwrap_or_default());
    }

    serde_json::from_slice(body).map_err(|_| ApiError::validation_error("Invalid request body"))
}

/// `Set-Cookie` value issuing a session
pub fn session_cookie(name: &str, session: &Session, now: DateTime<Utc>) -> String {
    let max_age = (session.expires_at - now).num_seconds().max(0);
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Strict; Max-Age={}; Expires={}",
        name,
        session.token,
        max_age,
        session.expires_at.format("%a, %d %b %Y %H:%M:%S GMT")
    )
}

/// `Set-Cookie` value removing the session cookie from the client
pub fn clear_session_cookie(name: &str) -> String {
    format!("{}=; Path=/; HttpOnly; SameSite=Strict; Max-Age=0", name)
}

fn cookie_header(cookie: &str) -> Result<HeaderValue, ApiError> {
    HeaderValue::from_str(cookie).map_err(|e| {
        tracing::error!("Invalid Set-Cookie value: {}", e);
        ApiError::internal_error("Internal server error")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn session_expiring_at(expires_at: DateTime<Utc>) -> Session {
        Session {
            id: 1,
            user_id: 1,
            username: "alice".to_string(),
            token: "tok-123".to_string(),
            expires_at,
            created_at: expires_at - Duration::hours(24),
        }
    }

    #[test]
    fn test_session_cookie_attributes() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let session = session_expiring_at(now + Duration::hours(24));

        let cookie = session_cookie("session_token", &session, now);

        assert_eq!(
            cookie,
            "session_token=tok-123; Path=/; HttpOnly; SameSite=Strict; Max-Age=86400; \
             Expires=Sat, 02 Mar 2024 12:00:00 GMT"
        );
    }

    #[test]
    fn test_session_cookie_never_negative_max_age() {
        let now = Utc::now();
        let session = session_expiring_at(now - Duration::seconds(5));

        assert!(session_cookie("session_token", &session, now).contains("Max-Age=0;"));
    }

    #[test]
    fn test_clear_session_cookie() {
        let cookie = clear_session_cookie("session_token");
        assert!(cookie.starts_with("session_token=;"));
        assert!(cookie.contains("Max-Age=0"));
        assert!(cookie.contains("HttpOnly"));
    }

    #[test]
    fn test_read_login_credentials_from_json() {
        let body = Bytes::from_static(br#"{"username":"alice","password":"secret123"}"#);
        let creds = read_login_credentials(&HeaderMap::new(), &body).unwrap();

        assert_eq!(creds.username, "alice");
        assert_eq!(creds.password, "secret123");
    }

    #[test]
    fn test_read_login_credentials_from_basic_auth() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Basic YWxpY2U6c2VjcmV0MTIz"),
        );

        let creds = read_login_credentials(&headers, &Bytes::new()).unwrap();

        assert_eq!(creds.username, "alice");
        assert_eq!(creds.password, "secret123");
    }

    #[test]
    fn test_read_login_credentials_missing() {
        let creds = read_login_credentials(&HeaderMap::new(), &Bytes::new()).unwrap();
        assert!(creds.username.is_empty());
        assert!(validate_login_input(&creds.username, &creds.password).is_err());
    }

    #[test]
    fn test_read_login_credentials_malformed_json() {
        let body = Bytes::from_static(b"{not json");
        let err = read_login_credentials(&HeaderMap::new(), &body).unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
