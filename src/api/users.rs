//! User profile API endpoints
//!
//! - GET /users/profile - Own profile (requires session)
//! - PUT /users/update - Partial profile update (requires session)
//! - GET /users/{username} - Public profile

use axum::{
    extract::{Path, State},
    routing::{get, put},
    Json, Router,
};

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{UpdateUserInput, User, UserPublic};

/// Build public user routes
pub fn public_router() -> Router<AppState> {
    Router::new().route("/users/{username}", get(get_public_profile))
}

/// Build protected user routes (requires the session middleware)
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/users/profile", get(get_profile))
        .route("/users/update", put(update_profile))
}

/// GET /users/profile
async fn get_profile(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<User>, ApiError> {
    let profile = state.user_service.get_profile(&user.username).await?;
    Ok(Json(profile))
}

/// PUT /users/update
async fn update_profile(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<UpdateUserInput>,
) -> Result<Json<User>, ApiError> {
    let updated = state
        .user_service
        .update_profile(&user.username, body)
        .await?;
    Ok(Json(updated))
}

/// GET /users/{username}
async fn get_public_profile(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Json<UserPublic>, ApiError> {
    let profile = state.user_service.get_public_profile(&username).await?;
    Ok(Json(profile))
}
