//! services/api/src/web/auth.rs
//!
//! Authentication endpoints for login, logout, and session status.

use crate::web::{middleware::bearer_token, state::AppState};
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use utoipa::ToSchema;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    /// An email address, or the configured short alias for the admin account.
    pub email: String,
    pub password: String,
}

#[derive(Serialize, ToSchema)]
pub struct LoginResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct SessionStatus {
    pub logged_in: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /auth/login - Sign in with email (or alias) and password
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 401, description = "Login rejected", body = LoginResponse)
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> impl IntoResponse {
    let outcome = state.core.login(&req.email, &req.password).await;
    let status = if outcome.success {
        info!("Login succeeded");
        StatusCode::OK
    } else {
        warn!(reason = %outcome.message, "Login rejected");
        StatusCode::UNAUTHORIZED
    };

    let response = LoginResponse {
        success: outcome.success,
        message: outcome.message,
        token: outcome.token,
    };
    (status, Json(response))
}

/// POST /auth/logout - Sign out and drop all cached data
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 204, description = "Logged out"),
        (status = 401, description = "Missing or invalid session token")
    ),
    security(
        ("bearer" = [])
    )
)]
pub async fn logout_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.core.logout().await;
    StatusCode::NO_CONTENT
}

/// GET /auth/session - Report whether the caller's token belongs to the active session
#[utoipa::path(
    get,
    path = "/auth/session",
    responses(
        (status = 200, description = "Current session state", body = SessionStatus)
    ),
    security(
        (), ("bearer" = [])
    )
)]
pub async fn session_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let session = bearer_token(&headers)
        .filter(|token| state.core.is_session_token(token))
        .and_then(|_| state.core.current_session());
    Json(SessionStatus {
        logged_in: session.is_some(),
        email: session.and_then(|s| s.user.email),
    })
}
