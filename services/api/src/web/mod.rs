pub mod auth;
pub mod middleware;
pub mod rest;
pub mod state;

pub use middleware::require_session;

use crate::web::{
    auth::{login_handler, logout_handler, session_handler},
    rest::*,
    state::AppState,
};
use axum::{
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// Largest request body accepted: a base64 payload of `max_file_size` bytes
/// plus room for the surrounding JSON.
pub fn body_limit(max_file_size: u64) -> usize {
    let encoded = max_file_size.saturating_add(2) / 3 * 4;
    usize::try_from(encoded)
        .unwrap_or(usize::MAX)
        .saturating_add(64 * 1024)
}

/// Builds the API router. CORS and the Swagger UI are layered on by the binary.
pub fn router(app_state: Arc<AppState>) -> Router {
    // Public routes (no token required)
    let public_routes = Router::new()
        .route("/auth/login", post(login_handler))
        .route("/auth/session", get(session_handler))
        .route("/subjects", get(list_subjects_handler))
        .route("/subjects/{id}", get(get_subject_handler))
        .route("/subjects/{id}/documents", get(list_subject_documents_handler))
        .route("/documents", get(list_documents_handler))
        .route("/documents/{id}", get(get_document_handler))
        .route("/search", get(search_handler))
        .route("/theme", get(get_theme_handler).put(set_theme_handler));

    // Protected routes (session token required)
    let protected_routes = Router::new()
        .route("/auth/logout", post(logout_handler))
        .route("/subjects", post(create_subject_handler))
        .route(
            "/subjects/{id}",
            axum::routing::put(update_subject_handler).delete(delete_subject_handler),
        )
        .route("/documents", post(create_document_handler))
        .route(
            "/documents/{id}",
            axum::routing::put(update_document_handler).delete(delete_document_handler),
        )
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_session,
        ));

    let limit = body_limit(app_state.config.core.max_file_size);
    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(limit))
        .with_state(app_state)
}

#[cfg(test)]
mod tests {
    use super::body_limit;

    #[test]
    fn body_limit_covers_the_encoded_file() {
        assert_eq!(body_limit(3), 4 + 64 * 1024);
        assert_eq!(body_limit(10 * 1024 * 1024), 13_981_016 + 64 * 1024);
    }
}
