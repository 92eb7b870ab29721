pub mod health;
pub mod send;

use axum::extract::DefaultBodyLimit;
use axum::Router;

use crate::state::AppState;

/// Create the API router with all routes
pub fn create_router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes;

    Router::new()
        .merge(send::send_routes())
        .merge(health::health_routes())
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}
