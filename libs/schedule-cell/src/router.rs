use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};

use shared_utils::extractor::auth_middleware;
use shared_utils::state::AppState;

use crate::handlers;

/// Booking wizard endpoints, mounted under `/booking`.
pub fn schedule_public_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/available-hours", get(handlers::get_available_hours))
        .route("/unavailable-dates", get(handlers::get_unavailable_dates))
        .with_state(state)
}

/// Calendar management endpoints, mounted under `/backend`.
pub fn schedule_backend_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/providers/{provider_id}/exceptions/{date}",
            post(handlers::set_exception).delete(handlers::clear_exception),
        )
        .route("/unavailable", post(handlers::save_unavailable))
        .route("/unavailable/{block_id}", delete(handlers::delete_unavailable))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}
