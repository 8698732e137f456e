use std::sync::Arc;

use axum::{routing::get, Router};

use shared_utils::state::AppState;

use crate::handlers;

/// Registry lookups used by the booking wizard, mounted under `/booking`.
pub fn patient_public_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/patients/by-ci", get(handlers::get_patient_by_ci))
        .with_state(state)
}
