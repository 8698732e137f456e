use std::sync::Arc;

use axum::{
    Router,
    routing::get,
};

use appointment_cell::router::{appointment_backend_routes, appointment_public_routes};
use patient_cell::router::patient_public_routes;
use schedule_cell::router::{schedule_backend_routes, schedule_public_routes};
use shared_utils::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let public = Router::new()
        .merge(schedule_public_routes(state.clone()))
        .merge(patient_public_routes(state.clone()))
        .merge(appointment_public_routes(state.clone()));

    let backend = Router::new()
        .merge(schedule_backend_routes(state.clone()))
        .merge(appointment_backend_routes(state));

    Router::new()
        .route("/", get(|| async { "Clinic scheduling API is running!" }))
        .nest("/booking", public)
        .nest("/backend", backend)
}
