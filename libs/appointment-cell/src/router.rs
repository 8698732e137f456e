use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};

use shared_utils::extractor::auth_middleware;
use shared_utils::state::AppState;

use crate::handlers;

/// Public booking endpoints, mounted under `/booking`.
pub fn appointment_public_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/register", post(handlers::register_appointment))
        .route("/captcha", get(handlers::get_challenge))
        .route("/appointments/{reference}", get(handlers::get_appointment_by_reference))
        .route("/patients/reservation", get(handlers::get_patient_reservation))
        .with_state(state)
}

/// Staff booking and report endpoints, mounted under `/backend`.
pub fn appointment_backend_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/appointments", post(handlers::save_appointment))
        .route("/appointments/{appointment_id}", delete(handlers::delete_appointment))
        .route("/reports/by-speciality", get(handlers::get_report_by_speciality))
        .route("/reports/by-ci", get(handlers::get_report_by_ci))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}
