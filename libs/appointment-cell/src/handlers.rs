use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use patient_cell::PatientIdentity;
use shared_models::auth::User;
use shared_models::error::AppError;
use shared_utils::state::AppState;

use crate::models::{
    AppointmentError, BookingOutcome, PatientIdentityQuery, RegisterAppointmentRequest,
    SpecialityReportQuery,
};
use crate::services::guard::clinic_today;
use crate::services::{
    BookingMode, BookingTransaction, ChallengeVerifier, ConflictGuard, ReportService,
};

fn ensure_can_manage(user: &User, provider_id: Uuid) -> Result<(), AppointmentError> {
    if user.can_manage_provider(&provider_id.to_string()) {
        Ok(())
    } else {
        Err(AppointmentError::Forbidden(provider_id))
    }
}

async fn submit(
    state: &AppState,
    transaction: &BookingTransaction,
    request: RegisterAppointmentRequest,
    mode: BookingMode,
) -> Result<BookingOutcome, AppError> {
    match transaction.submit_appointment(request, mode, state.clock.now()).await {
        Ok(booked) => Ok(BookingOutcome::from(booked)),
        Err(e) => e.into_outcome(),
    }
}

// ==============================================================================
// PUBLIC HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn register_appointment(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegisterAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let transaction = BookingTransaction::new(state.store.clone(), state.config.clone());
    let outcome = submit(&state, &transaction, request, BookingMode::Public).await?;
    Ok(Json(json!(outcome)))
}

/// Confirmation lookup; the reference is the only public handle on an appointment.
#[axum::debug_handler]
pub async fn get_appointment_by_reference(
    State(state): State<Arc<AppState>>,
    Path(reference): Path<String>,
) -> Result<Json<Value>, AppError> {
    let reservation = BookingTransaction::new(state.store.clone(), state.config.clone())
        .reservation_by_reference(&reference)
        .await?;

    Ok(Json(json!({
        "booking_reference": reference,
        "reservation": reservation
    })))
}

#[axum::debug_handler]
pub async fn get_challenge(State(state): State<Arc<AppState>>) -> Result<Json<Value>, AppError> {
    let challenge = ChallengeVerifier::new(state.config.booking_secret()).issue(state.clock.now())?;

    Ok(Json(json!({
        "enabled": state.config.captcha_enabled,
        "question": challenge.question,
        "token": challenge.token,
        "expires_at": challenge.expires_at
    })))
}

/// Same-day reservation of a patient, checked before the wizard shows the calendar.
#[axum::debug_handler]
pub async fn get_patient_reservation(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PatientIdentityQuery>,
) -> Result<Json<Value>, AppError> {
    let identity = PatientIdentity::parse(&query.ci, query.complement.as_deref())?;
    let status = ConflictGuard::new(state.store.clone(), state.config.same_day_rule)
        .reservation_status(&identity, clinic_today(&state.config, state.clock.now()))
        .await?;

    Ok(Json(json!(status)))
}

// ==============================================================================
// BACK-OFFICE HANDLERS (AUTHENTICATION REQUIRED)
// ==============================================================================

#[axum::debug_handler]
pub async fn save_appointment(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Json(request): Json<RegisterAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    ensure_can_manage(&user, request.appointment.provider_id)?;

    let transaction = BookingTransaction::new(state.store.clone(), state.config.clone());
    if let Some(existing) = transaction
        .rescheduled_appointment(&request, BookingMode::Staff)
        .await?
    {
        ensure_can_manage(&user, existing.provider_id)?;
    }

    let outcome = submit(&state, &transaction, request, BookingMode::Staff).await?;
    Ok(Json(json!(outcome)))
}

#[axum::debug_handler]
pub async fn delete_appointment(
    State(state): State<Arc<AppState>>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let transaction = BookingTransaction::new(state.store.clone(), state.config.clone());
    let appointment = transaction.get_appointment(appointment_id).await?;
    ensure_can_manage(&user, appointment.provider_id)?;

    transaction.delete_appointment(appointment_id).await?;

    Ok(Json(json!({
        "id": appointment_id,
        "deleted": true
    })))
}

#[axum::debug_handler]
pub async fn get_report_by_speciality(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SpecialityReportQuery>,
    Extension(_user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let speciality_id = match query.speciality_id.trim() {
        "all" => None,
        raw => Some(Uuid::parse_str(raw).map_err(|_| {
            AppointmentError::Validation(format!("invalid speciality id: {}", raw))
        })?),
    };

    let groups = ReportService::new(state.store.clone())
        .by_speciality(speciality_id, query.date)
        .await?;

    Ok(Json(json!({
        "date": query.date,
        "groups": groups
    })))
}

#[axum::debug_handler]
pub async fn get_report_by_ci(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PatientIdentityQuery>,
    Extension(_user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let identity = PatientIdentity::parse(&query.ci, query.complement.as_deref())?;
    let latest = ReportService::new(state.store.clone())
        .last_appointment_by_ci(&identity)
        .await?;

    match latest {
        Some(appointment) => Ok(Json(json!({
            "kind": "found",
            "appointment": appointment
        }))),
        None => Ok(Json(json!({
            "kind": "not_found",
            "ci": identity.ci
        }))),
    }
}
