use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use chrono_tz::Tz;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_models::auth::User;
use shared_models::error::AppError;
use shared_models::scheduling::DateRange;
use shared_utils::state::AppState;

use crate::models::{
    AvailableHour, AvailableHoursQuery, AvailableHoursResponse, SaveUnavailabilityRequest,
    ScheduleError, SetExceptionRequest, UnavailableDatesQuery,
};
use crate::services::{
    timezone::{convert_wall_clock, local_now, parse_timezone, provider_timezone},
    AvailabilityHorizonScanner, SlotCalculator, SlotOptions, UnavailabilityService,
    WorkingPlanService,
};

fn ensure_can_manage(user: &User, provider_id: Uuid) -> Result<(), ScheduleError> {
    if user.can_manage_provider(&provider_id.to_string()) {
        Ok(())
    } else {
        Err(ScheduleError::Forbidden(provider_id))
    }
}

/// Earliest provider-local start still bookable now.
fn booking_horizon(state: &AppState, tz: Tz) -> NaiveDateTime {
    local_now(tz, state.clock.now()) + Duration::minutes(state.config.book_advance_timeout_minutes)
}

// ==============================================================================
// PUBLIC HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn get_available_hours(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AvailableHoursQuery>,
) -> Result<Json<Value>, AppError> {
    let calculator = SlotCalculator::new(state.store.clone());
    let (provider, _) = calculator
        .load_request(query.provider_id, query.service_id)
        .await?;

    let provider_tz = provider_timezone(&provider.timezone, &state.config.clinic_timezone);
    let display_tz = match query.timezone.as_deref() {
        Some(name) => parse_timezone(name)?,
        None => provider_tz,
    };

    let excluded = if query.manage_mode { query.appointment_id } else { None };
    let options = SlotOptions::with_granularity(state.config.slot_granularity_minutes)
        .excluding(excluded)
        .not_before(Some(booking_horizon(&state, provider_tz)));

    let slots = calculator
        .compute_available_slots(query.provider_id, query.service_id, query.selected_date, &options)
        .await?;

    let current_start = match excluded {
        Some(appointment_id) => state
            .store
            .get_appointment(appointment_id)
            .await
            .map_err(ScheduleError::from)?
            .map(|appointment| appointment.start_datetime),
        None => None,
    };

    let hours = slots
        .iter()
        .enumerate()
        .map(|(index, slot)| AvailableHour {
            value: slot.format("%H:%M").to_string(),
            display: convert_wall_clock(*slot, provider_tz, display_tz)
                .format("%H:%M")
                .to_string(),
            selected: match current_start {
                Some(start) => *slot == start,
                None => !query.manage_mode && index == 0,
            },
        })
        .collect();

    Ok(Json(json!(AvailableHoursResponse {
        provider_id: query.provider_id,
        service_id: query.service_id,
        date: query.selected_date,
        provider_timezone: provider_tz.name().to_string(),
        display_timezone: display_tz.name().to_string(),
        hours,
    })))
}

#[axum::debug_handler]
pub async fn get_unavailable_dates(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UnavailableDatesQuery>,
) -> Result<Json<Value>, AppError> {
    let provider = state
        .store
        .get_provider(query.provider_id)
        .await
        .map_err(ScheduleError::from)?
        .ok_or(ScheduleError::ProviderNotFound)?;
    let provider_tz = provider_timezone(&provider.timezone, &state.config.clinic_timezone);

    let horizon = booking_horizon(&state, provider_tz);
    let today = local_now(provider_tz, state.clock.now()).date();

    let excluded = if query.manage_mode { query.appointment_id } else { None };
    let options = SlotOptions::with_granularity(state.config.slot_granularity_minutes)
        .excluding(excluded)
        .not_before(Some(horizon));

    let scanner = AvailabilityHorizonScanner::new(state.store.clone());
    let unavailable = scanner
        .compute_unavailable_dates(
            query.provider_id,
            query.service_id,
            DateRange::month_of(query.selected_date),
            &options,
            today,
        )
        .await?;

    Ok(Json(json!(unavailable)))
}

// ==============================================================================
// BACK-OFFICE HANDLERS (AUTHENTICATION REQUIRED)
// ==============================================================================

#[axum::debug_handler]
pub async fn set_exception(
    State(state): State<Arc<AppState>>,
    Path((provider_id, date)): Path<(Uuid, NaiveDate)>,
    Extension(user): Extension<User>,
    Json(request): Json<SetExceptionRequest>,
) -> Result<Json<Value>, AppError> {
    ensure_can_manage(&user, provider_id)?;

    let outcome = WorkingPlanService::new(state.store.clone())
        .set_exception(provider_id, date, request.plan)
        .await?;

    Ok(Json(json!(outcome)))
}

#[axum::debug_handler]
pub async fn clear_exception(
    State(state): State<Arc<AppState>>,
    Path((provider_id, date)): Path<(Uuid, NaiveDate)>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    ensure_can_manage(&user, provider_id)?;

    WorkingPlanService::new(state.store.clone())
        .clear_exception(provider_id, date)
        .await?;

    Ok(Json(json!({
        "provider_id": provider_id,
        "date": date,
        "cleared": true
    })))
}

#[axum::debug_handler]
pub async fn save_unavailable(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Json(request): Json<SaveUnavailabilityRequest>,
) -> Result<Json<Value>, AppError> {
    ensure_can_manage(&user, request.provider_id)?;

    let outcome = UnavailabilityService::new(state.store.clone())
        .save_block(request)
        .await?;

    Ok(Json(json!(outcome)))
}

#[axum::debug_handler]
pub async fn delete_unavailable(
    State(state): State<Arc<AppState>>,
    Path(block_id): Path<Uuid>,
    Extension(_user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    UnavailabilityService::new(state.store.clone())
        .delete_block(block_id)
        .await?;

    Ok(Json(json!({
        "id": block_id,
        "deleted": true
    })))
}
