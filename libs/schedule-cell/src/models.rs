use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use shared_database::StoreError;
use shared_models::error::AppError;
use shared_models::scheduling::{Appointment, UnavailabilityBlock, WorkingDay};

// ==============================================================================
// AVAILABLE HOURS
// ==============================================================================

#[derive(Debug, Deserialize)]
pub struct AvailableHoursQuery {
    pub service_id: Uuid,
    pub provider_id: Uuid,
    pub selected_date: NaiveDate,
    #[serde(default)]
    pub manage_mode: bool,
    pub appointment_id: Option<Uuid>,
    /// Viewer's IANA timezone; defaults to the provider's.
    pub timezone: Option<String>,
}

/// One bookable start time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailableHour {
    /// Provider-local `HH:MM`, the value submitted when booking.
    pub value: String,
    /// Same instant rendered in the viewer's timezone.
    pub display: String,
    pub selected: bool,
}

#[derive(Debug, Serialize)]
pub struct AvailableHoursResponse {
    pub provider_id: Uuid,
    pub service_id: Uuid,
    pub date: NaiveDate,
    pub provider_timezone: String,
    pub display_timezone: String,
    pub hours: Vec<AvailableHour>,
}

// ==============================================================================
// UNAVAILABLE DATES
// ==============================================================================

#[derive(Debug, Deserialize)]
pub struct UnavailableDatesQuery {
    pub provider_id: Uuid,
    pub service_id: Uuid,
    /// Any date of the month to scan.
    pub selected_date: NaiveDate,
    #[serde(default)]
    pub manage_mode: bool,
    pub appointment_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnavailableDates {
    pub dates: Vec<NaiveDate>,
    /// Every date of the scanned range is unavailable.
    pub fully_booked: bool,
    pub first_available: Option<NaiveDate>,
}

// ==============================================================================
// BACK OFFICE
// ==============================================================================

/// Body of `POST /providers/{id}/exceptions/{date}`; `plan: null` closes the date.
#[derive(Debug, Deserialize)]
pub struct SetExceptionRequest {
    pub plan: Option<WorkingDay>,
}

#[derive(Debug, Serialize)]
pub struct ExceptionOutcome {
    pub provider_id: Uuid,
    pub date: NaiveDate,
    pub plan: Option<WorkingDay>,
    /// Booked appointments left outside the new working hours. They are kept.
    pub inconsistent_appointments: Vec<Appointment>,
}

#[derive(Debug, Deserialize)]
pub struct SaveUnavailabilityRequest {
    pub id: Option<Uuid>,
    pub provider_id: Uuid,
    pub start_datetime: NaiveDateTime,
    pub end_datetime: NaiveDateTime,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UnavailabilityOutcome {
    pub block: UnavailabilityBlock,
    pub overlapping_appointments: Vec<Appointment>,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("Provider not found")]
    ProviderNotFound,

    #[error("Service not found")]
    ServiceNotFound,

    #[error("Unavailability block not found")]
    BlockNotFound,

    #[error("Invalid interval: {0}")]
    InvalidInterval(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not allowed to manage provider {0}")]
    Forbidden(Uuid),

    #[error("Storage failure: {0}")]
    Storage(String),
}

impl From<StoreError> for ScheduleError {
    fn from(err: StoreError) -> Self {
        ScheduleError::Storage(err.to_string())
    }
}

impl From<ScheduleError> for AppError {
    fn from(err: ScheduleError) -> Self {
        match err {
            ScheduleError::ProviderNotFound
            | ScheduleError::ServiceNotFound
            | ScheduleError::BlockNotFound => AppError::NotFound(err.to_string()),
            ScheduleError::InvalidInterval(_) | ScheduleError::Validation(_) => {
                AppError::ValidationError(err.to_string())
            }
            ScheduleError::Forbidden(_) => AppError::Auth(err.to_string()),
            ScheduleError::Storage(msg) => AppError::Database(msg),
        }
    }
}
