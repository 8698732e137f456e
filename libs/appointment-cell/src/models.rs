use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use patient_cell::PatientError;
use schedule_cell::ScheduleError;
use shared_database::StoreError;
use shared_models::error::AppError;
use shared_models::scheduling::{Appointment, Customer};

// ==============================================================================
// BOOKING REQUESTS
// ==============================================================================

/// Appointment part of a booking submission. Times are provider-local.
#[derive(Debug, Clone, Deserialize)]
pub struct AppointmentDraft {
    pub provider_id: Uuid,
    pub service_id: Uuid,
    pub start_datetime: NaiveDateTime,
    /// Optional; when present it must equal `start + service duration`.
    pub end_datetime: Option<NaiveDateTime>,
    pub notes: Option<String>,
    pub municipality: Option<String>,
    pub medical_center: Option<String>,
}

/// Customer part of a booking submission, keyed by CI and complement.
#[derive(Debug, Clone, Deserialize)]
pub struct CustomerDraft {
    pub ci: String,
    pub complement: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone_number: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChallengeResponse {
    pub token: String,
    pub answer: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterAppointmentRequest {
    pub appointment: AppointmentDraft,
    /// May be omitted when rescheduling; the appointment's customer is kept.
    pub customer: Option<CustomerDraft>,
    pub captcha: Option<ChallengeResponse>,
    /// Appointment being rescheduled. It keeps its id and does not conflict with itself.
    /// Only staff may name it by id.
    pub exclude_appointment_id: Option<Uuid>,
    /// Booking reference of the appointment being rescheduled from the public form.
    pub booking_reference: Option<String>,
}

/// Result of a committed booking.
#[derive(Debug, Clone)]
pub struct BookedAppointment {
    pub appointment: Appointment,
    pub customer: Customer,
    pub booking_reference: String,
    pub provider_name: String,
    pub service_name: String,
    pub rescheduled: bool,
}

/// Explicit result of a booking endpoint; callers branch on `kind`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BookingOutcome {
    Booked {
        booking_reference: String,
        start_datetime: NaiveDateTime,
        end_datetime: NaiveDateTime,
        provider: String,
        service: String,
        rescheduled: bool,
    },
    ChallengeFailed,
    AlreadyReserved {
        reservation: ReservationSummary,
    },
    PatientNotFound,
    SlotNoLongerAvailable,
    InvalidInterval {
        message: String,
    },
}

impl From<BookedAppointment> for BookingOutcome {
    fn from(booked: BookedAppointment) -> Self {
        BookingOutcome::Booked {
            booking_reference: booked.booking_reference,
            start_datetime: booked.appointment.start_datetime,
            end_datetime: booked.appointment.end_datetime,
            provider: booked.provider_name,
            service: booked.service_name,
            rescheduled: booked.rescheduled,
        }
    }
}

// ==============================================================================
// CONFLICT GUARD
// ==============================================================================

#[derive(Debug, Deserialize)]
pub struct PatientIdentityQuery {
    pub ci: String,
    pub complement: Option<String>,
}

/// Existing reservation shown to the patient or the front desk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReservationSummary {
    pub date: NaiveDate,
    pub start_datetime: NaiveDateTime,
    pub service: String,
    pub provider: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReservationStatus {
    None,
    AlreadyReserved { reservation: ReservationSummary },
    PatientNotFound,
}

// ==============================================================================
// REPORTS
// ==============================================================================

/// `speciality_id` is a speciality uuid or `all`.
#[derive(Debug, Deserialize)]
pub struct SpecialityReportQuery {
    pub speciality_id: String,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportPatient {
    pub first_name: String,
    pub last_name: String,
    pub clinical_story: String,
    pub diagnostic: String,
    pub municipality: String,
    pub medical_center: String,
    pub start_datetime: NaiveDateTime,
}

/// Appointments of one provider within one speciality.
#[derive(Debug, Clone, Serialize)]
pub struct ReportGroup {
    /// `"<speciality> - <provider last name> <provider first name>"`
    pub key: String,
    pub speciality: String,
    pub provider_first_name: String,
    pub provider_last_name: String,
    pub patients: Vec<ReportPatient>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AppointmentByCi {
    pub customer: Customer,
    pub start_datetime: NaiveDateTime,
    pub service: String,
    pub provider: String,
    pub clinical_story: Option<String>,
    pub diagnostic: Option<String>,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Error, Debug)]
pub enum AppointmentError {
    #[error("Patient not found in the clinical registry")]
    PatientNotFound,

    #[error("Patient already holds a reservation on {}", .0.date)]
    AlreadyReserved(ReservationSummary),

    #[error("The selected slot is no longer available")]
    SlotNoLongerAvailable,

    #[error("Human verification failed")]
    ChallengeFailed,

    #[error("Invalid interval: {0}")]
    InvalidInterval(String),

    #[error("Service not found")]
    ServiceNotFound,

    #[error("Provider not found")]
    ProviderNotFound,

    #[error("Appointment not found")]
    AppointmentNotFound,

    #[error("The appointment belongs to another patient")]
    PatientMismatch,

    #[error("Not allowed to manage provider {0}")]
    Forbidden(Uuid),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Storage failure: {0}")]
    Storage(String),
}

impl From<StoreError> for AppointmentError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(_) => AppointmentError::SlotNoLongerAvailable,
            other => AppointmentError::Storage(other.to_string()),
        }
    }
}

impl From<ScheduleError> for AppointmentError {
    fn from(err: ScheduleError) -> Self {
        match err {
            ScheduleError::ProviderNotFound => AppointmentError::ProviderNotFound,
            ScheduleError::ServiceNotFound => AppointmentError::ServiceNotFound,
            ScheduleError::InvalidInterval(msg) => AppointmentError::InvalidInterval(msg),
            ScheduleError::Validation(msg) => AppointmentError::Validation(msg),
            ScheduleError::Forbidden(provider_id) => AppointmentError::Forbidden(provider_id),
            ScheduleError::Storage(msg) => AppointmentError::Storage(msg),
            ScheduleError::BlockNotFound => AppointmentError::Validation(err.to_string()),
        }
    }
}

impl From<PatientError> for AppointmentError {
    fn from(err: PatientError) -> Self {
        match err {
            PatientError::PatientNotFound => AppointmentError::PatientNotFound,
            PatientError::Validation(msg) => AppointmentError::Validation(msg),
            PatientError::Storage(msg) => AppointmentError::Storage(msg),
        }
    }
}

impl AppointmentError {
    /// Splits booking rejections the caller must branch on from transport failures.
    pub fn into_outcome(self) -> Result<BookingOutcome, AppError> {
        match self {
            AppointmentError::ChallengeFailed => Ok(BookingOutcome::ChallengeFailed),
            AppointmentError::AlreadyReserved(reservation) => {
                Ok(BookingOutcome::AlreadyReserved { reservation })
            }
            AppointmentError::PatientNotFound => Ok(BookingOutcome::PatientNotFound),
            AppointmentError::SlotNoLongerAvailable => Ok(BookingOutcome::SlotNoLongerAvailable),
            AppointmentError::InvalidInterval(message) => {
                Ok(BookingOutcome::InvalidInterval { message })
            }
            other => Err(other.into()),
        }
    }
}

impl From<AppointmentError> for AppError {
    fn from(err: AppointmentError) -> Self {
        match err {
            AppointmentError::PatientNotFound
            | AppointmentError::ServiceNotFound
            | AppointmentError::ProviderNotFound
            | AppointmentError::AppointmentNotFound => AppError::NotFound(err.to_string()),
            AppointmentError::AlreadyReserved(_) | AppointmentError::SlotNoLongerAvailable => {
                AppError::Conflict(err.to_string())
            }
            AppointmentError::ChallengeFailed | AppointmentError::PatientMismatch => {
                AppError::BadRequest(err.to_string())
            }
            AppointmentError::InvalidInterval(_) | AppointmentError::Validation(_) => {
                AppError::ValidationError(err.to_string())
            }
            AppointmentError::Forbidden(_) => AppError::Auth(err.to_string()),
            AppointmentError::Storage(msg) => AppError::Database(msg),
        }
    }
}
