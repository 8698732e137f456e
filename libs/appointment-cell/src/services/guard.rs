use std::sync::Arc;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use patient_cell::{PatientIdentity, PatientService};
use schedule_cell::services::timezone::{local_now, provider_timezone};
use shared_config::{AppConfig, SameDayRule};
use shared_database::SchedulingStore;
use shared_models::scheduling::Appointment;

use crate::models::{AppointmentError, ReservationStatus, ReservationSummary};

/// Calendar date of the clinic at `now`; the reference date of the guard.
pub fn clinic_today(config: &AppConfig, now: DateTime<Utc>) -> NaiveDate {
    local_now(provider_timezone(&config.clinic_timezone, "UTC"), now).date()
}

/// Whether `date` counts as the same day as `reference`.
///
/// `MonthAndDay` ignores the year, as the legacy front desk did.
pub fn same_day(rule: SameDayRule, date: NaiveDate, reference: NaiveDate) -> bool {
    match rule {
        SameDayRule::MonthAndDay => date.month() == reference.month() && date.day() == reference.day(),
        SameDayRule::CalendarDay => date == reference,
    }
}

/// Blocks a patient from holding two reservations on the same day.
pub struct ConflictGuard {
    store: Arc<dyn SchedulingStore>,
    patients: PatientService,
    rule: SameDayRule,
}

impl ConflictGuard {
    pub fn new(store: Arc<dyn SchedulingStore>, rule: SameDayRule) -> Self {
        Self {
            patients: PatientService::new(store.clone()),
            store,
            rule,
        }
    }

    /// Reservation of `identity` falling on `reference_date`, if any.
    ///
    /// The patient must exist in the clinical registry. `exclude` is the
    /// appointment being rescheduled, which never conflicts with itself.
    pub async fn find_active_reservation(
        &self,
        identity: &PatientIdentity,
        reference_date: NaiveDate,
        exclude: Option<Uuid>,
    ) -> Result<Option<ReservationSummary>, AppointmentError> {
        self.patients.require_records(identity).await?;

        let customers = self.patients.find_customers(identity).await?;
        if customers.is_empty() {
            debug!("CI {} has no customer rows yet", identity.ci);
            return Ok(None);
        }
        let customer_ids: Vec<Uuid> = customers.iter().map(|customer| customer.id).collect();

        let mut appointments = self.store.get_customer_appointments(&customer_ids).await?;
        appointments.sort_by_key(|appointment| appointment.start_datetime);

        let existing = appointments.into_iter().find(|appointment| {
            Some(appointment.id) != exclude
                && same_day(self.rule, appointment.start_datetime.date(), reference_date)
        });

        match existing {
            Some(appointment) => Ok(Some(summarize(self.store.as_ref(), &appointment).await?)),
            None => Ok(None),
        }
    }

    /// Fails with `AlreadyReserved` when `identity` already booked on `reference_date`.
    pub async fn check(
        &self,
        identity: &PatientIdentity,
        reference_date: NaiveDate,
        exclude: Option<Uuid>,
    ) -> Result<(), AppointmentError> {
        match self.find_active_reservation(identity, reference_date, exclude).await? {
            Some(reservation) => {
                warn!(
                    "CI {} already holds a reservation at {}",
                    identity.ci, reservation.start_datetime
                );
                Err(AppointmentError::AlreadyReserved(reservation))
            }
            None => Ok(()),
        }
    }

    /// Tagged reservation lookup for the public form.
    pub async fn reservation_status(
        &self,
        identity: &PatientIdentity,
        reference_date: NaiveDate,
    ) -> Result<ReservationStatus, AppointmentError> {
        match self.find_active_reservation(identity, reference_date, None).await {
            Ok(Some(reservation)) => Ok(ReservationStatus::AlreadyReserved { reservation }),
            Ok(None) => Ok(ReservationStatus::None),
            Err(AppointmentError::PatientNotFound) => Ok(ReservationStatus::PatientNotFound),
            Err(e) => Err(e),
        }
    }
}

/// Date, service and provider of `appointment`, as shown to the patient.
pub(crate) async fn summarize(
    store: &dyn SchedulingStore,
    appointment: &Appointment,
) -> Result<ReservationSummary, AppointmentError> {
    let service = store.get_service(appointment.service_id).await?;
    let provider = store.get_provider(appointment.provider_id).await?;

    Ok(ReservationSummary {
        date: appointment.start_datetime.date(),
        start_datetime: appointment.start_datetime,
        service: service.map(|s| s.name).unwrap_or_default(),
        provider: provider.map(|p| p.full_name()).unwrap_or_default(),
    })
}
