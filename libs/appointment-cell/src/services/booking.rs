use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use patient_cell::{PatientIdentity, PatientService};
use schedule_cell::services::slots::service_duration;
use schedule_cell::services::timezone::{local_now, provider_timezone};
use schedule_cell::{SlotCalculator, SlotOptions};
use shared_config::AppConfig;
use shared_database::{BookingCommit, SchedulingStore, StoreError};
use shared_models::scheduling::{Appointment, ClinicalRecord, Customer, Provider, Service};

use crate::models::{
    AppointmentDraft, AppointmentError, BookedAppointment, CustomerDraft,
    RegisterAppointmentRequest, ReservationSummary,
};
use crate::services::challenge::ChallengeVerifier;
use crate::services::guard::{clinic_today, summarize, ConflictGuard};
use crate::services::reference::booking_reference;

/// Who is submitting. Staff saves skip the challenge, the same-day guard,
/// the registry requirement and the advance-booking window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingMode {
    Public,
    Staff,
}

/// A draft that passed every check and only awaits the atomic commit.
struct ValidatedBooking {
    provider: Provider,
    service: Service,
    customer: Customer,
    draft: AppointmentDraft,
    end: NaiveDateTime,
    existing: Option<Appointment>,
}

/// Validates a booking submission against current state and commits it.
///
/// Everything before `commit` only reads; the store re-checks overlap inside
/// `commit_booking`, so a slot that was free here can still be lost there.
pub struct BookingTransaction {
    store: Arc<dyn SchedulingStore>,
    config: Arc<AppConfig>,
    calculator: SlotCalculator,
    guard: ConflictGuard,
    patients: PatientService,
    challenge: ChallengeVerifier,
}

impl BookingTransaction {
    pub fn new(store: Arc<dyn SchedulingStore>, config: Arc<AppConfig>) -> Self {
        Self {
            calculator: SlotCalculator::new(store.clone()),
            guard: ConflictGuard::new(store.clone(), config.same_day_rule),
            patients: PatientService::new(store.clone()),
            challenge: ChallengeVerifier::new(config.booking_secret()),
            store,
            config,
        }
    }

    #[instrument(
        skip(self, request, now),
        fields(
            provider_id = %request.appointment.provider_id,
            start = %request.appointment.start_datetime
        )
    )]
    pub async fn submit_appointment(
        &self,
        request: RegisterAppointmentRequest,
        mode: BookingMode,
        now: DateTime<Utc>,
    ) -> Result<BookedAppointment, AppointmentError> {
        if mode == BookingMode::Public && self.config.captcha_enabled {
            if let Err(e) = self.challenge.verify(request.captcha.as_ref(), now) {
                warn!("Booking rejected: challenge failed");
                return Err(e);
            }
        }

        let validated = self.validate(request, mode, now).await?;
        self.commit(validated, now).await
    }

    async fn validate(
        &self,
        request: RegisterAppointmentRequest,
        mode: BookingMode,
        now: DateTime<Utc>,
    ) -> Result<ValidatedBooking, AppointmentError> {
        let draft = request.appointment;
        if let Some(end) = draft.end_datetime {
            if end <= draft.start_datetime {
                return Err(AppointmentError::InvalidInterval(format!(
                    "appointment ends at {} before it starts at {}",
                    end, draft.start_datetime
                )));
            }
        }

        let (provider, service) = self
            .calculator
            .load_request(draft.provider_id, draft.service_id)
            .await?;
        let end = draft.start_datetime + service_duration(&service)?;
        if draft.end_datetime.is_some_and(|given| given != end) {
            return Err(AppointmentError::InvalidInterval(format!(
                "appointment must last {} minutes",
                service.duration_minutes
            )));
        }

        let existing = self
            .resolve_reschedule(
                request.booking_reference.as_deref(),
                request.exclude_appointment_id,
                mode,
            )
            .await?;
        let existing_customer = match &existing {
            Some(appointment) => self
                .store
                .get_customers(&[appointment.customer_id])
                .await?
                .into_iter()
                .next(),
            None => None,
        };

        let identity = match (&request.customer, &existing_customer) {
            (Some(customer), _) => {
                PatientIdentity::parse(&customer.ci, customer.complement.as_deref())?
            }
            (None, Some(customer)) => {
                PatientIdentity::parse(&customer.ci, customer.complement.as_deref())?
            }
            (None, None) => {
                return Err(AppointmentError::Validation(
                    "customer data is required for a new appointment".to_string(),
                ))
            }
        };

        if let (Some(_), Some(holder)) = (&request.customer, &existing_customer) {
            if !identity.matches(&holder.ci, holder.complement.as_deref()) {
                warn!(
                    "Reschedule rejected: CI {} does not hold appointment {:?}",
                    identity.ci,
                    existing.as_ref().map(|appointment| appointment.id)
                );
                return Err(AppointmentError::PatientMismatch);
            }
        }

        let exclude = existing.as_ref().map(|appointment| appointment.id);
        let records = match mode {
            BookingMode::Public => {
                self.guard
                    .check(&identity, clinic_today(&self.config, now), exclude)
                    .await?;
                self.patients.require_records(&identity).await?
            }
            BookingMode::Staff => self.patients.find_records(&identity).await?,
        };

        let not_before = match mode {
            BookingMode::Public => {
                let tz = provider_timezone(&provider.timezone, &self.config.clinic_timezone);
                Some(local_now(tz, now) + Duration::minutes(self.config.book_advance_timeout_minutes))
            }
            BookingMode::Staff => None,
        };
        let options = SlotOptions::with_granularity(self.config.slot_granularity_minutes)
            .excluding(exclude)
            .not_before(not_before);

        if !self
            .calculator
            .is_slot_available(provider.id, service.id, draft.start_datetime, &options)
            .await?
        {
            warn!(
                "Booking rejected: {} is no longer free for provider {}",
                draft.start_datetime, provider.id
            );
            return Err(AppointmentError::SlotNoLongerAvailable);
        }

        let known = match existing_customer {
            Some(customer) => Some(customer),
            None => self.patients.find_customers(&identity).await?.into_iter().next(),
        };
        let customer = merge_customer(
            &identity,
            request.customer.as_ref(),
            known,
            records.first(),
        )?;

        Ok(ValidatedBooking {
            provider,
            service,
            customer,
            draft,
            end,
            existing,
        })
    }

    async fn commit(
        &self,
        booking: ValidatedBooking,
        now: DateTime<Utc>,
    ) -> Result<BookedAppointment, AppointmentError> {
        let ValidatedBooking {
            provider,
            service,
            customer,
            draft,
            end,
            existing,
        } = booking;

        let id = existing.as_ref().map_or_else(Uuid::new_v4, |appointment| appointment.id);
        let booking_reference = booking_reference(self.config.booking_secret(), id)?;
        let previous = existing.as_ref();

        let appointment = Appointment {
            id,
            provider_id: provider.id,
            service_id: service.id,
            customer_id: customer.id,
            start_datetime: draft.start_datetime,
            end_datetime: end,
            notes: draft.notes.or_else(|| previous.and_then(|a| a.notes.clone())),
            book_datetime: previous.map_or(now, |a| a.book_datetime),
            hash: booking_reference.clone(),
            municipality: draft
                .municipality
                .or_else(|| previous.and_then(|a| a.municipality.clone())),
            medical_center: draft
                .medical_center
                .or_else(|| previous.and_then(|a| a.medical_center.clone())),
        };

        let committed = match self
            .store
            .commit_booking(BookingCommit {
                customer,
                appointment,
            })
            .await
        {
            Ok(committed) => committed,
            Err(StoreError::Conflict(reason)) => {
                warn!("Booking lost the race at commit: {}", reason);
                return Err(AppointmentError::SlotNoLongerAvailable);
            }
            Err(e) => return Err(e.into()),
        };

        info!(
            "Committed appointment {} for provider {} at {}",
            committed.appointment.id, provider.id, committed.appointment.start_datetime
        );

        Ok(BookedAppointment {
            appointment: committed.appointment,
            customer: committed.customer,
            booking_reference,
            provider_name: provider.full_name(),
            service_name: service.name,
            rescheduled: existing.is_some(),
        })
    }

    /// Appointment a submission reschedules, if any.
    ///
    /// The public form names it by booking reference; a raw id is only
    /// accepted from staff. When both are sent they must agree.
    pub async fn rescheduled_appointment(
        &self,
        request: &RegisterAppointmentRequest,
        mode: BookingMode,
    ) -> Result<Option<Appointment>, AppointmentError> {
        self.resolve_reschedule(
            request.booking_reference.as_deref(),
            request.exclude_appointment_id,
            mode,
        )
        .await
    }

    async fn resolve_reschedule(
        &self,
        reference: Option<&str>,
        appointment_id: Option<Uuid>,
        mode: BookingMode,
    ) -> Result<Option<Appointment>, AppointmentError> {
        let reference = reference
            .map(str::trim)
            .filter(|reference| !reference.is_empty());

        match (reference, appointment_id, mode) {
            (Some(reference), id, _) => {
                let appointment = self.find_by_reference(reference).await?;
                if id.is_some_and(|id| id != appointment.id) {
                    return Err(AppointmentError::AppointmentNotFound);
                }
                Ok(Some(appointment))
            }
            (None, Some(id), BookingMode::Staff) => self.get_appointment(id).await.map(Some),
            (None, Some(_), BookingMode::Public) => Err(AppointmentError::Validation(
                "a booking reference is required to reschedule".to_string(),
            )),
            (None, None, _) => Ok(None),
        }
    }

    pub async fn find_by_reference(&self, reference: &str) -> Result<Appointment, AppointmentError> {
        self.store
            .get_appointment_by_hash(reference)
            .await?
            .ok_or(AppointmentError::AppointmentNotFound)
    }

    /// Confirmation view of the appointment behind a booking reference.
    pub async fn reservation_by_reference(
        &self,
        reference: &str,
    ) -> Result<ReservationSummary, AppointmentError> {
        let appointment = self.find_by_reference(reference.trim()).await?;
        summarize(self.store.as_ref(), &appointment).await
    }

    pub async fn get_appointment(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        self.store
            .get_appointment(appointment_id)
            .await?
            .ok_or(AppointmentError::AppointmentNotFound)
    }

    pub async fn delete_appointment(&self, appointment_id: Uuid) -> Result<(), AppointmentError> {
        match self.store.delete_appointment(appointment_id).await {
            Ok(()) => {
                info!("Deleted appointment {}", appointment_id);
                Ok(())
            }
            Err(StoreError::NotFound(_)) => Err(AppointmentError::AppointmentNotFound),
            Err(e) => Err(e.into()),
        }
    }
}

/// Create-or-update of the customer row keyed by the patient identity.
///
/// Submitted fields win, then the stored customer, then the registry record.
fn merge_customer(
    identity: &PatientIdentity,
    draft: Option<&CustomerDraft>,
    known: Option<Customer>,
    record: Option<&ClinicalRecord>,
) -> Result<Customer, AppointmentError> {
    let pick = |submitted: Option<&String>, stored: Option<&String>, registry: Option<String>| {
        submitted
            .filter(|value| !value.trim().is_empty())
            .map(|value| value.trim().to_string())
            .or_else(|| stored.cloned())
            .or(registry)
    };

    let first_name = pick(
        draft.and_then(|d| d.first_name.as_ref()),
        known.as_ref().map(|c| &c.first_name),
        record.map(|r| r.first_name.clone()),
    )
    .ok_or_else(|| AppointmentError::Validation("customer first name is required".to_string()))?;
    let last_name = pick(
        draft.and_then(|d| d.last_name.as_ref()),
        known.as_ref().map(|c| &c.last_name),
        record.map(ClinicalRecord::last_name),
    )
    .ok_or_else(|| AppointmentError::Validation("customer last name is required".to_string()))?;

    if known.is_none() {
        debug!("Creating customer for CI {}", identity.ci);
    }

    Ok(Customer {
        id: known.as_ref().map_or_else(Uuid::new_v4, |c| c.id),
        ci: identity.ci.clone(),
        complement: identity
            .complement
            .clone()
            .or_else(|| known.as_ref().and_then(|c| c.complement.clone())),
        first_name,
        last_name,
        clinical_story: record
            .map(|r| r.clinical_story_code.clone())
            .or_else(|| known.as_ref().and_then(|c| c.clinical_story.clone())),
        email: draft
            .and_then(|d| d.email.clone())
            .or_else(|| known.as_ref().and_then(|c| c.email.clone())),
        phone_number: draft
            .and_then(|d| d.phone_number.clone())
            .or_else(|| known.as_ref().and_then(|c| c.phone_number.clone())),
    })
}
