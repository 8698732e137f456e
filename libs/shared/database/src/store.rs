use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

use shared_models::scheduling::{
    Appointment, ClinicalRecord, Customer, DateRange, Provider, Service, Speciality,
    UnavailabilityBlock, WeeklyPlan, WorkingPlanException,
};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Record not found: {0}")]
    NotFound(String),

    /// A write lost against a concurrent one (overlap or unique constraint).
    #[error("Write conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Customer and appointment written as one unit.
#[derive(Debug, Clone)]
pub struct BookingCommit {
    pub customer: Customer,
    pub appointment: Appointment,
}

/// Data-access collaborator used by the scheduling engine.
///
/// Reads are side-effect free. `commit_booking` is the serialization point of
/// the booking transaction: it must re-check that no other appointment or
/// unavailability block of the provider overlaps the appointment (ignoring the
/// appointment's own id) and persist customer and appointment atomically,
/// answering `StoreError::Conflict` otherwise.
#[async_trait]
pub trait SchedulingStore: Send + Sync {
    // Catalogue
    async fn get_provider(&self, provider_id: Uuid) -> StoreResult<Option<Provider>>;
    async fn list_providers(&self) -> StoreResult<Vec<Provider>>;
    async fn get_service(&self, service_id: Uuid) -> StoreResult<Option<Service>>;
    async fn list_services(&self) -> StoreResult<Vec<Service>>;
    async fn list_specialities(&self) -> StoreResult<Vec<Speciality>>;

    // Working plans
    async fn get_working_plan(&self, provider_id: Uuid) -> StoreResult<WeeklyPlan>;
    async fn get_exceptions(
        &self,
        provider_id: Uuid,
        range: DateRange,
    ) -> StoreResult<Vec<WorkingPlanException>>;
    async fn upsert_exception(&self, exception: WorkingPlanException) -> StoreResult<()>;
    async fn delete_exception(&self, provider_id: Uuid, date: NaiveDate) -> StoreResult<()>;

    // Ledger
    async fn get_appointments(
        &self,
        provider_id: Uuid,
        range: DateRange,
        exclude_id: Option<Uuid>,
    ) -> StoreResult<Vec<Appointment>>;
    async fn get_appointments_in_range(&self, range: DateRange) -> StoreResult<Vec<Appointment>>;
    async fn get_appointment(&self, appointment_id: Uuid) -> StoreResult<Option<Appointment>>;
    /// Appointment whose booking reference is `hash`.
    async fn get_appointment_by_hash(&self, hash: &str) -> StoreResult<Option<Appointment>>;
    async fn get_customer_appointments(&self, customer_ids: &[Uuid]) -> StoreResult<Vec<Appointment>>;
    async fn commit_booking(&self, booking: BookingCommit) -> StoreResult<BookingCommit>;
    async fn delete_appointment(&self, appointment_id: Uuid) -> StoreResult<()>;

    async fn get_unavailability_blocks(
        &self,
        provider_id: Uuid,
        range: DateRange,
    ) -> StoreResult<Vec<UnavailabilityBlock>>;
    async fn save_unavailability_block(
        &self,
        block: UnavailabilityBlock,
    ) -> StoreResult<UnavailabilityBlock>;
    async fn delete_unavailability_block(&self, block_id: Uuid) -> StoreResult<()>;

    // Patients
    /// Candidate customers whose stored CI contains `ci_digits`; callers filter exactly.
    async fn find_customers(&self, ci_digits: &str) -> StoreResult<Vec<Customer>>;
    async fn get_customers(&self, customer_ids: &[Uuid]) -> StoreResult<Vec<Customer>>;
    /// Candidate rows of the external clinical registry (read-only).
    async fn find_patient_records(
        &self,
        ci_digits: &str,
        complement_hint: Option<&str>,
    ) -> StoreResult<Vec<ClinicalRecord>>;
}
