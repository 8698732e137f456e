use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use shared_models::scheduling::{
    Appointment, ClinicalRecord, Customer, DateRange, Provider, Service, Speciality,
    UnavailabilityBlock, WeeklyPlan, WorkingPlanException,
};

use crate::store::{BookingCommit, SchedulingStore, StoreError, StoreResult};

#[derive(Default)]
struct Tables {
    providers: HashMap<Uuid, Provider>,
    services: HashMap<Uuid, Service>,
    specialities: HashMap<Uuid, Speciality>,
    exceptions: HashMap<(Uuid, NaiveDate), WorkingPlanException>,
    appointments: HashMap<Uuid, Appointment>,
    blocks: HashMap<Uuid, UnavailabilityBlock>,
    customers: HashMap<Uuid, Customer>,
    registry: Vec<ClinicalRecord>,
}

/// Process-local store used when no PostgREST backend is configured, and by tests.
///
/// Every write happens under one write guard, so `commit_booking` re-checks
/// overlaps and persists both rows without interleaving.
#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
    offline: AtomicBool,
}

fn digits(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_digit).collect()
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail with a backend error until switched back.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn ensure_online(&self) -> StoreResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Backend(anyhow!("scheduling store is unreachable")));
        }
        Ok(())
    }

    pub async fn insert_provider(&self, provider: Provider) {
        self.tables.write().await.providers.insert(provider.id, provider);
    }

    pub async fn insert_service(&self, service: Service) {
        self.tables.write().await.services.insert(service.id, service);
    }

    pub async fn insert_speciality(&self, speciality: Speciality) {
        self.tables.write().await.specialities.insert(speciality.id, speciality);
    }

    pub async fn insert_customer(&self, customer: Customer) {
        self.tables.write().await.customers.insert(customer.id, customer);
    }

    /// Seeds an appointment without the overlap check (imported or legacy data).
    pub async fn insert_appointment(&self, appointment: Appointment) {
        self.tables.write().await.appointments.insert(appointment.id, appointment);
    }

    pub async fn insert_patient_record(&self, record: ClinicalRecord) {
        self.tables.write().await.registry.push(record);
    }

    pub async fn appointment_count(&self) -> usize {
        self.tables.read().await.appointments.len()
    }

    pub async fn customer_count(&self) -> usize {
        self.tables.read().await.customers.len()
    }
}

#[async_trait]
impl SchedulingStore for InMemoryStore {
    async fn get_provider(&self, provider_id: Uuid) -> StoreResult<Option<Provider>> {
        self.ensure_online()?;
        Ok(self.tables.read().await.providers.get(&provider_id).cloned())
    }

    async fn list_providers(&self) -> StoreResult<Vec<Provider>> {
        self.ensure_online()?;
        Ok(self.tables.read().await.providers.values().cloned().collect())
    }

    async fn get_service(&self, service_id: Uuid) -> StoreResult<Option<Service>> {
        self.ensure_online()?;
        Ok(self.tables.read().await.services.get(&service_id).cloned())
    }

    async fn list_services(&self) -> StoreResult<Vec<Service>> {
        self.ensure_online()?;
        Ok(self.tables.read().await.services.values().cloned().collect())
    }

    async fn list_specialities(&self) -> StoreResult<Vec<Speciality>> {
        self.ensure_online()?;
        Ok(self.tables.read().await.specialities.values().cloned().collect())
    }

    async fn get_working_plan(&self, provider_id: Uuid) -> StoreResult<WeeklyPlan> {
        self.ensure_online()?;
        self.tables
            .read()
            .await
            .providers
            .get(&provider_id)
            .map(|provider| provider.working_plan.clone())
            .ok_or_else(|| StoreError::NotFound(format!("provider {}", provider_id)))
    }

    async fn get_exceptions(
        &self,
        provider_id: Uuid,
        range: DateRange,
    ) -> StoreResult<Vec<WorkingPlanException>> {
        self.ensure_online()?;
        let tables = self.tables.read().await;
        let mut exceptions: Vec<WorkingPlanException> = tables
            .exceptions
            .values()
            .filter(|exception| exception.provider_id == provider_id && range.contains(exception.date))
            .cloned()
            .collect();
        exceptions.sort_by_key(|exception| exception.date);
        Ok(exceptions)
    }

    async fn upsert_exception(&self, exception: WorkingPlanException) -> StoreResult<()> {
        self.ensure_online()?;
        debug!("Storing exception for provider {} on {}", exception.provider_id, exception.date);
        self.tables
            .write()
            .await
            .exceptions
            .insert((exception.provider_id, exception.date), exception);
        Ok(())
    }

    async fn delete_exception(&self, provider_id: Uuid, date: NaiveDate) -> StoreResult<()> {
        self.ensure_online()?;
        self.tables.write().await.exceptions.remove(&(provider_id, date));
        Ok(())
    }

    async fn get_appointments(
        &self,
        provider_id: Uuid,
        range: DateRange,
        exclude_id: Option<Uuid>,
    ) -> StoreResult<Vec<Appointment>> {
        self.ensure_online()?;
        let (lower, upper) = range.bounds();
        let tables = self.tables.read().await;
        let mut appointments: Vec<Appointment> = tables
            .appointments
            .values()
            .filter(|appointment| appointment.provider_id == provider_id)
            .filter(|appointment| Some(appointment.id) != exclude_id)
            .filter(|appointment| appointment.overlaps(lower, upper))
            .cloned()
            .collect();
        appointments.sort_by_key(|appointment| appointment.start_datetime);
        Ok(appointments)
    }

    async fn get_appointments_in_range(&self, range: DateRange) -> StoreResult<Vec<Appointment>> {
        self.ensure_online()?;
        let tables = self.tables.read().await;
        let mut appointments: Vec<Appointment> = tables
            .appointments
            .values()
            .filter(|appointment| range.contains(appointment.start_datetime.date()))
            .cloned()
            .collect();
        appointments.sort_by_key(|appointment| appointment.start_datetime);
        Ok(appointments)
    }

    async fn get_appointment(&self, appointment_id: Uuid) -> StoreResult<Option<Appointment>> {
        self.ensure_online()?;
        Ok(self.tables.read().await.appointments.get(&appointment_id).cloned())
    }

    async fn get_appointment_by_hash(&self, hash: &str) -> StoreResult<Option<Appointment>> {
        self.ensure_online()?;
        if hash.is_empty() {
            return Ok(None);
        }
        let tables = self.tables.read().await;
        Ok(tables
            .appointments
            .values()
            .find(|appointment| appointment.hash == hash)
            .cloned())
    }

    async fn get_customer_appointments(&self, customer_ids: &[Uuid]) -> StoreResult<Vec<Appointment>> {
        self.ensure_online()?;
        let tables = self.tables.read().await;
        let mut appointments: Vec<Appointment> = tables
            .appointments
            .values()
            .filter(|appointment| customer_ids.contains(&appointment.customer_id))
            .cloned()
            .collect();
        appointments.sort_by_key(|appointment| appointment.start_datetime);
        Ok(appointments)
    }

    async fn commit_booking(&self, booking: BookingCommit) -> StoreResult<BookingCommit> {
        self.ensure_online()?;
        let mut tables = self.tables.write().await;
        let appointment = &booking.appointment;

        let clashes_with_appointment = tables.appointments.values().any(|existing| {
            existing.id != appointment.id
                && existing.provider_id == appointment.provider_id
                && existing.overlaps(appointment.start_datetime, appointment.end_datetime)
        });
        let clashes_with_block = tables.blocks.values().any(|block| {
            block.provider_id == appointment.provider_id
                && block.overlaps(appointment.start_datetime, appointment.end_datetime)
        });

        if clashes_with_appointment || clashes_with_block {
            return Err(StoreError::Conflict(format!(
                "provider {} is already booked between {} and {}",
                appointment.provider_id, appointment.start_datetime, appointment.end_datetime
            )));
        }

        tables.customers.insert(booking.customer.id, booking.customer.clone());
        tables.appointments.insert(appointment.id, appointment.clone());
        Ok(booking)
    }

    async fn delete_appointment(&self, appointment_id: Uuid) -> StoreResult<()> {
        self.ensure_online()?;
        self.tables
            .write()
            .await
            .appointments
            .remove(&appointment_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("appointment {}", appointment_id)))
    }

    async fn get_unavailability_blocks(
        &self,
        provider_id: Uuid,
        range: DateRange,
    ) -> StoreResult<Vec<UnavailabilityBlock>> {
        self.ensure_online()?;
        let (lower, upper) = range.bounds();
        let tables = self.tables.read().await;
        let mut blocks: Vec<UnavailabilityBlock> = tables
            .blocks
            .values()
            .filter(|block| block.provider_id == provider_id && block.overlaps(lower, upper))
            .cloned()
            .collect();
        blocks.sort_by_key(|block| block.start_datetime);
        Ok(blocks)
    }

    async fn save_unavailability_block(
        &self,
        block: UnavailabilityBlock,
    ) -> StoreResult<UnavailabilityBlock> {
        self.ensure_online()?;
        self.tables.write().await.blocks.insert(block.id, block.clone());
        Ok(block)
    }

    async fn delete_unavailability_block(&self, block_id: Uuid) -> StoreResult<()> {
        self.ensure_online()?;
        self.tables
            .write()
            .await
            .blocks
            .remove(&block_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("unavailability block {}", block_id)))
    }

    async fn find_customers(&self, ci_digits: &str) -> StoreResult<Vec<Customer>> {
        self.ensure_online()?;
        if ci_digits.is_empty() {
            return Ok(Vec::new());
        }
        let tables = self.tables.read().await;
        Ok(tables
            .customers
            .values()
            .filter(|customer| digits(&customer.ci).contains(ci_digits))
            .cloned()
            .collect())
    }

    async fn get_customers(&self, customer_ids: &[Uuid]) -> StoreResult<Vec<Customer>> {
        self.ensure_online()?;
        let tables = self.tables.read().await;
        Ok(customer_ids
            .iter()
            .filter_map(|id| tables.customers.get(id).cloned())
            .collect())
    }

    async fn find_patient_records(
        &self,
        ci_digits: &str,
        complement_hint: Option<&str>,
    ) -> StoreResult<Vec<ClinicalRecord>> {
        self.ensure_online()?;
        if ci_digits.is_empty() {
            return Ok(Vec::new());
        }
        let tables = self.tables.read().await;
        Ok(tables
            .registry
            .iter()
            .filter(|record| digits(&record.ci).contains(ci_digits))
            .filter(|record| match (complement_hint, record.complement.as_deref()) {
                (Some(hint), Some(stored)) => stored.eq_ignore_ascii_case(hint),
                _ => true,
            })
            .cloned()
            .collect())
    }
}
