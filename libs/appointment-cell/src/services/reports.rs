use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::debug;
use uuid::Uuid;

use patient_cell::{PatientIdentity, PatientService};
use shared_database::SchedulingStore;
use shared_models::scheduling::{Customer, DateRange, Provider, Service};

use crate::models::{AppointmentByCi, AppointmentError, ReportGroup, ReportPatient};

/// Read-only views over the ledger for the front desk and printed reports.
pub struct ReportService {
    store: Arc<dyn SchedulingStore>,
    patients: PatientService,
}

impl ReportService {
    pub fn new(store: Arc<dyn SchedulingStore>) -> Self {
        Self {
            patients: PatientService::new(store.clone()),
            store,
        }
    }

    /// Appointments of `date` grouped by speciality and provider.
    ///
    /// `speciality_id = None` reports every speciality. Groups are ordered by
    /// key and patients by start time.
    pub async fn by_speciality(
        &self,
        speciality_id: Option<Uuid>,
        date: NaiveDate,
    ) -> Result<Vec<ReportGroup>, AppointmentError> {
        let appointments = self
            .store
            .get_appointments_in_range(DateRange::single(date))
            .await?;
        if appointments.is_empty() {
            return Ok(Vec::new());
        }

        let services: HashMap<Uuid, Service> = self
            .store
            .list_services()
            .await?
            .into_iter()
            .map(|service| (service.id, service))
            .collect();
        let providers: HashMap<Uuid, Provider> = self
            .store
            .list_providers()
            .await?
            .into_iter()
            .map(|provider| (provider.id, provider))
            .collect();
        let specialities: HashMap<Uuid, String> = self
            .store
            .list_specialities()
            .await?
            .into_iter()
            .map(|speciality| (speciality.id, speciality.name))
            .collect();

        let customer_ids: Vec<Uuid> = appointments.iter().map(|a| a.customer_id).collect();
        let customers: HashMap<Uuid, Customer> = self
            .store
            .get_customers(&customer_ids)
            .await?
            .into_iter()
            .map(|customer| (customer.id, customer))
            .collect();

        let mut groups: BTreeMap<String, ReportGroup> = BTreeMap::new();
        for appointment in appointments {
            let Some(service) = services.get(&appointment.service_id) else {
                continue;
            };
            if speciality_id.is_some() && service.speciality_id != speciality_id {
                continue;
            }
            let (Some(provider), Some(customer)) = (
                providers.get(&appointment.provider_id),
                customers.get(&appointment.customer_id),
            ) else {
                debug!("Skipping appointment {} with dangling references", appointment.id);
                continue;
            };

            let speciality = service
                .speciality_id
                .and_then(|id| specialities.get(&id).cloned())
                .unwrap_or_default();
            let key = format!("{} - {} {}", speciality, provider.last_name, provider.first_name);

            groups
                .entry(key.clone())
                .or_insert_with(|| ReportGroup {
                    key,
                    speciality,
                    provider_first_name: provider.first_name.clone(),
                    provider_last_name: provider.last_name.clone(),
                    patients: Vec::new(),
                })
                .patients
                .push(ReportPatient {
                    first_name: customer.first_name.clone(),
                    last_name: customer.last_name.clone(),
                    clinical_story: customer.clinical_story.clone().unwrap_or_default(),
                    diagnostic: appointment.notes.unwrap_or_default(),
                    municipality: appointment.municipality.unwrap_or_default(),
                    medical_center: appointment.medical_center.unwrap_or_default(),
                    start_datetime: appointment.start_datetime,
                });
        }

        let mut groups: Vec<ReportGroup> = groups.into_values().collect();
        for group in &mut groups {
            group.patients.sort_by_key(|patient| patient.start_datetime);
        }
        debug!("Speciality report for {}: {} groups", date, groups.len());
        Ok(groups)
    }

    /// Latest appointment of the patient, or `None` when they never booked.
    pub async fn last_appointment_by_ci(
        &self,
        identity: &PatientIdentity,
    ) -> Result<Option<AppointmentByCi>, AppointmentError> {
        let customers = self.patients.find_customers(identity).await?;
        if customers.is_empty() {
            return Ok(None);
        }
        let customer_ids: Vec<Uuid> = customers.iter().map(|c| c.id).collect();

        let latest = self
            .store
            .get_customer_appointments(&customer_ids)
            .await?
            .into_iter()
            .max_by_key(|appointment| appointment.start_datetime);
        let Some(appointment) = latest else {
            return Ok(None);
        };
        let Some(customer) = customers.into_iter().find(|c| c.id == appointment.customer_id) else {
            return Ok(None);
        };

        let service = self.store.get_service(appointment.service_id).await?;
        let provider = self.store.get_provider(appointment.provider_id).await?;

        Ok(Some(AppointmentByCi {
            start_datetime: appointment.start_datetime,
            service: service.map(|s| s.name).unwrap_or_default(),
            provider: provider.map(|p| p.full_name()).unwrap_or_default(),
            clinical_story: customer.clinical_story.clone(),
            diagnostic: appointment.notes,
            customer,
        }))
    }
}
