use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::scheduling::{
    Appointment, ClinicalRecord, Customer, DateRange, Provider, Service, Speciality,
    UnavailabilityBlock, WeeklyPlan, WorkingPlanException,
};

use crate::store::{BookingCommit, SchedulingStore, StoreError, StoreResult};
use crate::supabase::{upsert_headers, ApiError, SupabaseClient};

/// `SchedulingStore` backed by the clinic's PostgREST (Supabase) schema.
///
/// `commit_booking` goes through the `commit_booking` SQL function, which
/// upserts the customer and the appointment in one transaction; the
/// appointments table carries an exclusion constraint on
/// `(provider_id, tsrange(start_datetime, end_datetime))`, so a lost race
/// answers 409.
pub struct SupabaseStore {
    supabase: SupabaseClient,
}

fn map_error(err: anyhow::Error) -> StoreError {
    match err.downcast_ref::<ApiError>().map(|api| api.status) {
        Some(StatusCode::CONFLICT) => StoreError::Conflict(err.to_string()),
        Some(StatusCode::NOT_FOUND) => StoreError::NotFound(err.to_string()),
        _ => StoreError::Backend(err),
    }
}

fn timestamp(value: NaiveDateTime) -> String {
    value.format("%Y-%m-%dT%H:%M:%S").to_string()
}

fn id_list(ids: &[Uuid]) -> String {
    ids.iter().map(Uuid::to_string).collect::<Vec<_>>().join(",")
}

impl SupabaseStore {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    async fn select<T: DeserializeOwned>(&self, path: &str) -> StoreResult<Vec<T>> {
        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, path, None, None)
            .await
            .map_err(map_error)?;

        rows.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<T>, _>>()
            .map_err(|e| StoreError::Backend(e.into()))
    }

    async fn select_one<T: DeserializeOwned>(&self, path: &str) -> StoreResult<Option<T>> {
        Ok(self.select(path).await?.into_iter().next())
    }

    async fn delete(&self, path: &str) -> StoreResult<()> {
        let _: Value = self
            .supabase
            .request(Method::DELETE, path, None, None)
            .await
            .map_err(map_error)?;
        Ok(())
    }
}

#[async_trait]
impl SchedulingStore for SupabaseStore {
    async fn get_provider(&self, provider_id: Uuid) -> StoreResult<Option<Provider>> {
        self.select_one(&format!("/rest/v1/providers?id=eq.{}", provider_id)).await
    }

    async fn list_providers(&self) -> StoreResult<Vec<Provider>> {
        self.select("/rest/v1/providers?order=last_name.asc").await
    }

    async fn get_service(&self, service_id: Uuid) -> StoreResult<Option<Service>> {
        self.select_one(&format!("/rest/v1/services?id=eq.{}", service_id)).await
    }

    async fn list_services(&self) -> StoreResult<Vec<Service>> {
        self.select("/rest/v1/services?order=name.asc").await
    }

    async fn list_specialities(&self) -> StoreResult<Vec<Speciality>> {
        self.select("/rest/v1/specialities?order=name.asc").await
    }

    async fn get_working_plan(&self, provider_id: Uuid) -> StoreResult<WeeklyPlan> {
        let rows: Vec<Value> = self
            .select(&format!("/rest/v1/providers?id=eq.{}&select=working_plan", provider_id))
            .await?;

        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::NotFound(format!("provider {}", provider_id)))?;

        serde_json::from_value(row["working_plan"].clone())
            .map_err(|e| StoreError::Backend(e.into()))
    }

    async fn get_exceptions(
        &self,
        provider_id: Uuid,
        range: DateRange,
    ) -> StoreResult<Vec<WorkingPlanException>> {
        self.select(&format!(
            "/rest/v1/working_plan_exceptions?provider_id=eq.{}&date=gte.{}&date=lte.{}&order=date.asc",
            provider_id, range.start, range.end
        ))
        .await
    }

    async fn upsert_exception(&self, exception: WorkingPlanException) -> StoreResult<()> {
        debug!("Upserting exception for provider {} on {}", exception.provider_id, exception.date);
        let _: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/working_plan_exceptions?on_conflict=provider_id,date",
                None,
                Some(json!(exception)),
                Some(upsert_headers()),
            )
            .await
            .map_err(map_error)?;
        Ok(())
    }

    async fn delete_exception(&self, provider_id: Uuid, date: NaiveDate) -> StoreResult<()> {
        self.delete(&format!(
            "/rest/v1/working_plan_exceptions?provider_id=eq.{}&date=eq.{}",
            provider_id, date
        ))
        .await
    }

    async fn get_appointments(
        &self,
        provider_id: Uuid,
        range: DateRange,
        exclude_id: Option<Uuid>,
    ) -> StoreResult<Vec<Appointment>> {
        let (lower, upper) = range.bounds();
        let mut path = format!(
            "/rest/v1/appointments?provider_id=eq.{}&start_datetime=lt.{}&end_datetime=gt.{}",
            provider_id,
            timestamp(upper),
            timestamp(lower)
        );
        if let Some(exclude) = exclude_id {
            path.push_str(&format!("&id=neq.{}", exclude));
        }
        path.push_str("&order=start_datetime.asc");
        self.select(&path).await
    }

    async fn get_appointments_in_range(&self, range: DateRange) -> StoreResult<Vec<Appointment>> {
        let (lower, upper) = range.bounds();
        self.select(&format!(
            "/rest/v1/appointments?start_datetime=gte.{}&start_datetime=lt.{}&order=start_datetime.asc",
            timestamp(lower),
            timestamp(upper)
        ))
        .await
    }

    async fn get_appointment(&self, appointment_id: Uuid) -> StoreResult<Option<Appointment>> {
        self.select_one(&format!("/rest/v1/appointments?id=eq.{}", appointment_id)).await
    }

    async fn get_appointment_by_hash(&self, hash: &str) -> StoreResult<Option<Appointment>> {
        if hash.is_empty() {
            return Ok(None);
        }
        self.select_one(&format!(
            "/rest/v1/appointments?hash=eq.{}",
            urlencoding::encode(hash)
        ))
        .await
    }

    async fn get_customer_appointments(&self, customer_ids: &[Uuid]) -> StoreResult<Vec<Appointment>> {
        if customer_ids.is_empty() {
            return Ok(Vec::new());
        }
        self.select(&format!(
            "/rest/v1/appointments?customer_id=in.({})&order=start_datetime.asc",
            id_list(customer_ids)
        ))
        .await
    }

    async fn commit_booking(&self, booking: BookingCommit) -> StoreResult<BookingCommit> {
        let payload = json!({
            "customer": booking.customer,
            "appointment": booking.appointment,
        });

        let _: Value = self
            .supabase
            .request(Method::POST, "/rest/v1/rpc/commit_booking", None, Some(payload))
            .await
            .map_err(map_error)?;

        Ok(booking)
    }

    async fn delete_appointment(&self, appointment_id: Uuid) -> StoreResult<()> {
        self.delete(&format!("/rest/v1/appointments?id=eq.{}", appointment_id)).await
    }

    async fn get_unavailability_blocks(
        &self,
        provider_id: Uuid,
        range: DateRange,
    ) -> StoreResult<Vec<UnavailabilityBlock>> {
        let (lower, upper) = range.bounds();
        self.select(&format!(
            "/rest/v1/unavailability_blocks?provider_id=eq.{}&start_datetime=lt.{}&end_datetime=gt.{}&order=start_datetime.asc",
            provider_id,
            timestamp(upper),
            timestamp(lower)
        ))
        .await
    }

    async fn save_unavailability_block(
        &self,
        block: UnavailabilityBlock,
    ) -> StoreResult<UnavailabilityBlock> {
        let rows: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/unavailability_blocks?on_conflict=id",
                None,
                Some(json!(block)),
                Some(upsert_headers()),
            )
            .await
            .map_err(map_error)?;

        match rows.into_iter().next() {
            Some(row) => serde_json::from_value(row).map_err(|e| StoreError::Backend(e.into())),
            None => Ok(block),
        }
    }

    async fn delete_unavailability_block(&self, block_id: Uuid) -> StoreResult<()> {
        self.delete(&format!("/rest/v1/unavailability_blocks?id=eq.{}", block_id)).await
    }

    async fn find_customers(&self, ci_digits: &str) -> StoreResult<Vec<Customer>> {
        if ci_digits.is_empty() {
            return Ok(Vec::new());
        }
        self.select(&format!("/rest/v1/customers?ci=ilike.*{}*", ci_digits)).await
    }

    async fn get_customers(&self, customer_ids: &[Uuid]) -> StoreResult<Vec<Customer>> {
        if customer_ids.is_empty() {
            return Ok(Vec::new());
        }
        self.select(&format!("/rest/v1/customers?id=in.({})", id_list(customer_ids))).await
    }

    async fn find_patient_records(
        &self,
        ci_digits: &str,
        complement_hint: Option<&str>,
    ) -> StoreResult<Vec<ClinicalRecord>> {
        if ci_digits.is_empty() {
            return Ok(Vec::new());
        }
        let mut path = format!("/rest/v1/clinical_records?HCL_NUMCI=ilike.*{}*", ci_digits);
        if let Some(hint) = complement_hint.filter(|hint| !hint.is_empty()) {
            path.push_str(&format!(
                "&or=(HCL_COMPLEMENTO.is.null,HCL_COMPLEMENTO.ilike.{})",
                urlencoding::encode(hint)
            ));
        }
        self.select(&path).await
    }
}
