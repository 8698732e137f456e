use std::sync::Arc;

use tracing::debug;

use shared_database::SchedulingStore;
use shared_models::scheduling::{ClinicalRecord, Customer};

use crate::models::PatientError;
use crate::services::identifier::PatientIdentity;

/// Natural-key lookups against the clinical registry and the customer table.
///
/// The store only narrows candidates; exact matching on the canonical
/// identity happens here.
pub struct PatientService {
    store: Arc<dyn SchedulingStore>,
}

impl PatientService {
    pub fn new(store: Arc<dyn SchedulingStore>) -> Self {
        Self { store }
    }

    pub async fn find_records(
        &self,
        identity: &PatientIdentity,
    ) -> Result<Vec<ClinicalRecord>, PatientError> {
        let candidates = self
            .store
            .find_patient_records(&identity.ci, identity.complement.as_deref())
            .await?;
        let total = candidates.len();

        let records: Vec<ClinicalRecord> = candidates
            .into_iter()
            .filter(|record| identity.matches(&record.ci, record.complement.as_deref()))
            .collect();

        debug!(
            "Registry lookup for CI {}: {} candidates, {} exact matches",
            identity.ci,
            total,
            records.len()
        );
        Ok(records)
    }

    /// Like `find_records`, but an unknown patient is an error.
    pub async fn require_records(
        &self,
        identity: &PatientIdentity,
    ) -> Result<Vec<ClinicalRecord>, PatientError> {
        let records = self.find_records(identity).await?;
        if records.is_empty() {
            return Err(PatientError::PatientNotFound);
        }
        Ok(records)
    }

    /// Customers registered under `identity`.
    pub async fn find_customers(
        &self,
        identity: &PatientIdentity,
    ) -> Result<Vec<Customer>, PatientError> {
        let candidates = self.store.find_customers(&identity.ci).await?;
        Ok(candidates
            .into_iter()
            .filter(|customer| identity.matches(&customer.ci, customer.complement.as_deref()))
            .collect())
    }
}
