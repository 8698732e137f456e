use serde::{Deserialize, Serialize};
use thiserror::Error;

use shared_database::StoreError;
use shared_models::error::AppError;
use shared_models::scheduling::ClinicalRecord;

#[derive(Debug, Deserialize)]
pub struct PatientLookupQuery {
    pub ci: String,
    pub complement: Option<String>,
}

/// Registry row as shown by the booking wizard.
#[derive(Debug, Clone, Serialize)]
pub struct PatientRecordView {
    pub ci: String,
    pub complement: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub clinical_story: String,
}

impl From<&ClinicalRecord> for PatientRecordView {
    fn from(record: &ClinicalRecord) -> Self {
        Self {
            ci: record.ci.clone(),
            complement: record.complement.clone(),
            first_name: record.first_name.clone(),
            last_name: record.last_name(),
            full_name: record.full_name(),
            clinical_story: record.clinical_story_code.clone(),
        }
    }
}

#[derive(Error, Debug)]
pub enum PatientError {
    #[error("Patient not found in the clinical registry")]
    PatientNotFound,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Storage failure: {0}")]
    Storage(String),
}

impl From<StoreError> for PatientError {
    fn from(err: StoreError) -> Self {
        PatientError::Storage(err.to_string())
    }
}

impl From<PatientError> for AppError {
    fn from(err: PatientError) -> Self {
        match err {
            PatientError::PatientNotFound => AppError::NotFound(err.to_string()),
            PatientError::Validation(_) => AppError::ValidationError(err.to_string()),
            PatientError::Storage(msg) => AppError::Database(msg),
        }
    }
}
