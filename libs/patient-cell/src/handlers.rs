use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use serde_json::{json, Value};

use shared_models::error::AppError;
use shared_utils::state::AppState;

use crate::models::{PatientLookupQuery, PatientRecordView};
use crate::services::{PatientIdentity, PatientService};

/// Registry rows for a CI. An unknown patient is a `patient_not_found` result, not an error.
#[axum::debug_handler]
pub async fn get_patient_by_ci(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PatientLookupQuery>,
) -> Result<Json<Value>, AppError> {
    let identity = PatientIdentity::parse(&query.ci, query.complement.as_deref())?;
    let records = PatientService::new(state.store.clone())
        .find_records(&identity)
        .await?;

    if records.is_empty() {
        return Ok(Json(json!({
            "kind": "patient_not_found",
            "ci": identity.ci,
            "records": []
        })));
    }

    let records: Vec<PatientRecordView> = records.iter().map(PatientRecordView::from).collect();
    Ok(Json(json!({
        "kind": "found",
        "ci": identity.ci,
        "records": records
    })))
}
