use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

use crate::models::AppointmentError;

type HmacSha256 = Hmac<Sha256>;

/// Opaque reference handed to the patient instead of the appointment id.
///
/// Stable for an appointment id, so a rescheduled booking keeps its reference.
pub fn booking_reference(secret: &str, appointment_id: Uuid) -> Result<String, AppointmentError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppointmentError::Validation(format!("invalid booking secret: {}", e)))?;
    mac.update(appointment_id.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}
