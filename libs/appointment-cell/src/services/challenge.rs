use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use rand::Rng;
use serde::Serialize;
use sha2::Sha256;
use tracing::debug;

use crate::models::{AppointmentError, ChallengeResponse};

type HmacSha256 = Hmac<Sha256>;

pub const CHALLENGE_TTL_MINUTES: i64 = 10;

/// Arithmetic question shown on the public booking form.
#[derive(Debug, Clone, Serialize)]
pub struct Challenge {
    pub question: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Stateless human-verification challenge.
///
/// The expected answer never leaves the server in clear: the token is
/// `<expires>.<nonce>.<hmac(expires.nonce.answer)>`, so verification only
/// needs the secret.
pub struct ChallengeVerifier {
    secret: String,
}

impl ChallengeVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            secret: secret.to_string(),
        }
    }

    pub fn issue(&self, now: DateTime<Utc>) -> Result<Challenge, AppointmentError> {
        let mut rng = rand::thread_rng();
        let a: u32 = rng.gen_range(1..=9);
        let b: u32 = rng.gen_range(1..=9);
        let nonce: u64 = rng.gen();

        let expires_at = now + Duration::minutes(CHALLENGE_TTL_MINUTES);
        let payload = format!("{}.{:x}", expires_at.timestamp(), nonce);
        let signature = self.sign(&payload, &(a + b).to_string())?;

        Ok(Challenge {
            question: format!("{} + {}", a, b),
            token: format!("{}.{}", payload, signature),
            expires_at,
        })
    }

    pub fn verify(
        &self,
        response: Option<&ChallengeResponse>,
        now: DateTime<Utc>,
    ) -> Result<(), AppointmentError> {
        let response = response.ok_or(AppointmentError::ChallengeFailed)?;

        let parts: Vec<&str> = response.token.split('.').collect();
        let [expires, nonce, signature] = parts.as_slice() else {
            debug!("Malformed challenge token");
            return Err(AppointmentError::ChallengeFailed);
        };
        let expires: i64 = expires.parse().map_err(|_| AppointmentError::ChallengeFailed)?;
        if now.timestamp() > expires {
            debug!("Challenge token expired");
            return Err(AppointmentError::ChallengeFailed);
        }
        let signature = hex::decode(signature).map_err(|_| AppointmentError::ChallengeFailed)?;

        let mut mac = self.mac()?;
        mac.update(format!("{}.{}.{}", expires, nonce, response.answer.trim()).as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| AppointmentError::ChallengeFailed)
    }

    fn mac(&self) -> Result<HmacSha256, AppointmentError> {
        HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| AppointmentError::Validation(format!("invalid challenge secret: {}", e)))
    }

    fn sign(&self, payload: &str, answer: &str) -> Result<String, AppointmentError> {
        let mut mac = self.mac()?;
        mac.update(format!("{}.{}", payload, answer).as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}
