use std::sync::Arc;

use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::InMemoryStore;
use shared_models::auth::User;
use shared_models::scheduling::{
    Appointment, ClinicalRecord, Customer, Provider, Service, Speciality, WeeklyPlan, WorkingDay,
};

use crate::state::{AppState, Clock};

pub struct TestConfig {
    pub jwt_secret: String,
    pub supabase_url: String,
    pub supabase_anon_key: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
        }
    }
}

impl TestConfig {
    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            supabase_jwt_secret: self.jwt_secret.clone(),
            booking_hash_secret: "test-booking-secret".to_string(),
            ..AppConfig::default()
        }
    }
}

pub struct TestUser {
    pub id: String,
    pub email: String,
    pub role: String,
}

impl Default for TestUser {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: "staff@clinic.test".to_string(),
            role: "secretary".to_string(),
        }
    }
}

impl TestUser {
    pub fn new(email: &str, role: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            role: role.to_string(),
        }
    }

    /// Provider account whose id matches the provider's calendar id.
    pub fn provider_for(provider_id: Uuid, email: &str) -> Self {
        Self {
            id: provider_id.to_string(),
            email: email.to_string(),
            role: "provider".to_string(),
        }
    }

    pub fn provider(email: &str) -> Self {
        Self::new(email, "provider")
    }

    pub fn secretary(email: &str) -> Self {
        Self::new(email, "secretary")
    }

    pub fn admin(email: &str) -> Self {
        Self::new(email, "admin")
    }

    pub fn to_user(&self) -> User {
        User {
            id: self.id.clone(),
            email: Some(self.email.clone()),
            role: Some(self.role.clone()),
            metadata: None,
            created_at: Some(Utc::now()),
        }
    }
}

pub struct JwtTestUtils;

impl JwtTestUtils {
    pub fn create_test_token(user: &TestUser, secret: &str, exp_hours: Option<i64>) -> String {
        let now = Utc::now();
        let exp = now + Duration::hours(exp_hours.unwrap_or(24));

        let header = json!({
            "alg": "HS256",
            "typ": "JWT"
        });

        let payload = json!({
            "sub": user.id,
            "email": user.email,
            "role": user.role,
            "iat": now.timestamp(),
            "exp": exp.timestamp()
        });

        let header_encoded = general_purpose::URL_SAFE_NO_PAD.encode(header.to_string());
        let payload_encoded = general_purpose::URL_SAFE_NO_PAD.encode(payload.to_string());

        let signing_input = format!("{}.{}", header_encoded, payload_encoded);

        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(signing_input.as_bytes());
        let signature = mac.finalize().into_bytes();
        let signature_encoded = general_purpose::URL_SAFE_NO_PAD.encode(signature);

        format!("{}.{}", signing_input, signature_encoded)
    }

    pub fn create_expired_token(user: &TestUser, secret: &str) -> String {
        Self::create_test_token(user, secret, Some(-1))
    }

    pub fn create_invalid_signature_token(user: &TestUser) -> String {
        Self::create_test_token(user, "wrong-secret", Some(24))
    }

    pub fn create_malformed_token() -> String {
        "invalid.token.format".to_string()
    }
}

pub fn time(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).expect("valid time of day")
}

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid calendar date")
}

pub fn at(day: NaiveDate, hour: u32, minute: u32) -> NaiveDateTime {
    day.and_time(time(hour, minute))
}

/// Monday 2025-06-02, an open weekday in the fixture plan.
pub fn fixture_monday() -> NaiveDate {
    date(2025, 6, 2)
}

/// One provider (08:00-12:00 on weekdays, break 10:00-10:30) offering a
/// 20-minute consultation, seeded into an in-memory store.
pub struct ClinicFixture {
    pub store: Arc<InMemoryStore>,
    pub provider: Provider,
    pub service: Service,
    pub speciality: Speciality,
}

impl ClinicFixture {
    pub async fn new() -> Self {
        let store = Arc::new(InMemoryStore::new());

        let speciality = Speciality {
            id: Uuid::new_v4(),
            name: "Cardiología".to_string(),
        };
        let service = Service {
            id: Uuid::new_v4(),
            name: "Consulta externa".to_string(),
            speciality_id: Some(speciality.id),
            duration_minutes: 20,
        };
        let provider = Provider {
            id: Uuid::new_v4(),
            first_name: "Carla".to_string(),
            last_name: "Rojas".to_string(),
            timezone: "America/La_Paz".to_string(),
            services: vec![service.id],
            working_plan: WeeklyPlan::weekdays(
                WorkingDay::new(time(8, 0), time(12, 0)).with_break(time(10, 0), time(10, 30)),
            ),
        };

        store.insert_speciality(speciality.clone()).await;
        store.insert_service(service.clone()).await;
        store.insert_provider(provider.clone()).await;

        Self {
            store,
            provider,
            service,
            speciality,
        }
    }

    pub fn state(&self, config: AppConfig) -> Arc<AppState> {
        Arc::new(AppState::new(config, self.store.clone()))
    }

    /// State whose handlers see `now` as the current instant.
    pub fn state_at(&self, config: AppConfig, now: DateTime<Utc>) -> Arc<AppState> {
        Arc::new(AppState::new(config, self.store.clone()).with_clock(Clock::Fixed(now)))
    }

    pub fn customer(&self, ci: &str, first_name: &str, last_name: &str) -> Customer {
        Customer {
            id: Uuid::new_v4(),
            ci: ci.to_string(),
            complement: None,
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            clinical_story: None,
            email: None,
            phone_number: None,
        }
    }

    /// Existing appointment of the fixture provider for `customer_id`.
    pub async fn book(
        &self,
        customer_id: Uuid,
        start: NaiveDateTime,
        minutes: i64,
    ) -> Appointment {
        let appointment = Appointment {
            id: Uuid::new_v4(),
            provider_id: self.provider.id,
            service_id: self.service.id,
            customer_id,
            start_datetime: start,
            end_datetime: start + Duration::minutes(minutes),
            notes: None,
            book_datetime: Utc::now(),
            hash: Uuid::new_v4().simple().to_string(),
            municipality: None,
            medical_center: None,
        };
        self.store.insert_appointment(appointment.clone()).await;
        appointment
    }

    pub async fn register_patient(&self, ci: &str, first_name: &str, paternal_surname: &str) -> ClinicalRecord {
        let record = ClinicalRecord {
            ci: ci.to_string(),
            complement: None,
            first_name: first_name.to_string(),
            paternal_surname: paternal_surname.to_string(),
            maternal_surname: String::new(),
            clinical_story_code: format!("HC-{}", ci.chars().filter(char::is_ascii_digit).collect::<String>()),
        };
        self.store.insert_patient_record(record.clone()).await;
        record
    }
}
