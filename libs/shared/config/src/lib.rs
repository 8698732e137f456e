use std::env;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// How the conflict guard decides that an existing reservation falls on the
/// reference date.
///
/// `MonthAndDay` reproduces the behaviour of the legacy booking wizard, whose
/// year comparison was a tautology: only month and day-of-month are compared.
/// `CalendarDay` is the strict year/month/day comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SameDayRule {
    MonthAndDay,
    CalendarDay,
}

impl FromStr for SameDayRule {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "month_and_day" => Ok(SameDayRule::MonthAndDay),
            "calendar_day" => Ok(SameDayRule::CalendarDay),
            other => Err(format!("unknown same-day rule: {}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_jwt_secret: String,
    pub clinic_timezone: String,
    pub slot_granularity_minutes: i64,
    pub book_advance_timeout_minutes: i64,
    pub captcha_enabled: bool,
    pub booking_hash_secret: String,
    pub same_day_rule: SameDayRule,
    pub server_port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            supabase_jwt_secret: String::new(),
            clinic_timezone: "UTC".to_string(),
            slot_granularity_minutes: 10,
            book_advance_timeout_minutes: 0,
            captcha_enabled: false,
            booking_hash_secret: String::new(),
            same_day_rule: SameDayRule::MonthAndDay,
            server_port: 3000,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            clinic_timezone: env::var("CLINIC_TIMEZONE")
                .unwrap_or_else(|_| {
                    warn!("CLINIC_TIMEZONE not set, using UTC");
                    defaults.clinic_timezone.clone()
                }),
            slot_granularity_minutes: parse_var("SLOT_GRANULARITY_MINUTES", defaults.slot_granularity_minutes),
            book_advance_timeout_minutes: parse_var("BOOK_ADVANCE_TIMEOUT_MINUTES", defaults.book_advance_timeout_minutes),
            captcha_enabled: parse_var("CAPTCHA_ENABLED", defaults.captcha_enabled),
            booking_hash_secret: env::var("BOOKING_HASH_SECRET")
                .unwrap_or_else(|_| {
                    warn!("BOOKING_HASH_SECRET not set, booking references will use the JWT secret");
                    String::new()
                }),
            same_day_rule: parse_var("SAME_DAY_RULE", defaults.same_day_rule),
            server_port: parse_var("SERVER_PORT", defaults.server_port),
        };

        if !config.is_configured() {
            warn!("Supabase not configured - scheduling data will be kept in memory");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }

    /// Secret used to derive opaque booking references.
    pub fn booking_secret(&self) -> &str {
        if self.booking_hash_secret.is_empty() {
            &self.supabase_jwt_secret
        } else {
            &self.booking_hash_secret
        }
    }
}

fn parse_var<T: FromStr + std::fmt::Debug>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("{} has an invalid value ({}), using {:?}", name, raw, default);
            default
        }),
        Err(_) => default,
    }
}
