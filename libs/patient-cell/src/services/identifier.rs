//! Canonical form of the national identity number (CI) and its complement.
//!
//! Registry and customer rows carry CIs typed by hand over many years
//! (`"4.567.890"`, `"4567890 LP"`, `" 4567890-1K"`), so every comparison
//! goes through these functions instead of raw string equality.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::models::PatientError;

static NON_DIGITS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^0-9]+").expect("non-digit pattern is valid"));

static NON_ALPHANUMERIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^0-9A-Za-z]+").expect("non-alphanumeric pattern is valid"));

/// Digits of `raw`, in order. Every run of other characters is removed.
pub fn canonical_ci(raw: &str) -> String {
    NON_DIGITS.replace_all(raw, "").into_owned()
}

/// Upper-cased alphanumerics of the complement; blank complements are `None`.
pub fn canonical_complement(raw: Option<&str>) -> Option<String> {
    raw.map(|value| NON_ALPHANUMERIC.replace_all(value, "").to_ascii_uppercase())
        .filter(|value| !value.is_empty())
}

/// Natural key of a patient: canonical CI plus optional complement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatientIdentity {
    pub ci: String,
    pub complement: Option<String>,
}

impl PatientIdentity {
    pub fn parse(ci: &str, complement: Option<&str>) -> Result<Self, PatientError> {
        let digits = canonical_ci(ci);
        if digits.is_empty() {
            return Err(PatientError::Validation(format!(
                "identity number '{}' contains no digits",
                ci
            )));
        }
        Ok(Self {
            ci: digits,
            complement: canonical_complement(complement),
        })
    }

    /// True when a stored `(ci, complement)` pair denotes this patient.
    ///
    /// CIs must be equal once canonical. Complements only disambiguate when
    /// both sides carry one.
    pub fn matches(&self, ci: &str, complement: Option<&str>) -> bool {
        if canonical_ci(ci) != self.ci {
            return false;
        }
        match (&self.complement, canonical_complement(complement)) {
            (Some(wanted), Some(stored)) => *wanted == stored,
            _ => true,
        }
    }
}
