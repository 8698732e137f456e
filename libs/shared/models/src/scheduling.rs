use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveDateTime, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ==============================================================================
// DATE RANGES
// ==============================================================================

/// Inclusive range of calendar dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    pub fn single(date: NaiveDate) -> Self {
        Self { start: date, end: date }
    }

    /// Every date of the calendar month containing `anchor`.
    pub fn month_of(anchor: NaiveDate) -> Self {
        let start = anchor.with_day(1).unwrap_or(anchor);
        let next_month = if start.month() == 12 {
            NaiveDate::from_ymd_opt(start.year() + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(start.year(), start.month() + 1, 1)
        };
        let end = next_month
            .and_then(|first| first.pred_opt())
            .unwrap_or(start);
        Self { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        self.start.iter_days().take_while(move |day| *day <= end)
    }

    pub fn day_count(&self) -> usize {
        (self.end - self.start).num_days() as usize + 1
    }

    /// Half-open wall-clock window `[start 00:00, end+1 00:00)`.
    pub fn bounds(&self) -> (NaiveDateTime, NaiveDateTime) {
        let lower = self.start.and_time(NaiveTime::MIN);
        let upper = self
            .end
            .checked_add_days(Days::new(1))
            .unwrap_or(self.end)
            .and_time(NaiveTime::MIN);
        (lower, upper)
    }
}

// ==============================================================================
// WORKING PLAN
// ==============================================================================

/// Wall-clock times are exchanged as `HH:MM` (seconds are accepted on input).
/// `HH:MM` times of day for working plans.
///
/// Days end at 23:59 at the latest; `24:00` is rejected because `NaiveTime`
/// has no end-of-day value and plans never cross midnight.
pub mod hhmm {
    use chrono::NaiveTime;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn parse(raw: &str) -> Option<NaiveTime> {
        NaiveTime::parse_from_str(raw, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
            .ok()
    }

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        if raw.trim().starts_with("24:") {
            return Err(D::Error::custom(format!(
                "{} is past the end of the day, use 23:59",
                raw
            )));
        }
        parse(&raw).ok_or_else(|| D::Error::custom(format!("invalid time of day: {}", raw)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    #[serde(with = "hhmm")]
    pub start: NaiveTime,
    #[serde(with = "hhmm")]
    pub end: NaiveTime,
}

impl TimeRange {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    pub fn is_valid(&self) -> bool {
        self.start < self.end
    }
}

/// One open day of a working plan: `[start, end)` minus its breaks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingDay {
    #[serde(with = "hhmm")]
    pub start: NaiveTime,
    #[serde(with = "hhmm")]
    pub end: NaiveTime,
    #[serde(default)]
    pub breaks: Vec<TimeRange>,
}

impl WorkingDay {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end, breaks: Vec::new() }
    }

    pub fn with_break(mut self, start: NaiveTime, end: NaiveTime) -> Self {
        self.breaks.push(TimeRange::new(start, end));
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.start >= self.end {
            return Err(format!(
                "working day must start before it ends ({} >= {})",
                self.start.format("%H:%M"),
                self.end.format("%H:%M")
            ));
        }
        for range in &self.breaks {
            if !range.is_valid() {
                return Err(format!(
                    "break {}-{} is empty or reversed",
                    range.start.format("%H:%M"),
                    range.end.format("%H:%M")
                ));
            }
        }
        Ok(())
    }
}

/// Recurring weekly template; `None` marks the weekday as closed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyPlan {
    pub monday: Option<WorkingDay>,
    pub tuesday: Option<WorkingDay>,
    pub wednesday: Option<WorkingDay>,
    pub thursday: Option<WorkingDay>,
    pub friday: Option<WorkingDay>,
    pub saturday: Option<WorkingDay>,
    pub sunday: Option<WorkingDay>,
}

impl WeeklyPlan {
    /// Same working day on Monday through Friday, weekend closed.
    pub fn weekdays(day: WorkingDay) -> Self {
        Self {
            monday: Some(day.clone()),
            tuesday: Some(day.clone()),
            wednesday: Some(day.clone()),
            thursday: Some(day.clone()),
            friday: Some(day),
            saturday: None,
            sunday: None,
        }
    }

    pub fn day(&self, weekday: Weekday) -> Option<&WorkingDay> {
        match weekday {
            Weekday::Mon => self.monday.as_ref(),
            Weekday::Tue => self.tuesday.as_ref(),
            Weekday::Wed => self.wednesday.as_ref(),
            Weekday::Thu => self.thursday.as_ref(),
            Weekday::Fri => self.friday.as_ref(),
            Weekday::Sat => self.saturday.as_ref(),
            Weekday::Sun => self.sunday.as_ref(),
        }
    }
}

/// Date-specific override; `plan: None` closes the provider for that date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingPlanException {
    pub provider_id: Uuid,
    pub date: NaiveDate,
    pub plan: Option<WorkingDay>,
}

// ==============================================================================
// CATALOGUE
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provider {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub timezone: String,
    #[serde(default)]
    pub services: Vec<Uuid>,
    pub working_plan: WeeklyPlan,
}

impl Provider {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn provides(&self, service_id: Uuid) -> bool {
        self.services.contains(&service_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Speciality {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub id: Uuid,
    pub name: String,
    pub speciality_id: Option<Uuid>,
    pub duration_minutes: i64,
}

// ==============================================================================
// LEDGER
// ==============================================================================

/// Booked appointment. Timestamps are wall-clock values in the provider's timezone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub service_id: Uuid,
    pub customer_id: Uuid,
    pub start_datetime: NaiveDateTime,
    pub end_datetime: NaiveDateTime,
    pub notes: Option<String>,
    pub book_datetime: DateTime<Utc>,
    pub hash: String,
    pub municipality: Option<String>,
    pub medical_center: Option<String>,
}

impl Appointment {
    pub fn overlaps(&self, start: NaiveDateTime, end: NaiveDateTime) -> bool {
        self.start_datetime < end && start < self.end_datetime
    }
}

/// Provider-declared time off.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnavailabilityBlock {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub start_datetime: NaiveDateTime,
    pub end_datetime: NaiveDateTime,
    pub notes: Option<String>,
}

impl UnavailabilityBlock {
    pub fn overlaps(&self, start: NaiveDateTime, end: NaiveDateTime) -> bool {
        self.start_datetime < end && start < self.end_datetime
    }
}

// ==============================================================================
// PATIENTS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: Uuid,
    pub ci: String,
    pub complement: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub clinical_story: Option<String>,
    pub email: Option<String>,
    pub phone_number: Option<String>,
}

impl Customer {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Row of the external clinical registry. Identifiers may carry formatting noise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClinicalRecord {
    #[serde(alias = "HCL_NUMCI")]
    pub ci: String,
    #[serde(default, alias = "HCL_COMPLEMENTO")]
    pub complement: Option<String>,
    #[serde(alias = "HCL_NOMBRE")]
    pub first_name: String,
    #[serde(alias = "HCL_APPAT")]
    pub paternal_surname: String,
    #[serde(default, alias = "HCL_APMAT")]
    pub maternal_surname: String,
    #[serde(alias = "HCL_CODIGO")]
    pub clinical_story_code: String,
}

impl ClinicalRecord {
    pub fn last_name(&self) -> String {
        format!("{} {}", self.paternal_surname, self.maternal_surname)
            .trim()
            .to_string()
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name())
    }
}
