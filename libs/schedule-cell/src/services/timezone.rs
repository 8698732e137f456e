use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::models::ScheduleError;

pub fn parse_timezone(name: &str) -> Result<Tz, ScheduleError> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| ScheduleError::Validation(format!("unknown timezone: {}", name)))
}

/// Provider timezone, or `fallback` when the stored name is not a valid IANA zone.
pub fn provider_timezone(name: &str, fallback: &str) -> Tz {
    parse_timezone(name)
        .or_else(|_| parse_timezone(fallback))
        .unwrap_or(Tz::UTC)
}

/// Wall-clock time in `tz` at `now`.
pub fn local_now(tz: Tz, now: DateTime<Utc>) -> NaiveDateTime {
    now.with_timezone(&tz).naive_local()
}

/// Re-expresses a wall-clock value of `from` on the clock of `to`.
///
/// Ambiguous local times resolve to the earliest instant; times skipped by a
/// DST jump are returned unchanged.
pub fn convert_wall_clock(local: NaiveDateTime, from: Tz, to: Tz) -> NaiveDateTime {
    match from.from_local_datetime(&local).earliest() {
        Some(instant) => instant.with_timezone(&to).naive_local(),
        None => local,
    }
}
