use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Datelike, NaiveDate};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_database::{SchedulingStore, StoreError};
use shared_models::scheduling::{
    Appointment, DateRange, WeeklyPlan, WorkingDay, WorkingPlanException,
};

use crate::interval::{Interval, IntervalSet};
use crate::models::{ExceptionOutcome, ScheduleError};

/// Effective working day for `date`: the date's exception when one exists
/// (including a closed one), the weekly template otherwise.
pub fn resolve_day(
    plan: &WeeklyPlan,
    exceptions: &[WorkingPlanException],
    date: NaiveDate,
) -> Option<WorkingDay> {
    match exceptions.iter().find(|exception| exception.date == date) {
        Some(exception) => exception.plan.clone(),
        None => plan.day(date.weekday()).cloned(),
    }
}

/// Open hours of `day` on `date` with its breaks carved out.
pub fn working_intervals(date: NaiveDate, day: &WorkingDay) -> IntervalSet {
    let mut intervals = match Interval::new(date.and_time(day.start), date.and_time(day.end)) {
        Some(open) => IntervalSet::single(open),
        None => return IntervalSet::new(),
    };

    let breaks: Vec<Interval> = day
        .breaks
        .iter()
        .filter_map(|range| Interval::new(date.and_time(range.start), date.and_time(range.end)))
        .collect();
    intervals.subtract_all(&breaks);
    intervals
}

pub struct WorkingPlanService {
    store: Arc<dyn SchedulingStore>,
}

impl WorkingPlanService {
    pub fn new(store: Arc<dyn SchedulingStore>) -> Self {
        Self { store }
    }

    async fn weekly_plan(&self, provider_id: Uuid) -> Result<WeeklyPlan, ScheduleError> {
        self.store
            .get_working_plan(provider_id)
            .await
            .map_err(|err| match err {
                StoreError::NotFound(_) => ScheduleError::ProviderNotFound,
                other => other.into(),
            })
    }

    pub async fn effective_day(
        &self,
        provider_id: Uuid,
        date: NaiveDate,
    ) -> Result<Option<WorkingDay>, ScheduleError> {
        let plan = self.weekly_plan(provider_id).await?;
        let exceptions = self
            .store
            .get_exceptions(provider_id, DateRange::single(date))
            .await?;
        Ok(resolve_day(&plan, &exceptions, date))
    }

    /// Effective working day of every date in `range`, loaded with one query per table.
    pub async fn effective_days(
        &self,
        provider_id: Uuid,
        range: DateRange,
    ) -> Result<BTreeMap<NaiveDate, Option<WorkingDay>>, ScheduleError> {
        let plan = self.weekly_plan(provider_id).await?;
        let exceptions = self.store.get_exceptions(provider_id, range).await?;
        debug!(
            "Resolved {} exceptions for provider {} between {} and {}",
            exceptions.len(),
            provider_id,
            range.start,
            range.end
        );

        Ok(range
            .days()
            .map(|date| (date, resolve_day(&plan, &exceptions, date)))
            .collect())
    }

    /// Replaces the provider's schedule for `date` (`None` closes it).
    ///
    /// Appointments already booked on that date are never touched; the ones
    /// no longer inside the new working hours are returned for an operator.
    pub async fn set_exception(
        &self,
        provider_id: Uuid,
        date: NaiveDate,
        plan: Option<WorkingDay>,
    ) -> Result<ExceptionOutcome, ScheduleError> {
        if let Some(day) = &plan {
            day.validate().map_err(ScheduleError::InvalidInterval)?;
        }
        self.weekly_plan(provider_id).await?;

        self.store
            .upsert_exception(WorkingPlanException {
                provider_id,
                date,
                plan: plan.clone(),
            })
            .await?;
        info!("Exception set for provider {} on {}", provider_id, date);

        let open = plan
            .as_ref()
            .map(|day| working_intervals(date, day))
            .unwrap_or_default();
        let appointments = self
            .store
            .get_appointments(provider_id, DateRange::single(date), None)
            .await?;
        let inconsistent = outside_working_hours(&open, appointments);

        for appointment in &inconsistent {
            warn!(
                "Appointment {} ({} - {}) is outside the new working hours of provider {}",
                appointment.id, appointment.start_datetime, appointment.end_datetime, provider_id
            );
        }

        Ok(ExceptionOutcome {
            provider_id,
            date,
            plan,
            inconsistent_appointments: inconsistent,
        })
    }

    /// Reverts `date` to the weekly template. Clearing a date without an exception is a no-op.
    pub async fn clear_exception(
        &self,
        provider_id: Uuid,
        date: NaiveDate,
    ) -> Result<(), ScheduleError> {
        self.weekly_plan(provider_id).await?;
        match self.store.delete_exception(provider_id, date).await {
            Ok(()) | Err(StoreError::NotFound(_)) => {
                info!("Exception cleared for provider {} on {}", provider_id, date);
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }
}

fn outside_working_hours(open: &IntervalSet, appointments: Vec<Appointment>) -> Vec<Appointment> {
    appointments
        .into_iter()
        .filter(|appointment| !open.fits(appointment.start_datetime, appointment.end_datetime))
        .collect()
}
