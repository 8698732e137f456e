use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use tracing::debug;
use uuid::Uuid;

use shared_database::SchedulingStore;
use shared_models::scheduling::{
    Appointment, DateRange, Provider, Service, UnavailabilityBlock, WorkingDay,
};

use crate::interval::{Interval, IntervalSet};
use crate::models::ScheduleError;
use crate::services::working_plan::{working_intervals, WorkingPlanService};

pub const DEFAULT_GRANULARITY_MINUTES: i64 = 10;

/// Per-request knobs of the slot calculation. Nothing here is ambient state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotOptions {
    /// Appointment being rescheduled; its own interval counts as free.
    pub exclude_appointment_id: Option<Uuid>,
    /// Candidates starting before this provider-local instant are dropped.
    pub not_before: Option<NaiveDateTime>,
    /// Step between candidate start times, independent of the service duration.
    pub granularity_minutes: i64,
}

impl Default for SlotOptions {
    fn default() -> Self {
        Self {
            exclude_appointment_id: None,
            not_before: None,
            granularity_minutes: DEFAULT_GRANULARITY_MINUTES,
        }
    }
}

impl SlotOptions {
    pub fn with_granularity(granularity_minutes: i64) -> Self {
        Self {
            granularity_minutes,
            ..Self::default()
        }
    }

    pub fn excluding(mut self, appointment_id: Option<Uuid>) -> Self {
        self.exclude_appointment_id = appointment_id;
        self
    }

    pub fn not_before(mut self, instant: Option<NaiveDateTime>) -> Self {
        self.not_before = instant;
        self
    }

    fn step(&self) -> Result<Duration, ScheduleError> {
        if self.granularity_minutes <= 0 {
            return Err(ScheduleError::InvalidInterval(format!(
                "slot granularity must be positive, got {} minutes",
                self.granularity_minutes
            )));
        }
        Ok(Duration::minutes(self.granularity_minutes))
    }
}

pub fn service_duration(service: &Service) -> Result<Duration, ScheduleError> {
    if service.duration_minutes <= 0 {
        return Err(ScheduleError::InvalidInterval(format!(
            "service {} has a non-positive duration of {} minutes",
            service.id, service.duration_minutes
        )));
    }
    Ok(Duration::minutes(service.duration_minutes))
}

/// Appointments and unavailability blocks as busy intervals.
pub fn busy_intervals(
    appointments: &[Appointment],
    blocks: &[UnavailabilityBlock],
) -> Vec<Interval> {
    appointments
        .iter()
        .filter_map(|appointment| Interval::new(appointment.start_datetime, appointment.end_datetime))
        .chain(
            blocks
                .iter()
                .filter_map(|block| Interval::new(block.start_datetime, block.end_datetime)),
        )
        .collect()
}

/// Working hours of `date` minus every busy interval. A closed day has no free time.
pub fn free_periods(date: NaiveDate, day: Option<&WorkingDay>, busy: &[Interval]) -> IntervalSet {
    match day {
        Some(day) => {
            let mut free = working_intervals(date, day);
            free.subtract_all(busy);
            free
        }
        None => IntervalSet::new(),
    }
}

/// Start times stepping from the beginning of each free period such that the
/// whole service fits inside that period. Ascending.
pub fn enumerate_slots(free: &IntervalSet, duration: Duration, step: Duration) -> Vec<NaiveDateTime> {
    let mut slots = Vec::new();
    for period in free {
        let mut candidate = period.start();
        while candidate + duration <= period.end() {
            slots.push(candidate);
            candidate += step;
        }
    }
    slots
}

/// Bookable start times of one day.
pub fn slots_for_day(
    date: NaiveDate,
    day: Option<&WorkingDay>,
    busy: &[Interval],
    duration: Duration,
    options: &SlotOptions,
) -> Result<Vec<NaiveDateTime>, ScheduleError> {
    let step = options.step()?;
    let free = free_periods(date, day, busy);

    Ok(enumerate_slots(&free, duration, step)
        .into_iter()
        .filter(|start| options.not_before.map_or(true, |limit| *start >= limit))
        .collect())
}

/// Computes bookable start times for a provider, service and date.
///
/// All arithmetic happens on the provider's wall clock; converting results to
/// a viewer's timezone is left to the caller.
pub struct SlotCalculator {
    store: Arc<dyn SchedulingStore>,
    plans: WorkingPlanService,
}

impl SlotCalculator {
    pub fn new(store: Arc<dyn SchedulingStore>) -> Self {
        Self {
            plans: WorkingPlanService::new(store.clone()),
            store,
        }
    }

    /// Provider and service of a request, checking that the provider delivers the service.
    pub async fn load_request(
        &self,
        provider_id: Uuid,
        service_id: Uuid,
    ) -> Result<(Provider, Service), ScheduleError> {
        let service = self
            .store
            .get_service(service_id)
            .await?
            .ok_or(ScheduleError::ServiceNotFound)?;
        let provider = self
            .store
            .get_provider(provider_id)
            .await?
            .ok_or(ScheduleError::ProviderNotFound)?;

        if !provider.provides(service.id) {
            return Err(ScheduleError::Validation(format!(
                "provider {} does not deliver service {}",
                provider.id, service.id
            )));
        }
        Ok((provider, service))
    }

    /// Busy intervals of the provider over `range`, minus the excluded appointment.
    pub async fn busy_in_range(
        &self,
        provider_id: Uuid,
        range: DateRange,
        exclude_appointment_id: Option<Uuid>,
    ) -> Result<Vec<Interval>, ScheduleError> {
        let appointments = self
            .store
            .get_appointments(provider_id, range, exclude_appointment_id)
            .await?;
        let blocks = self.store.get_unavailability_blocks(provider_id, range).await?;
        Ok(busy_intervals(&appointments, &blocks))
    }

    pub async fn compute_available_slots(
        &self,
        provider_id: Uuid,
        service_id: Uuid,
        date: NaiveDate,
        options: &SlotOptions,
    ) -> Result<Vec<NaiveDateTime>, ScheduleError> {
        let (_, service) = self.load_request(provider_id, service_id).await?;
        let duration = service_duration(&service)?;

        let day = self.plans.effective_day(provider_id, date).await?;
        let busy = self
            .busy_in_range(provider_id, DateRange::single(date), options.exclude_appointment_id)
            .await?;

        let slots = slots_for_day(date, day.as_ref(), &busy, duration, options)?;
        debug!(
            "Provider {} has {} slots for service {} on {}",
            provider_id,
            slots.len(),
            service_id,
            date
        );
        Ok(slots)
    }

    /// True when a booking of the service starting at `start` fits in free time.
    ///
    /// Unlike the offered grid, any start minute is accepted as long as the
    /// whole service fits inside one free period.
    pub async fn is_slot_available(
        &self,
        provider_id: Uuid,
        service_id: Uuid,
        start: NaiveDateTime,
        options: &SlotOptions,
    ) -> Result<bool, ScheduleError> {
        let (_, service) = self.load_request(provider_id, service_id).await?;
        let duration = service_duration(&service)?;
        if options.not_before.is_some_and(|limit| start < limit) {
            return Ok(false);
        }

        let date = start.date();
        let day = self.plans.effective_day(provider_id, date).await?;
        let busy = self
            .busy_in_range(provider_id, DateRange::single(date), options.exclude_appointment_id)
            .await?;

        Ok(free_periods(date, day.as_ref(), &busy).fits(start, start + duration))
    }
}
