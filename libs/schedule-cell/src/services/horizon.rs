use std::sync::Arc;

use chrono::NaiveDate;
use tracing::debug;
use uuid::Uuid;

use shared_database::SchedulingStore;
use shared_models::scheduling::DateRange;

use crate::models::{ScheduleError, UnavailableDates};
use crate::services::slots::{service_duration, slots_for_day, SlotCalculator, SlotOptions};
use crate::services::working_plan::WorkingPlanService;

/// Classifies the dates of a range as bookable or fully unavailable.
pub struct AvailabilityHorizonScanner {
    calculator: SlotCalculator,
    plans: WorkingPlanService,
}

impl AvailabilityHorizonScanner {
    pub fn new(store: Arc<dyn SchedulingStore>) -> Self {
        Self {
            calculator: SlotCalculator::new(store.clone()),
            plans: WorkingPlanService::new(store),
        }
    }

    /// Dates of `range` without a single bookable slot. Dates before `today`
    /// are always unavailable.
    pub async fn compute_unavailable_dates(
        &self,
        provider_id: Uuid,
        service_id: Uuid,
        range: DateRange,
        options: &SlotOptions,
        today: NaiveDate,
    ) -> Result<UnavailableDates, ScheduleError> {
        let (_, service) = self.calculator.load_request(provider_id, service_id).await?;
        let duration = service_duration(&service)?;

        let days = self.plans.effective_days(provider_id, range).await?;
        let busy = self
            .calculator
            .busy_in_range(provider_id, range, options.exclude_appointment_id)
            .await?;

        let mut dates = Vec::new();
        let mut first_available = None;
        for (date, day) in &days {
            let bookable = *date >= today
                && !slots_for_day(*date, day.as_ref(), &busy, duration, options)?.is_empty();
            if bookable {
                first_available.get_or_insert(*date);
            } else {
                dates.push(*date);
            }
        }

        debug!(
            "Provider {} has {} unavailable dates between {} and {}",
            provider_id,
            dates.len(),
            range.start,
            range.end
        );

        Ok(UnavailableDates {
            fully_booked: dates.len() == range.day_count(),
            dates,
            first_available,
        })
    }
}
