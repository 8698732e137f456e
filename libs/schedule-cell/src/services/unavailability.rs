use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use shared_database::{SchedulingStore, StoreError};
use shared_models::scheduling::{DateRange, UnavailabilityBlock};

use crate::models::{SaveUnavailabilityRequest, ScheduleError, UnavailabilityOutcome};

/// Provider-declared time off.
pub struct UnavailabilityService {
    store: Arc<dyn SchedulingStore>,
}

impl UnavailabilityService {
    pub fn new(store: Arc<dyn SchedulingStore>) -> Self {
        Self { store }
    }

    /// Inserts or updates a block. Appointments it overlaps stay booked and are reported back.
    pub async fn save_block(
        &self,
        request: SaveUnavailabilityRequest,
    ) -> Result<UnavailabilityOutcome, ScheduleError> {
        if request.start_datetime >= request.end_datetime {
            return Err(ScheduleError::InvalidInterval(format!(
                "unavailability must start before it ends ({} >= {})",
                request.start_datetime, request.end_datetime
            )));
        }

        self.store
            .get_provider(request.provider_id)
            .await?
            .ok_or(ScheduleError::ProviderNotFound)?;

        let block = UnavailabilityBlock {
            id: request.id.unwrap_or_else(Uuid::new_v4),
            provider_id: request.provider_id,
            start_datetime: request.start_datetime,
            end_datetime: request.end_datetime,
            notes: request.notes,
        };
        let block = self.store.save_unavailability_block(block).await?;
        info!("Saved unavailability block {} for provider {}", block.id, block.provider_id);

        let range = DateRange::new(block.start_datetime.date(), block.end_datetime.date())
            .unwrap_or_else(|| DateRange::single(block.start_datetime.date()));
        let overlapping: Vec<_> = self
            .store
            .get_appointments(block.provider_id, range, None)
            .await?
            .into_iter()
            .filter(|appointment| appointment.overlaps(block.start_datetime, block.end_datetime))
            .collect();

        if !overlapping.is_empty() {
            warn!(
                "Unavailability block {} overlaps {} booked appointments",
                block.id,
                overlapping.len()
            );
        }

        Ok(UnavailabilityOutcome {
            block,
            overlapping_appointments: overlapping,
        })
    }

    pub async fn delete_block(&self, block_id: Uuid) -> Result<(), ScheduleError> {
        self.store
            .delete_unavailability_block(block_id)
            .await
            .map_err(|err| match err {
                StoreError::NotFound(_) => ScheduleError::BlockNotFound,
                other => other.into(),
            })?;
        info!("Deleted unavailability block {}", block_id);
        Ok(())
    }
}
