pub mod horizon;
pub mod slots;
pub mod timezone;
pub mod unavailability;
pub mod working_plan;

pub use horizon::AvailabilityHorizonScanner;
pub use slots::{SlotCalculator, SlotOptions};
pub use unavailability::UnavailabilityService;
pub use working_plan::WorkingPlanService;
