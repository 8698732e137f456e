pub mod booking;
pub mod challenge;
pub mod guard;
pub mod reference;
pub mod reports;

pub use booking::{BookingMode, BookingTransaction};
pub use challenge::ChallengeVerifier;
pub use guard::ConflictGuard;
pub use reports::ReportService;
