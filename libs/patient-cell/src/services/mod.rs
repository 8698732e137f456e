pub mod identifier;
pub mod registry;

pub use identifier::{canonical_ci, canonical_complement, PatientIdentity};
pub use registry::PatientService;
