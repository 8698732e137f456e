pub mod handlers;
pub mod interval;
pub mod models;
pub mod router;
pub mod services;

pub use interval::{Interval, IntervalSet};
pub use models::*;
pub use services::*;
