//! Common infrastructure for mock sensors.
//!
//! - **errors**: failure injection for port operations
//! - **rng**: seeded random number generator

pub mod errors;
pub mod rng;

pub use errors::{ErrorConfig, ErrorScenario};
pub use rng::MockRng;
