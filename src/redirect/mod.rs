//! Redirect resolution for incoming visitors.
//!
//! Combines the study catalog and the assignment store into the
//! request-time view used by the HTTP layer, and builds destination URLs
//! from a study URL plus the visitor's parameters.

mod merge;
mod roulette;

pub use merge::merge_urls;
pub use roulette::{AppState, HealthReport, HealthStatus, StudyInfo, StudyRoulette};
