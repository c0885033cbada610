//! Assignment storage for the study redirector.
//!
//! Fingerprints request parameters and persists one destination per
//! fingerprint, safely across threads and processes.

mod assignment_store;
mod fingerprint;

pub use assignment_store::AssignmentStore;
pub use fingerprint::{canonical_bytes, compute_fingerprint, Fingerprint, ParameterSet};
