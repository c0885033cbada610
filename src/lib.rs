//! Study roulette: a deterministic weighted redirector.
//!
//! Visitors are sent to one of several weighted studies. The first request
//! with a given set of query parameters picks a study at random; every later
//! request with the same parameters is sent to the same place.
//!
//! - **`studies`**: TOML catalog parsing with partial success, and weighted
//!   random selection.
//! - **`store`**: parameter fingerprints and the file-locked assignment store.
//! - **`redirect`**: URL merging and the request-time catalog/storage view.
//! - **`server`**: the hyper HTTP layer (`/health`, `/`, `/sr`).
//! - **`config`**: settings from flags and environment variables.

pub mod config;
pub mod error;
pub mod redirect;
pub mod server;
pub mod store;
pub mod studies;
