//! Error types for catalog loading, study selection and assignment storage.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// The studies file cannot be used at all.
///
/// Per-entry problems are not reported here; they are collected into
/// [`CatalogParseResult::errors`](crate::studies::CatalogParseResult).
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Cannot read studies file: {0}")]
    Unreadable(#[source] io::Error),
    #[error("Invalid TOML: {0}")]
    InvalidToml(String),
    #[error("Missing required key 'studies'")]
    MissingStudies,
    #[error("'studies' must be an array")]
    StudiesNotArray,
}

/// Every known study has zero weight.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectionError {
    #[error("No eligible studies with positive weight")]
    NoEligibleStudies,
}

/// Filesystem failure in the assignment store, with the path involved.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cannot encode parameter set: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("cannot create storage root {path}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },
    #[error("cannot open assignment record {path}: {source}")]
    Open { path: PathBuf, source: io::Error },
    #[error("cannot lock assignment record {path}: {source}")]
    Lock { path: PathBuf, source: io::Error },
    #[error("cannot read assignment record {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("cannot write assignment record {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
}

/// Failure of a single redirect request.
#[derive(Debug, Error)]
pub enum RedirectError {
    /// The caller sent no parameters; maps to a client error, not a fault.
    #[error("No parameters specified")]
    NoParams,
    #[error(transparent)]
    Selection(#[from] SelectionError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("invalid study URL: {0}")]
    InvalidStudyUrl(#[from] url::ParseError),
    #[error("redirect task failed: {0}")]
    Task(String),
}

impl RedirectError {
    /// Returns true when the failure is the caller's fault.
    pub fn is_client_error(&self) -> bool {
        matches!(self, RedirectError::NoParams)
    }
}
