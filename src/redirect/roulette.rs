//! Request-time view of the redirector: catalog, storage and their health.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use crate::error::{RedirectError, StoreError};
use crate::store::{AssignmentStore, ParameterSet};
use crate::studies::{parse_studies_file, scale_to_max, Study};

/// Overall health of the redirector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Error,
}

/// Catalog and storage state, checked once per request.
///
/// Building never fails: every problem lands in `errors`, and whatever
/// studies could be parsed stay usable.
#[derive(Clone)]
pub struct StudyRoulette {
    status: HealthStatus,
    errors: Vec<String>,
    studies: Vec<Study>,
    store: Arc<AssignmentStore>,
}

/// Serializable health report.
#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub errors: Vec<String>,
    pub studies: Vec<StudyInfo>,
}

#[derive(Debug, Serialize)]
pub struct StudyInfo {
    pub url: String,
    pub weight: f64,
    pub percent: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl StudyRoulette {
    /// Checks the storage root and reads the studies file.
    pub fn build_and_check(store: Arc<AssignmentStore>, studies_file: &Path) -> Self {
        tracing::debug!(
            lookup_dir = %store.root().display(),
            studies_file = %studies_file.display(),
            "building study roulette"
        );

        let mut errors = Vec::new();
        let mut studies = Vec::new();

        if let Err(e) = store.check_access() {
            errors.push(match e {
                StoreError::CreateDir { source, .. } => format!("Cannot create LOOKUP_DIR: {}", source),
                other => format!("Cannot read/write in LOOKUP_DIR: {}", other),
            });
        }

        if !studies_file.exists() {
            errors.push(format!("STUDIES_FILE does not exist: {}", studies_file.display()));
        } else {
            match parse_studies_file(studies_file) {
                Ok(result) => {
                    studies = result.studies;
                    errors.extend(result.errors);
                }
                Err(e) => errors.push(e.to_string()),
            }
        }

        let status = if errors.is_empty() {
            HealthStatus::Ok
        } else {
            HealthStatus::Error
        };

        if errors.is_empty() {
            tracing::debug!(studies = studies.len(), "study roulette ready");
        } else {
            tracing::debug!(?errors, "study roulette found errors");
        }

        Self {
            status,
            errors,
            studies,
            store,
        }
    }

    pub fn status(&self) -> HealthStatus {
        self.status
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn studies(&self) -> &[Study] {
        &self.studies
    }

    pub fn has_eligible_studies(&self) -> bool {
        self.studies.iter().any(Study::is_eligible)
    }

    /// Returns the pinned destination for `params`, assigning one if new.
    pub fn get_or_create_redirect(&self, params: &ParameterSet) -> Result<String, RedirectError> {
        if params.is_empty() {
            return Err(RedirectError::NoParams);
        }
        self.store.get_or_create(&self.studies, params)
    }

    /// Returns a copy marked unhealthy with `error` appended.
    pub fn with_error(&self, error: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.errors.push(error.into());
        next.status = HealthStatus::Error;
        next
    }

    pub fn report(&self) -> HealthReport {
        let scaled = scale_to_max(self.studies.iter().map(|s| s.weight));
        let total: f64 = scaled.iter().sum();
        HealthReport {
            status: self.status,
            errors: self.errors.clone(),
            studies: self
                .studies
                .iter()
                .zip(&scaled)
                .map(|(s, &w)| StudyInfo {
                    url: s.url.clone(),
                    weight: s.weight,
                    percent: percent_of(w, total),
                    note: s.note.clone(),
                })
                .collect(),
        }
    }
}

/// Share of `total`, as a percentage rounded to two decimals.
fn percent_of(weight: f64, total: f64) -> f64 {
    if total > 0.0 {
        (10_000.0 * weight / total).round() / 100.0
    } else {
        0.0
    }
}

/// Locations the redirector reads from and writes to.
pub struct AppState {
    pub store: Arc<AssignmentStore>,
    pub studies_file: PathBuf,
}

impl AppState {
    pub fn new(lookup_dir: impl Into<PathBuf>, studies_file: impl Into<PathBuf>) -> Self {
        Self {
            store: Arc::new(AssignmentStore::new(lookup_dir)),
            studies_file: studies_file.into(),
        }
    }

    pub fn roulette(&self) -> StudyRoulette {
        StudyRoulette::build_and_check(Arc::clone(&self.store), &self.studies_file)
    }
}
