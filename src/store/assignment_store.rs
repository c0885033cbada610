//! Persistent fingerprint → destination assignments.
//!
//! Each fingerprint owns one record file under the storage root. The record
//! is written once, under an exclusive advisory lock, and read back verbatim
//! on every later request with the same parameters.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use fs2::FileExt;
use parking_lot::Mutex;

use crate::error::{RedirectError, StoreError};
use crate::redirect::merge_urls;
use crate::studies::{choose_study, Study};

use super::fingerprint::{compute_fingerprint, Fingerprint, ParameterSet};

const HEALTH_PROBE: &str = ".health_check";

/// File-backed assignment store.
///
/// Thread-safe. Threads of one process queue on an in-memory mutex per
/// fingerprint; across processes the record's file lock decides.
pub struct AssignmentStore {
    root: PathBuf,
    in_flight: DashMap<String, Arc<Mutex<()>>>,
}

impl AssignmentStore {
    /// Creates a store rooted at `root`. Nothing touches the disk until use.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            in_flight: DashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the record file for a fingerprint.
    pub fn record_path(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.root.join(fingerprint.as_str())
    }

    /// Returns the stored destination for `params`, creating it on first use.
    ///
    /// At most one selection ever happens per fingerprint. A caller that
    /// waited on the lock while another wrote the record gets that record.
    pub fn get_or_create(
        &self,
        studies: &[Study],
        params: &ParameterSet,
    ) -> Result<String, RedirectError> {
        let fingerprint = compute_fingerprint(params).map_err(StoreError::Encode)?;
        self.ensure_root()?;

        let slot = self.slot(&fingerprint);
        let result = {
            let _local = slot.lock();
            self.assign_locked(&fingerprint, studies, params)
        };
        drop(slot);
        self.release_slot(&fingerprint);

        result
    }

    /// Returns the stored destination for `params` without creating one.
    pub fn lookup(&self, params: &ParameterSet) -> Result<Option<String>, StoreError> {
        let path = self.record_path(&compute_fingerprint(params).map_err(StoreError::Encode)?);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StoreError::Open { path, source }),
        };

        let _guard = RecordLock::acquire(&file, &path)?;
        let content = read_record(&file, &path)?;
        Ok((!content.is_empty()).then_some(content))
    }

    /// Checks that the storage root exists (creating it if missing) and
    /// that files can be written, read and removed inside it.
    pub fn check_access(&self) -> Result<(), StoreError> {
        self.ensure_root()?;

        // Unique name per call so concurrent checks never remove each other's file
        let mut probe = tempfile::Builder::new()
            .prefix(HEALTH_PROBE)
            .tempfile_in(&self.root)
            .map_err(|source| StoreError::Write {
                path: self.root.join(HEALTH_PROBE),
                source,
            })?;
        let path = probe.path().to_path_buf();

        probe
            .as_file_mut()
            .write_all(b"test")
            .map_err(|source| StoreError::Write {
                path: path.clone(),
                source,
            })?;
        fs::read(&path).map_err(|source| StoreError::Read {
            path: path.clone(),
            source,
        })?;
        probe.close().map_err(|source| StoreError::Write { path, source })?;
        Ok(())
    }

    fn ensure_root(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.root).map_err(|source| StoreError::CreateDir {
            path: self.root.clone(),
            source,
        })
    }

    /// Read-check-write on one record, holding its file lock throughout.
    fn assign_locked(
        &self,
        fingerprint: &Fingerprint,
        studies: &[Study],
        params: &ParameterSet,
    ) -> Result<String, RedirectError> {
        let path = self.record_path(fingerprint);
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)
            .map_err(|source| StoreError::Open {
                path: path.clone(),
                source,
            })?;

        let _guard = RecordLock::acquire(&file, &path)?;

        let cached = read_record(&file, &path)?;
        if !cached.is_empty() {
            tracing::debug!(fingerprint = %fingerprint, destination = %cached, "assignment cache hit");
            return Ok(cached);
        }

        let study = choose_study(studies)?;
        let destination = merge_urls(&study.url, params)?;

        let mut writer = &file;
        writer
            .write_all(format!("{}\n", destination).as_bytes())
            .and_then(|_| file.sync_all())
            .map_err(|source| StoreError::Write {
                path: path.clone(),
                source,
            })?;

        tracing::debug!(
            fingerprint = %fingerprint,
            study = %study.url,
            destination = %destination,
            "assignment created"
        );

        Ok(destination)
    }

    fn slot(&self, fingerprint: &Fingerprint) -> Arc<Mutex<()>> {
        self.in_flight
            .entry(fingerprint.as_str().to_string())
            .or_default()
            .clone()
    }

    /// Drops the in-memory slot once no other caller is holding it.
    fn release_slot(&self, fingerprint: &Fingerprint) {
        self.in_flight
            .remove_if(fingerprint.as_str(), |_, slot| Arc::strong_count(slot) == 1);
    }

    #[cfg(test)]
    fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }
}

/// Exclusive advisory lock on a record file, released on drop.
struct RecordLock<'a> {
    file: &'a File,
    path: &'a Path,
}

impl<'a> RecordLock<'a> {
    fn acquire(file: &'a File, path: &'a Path) -> Result<Self, StoreError> {
        FileExt::lock_exclusive(file).map_err(|source| StoreError::Lock {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self { file, path })
    }
}

impl Drop for RecordLock<'_> {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(self.file) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to unlock assignment record");
        }
    }
}

fn read_record(mut file: &File, path: &Path) -> Result<String, StoreError> {
    let mut content = String::new();
    file.seek(SeekFrom::Start(0))
        .and_then(|_| file.read_to_string(&mut content))
        .map_err(|source| StoreError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(content.trim().to_string())
}
