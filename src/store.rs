//! Encrypted per-patient record store.
//!
//! Each patient owns one container file under the store root, named by the
//! SHA-256 of the patient id. The container holds the whole entry sequence,
//! encrypted with AES-256-GCM. Appends rewrite the container through a
//! temp file + rename, so a reader sees either the old or the new sequence.
//!
//! Appends to the same patient serialize on a per-patient async mutex,
//! held until the rename completes. Different patients never share a lock,
//! and a patient's lock entry is dropped once no append holds or awaits it.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::crypto::{CryptoError, EncryptedData, StoreKey};
use crate::models::RecordEntry;

const CONTAINER_EXTENSION: &str = "rec";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Record data failed integrity check: {0}")]
    DataIntegrity(String),

    #[error("Record persistence failed: {0}")]
    Persistence(#[from] std::io::Error),

    #[error("Record serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Refusing to append an entry without vitals")]
    EmptyVitals,

    #[error("Patient id must not be empty")]
    InvalidPatientId,
}

impl From<CryptoError> for StoreError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::EncryptionFailed => StoreError::Persistence(std::io::Error::other(e)),
            other => StoreError::DataIntegrity(other.to_string()),
        }
    }
}

/// Plaintext layout of one container.
#[derive(Debug, Serialize, Deserialize)]
struct PatientContainer {
    patient_id: String,
    entries: Vec<RecordEntry>,
}

pub struct EncryptedRecordStore {
    root: PathBuf,
    key: Arc<StoreKey>,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl EncryptedRecordStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>, key: Arc<StoreKey>) -> Result<Self, StoreError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        tracing::debug!(root = %root.display(), "Record store opened");
        Ok(Self {
            root,
            key,
            locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Append one entry to a patient's history and return the new length.
    ///
    /// The first append for a patient creates the container. If the existing
    /// container cannot be decrypted the append fails and the file is left
    /// untouched.
    pub async fn append(&self, patient_id: &str, entry: RecordEntry) -> Result<usize, StoreError> {
        if patient_id.is_empty() {
            return Err(StoreError::InvalidPatientId);
        }
        if entry.vitals.is_empty() {
            return Err(StoreError::EmptyVitals);
        }

        let lock = self.key_lock(patient_id)?;
        let result = self.append_locked(&lock, patient_id, entry).await;
        self.release_lock(patient_id, &lock);
        result
    }

    async fn append_locked(
        &self,
        lock: &Arc<tokio::sync::Mutex<()>>,
        patient_id: &str,
        entry: RecordEntry,
    ) -> Result<usize, StoreError> {
        let guard = lock.clone().lock_owned().await;

        let path = self.container_path(patient_id);
        let mut container = match self.load(&path, patient_id).await? {
            Some(container) => container,
            None => PatientContainer {
                patient_id: patient_id.to_string(),
                entries: Vec::new(),
            },
        };
        container.entries.push(entry);
        let count = container.entries.len();

        let plaintext = serde_json::to_vec(&container)?;
        let encrypted = self.key.encrypt(&plaintext)?;
        let bytes = encrypted.to_bytes();

        let dir = self.root.clone();
        // Held until the rename lands, even if the caller is dropped.
        tokio::task::spawn_blocking(move || {
            let _guard = guard;
            write_atomic(&dir, &path, &bytes)
        })
        .await
            .map_err(std::io::Error::other)??;

        tracing::debug!(entries = count, "Patient record appended");
        Ok(count)
    }

    /// Read a patient's full history, oldest first. Unknown patients yield
    /// an empty list.
    pub async fn read(&self, patient_id: &str) -> Result<Vec<RecordEntry>, StoreError> {
        if patient_id.is_empty() {
            return Ok(Vec::new());
        }
        let path = self.container_path(patient_id);
        Ok(self
            .load(&path, patient_id)
            .await?
            .map(|c| c.entries)
            .unwrap_or_default())
    }

    async fn load(&self, path: &Path, patient_id: &str) -> Result<Option<PatientContainer>, StoreError> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::Persistence(e)),
        };

        let encrypted = EncryptedData::from_bytes(&bytes)?;
        let plaintext = self.key.decrypt(&encrypted)?;
        let container: PatientContainer = serde_json::from_slice(&plaintext)
            .map_err(|_| StoreError::DataIntegrity("undecodable container".into()))?;

        if container.patient_id != patient_id {
            tracing::error!(path = %path.display(), "Record container belongs to another patient");
            return Err(StoreError::DataIntegrity("container patient mismatch".into()));
        }
        Ok(Some(container))
    }

    fn container_path(&self, patient_id: &str) -> PathBuf {
        let digest = Sha256::digest(patient_id.as_bytes());
        let name: String = digest.iter().map(|b| format!("{b:02x}")).collect();
        self.root.join(format!("{name}.{CONTAINER_EXTENSION}"))
    }

    fn key_lock(&self, patient_id: &str) -> Result<Arc<tokio::sync::Mutex<()>>, StoreError> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| StoreError::Persistence(std::io::Error::other("lock table poisoned")))?;
        Ok(locks
            .entry(patient_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone())
    }

    /// Drop the lock entry when only the table and `lock` still reference it.
    fn release_lock(&self, patient_id: &str, lock: &Arc<tokio::sync::Mutex<()>>) {
        let Ok(mut locks) = self.locks.lock() else {
            return;
        };
        let idle = locks
            .get(patient_id)
            .is_some_and(|held| Arc::ptr_eq(held, lock) && Arc::strong_count(lock) == 2);
        if idle {
            locks.remove(patient_id);
        }
    }

    #[cfg(test)]
    fn lock_count(&self) -> usize {
        self.locks.lock().map(|l| l.len()).unwrap_or(0)
    }
}

/// Write `bytes` to a temp file in `dir`, fsync, then rename over `path`.
fn write_atomic(dir: &Path, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
