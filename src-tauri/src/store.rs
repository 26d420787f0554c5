//! Record stores.
//!
//! [`RecordStore`] is the persistence seam the submission flow and the table talk to.
//! Two implementations ship: [`MemoryStore`] for tests and sessions without a store
//! key, and [`EncryptedFileStore`], which keeps every record in one AES-256-GCM
//! envelope on disk.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::crypto::{self, CryptoEnvelope, CryptoError};
use crate::model::{NewRegistration, Registration};
use crate::storage::{read_text_file, write_text_file};

const STORE_VERSION: u8 = 1;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("registro {0} no encontrado")]
    NotFound(String),
    #[error("store i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("store data is unreadable: {0}")]
    Corrupt(String),
    #[error("store key does not open {0}")]
    WrongKey(PathBuf),
    #[error("store encryption failed: {0}")]
    Crypto(#[from] CryptoError),
    #[error("store is unavailable: {0}")]
    Unavailable(String),
}

/// Single-field equality lookup used by the duplicate check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordFilter {
    Id(String),
    NationalId(String),
    Phone(String),
}

impl RecordFilter {
    pub fn matches(&self, record: &Registration) -> bool {
        match self {
            RecordFilter::Id(id) => record.id == *id,
            RecordFilter::NationalId(value) => record.national_id.trim() == value.trim(),
            RecordFilter::Phone(value) => record.phone.trim() == value.trim(),
        }
    }
}

pub trait RecordStore: Send + Sync {
    /// Accepts a validated registration, assigning its id and timestamp.
    fn insert(&self, record: NewRegistration) -> Result<Registration, StoreError>;

    fn find_one(&self, filter: &RecordFilter) -> Result<Option<Registration>, StoreError>;

    /// Every record, newest first.
    fn select_all(&self) -> Result<Vec<Registration>, StoreError>;

    fn delete_by_id(&self, id: &str) -> Result<(), StoreError>;
}

fn finalize(record: NewRegistration) -> Registration {
    Registration::from_new(Uuid::new_v4().to_string(), Utc::now(), record)
}

fn newest_first(records: &[Registration]) -> Vec<Registration> {
    let mut out = records.to_vec();
    out.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    out
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, StoreError> {
    mutex
        .lock()
        .map_err(|_| StoreError::Unavailable("store lock poisoned".to_string()))
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<Vec<Registration>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<Registration>) -> Self {
        Self {
            records: Mutex::new(records),
        }
    }
}

impl RecordStore for MemoryStore {
    fn insert(&self, record: NewRegistration) -> Result<Registration, StoreError> {
        let record = finalize(record);
        lock(&self.records)?.insert(0, record.clone());
        Ok(record)
    }

    fn find_one(&self, filter: &RecordFilter) -> Result<Option<Registration>, StoreError> {
        Ok(lock(&self.records)?
            .iter()
            .find(|record| filter.matches(record))
            .cloned())
    }

    fn select_all(&self) -> Result<Vec<Registration>, StoreError> {
        Ok(newest_first(&lock(&self.records)?))
    }

    fn delete_by_id(&self, id: &str) -> Result<(), StoreError> {
        let mut records = lock(&self.records)?;
        let before = records.len();
        records.retain(|record| record.id != id);
        if records.len() == before {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct StoreFile {
    version: u8,
    #[serde(default)]
    records: Vec<Registration>,
}

/// On-disk form: the encrypted envelope plus the PBKDF2 iteration count its key was
/// derived with. Files without `iterations` take the count passed to `open`.
#[derive(Serialize, Deserialize)]
struct StoreEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    iterations: Option<u32>,
    #[serde(flatten)]
    envelope: CryptoEnvelope,
}

struct OpenedStore {
    salt: Vec<u8>,
    key: [u8; 32],
    iterations: u32,
    records: Vec<Registration>,
}

/// All records in one encrypted envelope. The key is derived once on open and kept in
/// memory; every mutation rewrites the whole file. `iterations` only applies to a new
/// file; an existing file is opened with the count recorded in it.
pub struct EncryptedFileStore {
    path: PathBuf,
    state: Mutex<OpenedStore>,
}

impl EncryptedFileStore {
    pub fn open(path: impl Into<PathBuf>, passphrase: &str, iterations: u32) -> Result<Self, StoreError> {
        let path = path.into();
        let state = match read_text_file(&path)? {
            None => {
                let iterations = iterations.max(1);
                let salt = crypto::random_salt().to_vec();
                let key = crypto::derive_key(passphrase, &salt, iterations);
                info!(path = %path.display(), iterations, "creating registration store");
                OpenedStore {
                    salt,
                    key,
                    iterations,
                    records: Vec::new(),
                }
            }
            Some(raw) => open_existing(&path, raw.as_str(), passphrase, iterations)?,
        };
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    fn persist(&self, state: &OpenedStore) -> Result<(), StoreError> {
        let file = StoreFile {
            version: STORE_VERSION,
            records: state.records.clone(),
        };
        let plaintext =
            serde_json::to_string(&file).map_err(|err| StoreError::Corrupt(err.to_string()))?;
        let envelope = StoreEnvelope {
            iterations: Some(state.iterations),
            envelope: crypto::encrypt_with_key(plaintext.as_str(), &state.salt, &state.key)?,
        };
        let content =
            serde_json::to_string(&envelope).map_err(|err| StoreError::Corrupt(err.to_string()))?;
        write_text_file(&self.path, content.as_str())?;
        debug!(records = state.records.len(), "registration store written");
        Ok(())
    }
}

fn open_existing(
    path: &Path,
    raw: &str,
    passphrase: &str,
    iterations: u32,
) -> Result<OpenedStore, StoreError> {
    let stored: StoreEnvelope =
        serde_json::from_str(raw).map_err(|err| StoreError::Corrupt(err.to_string()))?;
    let iterations = stored.iterations.unwrap_or(iterations).max(1);
    let salt = stored
        .envelope
        .salt_bytes()
        .ok_or_else(|| StoreError::Corrupt("missing salt".to_string()))?;
    let key = crypto::derive_key(passphrase, &salt, iterations);
    let Some(plaintext) = crypto::decrypt_with_key(&stored.envelope, &key) else {
        warn!(path = %path.display(), "store key rejected");
        return Err(StoreError::WrongKey(path.to_path_buf()));
    };
    let file: StoreFile =
        serde_json::from_str(plaintext.as_str()).map_err(|err| StoreError::Corrupt(err.to_string()))?;
    if file.version > STORE_VERSION {
        return Err(StoreError::Corrupt(format!(
            "unsupported store version {}",
            file.version
        )));
    }
    info!(path = %path.display(), records = file.records.len(), "registration store opened");
    Ok(OpenedStore {
        salt,
        key,
        iterations,
        records: file.records,
    })
}

impl RecordStore for EncryptedFileStore {
    fn insert(&self, record: NewRegistration) -> Result<Registration, StoreError> {
        let mut state = lock(&self.state)?;
        let record = finalize(record);
        state.records.insert(0, record.clone());
        if let Err(err) = self.persist(&state) {
            state.records.remove(0);
            return Err(err);
        }
        Ok(record)
    }

    fn find_one(&self, filter: &RecordFilter) -> Result<Option<Registration>, StoreError> {
        Ok(lock(&self.state)?
            .records
            .iter()
            .find(|record| filter.matches(record))
            .cloned())
    }

    fn select_all(&self) -> Result<Vec<Registration>, StoreError> {
        Ok(newest_first(&lock(&self.state)?.records))
    }

    fn delete_by_id(&self, id: &str) -> Result<(), StoreError> {
        let mut state = lock(&self.state)?;
        let Some(index) = state.records.iter().position(|record| record.id == id) else {
            return Err(StoreError::NotFound(id.to_string()));
        };
        let removed = state.records.remove(index);
        if let Err(err) = self.persist(&state) {
            state.records.insert(index, removed);
            return Err(err);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CategoryDetails, PartyName, Signature};
    use chrono::{Duration, TimeZone};

    fn payload(id: &str, phone: &str) -> NewRegistration {
        NewRegistration {
            name: "Ana".into(),
            lastname: "Pérez".into(),
            national_id: id.into(),
            phone: phone.into(),
            email: "ana@example.com".into(),
            details: CategoryDetails::Heir {
                predecessor: PartyName::new("Rosa", "Díaz"),
            },
            signature: Signature::new("data:image/png;base64,AAAA"),
        }
    }

    #[test]
    fn memory_store_lists_newest_first() {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let older = Registration::from_new("a", base, payload("1", "111"));
        let newer = Registration::from_new("b", base + Duration::days(1), payload("2", "222"));
        let store = MemoryStore::with_records(vec![older, newer]);
        let ids: Vec<String> = store
            .select_all()
            .unwrap()
            .into_iter()
            .map(|record| record.id)
            .collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn memory_store_finds_and_deletes() {
        let store = MemoryStore::new();
        let record = store.insert(payload("V-1", "555")).unwrap();
        assert!(!record.id.is_empty());
        let found = store
            .find_one(&RecordFilter::Phone(" 555 ".into()))
            .unwrap()
            .unwrap();
        assert_eq!(found.id, record.id);
        assert!(store
            .find_one(&RecordFilter::NationalId("V-2".into()))
            .unwrap()
            .is_none());
        store.delete_by_id(&record.id).unwrap();
        assert!(matches!(
            store.delete_by_id(&record.id),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn encrypted_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registrations.enc");
        let inserted = {
            let store = EncryptedFileStore::open(&path, "clave", 10).unwrap();
            store.insert(payload("V-1", "555")).unwrap()
        };
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(!raw.contains("V-1"));

        let store = EncryptedFileStore::open(&path, "clave", 10).unwrap();
        let records = store.select_all().unwrap();
        assert_eq!(records, vec![inserted.clone()]);
        store.delete_by_id(&inserted.id).unwrap();

        let store = EncryptedFileStore::open(&path, "clave", 10).unwrap();
        assert!(store.select_all().unwrap().is_empty());
    }

    #[test]
    fn reopening_uses_the_recorded_iteration_count() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registrations.enc");
        let inserted = EncryptedFileStore::open(&path, "clave", 10)
            .unwrap()
            .insert(payload("V-1", "555"))
            .unwrap();
        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["iterations"], 10);

        let store = EncryptedFileStore::open(&path, "clave", 11).unwrap();
        assert_eq!(store.select_all().unwrap(), vec![inserted.clone()]);
        store.insert(payload("V-2", "556")).unwrap();

        let store = EncryptedFileStore::open(&path, "clave", 500).unwrap();
        assert_eq!(store.select_all().unwrap().len(), 2);
    }

    #[test]
    fn files_without_an_iteration_count_use_the_configured_one() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registrations.enc");
        let salt = crypto::random_salt();
        let key = crypto::derive_key("clave", &salt, 7);
        let body = serde_json::to_string(&StoreFile {
            version: STORE_VERSION,
            records: Vec::new(),
        })
        .unwrap();
        let envelope = crypto::encrypt_with_key(body.as_str(), &salt, &key).unwrap();
        std::fs::write(&path, serde_json::to_string(&envelope).unwrap()).unwrap();

        assert!(EncryptedFileStore::open(&path, "clave", 7).is_ok());
        assert!(matches!(
            EncryptedFileStore::open(&path, "clave", 8),
            Err(StoreError::WrongKey(_))
        ));
    }

    #[test]
    fn encrypted_store_refuses_the_wrong_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registrations.enc");
        EncryptedFileStore::open(&path, "clave", 10)
            .unwrap()
            .insert(payload("V-1", "555"))
            .unwrap();
        assert!(matches!(
            EncryptedFileStore::open(&path, "otra", 10),
            Err(StoreError::WrongKey(_))
        ));
    }
}
