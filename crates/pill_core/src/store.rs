use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::medicine::Medicine;

/// Persistence for the medicine collection and the last-reconciled day.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Medicines in insertion order.
    async fn get_all(&self) -> Result<Vec<Medicine>, StoreError>;
    /// Upsert by id. New records are appended.
    async fn put(&self, medicine: Medicine) -> Result<(), StoreError>;
    async fn delete(&self, id: &str) -> Result<(), StoreError>;
    async fn get_marker(&self) -> Result<Option<NaiveDate>, StoreError>;
    async fn set_marker(&self, date: NaiveDate) -> Result<(), StoreError>;
}

/// On-disk layout shared by every store implementation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreSnapshot {
    #[serde(default)]
    pub medicines: Vec<Medicine>,
    #[serde(rename = "lastReset", default)]
    pub last_reset: Option<NaiveDate>,
}

impl StoreSnapshot {
    fn upsert(&mut self, medicine: Medicine) {
        match self
            .medicines
            .iter_mut()
            .find(|existing| existing.id == medicine.id)
        {
            Some(existing) => *existing = medicine,
            None => self.medicines.push(medicine),
        }
    }

    fn remove(&mut self, id: &str) {
        self.medicines.retain(|medicine| medicine.id != id);
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    snapshot: StoreSnapshot,
    unavailable: bool,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_medicines(medicines: Vec<Medicine>) -> Self {
        let store = Self::default();
        store.state.lock().snapshot.medicines = medicines;
        store
    }

    pub fn with_marker(self, date: NaiveDate) -> Self {
        self.state.lock().snapshot.last_reset = Some(date);
        self
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().unavailable = unavailable;
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        self.state.lock().snapshot.clone()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut StoreSnapshot) -> T) -> Result<T, StoreError> {
        let mut state = self.state.lock();
        if state.unavailable {
            return Err(StoreError::Unavailable("memory store switched off".to_string()));
        }
        Ok(f(&mut state.snapshot))
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn get_all(&self) -> Result<Vec<Medicine>, StoreError> {
        self.with_state(|snapshot| snapshot.medicines.clone())
    }

    async fn put(&self, medicine: Medicine) -> Result<(), StoreError> {
        self.with_state(|snapshot| snapshot.upsert(medicine))
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.with_state(|snapshot| snapshot.remove(id))
    }

    async fn get_marker(&self) -> Result<Option<NaiveDate>, StoreError> {
        self.with_state(|snapshot| snapshot.last_reset)
    }

    async fn set_marker(&self, date: NaiveDate) -> Result<(), StoreError> {
        self.with_state(|snapshot| snapshot.last_reset = Some(date))
    }
}

/// Keeps the whole collection in one JSON file. A missing file reads as empty.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<StoreSnapshot, StoreError> {
        match fs::read_to_string(&self.path) {
            Ok(raw) if raw.trim().is_empty() => Ok(StoreSnapshot::default()),
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(StoreSnapshot::default()),
            Err(err) => Err(err.into()),
        }
    }

    fn save(&self, snapshot: &StoreSnapshot) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let payload = serde_json::to_string_pretty(snapshot)?;
        fs::write(&self.path, payload)?;
        Ok(())
    }

    fn modify(&self, f: impl FnOnce(&mut StoreSnapshot)) -> Result<(), StoreError> {
        let _guard = self.lock.lock();
        let mut snapshot = self.load()?;
        f(&mut snapshot);
        self.save(&snapshot)
    }
}

#[async_trait]
impl RecordStore for JsonFileStore {
    async fn get_all(&self) -> Result<Vec<Medicine>, StoreError> {
        let _guard = self.lock.lock();
        Ok(self.load()?.medicines)
    }

    async fn put(&self, medicine: Medicine) -> Result<(), StoreError> {
        self.modify(|snapshot| snapshot.upsert(medicine))
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.modify(|snapshot| snapshot.remove(id))
    }

    async fn get_marker(&self) -> Result<Option<NaiveDate>, StoreError> {
        let _guard = self.lock.lock();
        Ok(self.load()?.last_reset)
    }

    async fn set_marker(&self, date: NaiveDate) -> Result<(), StoreError> {
        self.modify(|snapshot| snapshot.last_reset = Some(date))
    }
}
