//! Append-only local weight store
//!
//! The whole weight log is kept as one JSON array under a single settings key.
//! Reads never fail: a missing key, unreadable settings or bytes that do not
//! decode all load as an empty log. `append` swallows failures the same way;
//! `try_append` is the variant that reports them.

pub mod settings;

pub use settings::{FileSettings, MemorySettings, SettingsStore};

use std::sync::{Mutex, MutexGuard};

use tracing::{debug, warn};

use crate::config::{StoreConfig, DEFAULT_WEIGHTS_KEY};
use crate::errors::StoreError;
use crate::record::WeightRecord;

/// Append-only list of weight records backed by a settings store
pub struct LocalStore {
    settings: Mutex<Box<dyn SettingsStore>>,
    key: String,
}

impl LocalStore {
    /// Store using the default `StoredWeights` key
    pub fn new<S: SettingsStore + 'static>(settings: S) -> Self {
        Self::with_key(settings, DEFAULT_WEIGHTS_KEY)
    }

    pub fn with_key<S: SettingsStore + 'static>(settings: S, key: impl Into<String>) -> Self {
        let settings: Box<dyn SettingsStore> = Box::new(settings);
        Self {
            settings: Mutex::new(settings),
            key: key.into(),
        }
    }

    /// Build from configuration: file-backed when `settings_dir` is set,
    /// in-memory otherwise
    pub fn from_config(config: &StoreConfig) -> Result<Self, StoreError> {
        match &config.settings_dir {
            Some(dir) => Ok(Self::with_key(
                FileSettings::open(dir)?,
                config.weights_key.clone(),
            )),
            None => Ok(Self::with_key(
                MemorySettings::new(),
                config.weights_key.clone(),
            )),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Every stored record, in append order
    pub fn load_all(&self) -> Vec<WeightRecord> {
        let settings = self.lock();
        Self::read(&**settings, &self.key)
    }

    pub fn len(&self) -> usize {
        self.load_all().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append a record; failures are logged and the record is dropped
    pub fn append(&self, record: WeightRecord) {
        if let Err(err) = self.try_append(record) {
            warn!(key = %self.key, error = %err, "dropping weight record, store write failed");
        }
    }

    /// Append a record, returning the new number of stored records
    pub fn try_append(&self, record: WeightRecord) -> Result<usize, StoreError> {
        if !record.is_encodable() {
            return Err(StoreError::NonFiniteWeight {
                weight: record.weight(),
            });
        }

        // Hold the lock across read-modify-write so concurrent appends keep
        // call order.
        let mut settings = self.lock();
        let mut records = Self::read(&**settings, &self.key);
        records.push(record);

        let bytes = serde_json::to_vec(&records).map_err(StoreError::Encode)?;
        settings.set(&self.key, bytes)?;

        debug!(key = %self.key, count = records.len(), "weight record stored");
        Ok(records.len())
    }

    fn lock(&self) -> MutexGuard<'_, Box<dyn SettingsStore>> {
        match self.settings.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn read(settings: &dyn SettingsStore, key: &str) -> Vec<WeightRecord> {
        let bytes = match settings.get(key) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return Vec::new(),
            Err(err) => {
                warn!(key, error = %err, "settings read failed, treating store as empty");
                return Vec::new();
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(records) => records,
            Err(err) => {
                debug!(key, error = %err, "stored weights do not decode, treating store as empty");
                Vec::new()
            }
        }
    }
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStore").field("key", &self.key).finish()
    }
}
