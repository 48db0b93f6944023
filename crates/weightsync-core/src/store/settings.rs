//! Durable key-value settings abstraction
//!
//! Provides the byte-blob settings store the weight log lives in, with an
//! in-memory implementation for tests and a directory-backed implementation
//! for hosts without a platform settings store.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::errors::StoreError;

// ----------------------------------------------------------------------------
// Settings Trait
// ----------------------------------------------------------------------------

/// Key-value settings storage
pub trait SettingsStore: Send {
    /// Read the bytes stored under a key
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Replace the bytes stored under a key
    fn set(&mut self, key: &str, value: Vec<u8>) -> Result<(), StoreError>;
}

// ----------------------------------------------------------------------------
// Memory Settings Implementation
// ----------------------------------------------------------------------------

/// In-memory settings for testing and ephemeral sessions
#[derive(Debug, Default, Clone)]
pub struct MemorySettings {
    data: BTreeMap<String, Vec<u8>>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create settings pre-seeded with one value
    pub fn with_value(key: &str, value: Vec<u8>) -> Self {
        let mut settings = Self::new();
        settings.data.insert(key.to_string(), value);
        settings
    }
}

impl SettingsStore for MemorySettings {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.data.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        self.data.insert(key.to_string(), value);
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// File Settings Implementation
// ----------------------------------------------------------------------------

/// Settings persisted as one file per key under a directory
///
/// Writes go to a temporary sibling and are renamed into place, so a reader
/// never observes a half-written value.
#[derive(Debug, Clone)]
pub struct FileSettings {
    root: PathBuf,
}

impl FileSettings {
    /// Open (and create if needed) a settings directory
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File backing a key; bytes outside `[A-Za-z0-9._-]` are percent-encoded
    /// so distinct keys never share a file
    pub fn path_for(&self, key: &str) -> PathBuf {
        let mut name = String::with_capacity(key.len());
        for byte in key.bytes() {
            if byte.is_ascii_alphanumeric() || matches!(byte, b'.' | b'_' | b'-') {
                name.push(char::from(byte));
            } else {
                name.push_str(&format!("%{:02X}", byte));
            }
        }
        self.root.join(format!("{}.json", name))
    }
}

impl SettingsStore for FileSettings {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        match fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn set(&mut self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, &value)?;
        fs::rename(&tmp, &path)?;
        debug!(key, bytes = value.len(), path = %path.display(), "settings written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_settings() {
        let mut settings = MemorySettings::new();
        assert!(settings.get("key").unwrap().is_none());

        settings.set("key", vec![1, 2, 3]).unwrap();
        assert_eq!(settings.get("key").unwrap(), Some(vec![1, 2, 3]));

        settings.set("key", vec![4]).unwrap();
        assert_eq!(settings.get("key").unwrap(), Some(vec![4]));

        let seeded = MemorySettings::with_value("other", b"x".to_vec());
        assert_eq!(seeded.get("other").unwrap(), Some(b"x".to_vec()));
    }

    #[test]
    fn test_file_settings_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = FileSettings::open(dir.path().join("nested")).unwrap();

        assert!(settings.get("StoredWeights").unwrap().is_none());
        settings.set("StoredWeights", b"[]".to_vec()).unwrap();
        assert_eq!(settings.get("StoredWeights").unwrap(), Some(b"[]".to_vec()));

        // A second handle on the same directory sees the value
        let reopened = FileSettings::open(settings.root()).unwrap();
        assert_eq!(reopened.get("StoredWeights").unwrap(), Some(b"[]".to_vec()));
    }

    #[test]
    fn test_file_settings_key_sanitized() {
        let dir = tempfile::tempdir().unwrap();
        let settings = FileSettings::open(dir.path()).unwrap();
        let path = settings.path_for("../escape/me");
        assert_eq!(path.parent(), Some(dir.path()));
        assert_eq!(path.file_name().unwrap(), "..%2Fescape%2Fme.json");

        assert_eq!(settings.path_for("StoredWeights").file_name().unwrap(), "StoredWeights.json");
        assert_ne!(settings.path_for("a/b"), settings.path_for("a_b"));
        assert_ne!(settings.path_for("a%2Fb"), settings.path_for("a/b"));
    }

    #[test]
    fn test_file_settings_distinct_keys_kept_apart() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = FileSettings::open(dir.path()).unwrap();

        settings.set("a/b", b"slash".to_vec()).unwrap();
        settings.set("a_b", b"underscore".to_vec()).unwrap();
        assert_eq!(settings.get("a/b").unwrap(), Some(b"slash".to_vec()));
        assert_eq!(settings.get("a_b").unwrap(), Some(b"underscore".to_vec()));
    }
}
