//! File-backed key/value storage.
//!
//! Each key is one file, `<root>/<key>.json`.  The default root is
//! `<platform data dir>/smugmug-backup/storage`:
//!
//! - Linux:    `~/.local/share/smugmug-backup/storage`
//! - macOS:    `~/Library/Application Support/smugmug-backup/storage`
//! - Windows:  `%LOCALAPPDATA%\smugmug-backup\storage`
//!
//! Writes go to a temporary sibling file first and are then renamed over the
//! target, so a crash mid-write leaves the previous value intact.

use std::path::{Path, PathBuf};

use crate::application::manage_config::{ConfigRepository, StoreError};

use super::platform_data_dir;

/// Key/value store rooted at a directory.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    /// Storage rooted at `root`.  The directory is created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Storage rooted at the platform default location.
    ///
    /// Returns `None` when the platform data directory cannot be determined.
    pub fn open_default() -> Option<Self> {
        platform_data_dir().map(|dir| Self::new(dir.join("storage")))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the file holding `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidKey`] unless `key` is non-empty and made
    /// of ASCII letters, digits, `-`, and `_`.
    pub fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        let valid = !key.is_empty()
            && key
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        if !valid {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(format!("{key}.json")))
    }
}

impl ConfigRepository for LocalStorage {
    fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.path_for(key)?;
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let path = self.path_for(key)?;

        std::fs::create_dir_all(&self.root).map_err(|source| StoreError::Io {
            path: self.root.clone(),
            source,
        })?;

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, value).map_err(|source| StoreError::Io {
            path: tmp.clone(),
            source,
        })?;
        std::fs::rename(&tmp, &path).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    fn temp_storage() -> LocalStorage {
        LocalStorage::new(std::env::temp_dir().join(format!("smug_storage_{}", Uuid::new_v4())))
    }

    #[test]
    fn test_read_missing_key_is_none() {
        let storage = temp_storage();

        assert_eq!(storage.read("config").unwrap(), None);
    }

    #[test]
    fn test_write_then_read_returns_value() {
        // Arrange
        let storage = temp_storage();

        // Act
        storage.write("config", r#"{"auth":{}}"#).unwrap();
        let value = storage.read("config").unwrap();

        // Assert
        assert_eq!(value.as_deref(), Some(r#"{"auth":{}}"#));
        assert!(storage.root().join("config.json").is_file());
        assert!(!storage.root().join("config.json.tmp").exists());

        std::fs::remove_dir_all(storage.root()).ok();
    }

    #[test]
    fn test_write_replaces_previous_value() {
        let storage = temp_storage();

        storage.write("config", "first").unwrap();
        storage.write("config", "second").unwrap();

        assert_eq!(storage.read("config").unwrap().as_deref(), Some("second"));
        std::fs::remove_dir_all(storage.root()).ok();
    }

    #[test]
    fn test_path_traversal_key_is_rejected() {
        let storage = temp_storage();

        for key in ["../escape", "a/b", "", "con fig"] {
            assert!(
                matches!(storage.path_for(key), Err(StoreError::InvalidKey(_))),
                "key {key:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_open_default_ends_with_storage() {
        if let Some(storage) = LocalStorage::open_default() {
            assert!(storage.root().ends_with("storage"));
        }
    }
}
