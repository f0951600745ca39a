//! ManageConfigUseCase: the canonical backup configuration.
//!
//! The [`ConfigStore`] owns the single authoritative [`Config`].  It is built
//! in layers, each one overriding whole sections of the one below:
//!
//! ```text
//! built-in defaults
//!   └─ persisted copy (key `config`)        ← replaces both sections
//!        └─ user-opened file fragment       ← replaces the sections it has
//! ```
//!
//! Persistence failures are reported but never roll back the in-memory
//! instance: the user keeps the configuration they just applied even if the
//! disk is full.  A persisted copy that cannot be read or parsed is treated
//! as if it did not exist.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;
use tracing::{info, warn};

#[cfg(test)]
use mockall::automock;

use smug_core::{parse_overlay, Config, ConfigError, PartialConfig};

/// Storage key of the persisted configuration.
pub const CONFIG_KEY: &str = "config";

/// Error type for configuration store and repository operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A file system I/O error occurred.
    #[error("storage I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The storage key contains characters that are not allowed in a key.
    #[error("invalid storage key `{0}`")]
    InvalidKey(String),

    /// The configuration could not be encoded as JSON.
    #[error("failed to encode config: {0}")]
    Encode(#[source] serde_json::Error),

    /// A configuration fragment could not be parsed.
    #[error(transparent)]
    Parse(#[from] ConfigError),
}

/// Durable key/value text storage.
///
/// The production implementation is `infrastructure::storage::local`.
#[cfg_attr(test, automock)]
pub trait ConfigRepository: Send + Sync {
    /// Returns the stored value, or `None` if the key was never written.
    fn read(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Stores `value` under `key`, replacing any previous value.
    fn write(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// Owner of the canonical configuration instance.
pub struct ConfigStore {
    repository: Arc<dyn ConfigRepository>,
    current: Mutex<Option<Config>>,
}

impl ConfigStore {
    pub fn new(repository: Arc<dyn ConfigRepository>) -> Self {
        Self {
            repository,
            current: Mutex::new(None),
        }
    }

    /// Built-in defaults.  Pure; no I/O.
    pub fn load_defaults() -> Config {
        Config::default()
    }

    /// Reads the persisted configuration.
    ///
    /// Returns `None` when nothing was persisted, when the storage cannot be
    /// read, and when the stored text is not a valid configuration.
    pub fn load_persisted(&self) -> Option<Config> {
        let text = match self.repository.read(CONFIG_KEY) {
            Ok(Some(text)) => text,
            Ok(None) => return None,
            Err(e) => {
                warn!("could not read persisted config: {e}");
                return None;
            }
        };

        match serde_json::from_str::<Config>(&text) {
            Ok(config) => Some(config),
            Err(e) => {
                warn!("ignoring malformed persisted config: {e}");
                None
            }
        }
    }

    /// Section-level overlay; sections absent from `overlay` are kept.
    pub fn merge(base: Config, overlay: PartialConfig) -> Config {
        smug_core::merge(base, overlay)
    }

    /// Serializes `config` and writes it under [`CONFIG_KEY`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Encode`] or the repository's write error.
    pub fn persist(&self, config: &Config) -> Result<(), StoreError> {
        let text = serde_json::to_string_pretty(config).map_err(StoreError::Encode)?;
        self.repository.write(CONFIG_KEY, &text)
    }

    /// Produces the canonical instance on first use and returns a copy.
    ///
    /// The first call overlays the persisted copy onto the defaults.  When
    /// nothing was persisted the defaults are written back immediately.
    /// Later calls return the in-memory instance without touching storage.
    pub fn initialize(&self) -> Config {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        self.ensure(&mut current)
    }

    /// Read copy of the canonical instance, initializing it if needed.
    pub fn current(&self) -> Config {
        self.initialize()
    }

    /// Parses `text` as a configuration fragment, merges it into the
    /// canonical instance, and persists the result.
    ///
    /// A persistence failure is logged; the merged configuration is still
    /// kept and returned.  Concurrent calls are applied and written one at a
    /// time, so storage always ends up holding the last merge.
    ///
    /// Blocks on storage I/O; async callers run it on a blocking thread.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Parse`] if `text` is not a valid fragment.  The
    /// canonical instance is unchanged in that case.
    pub fn apply_overlay(&self, text: &str) -> Result<Config, StoreError> {
        let overlay = parse_overlay(text)?;

        // Persisting under the lock keeps disk order equal to merge order.
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        let base = self.ensure(&mut current);
        let merged = Self::merge(base, overlay);
        *current = Some(merged.clone());

        if let Err(e) = self.persist(&merged) {
            warn!("config applied but not persisted: {e}");
        }
        Ok(merged)
    }

    fn ensure(&self, current: &mut Option<Config>) -> Config {
        if let Some(config) = current.as_ref() {
            return config.clone();
        }

        let config = match self.load_persisted() {
            Some(persisted) => {
                info!("loaded persisted config");
                Self::merge(Self::load_defaults(), PartialConfig::from(persisted))
            }
            None => {
                let defaults = Self::load_defaults();
                if let Err(e) = self.persist(&defaults) {
                    warn!("could not persist default config: {e}");
                }
                defaults
            }
        };
        *current = Some(config.clone());
        config
    }
}
