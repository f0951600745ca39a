//! Typed backup configuration and section-level overlay merge.
//!
//! The configuration that drives the backup backend is a tree of exactly two
//! named sections:
//!
//! ```json
//! {
//!   "auth":  { "api_key": "", "api_secret": "", "user_token": "", "user_secret": "" },
//!   "store": { "destination": "", "file_names": "",
//!              "use_metadata_times": true, "force_metadata_times": true,
//!              "write_csv": true, "force_video_download": true,
//!              "concurrent_albums": 5, "concurrent_downloads": 10 }
//! }
//! ```
//!
//! # Overlays
//!
//! Configuration arrives in layers: built-in defaults, then the persisted
//! copy, then any file the user opens.  Each layer is a [`PartialConfig`] in
//! which either section may be absent.  [`merge`] replaces a section of the
//! base *in full* whenever the overlay carries it; there is no per-field
//! merging inside a section.
//!
//! # Serde default values
//!
//! Every leaf is annotated with `#[serde(default = "some_fn")]`, so a section
//! that appears in a fragment with only some of its fields still deserializes
//! into a fully populated value.  Missing leaves take the built-in default,
//! not the value from the base being overlaid.

use std::num::NonZeroU32;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default number of albums processed in parallel.
pub const DEFAULT_CONCURRENT_ALBUMS: NonZeroU32 = match NonZeroU32::new(5) {
    Some(n) => n,
    None => panic!("default album concurrency must be non-zero"),
};

/// Default number of file downloads in flight.
pub const DEFAULT_CONCURRENT_DOWNLOADS: NonZeroU32 = match NonZeroU32::new(10) {
    Some(n) => n,
    None => panic!("default download concurrency must be non-zero"),
};

/// Error type for parsing configuration fragments.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The text is not valid JSON or a value has the wrong type.
    #[error("failed to parse configuration JSON: {0}")]
    Parse(#[from] serde_json::Error),

    /// The text is valid JSON but the top-level value is not an object.
    #[error("configuration must be a JSON object, found {found}")]
    NotAnObject { found: &'static str },
}

// ── Config schema types ───────────────────────────────────────────────────────

/// The fully populated backup configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

/// SmugMug API credentials.
///
/// Values are opaque; an empty string means "not set".
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_secret: String,
    #[serde(default)]
    pub user_token: String,
    #[serde(default)]
    pub user_secret: String,
}

/// Where and how downloaded media is written.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreConfig {
    /// Destination folder for the backup.
    #[serde(default)]
    pub destination: String,
    /// File-naming template; empty selects the backend's built-in naming.
    #[serde(default)]
    pub file_names: String,
    /// Set file modification times from the media metadata.
    #[serde(default = "default_true")]
    pub use_metadata_times: bool,
    /// Rewrite modification times even for files that already exist.
    #[serde(default = "default_true")]
    pub force_metadata_times: bool,
    /// Write a CSV index of the downloaded media.
    #[serde(default = "default_true")]
    pub write_csv: bool,
    /// Download videos even when they are still being processed upstream.
    #[serde(default = "default_true")]
    pub force_video_download: bool,
    #[serde(default = "default_concurrent_albums")]
    pub concurrent_albums: NonZeroU32,
    #[serde(default = "default_concurrent_downloads")]
    pub concurrent_downloads: NonZeroU32,
}

/// A configuration fragment in which either section may be absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PartialConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store: Option<StoreConfig>,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_true() -> bool {
    true
}
fn default_concurrent_albums() -> NonZeroU32 {
    DEFAULT_CONCURRENT_ALBUMS
}
fn default_concurrent_downloads() -> NonZeroU32 {
    DEFAULT_CONCURRENT_DOWNLOADS
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            destination: String::new(),
            file_names: String::new(),
            use_metadata_times: default_true(),
            force_metadata_times: default_true(),
            write_csv: default_true(),
            force_video_download: default_true(),
            concurrent_albums: default_concurrent_albums(),
            concurrent_downloads: default_concurrent_downloads(),
        }
    }
}

impl From<Config> for PartialConfig {
    /// A full config is an overlay that carries every section.
    fn from(config: Config) -> Self {
        Self {
            auth: Some(config.auth),
            store: Some(config.store),
        }
    }
}

impl PartialConfig {
    /// Returns `true` when the fragment carries no section at all.
    pub fn is_empty(&self) -> bool {
        self.auth.is_none() && self.store.is_none()
    }
}

// ── Merge ─────────────────────────────────────────────────────────────────────

/// Overlays `overlay` on top of `base`, section by section.
///
/// Each section present in `overlay` replaces the corresponding section of
/// `base` in full; absent sections keep the value from `base`.
///
/// # Example
///
/// ```rust
/// use smug_core::{merge, AuthConfig, Config, PartialConfig};
///
/// let overlay = PartialConfig {
///     auth: Some(AuthConfig { api_key: "key".into(), ..AuthConfig::default() }),
///     store: None,
/// };
/// let merged = merge(Config::default(), overlay);
/// assert_eq!(merged.auth.api_key, "key");
/// assert_eq!(merged.store, Config::default().store);
/// ```
pub fn merge(base: Config, overlay: PartialConfig) -> Config {
    Config {
        auth: overlay.auth.unwrap_or(base.auth),
        store: overlay.store.unwrap_or(base.store),
    }
}

/// Applies a sequence of overlays in order; the last fragment carrying a
/// section wins.
pub fn merge_all<I>(base: Config, overlays: I) -> Config
where
    I: IntoIterator<Item = PartialConfig>,
{
    overlays.into_iter().fold(base, merge)
}

/// Parses the text of a user-supplied configuration fragment.
///
/// Unknown top-level keys are ignored.  Known sections must have the right
/// shape: a string where a boolean is expected, or a zero concurrency limit,
/// is an error.
///
/// # Errors
///
/// Returns [`ConfigError::Parse`] for invalid JSON or wrongly typed values and
/// [`ConfigError::NotAnObject`] when the top-level value is not an object.
pub fn parse_overlay(text: &str) -> Result<PartialConfig, ConfigError> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    if !value.is_object() {
        return Err(ConfigError::NotAnObject {
            found: json_kind(&value),
        });
    }
    Ok(serde_json::from_value(value)?)
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
