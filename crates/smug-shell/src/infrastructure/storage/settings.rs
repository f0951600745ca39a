//! TOML settings for the shell itself.
//!
//! Reads `ShellSettings` from `shell.toml` in the platform config directory:
//! - Windows:  `%APPDATA%\smugmug-backup\shell.toml`
//! - Linux:    `~/.config/smugmug-backup/shell.toml`
//! - macOS:    `~/Library/Application Support/smugmug-backup/shell.toml`
//!
//! ```toml
//! [backend]
//! program = "./server"
//! args = []
//! default_address = "localhost:8089"
//!
//! [health]
//! interval_secs = 5
//! timeout_ms = 3000
//! service = ""
//!
//! [dialog]
//! multiple = false
//!
//! [logging]
//! level = "info"
//! ```
//!
//! Every field has a serde default, so a missing file, a missing section, or
//! a section with only some keys all load.  These settings are separate from
//! the backup configuration the shell persists on behalf of the user.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use smug_core::DEFAULT_SERVER_ADDRESS;

use super::platform_config_dir;
use crate::infrastructure::process::BackendCommand;

/// Error type for settings file operations.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing settings at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse settings TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

// ── Settings schema ───────────────────────────────────────────────────────────

/// Top-level shell settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShellSettings {
    #[serde(default)]
    pub backend: BackendSettings,
    #[serde(default)]
    pub health: HealthSettings,
    #[serde(default)]
    pub dialog: DialogSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// How the backend process is launched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackendSettings {
    /// Backend executable, resolved against `working_dir` (or the shell's
    /// working directory) when relative.
    #[serde(default = "default_program")]
    pub program: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
    /// Address polled until the backend announces its own.
    #[serde(default = "default_address")]
    pub default_address: String,
}

/// Health polling cadence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthSettings {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Bound on one poll, connect and call together.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Service name sent in the health request; empty means the whole server.
    #[serde(default)]
    pub service: String,
}

/// Native file dialog behaviour.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DialogSettings {
    /// Allow selecting more than one file.
    #[serde(default)]
    pub multiple: bool,
}

/// Logging defaults; `RUST_LOG` takes precedence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingSettings {
    /// `tracing` level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub level: String,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_program() -> PathBuf {
    PathBuf::from("./server")
}
fn default_address() -> String {
    DEFAULT_SERVER_ADDRESS.to_string()
}
fn default_interval_secs() -> u64 {
    5
}
fn default_timeout_ms() -> u64 {
    3000
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: Vec::new(),
            working_dir: None,
            default_address: default_address(),
        }
    }
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            timeout_ms: default_timeout_ms(),
            service: String::new(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl BackendSettings {
    /// Launch description for the supervisor.
    pub fn command(&self) -> BackendCommand {
        BackendCommand {
            program: self.program.clone(),
            args: self.args.clone(),
            current_dir: self.working_dir.clone(),
        }
    }
}

impl HealthSettings {
    /// Poll period; never zero.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    /// Per-poll timeout; never zero.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.max(1))
    }
}

// ── Settings file ─────────────────────────────────────────────────────────────

/// Resolves the default settings file path.
///
/// # Errors
///
/// Returns [`SettingsError::NoPlatformConfigDir`] if the base directory cannot
/// be determined.
pub fn settings_file_path() -> Result<PathBuf, SettingsError> {
    platform_config_dir()
        .map(|dir| dir.join("shell.toml"))
        .ok_or(SettingsError::NoPlatformConfigDir)
}

/// Loads settings from `path`, returning defaults if the file does not exist.
///
/// # Errors
///
/// Returns [`SettingsError::Io`] for file-system errors other than "not
/// found", and [`SettingsError::Parse`] if the TOML is malformed.
pub fn load_settings_from(path: &Path) -> Result<ShellSettings, SettingsError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ShellSettings::default()),
        Err(source) => Err(SettingsError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Loads settings from `path`, or from [`settings_file_path`] when `None`.
///
/// # Errors
///
/// See [`load_settings_from`] and [`settings_file_path`].
pub fn load_settings(path: Option<&Path>) -> Result<ShellSettings, SettingsError> {
    match path {
        Some(path) => load_settings_from(path),
        None => load_settings_from(&settings_file_path()?),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        // Arrange / Act
        let settings = ShellSettings::default();

        // Assert
        assert_eq!(settings.backend.program, PathBuf::from("./server"));
        assert!(settings.backend.args.is_empty());
        assert_eq!(settings.backend.default_address, "localhost:8089");
        assert_eq!(settings.health.interval(), Duration::from_secs(5));
        assert_eq!(settings.health.timeout(), Duration::from_millis(3000));
        assert_eq!(settings.health.service, "");
        assert!(!settings.dialog.multiple);
        assert_eq!(settings.logging.level, "info");
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let settings: ShellSettings = toml::from_str("").unwrap();
        assert_eq!(settings, ShellSettings::default());
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        // Arrange
        let toml_str = r#"
[backend]
program = "/opt/smug/server"

[health]
interval_secs = 10
"#;

        // Act
        let settings: ShellSettings = toml::from_str(toml_str).unwrap();

        // Assert
        assert_eq!(settings.backend.program, PathBuf::from("/opt/smug/server"));
        assert_eq!(settings.backend.default_address, "localhost:8089");
        assert_eq!(settings.health.interval(), Duration::from_secs(10));
        assert_eq!(settings.health.timeout_ms, 3000);
        assert_eq!(settings.logging.level, "info");
    }

    #[test]
    fn test_zero_interval_is_clamped() {
        let health = HealthSettings {
            interval_secs: 0,
            timeout_ms: 0,
            service: String::new(),
        };

        assert_eq!(health.interval(), Duration::from_secs(1));
        assert_eq!(health.timeout(), Duration::from_millis(1));
    }

    #[test]
    fn test_backend_command_carries_args_and_dir() {
        let backend = BackendSettings {
            program: PathBuf::from("server"),
            args: vec!["-sock".to_string()],
            working_dir: Some(PathBuf::from("/srv")),
            default_address: default_address(),
        };

        let cmd = backend.command();

        assert_eq!(cmd.program, PathBuf::from("server"));
        assert_eq!(cmd.args, vec!["-sock".to_string()]);
        assert_eq!(cmd.current_dir, Some(PathBuf::from("/srv")));
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let dir = std::env::temp_dir().join(format!("smug_settings_{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("shell.toml");
        std::fs::write(&path, "[[[ not valid toml").unwrap();

        let result = load_settings_from(&path);

        assert!(matches!(result, Err(SettingsError::Parse(_))));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let path = PathBuf::from("/nonexistent/path/that/cannot/exist/shell.toml");

        let settings = load_settings_from(&path).unwrap();

        assert_eq!(settings, ShellSettings::default());
    }

    #[test]
    fn test_written_settings_load_back() {
        // Arrange
        let dir = std::env::temp_dir().join(format!("smug_settings_{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("shell.toml");
        let mut settings = ShellSettings::default();
        settings.dialog.multiple = true;
        settings.logging.level = "debug".to_string();
        std::fs::write(&path, toml::to_string_pretty(&settings).unwrap()).unwrap();

        // Act
        let loaded = load_settings(Some(&path)).unwrap();

        // Assert
        assert_eq!(loaded, settings);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_settings_file_path_ends_with_shell_toml() {
        if let Ok(path) = settings_file_path() {
            assert!(path.ends_with("smugmug-backup/shell.toml"), "got {path:?}");
        }
    }
}
