//! Storage infrastructure: durable key/value data and the shell's own settings.
//!
//! - **`local`** – JSON text values stored one file per key under the
//!   platform data directory.  Implements the application layer's
//!   `ConfigRepository`, which is where the backup configuration is persisted.
//! - **`settings`** – The `shell.toml` file controlling how the backend is
//!   launched, how often it is polled, and the default log level.
//!
//! Both resolve their base directories the same way the platform does:
//! XDG variables on Linux, `~/Library/Application Support` on macOS, and
//! `%APPDATA%` on Windows.

use std::path::PathBuf;

pub mod local;
pub mod settings;

/// Directory name used under the platform config and data directories.
pub const APP_DIR_NAME: &str = "smugmug-backup";

/// Resolves `<platform config dir>/smugmug-backup`.
pub(crate) fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join(APP_DIR_NAME))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join(APP_DIR_NAME))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join(APP_DIR_NAME)
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

/// Resolves `<platform data dir>/smugmug-backup`.
pub(crate) fn platform_data_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("LOCALAPPDATA")
            .or_else(|| std::env::var_os("APPDATA"))
            .map(|p| PathBuf::from(p).join(APP_DIR_NAME))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .or_else(|| {
                std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".local").join("share"))
            })?;
        Some(base.join(APP_DIR_NAME))
    }

    #[cfg(target_os = "macos")]
    {
        platform_config_dir()
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}
