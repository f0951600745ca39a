//! Native open-file dialog.
//!
//! The dialog is the only way the presentation layer learns about paths on
//! disk: it cannot browse the file system itself.  Cancelling the dialog is
//! not an error and yields an empty selection.

use std::path::PathBuf;

use async_trait::async_trait;
use rfd::AsyncFileDialog;
use thiserror::Error;

#[cfg(test)]
use mockall::automock;

/// Error type for dialog operations.
#[derive(Debug, Error)]
pub enum DialogError {
    /// There is no graphical session to show the dialog in.
    #[error("no graphical session available for the file dialog")]
    NoDisplay,
}

/// Shows an open-file dialog.
///
/// The production implementation is [`RfdFilePicker`]; tests use the
/// generated `MockFilePicker`.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait FilePicker: Send + Sync {
    /// Returns the selected paths in selection order, or an empty list if the
    /// user cancelled.
    async fn pick(&self, multiple: bool) -> Result<Vec<PathBuf>, DialogError>;
}

/// [`FilePicker`] using the platform dialog through `rfd`.
#[derive(Debug, Clone)]
pub struct RfdFilePicker {
    title: String,
}

impl RfdFilePicker {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
        }
    }
}

impl Default for RfdFilePicker {
    fn default() -> Self {
        Self::new("Open configuration")
    }
}

#[async_trait]
impl FilePicker for RfdFilePicker {
    async fn pick(&self, multiple: bool) -> Result<Vec<PathBuf>, DialogError> {
        if !has_display() {
            return Err(DialogError::NoDisplay);
        }

        let dialog = AsyncFileDialog::new().set_title(self.title.as_str());
        let handles = if multiple {
            dialog.pick_files().await.unwrap_or_default()
        } else {
            dialog.pick_file().await.into_iter().collect()
        };
        Ok(handles
            .into_iter()
            .map(|handle| handle.path().to_path_buf())
            .collect())
    }
}

#[cfg(all(unix, not(target_os = "macos")))]
fn has_display() -> bool {
    std::env::var_os("DISPLAY").is_some() || std::env::var_os("WAYLAND_DISPLAY").is_some()
}

#[cfg(not(all(unix, not(target_os = "macos"))))]
fn has_display() -> bool {
    true
}
