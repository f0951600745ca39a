//! Lifecycle of the supervised backend process.
//!
//! ```text
//! Starting ──handshake──►  Listening ──exit──► Exited
//!     │                      │  ▲                  (terminal)
//!     │                      └──┘ handshake
//!     └──────────exit─────────────────────────────►
//! ```
//!
//! - `Starting`: the child was spawned; no handshake line seen yet.
//! - `Listening`: at least one handshake line announced a listen address.
//! - `Exited`: the child terminated.  Nothing leaves this state.

use serde::{Deserialize, Serialize};

/// Address used for health polls until the backend announces its own.
pub const DEFAULT_SERVER_ADDRESS: &str = "localhost:8089";

/// Current lifecycle state of the backend process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ServerState {
    Starting,
    Listening,
    Exited {
        /// Process exit code; `None` when the process was killed by a signal.
        code: Option<i32>,
    },
}

impl ServerState {
    /// State after a handshake line was parsed successfully.
    ///
    /// Returns `None` when the handshake must be ignored because the process
    /// has already exited.
    pub fn on_handshake(self) -> Option<Self> {
        match self {
            Self::Starting | Self::Listening => Some(Self::Listening),
            Self::Exited { .. } => None,
        }
    }

    /// State after the process terminated.
    ///
    /// A second exit notification keeps the first exit code.
    pub fn on_exit(self, code: Option<i32>) -> Self {
        match self {
            Self::Exited { .. } => self,
            Self::Starting | Self::Listening => Self::Exited { code },
        }
    }

    /// Returns `true` once the process has exited.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Exited { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_moves_starting_to_listening() {
        assert_eq!(
            ServerState::Starting.on_handshake(),
            Some(ServerState::Listening)
        );
    }

    #[test]
    fn test_repeated_handshake_stays_listening() {
        assert_eq!(
            ServerState::Listening.on_handshake(),
            Some(ServerState::Listening)
        );
    }

    #[test]
    fn test_handshake_after_exit_is_ignored() {
        let exited = ServerState::Exited { code: Some(0) };
        assert_eq!(exited.on_handshake(), None);
    }

    #[test]
    fn test_exit_from_any_live_state() {
        assert_eq!(
            ServerState::Starting.on_exit(Some(1)),
            ServerState::Exited { code: Some(1) }
        );
        assert_eq!(
            ServerState::Listening.on_exit(None),
            ServerState::Exited { code: None }
        );
    }

    #[test]
    fn test_exited_is_terminal_and_keeps_first_code() {
        let exited = ServerState::Exited { code: Some(2) };

        let again = exited.on_exit(Some(9));

        assert!(again.is_terminal());
        assert_eq!(again, ServerState::Exited { code: Some(2) });
    }

    #[test]
    fn test_state_serializes_with_tag() {
        let json = serde_json::to_string(&ServerState::Exited { code: Some(3) }).unwrap();
        assert_eq!(json, r#"{"state":"exited","code":3}"#);
    }
}
