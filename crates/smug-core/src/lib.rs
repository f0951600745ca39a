//! # smug-core
//!
//! Shared library for the SmugMug Backup desktop shell containing the typed
//! backup configuration, the backend lifecycle model, and the message formats
//! that cross process and trust boundaries.
//!
//! This crate has zero dependencies on OS APIs, async runtimes, UI frameworks,
//! or network sockets.
//!
//! # Architecture overview
//!
//! The desktop shell is a privileged host process that launches a backup
//! backend as a child process and exposes a small, whitelisted set of host
//! operations to an untrusted presentation layer.  This crate defines:
//!
//! - **`domain`** – Pure state: the two-section [`Config`] with its defaults
//!   and section-level overlay merge, the backend [`ServerState`] machine, and
//!   the [`HealthStatus`] enumeration.
//!
//! - **`protocol`** – Wire formats: the JSON handshake line the backend prints
//!   on stdout, and the closed, tagged request/response envelope of the
//!   presentation bridge.

pub mod domain;
pub mod protocol;

pub use domain::config::{
    merge, merge_all, parse_overlay, AuthConfig, Config, ConfigError, PartialConfig, StoreConfig,
};
pub use domain::health::HealthStatus;
pub use domain::server::{ServerState, DEFAULT_SERVER_ADDRESS};
pub use protocol::bridge::{
    BridgeEnvelope, BridgeErrorKind, BridgeFailure, BridgeReply, BridgeRequest, BridgeResponse,
    DecodeError, Operation,
};
pub use protocol::handshake::{encode_handshake, parse_handshake_line, HandshakeError};
