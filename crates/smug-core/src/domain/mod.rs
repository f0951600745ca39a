//! Domain layer: pure state types with no I/O.
//!
//! - **`config`** – The backup configuration tree, its built-in defaults, and
//!   the section-granular overlay merge.
//! - **`server`** – Lifecycle of the supervised backend process.
//! - **`health`** – The serving-status enumeration reported by health polls.

pub mod config;
pub mod health;
pub mod server;
