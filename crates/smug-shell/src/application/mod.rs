//! Application layer use cases for the desktop shell.
//!
//! Use cases in this layer orchestrate `smug_core` domain types and depend on
//! traits ([`monitor_health::HealthProbe`], [`manage_config::ConfigRepository`])
//! rather than on gRPC channels or the file system, so they can be exercised
//! with mocks.
//!
//! # Sub-modules
//!
//! - **`supervise_server`** – Owns the discovered backend address and the
//!   lifecycle state, and turns the backend's stdout into handshake updates.
//!
//! - **`monitor_health`** – Polls the backend's health service, one call at a
//!   time, and caches the last observed status.
//!
//! - **`manage_config`** – The canonical configuration instance: defaults,
//!   persisted overlay, user overlays, and write-back.

pub mod manage_config;
pub mod monitor_health;
pub mod supervise_server;
