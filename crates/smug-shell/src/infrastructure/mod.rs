//! Infrastructure layer for the desktop shell.
//!
//! Contains OS-facing adapters: the backend child process, the gRPC health
//! client, file-system storage, the native file dialog, and the host side of
//! the presentation bridge.
//!
//! **Dependency rule**: this layer may depend on `application` and `smug_core`,
//! but MUST NOT be imported by the `application` layer.

pub mod dialog;
pub mod grpc;
pub mod process;
pub mod storage;
pub mod ui_bridge;
