//! Wire formats shared between the shell, the backend, and the presentation
//! layer.
//!
//! - **`handshake`** – The one-line JSON record a backend prints on stdout to
//!   announce its listen address.
//! - **`bridge`** – The closed set of operations the presentation layer may
//!   request from the host, and the uniform response envelope.

pub mod bridge;
pub mod handshake;
