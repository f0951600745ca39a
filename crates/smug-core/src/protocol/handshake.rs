//! Backend start-up handshake.
//!
//! Once the backend has bound its listener it prints one JSON object per line
//! on stdout.  The shell recognises a single field:
//!
//! ```json
//! {"listen": "127.0.0.1:50213"}
//! ```
//!
//! Other fields are ignored, and so are records without `listen`.  Lines that
//! are not JSON objects are reported as [`HandshakeError::Malformed`] or
//! [`HandshakeError::NotAnObject`] so the caller can log them; they are never
//! fatal.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for handshake line parsing.
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// The line is not a JSON record, or `listen` is not a string.
    #[error("malformed handshake line: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The line is valid JSON but not an object.
    #[error("handshake line is not a JSON object")]
    NotAnObject,

    /// The record carries a `listen` field with no address in it.
    #[error("handshake line announced an empty listen address")]
    EmptyAddress,
}

#[derive(Debug, Serialize, Deserialize)]
struct HandshakeRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    listen: Option<String>,
}

/// Parses one line of backend stdout.
///
/// Returns `Ok(Some(address))` for a handshake record, `Ok(None)` for a valid
/// JSON record without a `listen` field (and for blank lines).
///
/// # Errors
///
/// See [`HandshakeError`].
pub fn parse_handshake_line(line: &str) -> Result<Option<String>, HandshakeError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    // Derived `Deserialize` would also accept `["addr"]` as a record.
    let value: serde_json::Value = serde_json::from_str(line)?;
    if !value.is_object() {
        return Err(HandshakeError::NotAnObject);
    }
    let record: HandshakeRecord = serde_json::from_value(value)?;
    match record.listen {
        Some(addr) if addr.trim().is_empty() => Err(HandshakeError::EmptyAddress),
        Some(addr) => Ok(Some(addr.trim().to_string())),
        None => Ok(None),
    }
}

/// Renders the handshake line a backend prints after binding `listen`.
///
/// The returned string has no trailing newline.
pub fn encode_handshake(listen: &str) -> String {
    let record = HandshakeRecord {
        listen: Some(listen.to_string()),
    };
    // A struct holding one `Option<String>` always serializes.
    serde_json::to_string(&record).unwrap_or_else(|_| format!("{{\"listen\":\"{listen}\"}}"))
}
