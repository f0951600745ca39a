//! Request/response protocol of the presentation bridge.
//!
//! The presentation layer is untrusted.  It can only ask the host to perform
//! one of a fixed set of named operations, each a single request/response
//! exchange.  Requests travel as JSON text so the host can validate them
//! strictly before anything is dispatched.
//!
//! # Request format
//!
//! ```json
//! {"id":"6f1c…","op":"read-file","args":{"path":"/home/me/config.json"}}
//! {"id":"0b9e…","op":"health-check"}
//! ```
//!
//! # Response format
//!
//! Every response has the same shape, whatever the operation:
//!
//! ```json
//! {"id":"6f1c…","success":true,"data":{"kind":"text","value":"{…}"},"error":null}
//! {"id":"6f1c…","success":false,"data":null,"error":{"kind":"io-error","message":"…"}}
//! ```
//!
//! # Validation
//!
//! Decoding never guesses.  An operation name outside [`Operation::ALL`] is
//! [`BridgeErrorKind::UnknownOperation`]; extra envelope fields, extra or
//! missing arguments, and wrongly typed arguments are
//! [`BridgeErrorKind::InvalidPayload`].

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::config::Config;
use crate::domain::health::HealthStatus;

// ── Operations ────────────────────────────────────────────────────────────────

/// The closed set of bridge operations, by stable name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `open-file`: show the native file picker.
    OpenFile,
    /// `read-file`: read a file as UTF-8 text.
    ReadFile,
    /// `health-check`: poll the backend and return its status.
    HealthCheck,
    /// `load-config`: return the current merged configuration.
    LoadConfig,
    /// `apply-config`: overlay a configuration fragment and persist the result.
    ApplyConfig,
}

impl Operation {
    /// Every operation the bridge knows about.
    pub const ALL: [Operation; 5] = [
        Operation::OpenFile,
        Operation::ReadFile,
        Operation::HealthCheck,
        Operation::LoadConfig,
        Operation::ApplyConfig,
    ];

    /// Stable routing name used on the wire.
    pub fn name(self) -> &'static str {
        match self {
            Self::OpenFile => "open-file",
            Self::ReadFile => "read-file",
            Self::HealthCheck => "health-check",
            Self::LoadConfig => "load-config",
            Self::ApplyConfig => "apply-config",
        }
    }

    /// Looks up an operation by its wire name.  Matching is exact.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.name() == name)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ── Requests ──────────────────────────────────────────────────────────────────

/// A validated bridge request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeRequest {
    OpenFile,
    ReadFile { path: String },
    HealthCheck,
    LoadConfig,
    /// `text` is the raw content of a configuration fragment, usually the
    /// result of a preceding `read-file`.
    ApplyConfig { text: String },
}

impl BridgeRequest {
    /// The operation this request invokes.
    pub fn operation(&self) -> Operation {
        match self {
            Self::OpenFile => Operation::OpenFile,
            Self::ReadFile { .. } => Operation::ReadFile,
            Self::HealthCheck => Operation::HealthCheck,
            Self::LoadConfig => Operation::LoadConfig,
            Self::ApplyConfig { .. } => Operation::ApplyConfig,
        }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ReadFileArgs {
    path: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ApplyConfigArgs {
    text: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawEnvelope {
    id: Uuid,
    op: String,
    #[serde(default)]
    args: Option<Value>,
}

#[derive(Serialize)]
struct WireEnvelope {
    id: Uuid,
    op: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    args: Option<Value>,
}

/// A request together with its correlation id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeEnvelope {
    pub id: Uuid,
    pub request: BridgeRequest,
}

/// Error produced when a request envelope fails validation.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct DecodeError {
    /// Correlation id, when the envelope was readable far enough to have one.
    pub id: Option<Uuid>,
    pub kind: BridgeErrorKind,
    pub message: String,
}

impl DecodeError {
    fn invalid(id: Option<Uuid>, message: impl Into<String>) -> Self {
        Self {
            id,
            kind: BridgeErrorKind::InvalidPayload,
            message: message.into(),
        }
    }
}

impl BridgeEnvelope {
    /// Wraps `request` with a fresh random id.
    pub fn new(request: BridgeRequest) -> Self {
        Self {
            id: Uuid::new_v4(),
            request,
        }
    }

    /// Encodes the envelope as a single-line JSON string.
    pub fn to_json(&self) -> String {
        let args = match &self.request {
            BridgeRequest::ReadFile { path } => Some(serde_json::json!({ "path": path })),
            BridgeRequest::ApplyConfig { text } => Some(serde_json::json!({ "text": text })),
            BridgeRequest::OpenFile | BridgeRequest::HealthCheck | BridgeRequest::LoadConfig => {
                None
            }
        };
        let wire = WireEnvelope {
            id: self.id,
            op: self.request.operation().name(),
            args,
        };
        // Only strings and a UUID go into the envelope, so encoding cannot fail.
        serde_json::to_string(&wire).unwrap_or_default()
    }

    /// Decodes and validates a JSON request envelope.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] describing why the request was rejected.
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        let raw: RawEnvelope = serde_json::from_str(text).map_err(|e| {
            // Try to recover the id so the rejection can still be correlated.
            let id = serde_json::from_str::<Value>(text)
                .ok()
                .and_then(|v| v.get("id").and_then(Value::as_str).map(str::to_string))
                .and_then(|s| Uuid::parse_str(&s).ok());
            DecodeError::invalid(id, format!("malformed request envelope: {e}"))
        })?;

        let id = raw.id;
        let op = Operation::from_name(&raw.op).ok_or_else(|| DecodeError {
            id: Some(id),
            kind: BridgeErrorKind::UnknownOperation,
            message: format!("unknown operation `{}`", raw.op),
        })?;

        let request = match op {
            Operation::OpenFile => {
                expect_no_args(id, op, raw.args)?;
                BridgeRequest::OpenFile
            }
            Operation::HealthCheck => {
                expect_no_args(id, op, raw.args)?;
                BridgeRequest::HealthCheck
            }
            Operation::LoadConfig => {
                expect_no_args(id, op, raw.args)?;
                BridgeRequest::LoadConfig
            }
            Operation::ReadFile => {
                let args: ReadFileArgs = decode_args(id, op, raw.args)?;
                BridgeRequest::ReadFile { path: args.path }
            }
            Operation::ApplyConfig => {
                let args: ApplyConfigArgs = decode_args(id, op, raw.args)?;
                BridgeRequest::ApplyConfig { text: args.text }
            }
        };

        Ok(Self { id, request })
    }
}

fn expect_no_args(id: Uuid, op: Operation, args: Option<Value>) -> Result<(), DecodeError> {
    match args {
        None | Some(Value::Null) => Ok(()),
        Some(Value::Object(map)) if map.is_empty() => Ok(()),
        Some(_) => Err(DecodeError::invalid(
            Some(id),
            format!("`{op}` takes no arguments"),
        )),
    }
}

fn decode_args<T: serde::de::DeserializeOwned>(
    id: Uuid,
    op: Operation,
    args: Option<Value>,
) -> Result<T, DecodeError> {
    let args = args
        .ok_or_else(|| DecodeError::invalid(Some(id), format!("`{op}` requires arguments")))?;
    serde_json::from_value(args)
        .map_err(|e| DecodeError::invalid(Some(id), format!("invalid arguments for `{op}`: {e}")))
}

// ── Responses ─────────────────────────────────────────────────────────────────

/// Typed result of a successful operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "kebab-case")]
pub enum BridgeReply {
    /// Paths chosen in the file picker, in selection order.
    Files(Vec<String>),
    /// File contents.
    Text(String),
    /// Result of a health poll.
    Health(HealthStatus),
    /// The current merged configuration.
    Config(Config),
}

/// Stable failure categories reported to the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BridgeErrorKind {
    /// A file could not be read or is not valid UTF-8.
    IoError,
    /// The request envelope or its arguments failed validation.
    InvalidPayload,
    /// The operation name is not part of the bridge.
    UnknownOperation,
    /// The operation exists but this bridge was not granted it.
    CapabilityDenied,
    /// A configuration fragment could not be parsed.
    ConfigParse,
    /// The native file dialog failed to open.
    DialogFailed,
    /// The host side of the bridge is gone.
    HostUnavailable,
}

impl BridgeErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::IoError => "io-error",
            Self::InvalidPayload => "invalid-payload",
            Self::UnknownOperation => "unknown-operation",
            Self::CapabilityDenied => "capability-denied",
            Self::ConfigParse => "config-parse",
            Self::DialogFailed => "dialog-failed",
            Self::HostUnavailable => "host-unavailable",
        }
    }
}

impl fmt::Display for BridgeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure detail carried in a [`BridgeResponse`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeFailure {
    pub kind: BridgeErrorKind,
    pub message: String,
}

/// Uniform response envelope for every bridge operation.
///
/// The presentation layer can always inspect `success` first; exactly one of
/// `data` and `error` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeResponse {
    pub id: Uuid,
    pub success: bool,
    pub data: Option<BridgeReply>,
    pub error: Option<BridgeFailure>,
}

impl BridgeResponse {
    pub fn ok(id: Uuid, data: BridgeReply) -> Self {
        Self {
            id,
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(id: Uuid, kind: BridgeErrorKind, message: impl Into<String>) -> Self {
        Self {
            id,
            success: false,
            data: None,
            error: Some(BridgeFailure {
                kind,
                message: message.into(),
            }),
        }
    }

    /// Converts the envelope back into a `Result` for typed consumers.
    pub fn into_result(self) -> Result<BridgeReply, BridgeFailure> {
        match (self.data, self.error) {
            (Some(data), None) if self.success => Ok(data),
            (_, Some(error)) => Err(error),
            _ => Err(BridgeFailure {
                kind: BridgeErrorKind::InvalidPayload,
                message: "response carries neither data nor error".to_string(),
            }),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
