//! Serving-status enumeration reported by backend health polls.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Outcome of a single health poll.
///
/// The variants mirror `grpc.health.v1.HealthCheckResponse.ServingStatus`.
/// `Unknown` doubles as the "could not reach the backend" result: a poll that
/// fails at the transport or call level reports `Unknown`.
///
/// Serialized in the same upper-case form the gRPC enum uses, e.g.
/// `"NOT_SERVING"`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthStatus {
    #[default]
    Unknown,
    Serving,
    NotServing,
    ServiceUnknown,
}

impl HealthStatus {
    /// Maps the protobuf enum value of `ServingStatus` to a status.
    ///
    /// Values outside the known range map to [`HealthStatus::Unknown`].
    pub fn from_wire(value: i32) -> Self {
        match value {
            1 => Self::Serving,
            2 => Self::NotServing,
            3 => Self::ServiceUnknown,
            _ => Self::Unknown,
        }
    }

    /// Returns the protobuf enum value for this status.
    pub fn to_wire(self) -> i32 {
        match self {
            Self::Unknown => 0,
            Self::Serving => 1,
            Self::NotServing => 2,
            Self::ServiceUnknown => 3,
        }
    }

    /// Upper-case name as it appears on the wire and in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::Serving => "SERVING",
            Self::NotServing => "NOT_SERVING",
            Self::ServiceUnknown => "SERVICE_UNKNOWN",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_wire_maps_known_values() {
        assert_eq!(HealthStatus::from_wire(0), HealthStatus::Unknown);
        assert_eq!(HealthStatus::from_wire(1), HealthStatus::Serving);
        assert_eq!(HealthStatus::from_wire(2), HealthStatus::NotServing);
        assert_eq!(HealthStatus::from_wire(3), HealthStatus::ServiceUnknown);
    }

    #[test]
    fn test_from_wire_out_of_range_is_unknown() {
        assert_eq!(HealthStatus::from_wire(42), HealthStatus::Unknown);
        assert_eq!(HealthStatus::from_wire(-1), HealthStatus::Unknown);
    }

    #[test]
    fn test_to_wire_inverts_from_wire() {
        for status in [
            HealthStatus::Unknown,
            HealthStatus::Serving,
            HealthStatus::NotServing,
            HealthStatus::ServiceUnknown,
        ] {
            assert_eq!(HealthStatus::from_wire(status.to_wire()), status);
        }
    }

    #[test]
    fn test_serializes_in_grpc_enum_spelling() {
        let json = serde_json::to_string(&HealthStatus::NotServing).unwrap();
        assert_eq!(json, r#""NOT_SERVING""#);
    }

    #[test]
    fn test_default_is_unknown() {
        assert_eq!(HealthStatus::default(), HealthStatus::Unknown);
    }
}
