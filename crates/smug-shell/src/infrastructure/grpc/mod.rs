//! gRPC health-check client.
//!
//! Opens a fresh plaintext HTTP/2 channel to `http://<address>` for every
//! poll and calls `grpc.health.v1.Health/Check`.  Channels are not cached:
//! the backend address can change between polls, and polls are seconds
//! apart.

use std::time::Duration;

use async_trait::async_trait;
use tonic::transport::Endpoint;
use tonic_health::pb::health_client::HealthClient;
use tonic_health::pb::HealthCheckRequest;

use smug_core::HealthStatus;

use crate::application::monitor_health::{HealthError, HealthProbe};

/// [`HealthProbe`] backed by `tonic`.
#[derive(Debug, Clone)]
pub struct TonicHealthProbe {
    timeout: Duration,
}

impl TonicHealthProbe {
    /// `timeout` bounds both the connect and the call.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl HealthProbe for TonicHealthProbe {
    async fn check(&self, address: &str, service: &str) -> Result<HealthStatus, HealthError> {
        let unreachable = |message: String| HealthError::Unreachable {
            address: address.to_string(),
            message,
        };

        let endpoint = Endpoint::from_shared(format!("http://{address}"))
            .map_err(|e| unreachable(e.to_string()))?
            .connect_timeout(self.timeout)
            .timeout(self.timeout);
        let channel = endpoint
            .connect()
            .await
            .map_err(|e| unreachable(e.to_string()))?;

        let response = HealthClient::new(channel)
            .check(HealthCheckRequest {
                service: service.to_string(),
            })
            .await
            .map_err(|status| HealthError::Call {
                address: address.to_string(),
                message: format!("{}: {}", status.code(), status.message()),
            })?;

        Ok(HealthStatus::from_wire(response.into_inner().status))
    }
}
