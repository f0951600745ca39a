//! MonitorHealthUseCase: polls the backend's health-check service.
//!
//! Every poll reads the *current* backend address from the [`ServerHandle`],
//! so a handshake that lands between two polls is picked up by the next one.
//! A poll that overlaps an address change may still use the superseded
//! address once; the following poll corrects it.
//!
//! Failures never propagate.  Unreachable backends, failed calls, and
//! timeouts all map to [`HealthStatus::Unknown`] and are logged.  There is no
//! retry and no backoff; the caller's timer decides when to poll again.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error};

#[cfg(test)]
use mockall::automock;

use smug_core::HealthStatus;

use super::supervise_server::ServerHandle;

/// Error type for a single health call.
#[derive(Debug, Error)]
pub enum HealthError {
    /// No channel could be opened to the backend.
    #[error("could not reach backend at {address}: {message}")]
    Unreachable { address: String, message: String },

    /// The channel opened but the `Check` call failed.
    #[error("health call to {address} failed: {message}")]
    Call { address: String, message: String },
}

/// Performs one `grpc.health.v1.Health/Check` call.
///
/// The production implementation lives in `infrastructure::grpc`; tests use
/// the generated `MockHealthProbe`.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn check(&self, address: &str, service: &str) -> Result<HealthStatus, HealthError>;
}

/// Serialized health poller with a cached last status.
pub struct HealthMonitor {
    probe: Arc<dyn HealthProbe>,
    server: Arc<ServerHandle>,
    service: String,
    timeout: Duration,
    // Held for the duration of a poll so at most one call is outstanding.
    in_flight: Mutex<()>,
    last: watch::Sender<HealthStatus>,
}

impl HealthMonitor {
    pub fn new(
        probe: Arc<dyn HealthProbe>,
        server: Arc<ServerHandle>,
        service: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let (last, _) = watch::channel(HealthStatus::Unknown);
        Self {
            probe,
            server,
            service: service.into(),
            timeout,
            in_flight: Mutex::new(()),
            last,
        }
    }

    /// Polls the backend once and returns the observed status.
    ///
    /// Concurrent callers queue behind the poll already in flight.
    pub async fn poll(&self) -> HealthStatus {
        let _in_flight = self.in_flight.lock().await;
        let address = self.server.address();

        let status = match tokio::time::timeout(
            self.timeout,
            self.probe.check(&address, &self.service),
        )
        .await
        {
            Ok(Ok(status)) => {
                debug!("backend at {address} reports {status}");
                status
            }
            Ok(Err(e)) => {
                error!("health check failed: {e}");
                HealthStatus::Unknown
            }
            Err(_) => {
                error!(
                    "health check of {address} timed out after {} ms",
                    self.timeout.as_millis()
                );
                HealthStatus::Unknown
            }
        };

        self.last.send_replace(status);
        status
    }

    /// Status observed by the most recent poll (`Unknown` before the first).
    pub fn last_status(&self) -> HealthStatus {
        *self.last.borrow()
    }

    /// Subscribes to status changes.
    pub fn subscribe(&self) -> watch::Receiver<HealthStatus> {
        self.last.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use mockall::predicate::eq;

    use super::*;

    fn listening_handle(addr: &str) -> Arc<ServerHandle> {
        let handle = ServerHandle::new("localhost:8089");
        handle.apply_line(&format!(r#"{{"listen":"{addr}"}}"#));
        handle
    }

    #[tokio::test]
    async fn test_poll_uses_current_address_and_empty_service() {
        // Arrange
        let mut probe = MockHealthProbe::new();
        probe
            .expect_check()
            .with(eq("127.0.0.1:7000"), eq(""))
            .times(1)
            .returning(|_, _| Ok(HealthStatus::Serving));
        let monitor = HealthMonitor::new(
            Arc::new(probe),
            listening_handle("127.0.0.1:7000"),
            "",
            Duration::from_secs(1),
        );

        // Act
        let status = monitor.poll().await;

        // Assert
        assert_eq!(status, HealthStatus::Serving);
        assert_eq!(monitor.last_status(), HealthStatus::Serving);
    }

    #[tokio::test]
    async fn test_poll_reports_status_verbatim() {
        let mut probe = MockHealthProbe::new();
        probe
            .expect_check()
            .returning(|_, _| Ok(HealthStatus::ServiceUnknown));
        let monitor = HealthMonitor::new(
            Arc::new(probe),
            ServerHandle::new("localhost:8089"),
            "",
            Duration::from_secs(1),
        );

        assert_eq!(monitor.poll().await, HealthStatus::ServiceUnknown);
    }

    #[tokio::test]
    async fn test_poll_failure_maps_to_unknown() {
        // Arrange
        let mut probe = MockHealthProbe::new();
        probe.expect_check().returning(|address, _| {
            Err(HealthError::Unreachable {
                address: address.to_string(),
                message: "connection refused".to_string(),
            })
        });
        let monitor = HealthMonitor::new(
            Arc::new(probe),
            ServerHandle::new("localhost:8089"),
            "",
            Duration::from_secs(1),
        );

        // Act / Assert
        assert_eq!(monitor.poll().await, HealthStatus::Unknown);
    }

    #[tokio::test]
    async fn test_failure_overwrites_previous_status() {
        let mut probe = MockHealthProbe::new();
        let mut seq = mockall::Sequence::new();
        probe
            .expect_check()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(HealthStatus::Serving));
        probe
            .expect_check()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|address, _| {
                Err(HealthError::Call {
                    address: address.to_string(),
                    message: "unavailable".to_string(),
                })
            });
        let monitor = HealthMonitor::new(
            Arc::new(probe),
            ServerHandle::new("localhost:8089"),
            "",
            Duration::from_secs(1),
        );

        monitor.poll().await;
        monitor.poll().await;

        assert_eq!(monitor.last_status(), HealthStatus::Unknown);
    }

    /// Probe that never answers, for timeout tests.
    struct HangingProbe;

    #[async_trait]
    impl HealthProbe for HangingProbe {
        async fn check(&self, _: &str, _: &str) -> Result<HealthStatus, HealthError> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_probe_times_out_as_unknown() {
        let monitor = HealthMonitor::new(
            Arc::new(HangingProbe),
            ServerHandle::new("localhost:8089"),
            "",
            Duration::from_secs(3),
        );

        let status = monitor.poll().await;

        assert_eq!(status, HealthStatus::Unknown);
    }

    /// Probe that records how many calls overlap.
    struct OverlapProbe {
        active: AtomicUsize,
        max_active: AtomicUsize,
    }

    #[async_trait]
    impl HealthProbe for OverlapProbe {
        async fn check(&self, _: &str, _: &str) -> Result<HealthStatus, HealthError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(HealthStatus::Serving)
        }
    }

    #[tokio::test]
    async fn test_concurrent_polls_are_serialized() {
        // Arrange
        let probe = Arc::new(OverlapProbe {
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        });
        let monitor = HealthMonitor::new(
            probe.clone(),
            ServerHandle::new("localhost:8089"),
            "",
            Duration::from_secs(1),
        );

        // Act
        tokio::join!(monitor.poll(), monitor.poll(), monitor.poll());

        // Assert
        assert_eq!(probe.max_active.load(Ordering::SeqCst), 1);
    }
}
