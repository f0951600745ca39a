//! Host side of the presentation bridge.
//!
//! The presentation layer is untrusted.  It never touches the file system,
//! the backend, or the configuration store directly; instead it sends JSON
//! request envelopes through a [`BridgeClient`] and gets back a
//! [`BridgeResponse`] for each one.
//!
//! ```text
//! presentation ──BridgeClient──► mpsc ──► BridgeHost::serve
//!                                             │ decode (strict)
//!                                             │ capability check
//!                                             ▼
//!                      FilePicker / fs / HealthMonitor / ConfigStore
//!                                             │
//! presentation ◄──────── oneshot ◄────────────┘  BridgeResponse
//! ```
//!
//! # Capabilities
//!
//! The set of operations a host will execute is fixed when it is built.  A
//! request for an operation outside that set fails with `capability-denied`
//! before anything runs, even if the operation itself is known.
//!
//! # `BridgeResponse` envelope
//!
//! Every request gets exactly one response with the same shape:
//! `{ id, success, data, error: { kind, message } }`.  Failures never surface
//! as a dropped reply; when the host is gone the client synthesizes a
//! `host-unavailable` response.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use smug_core::{
    BridgeEnvelope, BridgeErrorKind, BridgeFailure, BridgeReply, BridgeRequest, BridgeResponse,
    Operation,
};

use crate::application::manage_config::{ConfigStore, StoreError};
use crate::application::monitor_health::HealthMonitor;
use crate::infrastructure::dialog::FilePicker;

/// Services the host dispatches to.
pub struct BridgeServices {
    pub picker: Arc<dyn FilePicker>,
    pub health: Arc<HealthMonitor>,
    pub config: Arc<ConfigStore>,
    /// Whether `open-file` allows selecting several files.
    pub multiple_selection: bool,
}

/// Validates and executes bridge requests.
pub struct BridgeHost {
    capabilities: HashSet<Operation>,
    services: BridgeServices,
}

impl BridgeHost {
    /// Builds a host that executes only the operations in `capabilities`.
    pub fn new(
        capabilities: impl IntoIterator<Item = Operation>,
        services: BridgeServices,
    ) -> Self {
        let capabilities: HashSet<Operation> = capabilities.into_iter().collect();
        info!(
            "bridge capabilities: {}",
            Operation::ALL
                .iter()
                .filter(|op| capabilities.contains(op))
                .map(|op| op.name())
                .collect::<Vec<_>>()
                .join(", ")
        );
        Self {
            capabilities,
            services,
        }
    }

    /// Returns `true` if this host was granted `op`.
    pub fn allows(&self, op: Operation) -> bool {
        self.capabilities.contains(&op)
    }

    /// Decodes, checks, and executes one JSON request.
    ///
    /// Requests that fail validation are answered without being dispatched.
    /// When not even the id can be recovered the response carries the nil
    /// UUID.
    pub async fn handle_json(&self, text: &str) -> BridgeResponse {
        match BridgeEnvelope::decode(text) {
            Ok(envelope) => self.dispatch(envelope).await,
            Err(e) => {
                warn!("rejected bridge request: {e}");
                BridgeResponse::err(e.id.unwrap_or_else(Uuid::nil), e.kind, e.message)
            }
        }
    }

    /// Executes an already validated request if its capability was granted.
    pub async fn dispatch(&self, envelope: BridgeEnvelope) -> BridgeResponse {
        let BridgeEnvelope { id, request } = envelope;
        let op = request.operation();

        if !self.allows(op) {
            warn!("denied bridge operation `{op}`");
            return BridgeResponse::err(
                id,
                BridgeErrorKind::CapabilityDenied,
                format!("operation `{op}` is not enabled for this bridge"),
            );
        }

        debug!("bridge {id}: {op}");
        match self.execute(request).await {
            Ok(reply) => BridgeResponse::ok(id, reply),
            Err(failure) => {
                warn!("bridge operation `{op}` failed: {}", failure.message);
                BridgeResponse {
                    id,
                    success: false,
                    data: None,
                    error: Some(failure),
                }
            }
        }
    }

    async fn execute(&self, request: BridgeRequest) -> Result<BridgeReply, BridgeFailure> {
        match request {
            BridgeRequest::OpenFile => {
                let paths = self
                    .services
                    .picker
                    .pick(self.services.multiple_selection)
                    .await
                    .map_err(|e| failure(BridgeErrorKind::DialogFailed, e))?;
                Ok(BridgeReply::Files(
                    paths
                        .into_iter()
                        .map(|p| p.to_string_lossy().into_owned())
                        .collect(),
                ))
            }
            BridgeRequest::ReadFile { path } => {
                let bytes = tokio::fs::read(&path)
                    .await
                    .map_err(|e| failure(BridgeErrorKind::IoError, format!("{path}: {e}")))?;
                let text = String::from_utf8(bytes).map_err(|_| {
                    failure(BridgeErrorKind::IoError, format!("{path}: not valid UTF-8"))
                })?;
                Ok(BridgeReply::Text(text))
            }
            BridgeRequest::HealthCheck => Ok(BridgeReply::Health(self.services.health.poll().await)),
            // The config store does blocking file I/O.
            BridgeRequest::LoadConfig => {
                let config = Arc::clone(&self.services.config);
                let current = tokio::task::spawn_blocking(move || config.current())
                    .await
                    .map_err(config_task_failed)?;
                Ok(BridgeReply::Config(current))
            }
            BridgeRequest::ApplyConfig { text } => {
                let config = Arc::clone(&self.services.config);
                tokio::task::spawn_blocking(move || config.apply_overlay(&text))
                    .await
                    .map_err(config_task_failed)?
                    .map(BridgeReply::Config)
                    .map_err(|e| {
                        let kind = if matches!(e, StoreError::Parse(_)) {
                            BridgeErrorKind::ConfigParse
                        } else {
                            BridgeErrorKind::IoError
                        };
                        failure(kind, e)
                    })
            }
        }
    }

    /// Serves requests from `requests` until `cancel` fires or every client
    /// is dropped.
    ///
    /// Each request runs on its own task, so a slow dialog does not hold up a
    /// health check and responses may complete out of order.
    pub async fn serve(
        self: Arc<Self>,
        mut requests: mpsc::Receiver<BridgeCall>,
        cancel: CancellationToken,
    ) {
        loop {
            let call = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                call = requests.recv() => match call {
                    Some(call) => call,
                    None => break,
                },
            };

            let host = Arc::clone(&self);
            tokio::spawn(async move {
                let response = host.handle_json(&call.request).await;
                if call.reply.send(response).is_err() {
                    debug!("bridge caller went away before the response");
                }
            });
        }
        info!("bridge dispatcher stopped");
    }
}

fn config_task_failed(e: tokio::task::JoinError) -> BridgeFailure {
    failure(BridgeErrorKind::IoError, format!("config task failed: {e}"))
}

fn failure(kind: BridgeErrorKind, message: impl ToString) -> BridgeFailure {
    BridgeFailure {
        kind,
        message: message.to_string(),
    }
}

// ── Transport ─────────────────────────────────────────────────────────────────

/// One request in flight: JSON text plus its reply slot.
#[derive(Debug)]
pub struct BridgeCall {
    pub request: String,
    pub reply: oneshot::Sender<BridgeResponse>,
}

/// Presentation-side handle to the bridge.
#[derive(Debug, Clone)]
pub struct BridgeClient {
    tx: mpsc::Sender<BridgeCall>,
}

/// Creates a client and the receiver a [`BridgeHost`] serves.
pub fn channel(buffer: usize) -> (BridgeClient, mpsc::Receiver<BridgeCall>) {
    let (tx, rx) = mpsc::channel(buffer.max(1));
    (BridgeClient { tx }, rx)
}

impl BridgeClient {
    /// Sends a typed request and waits for its response.
    pub async fn call(&self, request: BridgeRequest) -> BridgeResponse {
        let envelope = BridgeEnvelope::new(request);
        self.send(envelope.id, envelope.to_json()).await
    }

    /// Sends raw JSON text, exactly as an untrusted caller would.
    pub async fn call_json(&self, text: impl Into<String>) -> BridgeResponse {
        self.send(Uuid::nil(), text.into()).await
    }

    async fn send(&self, id: Uuid, request: String) -> BridgeResponse {
        let (reply, response) = oneshot::channel();
        if self.tx.send(BridgeCall { request, reply }).await.is_err() {
            return host_unavailable(id);
        }
        response.await.unwrap_or_else(|_| host_unavailable(id))
    }
}

fn host_unavailable(id: Uuid) -> BridgeResponse {
    BridgeResponse::err(
        id,
        BridgeErrorKind::HostUnavailable,
        "bridge host is not running",
    )
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::time::Duration;

    use smug_core::{Config, HealthStatus};

    use super::*;
    use crate::application::manage_config::{ConfigRepository, MockConfigRepository};
    use crate::application::monitor_health::MockHealthProbe;
    use crate::application::supervise_server::ServerHandle;
    use crate::infrastructure::dialog::{DialogError, MockFilePicker};

    fn memory_repo() -> MockConfigRepository {
        let mut repo = MockConfigRepository::new();
        repo.expect_read().returning(|_| Ok(None));
        repo.expect_write().returning(|_, _| Ok(()));
        repo
    }

    fn serving_probe() -> MockHealthProbe {
        let mut probe = MockHealthProbe::new();
        probe
            .expect_check()
            .returning(|_, _| Ok(HealthStatus::Serving));
        probe
    }

    fn host_with(picker: MockFilePicker, ops: &[Operation]) -> BridgeHost {
        let health = HealthMonitor::new(
            Arc::new(serving_probe()),
            ServerHandle::new("localhost:8089"),
            "",
            Duration::from_secs(1),
        );
        BridgeHost::new(
            ops.iter().copied(),
            BridgeServices {
                picker: Arc::new(picker),
                health: Arc::new(health),
                config: Arc::new(ConfigStore::new(Arc::new(memory_repo()))),
                multiple_selection: false,
            },
        )
    }

    fn full_host(picker: MockFilePicker) -> BridgeHost {
        host_with(picker, &Operation::ALL)
    }

    #[tokio::test]
    async fn test_open_file_cancel_is_empty_success() {
        // Arrange
        let mut picker = MockFilePicker::new();
        picker.expect_pick().times(1).returning(|_| Ok(Vec::new()));
        let host = full_host(picker);

        // Act
        let response = host.dispatch(BridgeEnvelope::new(BridgeRequest::OpenFile)).await;

        // Assert
        assert!(response.success);
        assert_eq!(response.data, Some(BridgeReply::Files(Vec::new())));
    }

    #[tokio::test]
    async fn test_open_file_returns_paths_in_order() {
        let mut picker = MockFilePicker::new();
        picker
            .expect_pick()
            .with(mockall::predicate::eq(false))
            .returning(|_| Ok(vec![PathBuf::from("/b.json"), PathBuf::from("/a.json")]));
        let host = full_host(picker);

        let response = host.dispatch(BridgeEnvelope::new(BridgeRequest::OpenFile)).await;

        assert_eq!(
            response.into_result(),
            Ok(BridgeReply::Files(vec!["/b.json".to_string(), "/a.json".to_string()]))
        );
    }

    #[tokio::test]
    async fn test_open_file_dialog_error_is_dialog_failed() {
        let mut picker = MockFilePicker::new();
        picker.expect_pick().returning(|_| Err(DialogError::NoDisplay));
        let host = full_host(picker);

        let response = host.dispatch(BridgeEnvelope::new(BridgeRequest::OpenFile)).await;

        assert_eq!(
            response.error.map(|e| e.kind),
            Some(BridgeErrorKind::DialogFailed)
        );
    }

    #[tokio::test]
    async fn test_read_missing_file_is_io_error() {
        let host = full_host(MockFilePicker::new());

        let response = host
            .dispatch(BridgeEnvelope::new(BridgeRequest::ReadFile {
                path: "/nonexistent/smug/config.json".to_string(),
            }))
            .await;

        assert!(!response.success);
        assert_eq!(response.error.map(|e| e.kind), Some(BridgeErrorKind::IoError));
    }

    #[tokio::test]
    async fn test_read_non_utf8_file_is_io_error() {
        // Arrange
        let path = std::env::temp_dir().join(format!("smug_bin_{}.dat", Uuid::new_v4()));
        std::fs::write(&path, [0xff, 0xfe, 0x00, 0x80]).unwrap();
        let host = full_host(MockFilePicker::new());

        // Act
        let response = host
            .dispatch(BridgeEnvelope::new(BridgeRequest::ReadFile {
                path: path.to_string_lossy().into_owned(),
            }))
            .await;

        // Assert
        assert_eq!(response.error.map(|e| e.kind), Some(BridgeErrorKind::IoError));
        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn test_health_check_returns_polled_status() {
        let host = full_host(MockFilePicker::new());

        let response = host.dispatch(BridgeEnvelope::new(BridgeRequest::HealthCheck)).await;

        assert_eq!(
            response.into_result(),
            Ok(BridgeReply::Health(HealthStatus::Serving))
        );
    }

    #[tokio::test]
    async fn test_load_config_initializes_defaults() {
        let host = full_host(MockFilePicker::new());

        let response = host.dispatch(BridgeEnvelope::new(BridgeRequest::LoadConfig)).await;

        assert_eq!(
            response.into_result(),
            Ok(BridgeReply::Config(Config::default()))
        );
    }

    #[tokio::test]
    async fn test_apply_config_malformed_is_config_parse() {
        let host = full_host(MockFilePicker::new());

        let response = host
            .dispatch(BridgeEnvelope::new(BridgeRequest::ApplyConfig {
                text: "{ nope".to_string(),
            }))
            .await;

        assert_eq!(
            response.error.map(|e| e.kind),
            Some(BridgeErrorKind::ConfigParse)
        );
    }

    #[tokio::test]
    async fn test_operation_outside_capabilities_is_denied_without_dispatch() {
        // Arrange: the picker must never be invoked
        let mut picker = MockFilePicker::new();
        picker.expect_pick().never();
        let host = host_with(picker, &[Operation::HealthCheck]);

        // Act
        let response = host.dispatch(BridgeEnvelope::new(BridgeRequest::OpenFile)).await;

        // Assert
        assert_eq!(
            response.error.map(|e| e.kind),
            Some(BridgeErrorKind::CapabilityDenied)
        );
        assert!(!host.allows(Operation::OpenFile));
        assert!(host.allows(Operation::HealthCheck));
    }

    #[tokio::test]
    async fn test_handle_json_unknown_operation_keeps_id() {
        let host = full_host(MockFilePicker::new());
        let id = Uuid::new_v4();

        let response = host
            .handle_json(&format!(r#"{{"id":"{id}","op":"spawn-process"}}"#))
            .await;

        assert_eq!(response.id, id);
        assert_eq!(
            response.error.map(|e| e.kind),
            Some(BridgeErrorKind::UnknownOperation)
        );
    }

    #[tokio::test]
    async fn test_client_reports_host_unavailable_when_receiver_dropped() {
        let (client, rx) = channel(4);
        drop(rx);

        let response = client.call(BridgeRequest::HealthCheck).await;

        assert_eq!(
            response.error.map(|e| e.kind),
            Some(BridgeErrorKind::HostUnavailable)
        );
    }

    #[tokio::test]
    async fn test_serve_answers_until_cancelled() {
        // Arrange
        let host = Arc::new(full_host(MockFilePicker::new()));
        let (client, rx) = channel(4);
        let cancel = CancellationToken::new();
        let server = tokio::spawn(Arc::clone(&host).serve(rx, cancel.clone()));

        // Act
        let before = client.call(BridgeRequest::HealthCheck).await;
        cancel.cancel();
        server.await.unwrap();
        let after = client.call(BridgeRequest::HealthCheck).await;

        // Assert
        assert!(before.success);
        assert_eq!(
            after.error.map(|e| e.kind),
            Some(BridgeErrorKind::HostUnavailable)
        );
    }

    /// Repository whose read blocks the calling thread until released.
    struct GatedRepository {
        entered: Mutex<Option<oneshot::Sender<()>>>,
        release: Mutex<std::sync::mpsc::Receiver<()>>,
    }

    impl ConfigRepository for GatedRepository {
        fn read(&self, _key: &str) -> Result<Option<String>, StoreError> {
            if let Some(tx) = self.entered.lock().unwrap().take() {
                let _ = tx.send(());
            }
            let released = self
                .release
                .lock()
                .unwrap()
                .recv_timeout(Duration::from_secs(2))
                .is_ok();
            Ok(released.then(|| r#"{"auth":{"api_key":"released"}}"#.to_string()))
        }

        fn write(&self, _key: &str, _value: &str) -> Result<(), StoreError> {
            Ok(())
        }
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_load_config_storage_io_leaves_runtime_free() {
        // Arrange: the read can only finish once this task runs again.
        let (entered_tx, entered_rx) = oneshot::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel();
        let repo = GatedRepository {
            entered: Mutex::new(Some(entered_tx)),
            release: Mutex::new(release_rx),
        };
        let health = HealthMonitor::new(
            Arc::new(serving_probe()),
            ServerHandle::new("localhost:8089"),
            "",
            Duration::from_secs(1),
        );
        let host = Arc::new(BridgeHost::new(
            Operation::ALL,
            BridgeServices {
                picker: Arc::new(MockFilePicker::new()),
                health: Arc::new(health),
                config: Arc::new(ConfigStore::new(Arc::new(repo))),
                multiple_selection: false,
            },
        ));

        // Act
        let pending = {
            let host = Arc::clone(&host);
            tokio::spawn(async move {
                host.dispatch(BridgeEnvelope::new(BridgeRequest::LoadConfig))
                    .await
            })
        };
        entered_rx.await.unwrap();
        release_tx.send(()).unwrap();
        let response = pending.await.unwrap();

        // Assert
        let Some(BridgeReply::Config(config)) = response.data else {
            panic!("expected a config reply, got {:?}", response.error);
        };
        assert_eq!(config.auth.api_key, "released");
    }
}
