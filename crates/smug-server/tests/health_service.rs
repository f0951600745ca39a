//! End-to-end checks of the reference backend: the handshake names the bound
//! address and the health service answers `SERVING` there.

use std::time::Duration;

use tokio::sync::oneshot;
use tonic::transport::Endpoint;
use tonic_health::pb::health_check_response::ServingStatus;
use tonic_health::pb::health_client::HealthClient;
use tonic_health::pb::HealthCheckRequest;

use smug_core::parse_handshake_line;
use smug_server::{bind, handshake_line, serve, ServerConfig};

#[tokio::test]
async fn test_handshake_address_serves_health() {
    // Arrange
    let listener = bind(&ServerConfig::default()).await.unwrap();
    let bound = listener.local_addr().unwrap();
    let line = handshake_line(&listener).unwrap();
    let announced = parse_handshake_line(&line).unwrap().unwrap();
    assert_eq!(announced, bound.to_string());

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(serve(listener, async {
        let _ = stop_rx.await;
    }));

    // Act
    let channel = Endpoint::from_shared(format!("http://{announced}"))
        .unwrap()
        .connect_timeout(Duration::from_secs(2))
        .connect()
        .await
        .unwrap();
    let response = HealthClient::new(channel)
        .check(HealthCheckRequest {
            service: String::new(),
        })
        .await
        .unwrap()
        .into_inner();

    // Assert
    assert_eq!(response.status, ServingStatus::Serving as i32);

    stop_tx.send(()).unwrap();
    let result = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server did not stop")
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_unknown_service_is_not_found() {
    let listener = bind(&ServerConfig::default()).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(serve(listener, async {
        let _ = stop_rx.await;
    }));

    let channel = Endpoint::from_shared(format!("http://{addr}"))
        .unwrap()
        .connect()
        .await
        .unwrap();
    let result = HealthClient::new(channel)
        .check(HealthCheckRequest {
            service: "smugmug.backup.v1.Uploader".to_string(),
        })
        .await;

    let status = result.unwrap_err();
    assert_eq!(status.code(), tonic::Code::NotFound);

    stop_tx.send(()).unwrap();
    let _ = server.await;
}
