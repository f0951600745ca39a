//! smug-server library crate.
//!
//! A minimal backend that speaks the two contracts the desktop shell relies
//! on, for local development and integration tests:
//!
//! 1. After binding its listener it prints one handshake record on stdout:
//!    `{"listen":"127.0.0.1:50213"}`.
//! 2. It serves `grpc.health.v1.Health` on that listener, reporting the
//!    whole server (service `""`) as `SERVING`.
//!
//! ```text
//! bind(config) ──► TcpListener ──► handshake_line() ──► stdout
//!                       │
//!                       └──► serve(listener, shutdown) ── tonic + tonic-health
//! ```
//!
//! Logging goes to stderr so it never interleaves with handshake records.

use std::future::Future;
use std::io;
use std::net::SocketAddr;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tonic_health::ServingStatus;
use tracing::info;

use smug_core::encode_handshake;

/// Error type for the reference backend.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listener could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// The bound listener has no local address.
    #[error("could not read listener address: {0}")]
    LocalAddr(#[source] io::Error),

    /// The gRPC server failed while serving.
    #[error("gRPC transport error: {0}")]
    Transport(#[from] tonic::transport::Error),
}

/// Runtime configuration of the reference backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address to bind.  Port `0` picks an ephemeral port.
    pub bind_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
        }
    }
}

/// Binds the listener described by `config`.
///
/// # Errors
///
/// Returns [`ServerError::Bind`] if the address is unavailable.
pub async fn bind(config: &ServerConfig) -> Result<TcpListener, ServerError> {
    TcpListener::bind(config.bind_addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: config.bind_addr,
            source,
        })
}

/// Handshake record announcing `listener`'s actual address.
///
/// # Errors
///
/// Returns [`ServerError::LocalAddr`] if the OS cannot report the address.
pub fn handshake_line(listener: &TcpListener) -> Result<String, ServerError> {
    let addr = listener.local_addr().map_err(ServerError::LocalAddr)?;
    Ok(encode_handshake(&addr.to_string()))
}

/// Serves the gRPC health service on `listener` until `shutdown` resolves.
///
/// # Errors
///
/// Returns [`ServerError::Transport`] if the server fails.
pub async fn serve<F>(listener: TcpListener, shutdown: F) -> Result<(), ServerError>
where
    F: Future<Output = ()>,
{
    let (mut reporter, health_service) = tonic_health::server::health_reporter();
    reporter
        .set_service_status("", ServingStatus::Serving)
        .await;

    if let Ok(addr) = listener.local_addr() {
        info!("health service listening on {addr}");
    }

    Server::builder()
        .add_service(health_service)
        .serve_with_incoming_shutdown(TcpListenerStream::new(listener), shutdown)
        .await?;

    info!("health service stopped");
    Ok(())
}
