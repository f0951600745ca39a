//! smug-server entry point.
//!
//! Binds an ephemeral loopback port, announces it on stdout with a single
//! handshake record, and serves the gRPC health service until Ctrl-C.
//!
//! # Usage
//!
//! ```text
//! smug-server [OPTIONS]
//!
//! Options:
//!   --host <HOST>   Address to bind [default: 127.0.0.1]
//!   --port <PORT>   Port to bind; 0 picks a free one [default: 0]
//! ```
//!
//! | Variable           | Default     |
//! |--------------------|-------------|
//! | `SMUG_SERVER_HOST` | `127.0.0.1` |
//! | `SMUG_SERVER_PORT` | `0`         |

use std::io::Write;
use std::net::SocketAddr;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use smug_server::{bind, handshake_line, serve, ServerConfig};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Reference backend for the SmugMug Backup shell.
#[derive(Debug, Parser)]
#[command(name = "smug-server", version)]
struct Cli {
    /// IP address to bind.
    #[arg(long, default_value = "127.0.0.1", env = "SMUG_SERVER_HOST")]
    host: String,

    /// TCP port to bind; `0` lets the OS choose.
    #[arg(long, default_value_t = 0, env = "SMUG_SERVER_PORT")]
    port: u16,
}

impl Cli {
    /// Converts the parsed CLI arguments into a [`ServerConfig`].
    ///
    /// # Errors
    ///
    /// Returns an error if `--host` is not a valid IP address.
    fn into_server_config(self) -> anyhow::Result<ServerConfig> {
        let bind_addr: SocketAddr = format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid bind address: '{}:{}'", self.host, self.port))?;
        Ok(ServerConfig { bind_addr })
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout is reserved for handshake records.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Cli::parse().into_server_config()?;
    let listener = bind(&config).await?;

    {
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{}", handshake_line(&listener)?).context("failed to write handshake")?;
        stdout.flush().context("failed to flush handshake")?;
    }

    serve(listener, async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("received Ctrl-C; shutting down"),
            Err(e) => error!("failed to listen for Ctrl-C signal: {e}"),
        }
    })
    .await?;

    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["smug-server"]);

        assert_eq!(cli.host, "127.0.0.1");
        assert_eq!(cli.port, 0);
    }

    #[test]
    fn test_cli_port_override() {
        let cli = Cli::parse_from(["smug-server", "--port", "50051"]);
        assert_eq!(cli.port, 50051);
    }

    #[test]
    fn test_into_server_config_default_is_ephemeral_loopback() {
        let config = Cli::parse_from(["smug-server"]).into_server_config().unwrap();
        assert_eq!(config, ServerConfig::default());
    }

    #[test]
    fn test_into_server_config_ipv6_host() {
        let cli = Cli {
            host: "[::1]".to_string(),
            port: 7000,
        };

        let config = cli.into_server_config().unwrap();

        assert_eq!(config.bind_addr.to_string(), "[::1]:7000");
    }

    #[test]
    fn test_into_server_config_invalid_host_returns_error() {
        let cli = Cli {
            host: "not.an.ip".to_string(),
            port: 0,
        };

        assert!(cli.into_server_config().is_err());
    }
}
