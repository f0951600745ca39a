//! SmugMug Backup desktop shell entry point.
//!
//! Wires together the backend supervisor, the health monitor, the config
//! store, and the bridge host, then hands control to the headless
//! presentation adapter.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load shell.toml, init logging
//!  └─ Supervisor::spawn()        -- backend child; fatal on failure
//!  └─ BridgeHost::serve()        -- Tokio task, all five operations granted
//!  └─ PresentationAdapter
//!       ├─ mount()               -- load-config
//!       ├─ run_health_timer()    -- Tokio task, health-check every 5 s
//!       └─ run_commands(stdin)   -- until quit / EOF / Ctrl-C
//! ```
//!
//! Teardown runs in reverse: stop the timer, stop the bridge dispatcher,
//! shut down the backend.

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use smug_core::Operation;
use smug_shell::application::manage_config::{ConfigRepository, ConfigStore};
use smug_shell::application::monitor_health::HealthMonitor;
use smug_shell::application::supervise_server::ServerHandle;
use smug_shell::infrastructure::dialog::RfdFilePicker;
use smug_shell::infrastructure::grpc::TonicHealthProbe;
use smug_shell::infrastructure::process::Supervisor;
use smug_shell::infrastructure::storage::local::LocalStorage;
use smug_shell::infrastructure::storage::settings::{load_settings, ShellSettings};
use smug_shell::infrastructure::ui_bridge::{self, BridgeHost, BridgeServices};
use smug_shell::presentation::PresentationAdapter;

/// Outstanding bridge requests before callers wait.
const BRIDGE_QUEUE: usize = 32;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// SmugMug Backup desktop shell.
///
/// Launches the backup backend, watches its health, and applies
/// configuration files through a restricted host bridge.
#[derive(Debug, Parser)]
#[command(name = "smug-shell", version)]
struct Cli {
    /// Backend executable; overrides `backend.program` in the settings file.
    #[arg(long, env = "SMUG_BACKEND")]
    backend: Option<PathBuf>,

    /// Settings file; defaults to `shell.toml` in the platform config dir.
    #[arg(long, env = "SMUG_SETTINGS")]
    settings: Option<PathBuf>,

    /// Directory for persisted data; defaults to the platform data dir.
    #[arg(long, env = "SMUG_STORAGE_DIR")]
    storage_dir: Option<PathBuf>,
}

impl Cli {
    /// Applies command-line overrides on top of the loaded settings.
    fn apply_overrides(&self, mut settings: ShellSettings) -> ShellSettings {
        if let Some(program) = &self.backend {
            settings.backend.program = program.clone();
        }
        settings
    }

    fn storage(&self) -> anyhow::Result<LocalStorage> {
        match &self.storage_dir {
            Some(dir) => Ok(LocalStorage::new(dir)),
            None => LocalStorage::open_default()
                .context("could not determine platform data directory; pass --storage-dir"),
        }
    }
}

/// Forwards stdin lines from a dedicated thread.  The channel closes at EOF.
fn stdin_lines() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    let spawned = std::thread::Builder::new()
        .name("stdin".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.blocking_send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("failed to read stdin: {e}");
                        break;
                    }
                }
            }
        });
    if let Err(e) = spawned {
        warn!("could not start stdin reader: {e}");
    }
    rx
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Settings come first because they carry the default log level.
    let (settings, settings_error) = match load_settings(cli.settings.as_deref()) {
        Ok(settings) => (settings, None),
        Err(e) => (ShellSettings::default(), Some(e)),
    };
    let settings = cli.apply_overrides(settings);

    // Level is overridden by `RUST_LOG`.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&settings.logging.level)),
        )
        .init();

    info!("SmugMug Backup shell starting");
    if let Some(e) = settings_error {
        warn!("using default settings: {e}");
    }

    let storage = cli.storage()?;
    info!("storing data under {}", storage.root().display());

    // ── Backend ───────────────────────────────────────────────────────────────
    let server = ServerHandle::new(settings.backend.default_address.clone());
    let supervisor = Supervisor::spawn(&settings.backend.command(), Arc::clone(&server))
        .context("failed to start backend")?;

    // ── Host services ─────────────────────────────────────────────────────────
    let repository: Arc<dyn ConfigRepository> = Arc::new(storage);
    let config = Arc::new(ConfigStore::new(repository));

    let health = Arc::new(HealthMonitor::new(
        Arc::new(TonicHealthProbe::new(settings.health.timeout())),
        Arc::clone(&server),
        settings.health.service.clone(),
        settings.health.timeout(),
    ));

    let host = Arc::new(BridgeHost::new(
        Operation::ALL,
        BridgeServices {
            picker: Arc::new(RfdFilePicker::default()),
            health,
            config,
            multiple_selection: settings.dialog.multiple,
        },
    ));

    let (client, requests) = ui_bridge::channel(BRIDGE_QUEUE);
    let bridge_cancel = CancellationToken::new();
    let dispatcher = tokio::spawn(Arc::clone(&host).serve(requests, bridge_cancel.clone()));

    // ── Presentation ──────────────────────────────────────────────────────────
    let adapter = PresentationAdapter::new(client);
    if let Err(e) = adapter.mount().await {
        warn!("could not load configuration: {}", e.message);
    }
    adapter.render();

    let timer_cancel = CancellationToken::new();
    let timer = {
        let adapter = Arc::clone(&adapter);
        let cancel = timer_cancel.clone();
        let period = settings.health.interval();
        tokio::spawn(async move { adapter.run_health_timer(period, cancel).await })
    };

    info!("ready; commands: open, health, config, quit");
    tokio::select! {
        _ = adapter.run_commands(stdin_lines(), timer_cancel.clone()) => {}
        signal = tokio::signal::ctrl_c() => match signal {
            Ok(()) => info!("shutdown signal received"),
            Err(e) => warn!("failed to listen for Ctrl-C: {e}"),
        },
    }

    // ── Teardown ──────────────────────────────────────────────────────────────
    timer_cancel.cancel();
    if let Err(e) = timer.await {
        warn!("health timer task failed: {e}");
    }
    bridge_cancel.cancel();
    if let Err(e) = dispatcher.await {
        warn!("bridge dispatcher task failed: {e}");
    }
    supervisor.shutdown().await;

    info!("SmugMug Backup shell stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
