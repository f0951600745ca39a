//! Headless presentation adapter.
//!
//! Thin glue between a user and the bridge.  It holds only a [`BridgeClient`]
//! and a render copy of what it has learned ([`ViewModel`]); every change to
//! the configuration goes through the host.
//!
//! # Commands
//!
//! Read one per line from the input stream:
//!
//! | Command  | Effect                                                     |
//! |----------|------------------------------------------------------------|
//! | `open`   | pick a file, read it, apply it as a config overlay         |
//! | `health` | poll the backend now                                       |
//! | `config` | render the current config                                  |
//! | `quit`   | stop reading commands                                      |
//!
//! # Overlapping opens
//!
//! `open` runs in the background, so a second `open` can start before the
//! first finishes.  Each open takes a generation number; only the open that
//! still holds the newest generation when its file has been read is applied.
//! Applies are serialized, so the host's canonical config and the render copy
//! see the same sequence of overlays.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use smug_core::{
    BridgeErrorKind, BridgeFailure, BridgeReply, BridgeRequest, Config, HealthStatus, Operation,
};

use crate::infrastructure::ui_bridge::BridgeClient;

/// Render copy of everything the adapter displays.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewModel {
    pub config: Option<Config>,
    pub health: HealthStatus,
    /// Last file applied as an overlay.
    pub opened_file: Option<String>,
    pub last_error: Option<String>,
}

/// Result of one `open`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenOutcome {
    /// The file was applied and the render copy updated.
    Applied { path: String, config: Config },
    /// The dialog was cancelled.
    Cancelled,
    /// A newer open started first; this one was dropped.
    Superseded,
    /// A bridge operation failed.
    Failed(BridgeFailure),
}

/// A parsed input line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Open,
    Health,
    ShowConfig,
    Quit,
}

impl Command {
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim().to_ascii_lowercase().as_str() {
            "open" => Some(Self::Open),
            "health" => Some(Self::Health),
            "config" => Some(Self::ShowConfig),
            "quit" | "exit" => Some(Self::Quit),
            _ => None,
        }
    }
}

pub struct PresentationAdapter {
    client: BridgeClient,
    view: Mutex<ViewModel>,
    generation: AtomicU64,
    apply_gate: tokio::sync::Mutex<()>,
}

impl PresentationAdapter {
    pub fn new(client: BridgeClient) -> Arc<Self> {
        Arc::new(Self {
            client,
            view: Mutex::new(ViewModel::default()),
            generation: AtomicU64::new(0),
            apply_gate: tokio::sync::Mutex::new(()),
        })
    }

    /// Copy of the current render state.
    pub fn view(&self) -> ViewModel {
        self.lock_view().clone()
    }

    /// Loads the configuration into the render copy.
    ///
    /// # Errors
    ///
    /// Returns the bridge failure; it is also recorded in the view.
    pub async fn mount(&self) -> Result<Config, BridgeFailure> {
        match self.request(BridgeRequest::LoadConfig).await {
            Ok(BridgeReply::Config(config)) => {
                self.lock_view().config = Some(config.clone());
                info!("presentation mounted");
                Ok(config)
            }
            Ok(other) => Err(self.unexpected(other)),
            Err(failure) => Err(failure),
        }
    }

    /// Requests a health poll and records the result.
    pub async fn refresh_health(&self) -> HealthStatus {
        let status = match self.request(BridgeRequest::HealthCheck).await {
            Ok(BridgeReply::Health(status)) => status,
            Ok(other) => {
                self.unexpected(other);
                HealthStatus::Unknown
            }
            Err(_) => HealthStatus::Unknown,
        };
        self.lock_view().health = status;
        status
    }

    /// Picks a file, reads it, and applies it as a configuration overlay.
    pub async fn open_file(&self) -> OpenOutcome {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        // Failures before the apply step only reach the view while this open
        // is still the newest.
        let path = match self.call(BridgeRequest::OpenFile).await {
            Ok(BridgeReply::Files(paths)) => match paths.into_iter().next() {
                Some(path) => path,
                None => return OpenOutcome::Cancelled,
            },
            Ok(other) => {
                return self.open_failed(generation, Operation::OpenFile, mismatch(other));
            }
            Err(failure) => return self.open_failed(generation, Operation::OpenFile, failure),
        };

        let text = match self.call(BridgeRequest::ReadFile { path: path.clone() }).await {
            Ok(BridgeReply::Text(text)) => text,
            Ok(other) => {
                return self.open_failed(generation, Operation::ReadFile, mismatch(other));
            }
            Err(failure) => return self.open_failed(generation, Operation::ReadFile, failure),
        };

        let _gate = self.apply_gate.lock().await;
        if self.generation.load(Ordering::SeqCst) != generation {
            debug!("discarding stale open of {path} (generation {generation})");
            return OpenOutcome::Superseded;
        }

        match self.request(BridgeRequest::ApplyConfig { text }).await {
            Ok(BridgeReply::Config(config)) => {
                let mut view = self.lock_view();
                view.config = Some(config.clone());
                view.opened_file = Some(path.clone());
                view.last_error = None;
                info!("applied configuration from {path}");
                OpenOutcome::Applied { path, config }
            }
            Ok(other) => OpenOutcome::Failed(self.unexpected(other)),
            Err(failure) => OpenOutcome::Failed(failure),
        }
    }

    /// Polls health every `period` until `cancel` fires.
    ///
    /// The first poll happens immediately.  Returns the number of polls made.
    pub async fn run_health_timer(&self, period: Duration, cancel: CancellationToken) -> u64 {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut polls = 0;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                status = self.refresh_health() => {
                    polls += 1;
                    debug!("health: {status}");
                }
            }
        }

        debug!("health timer stopped after {polls} poll(s)");
        polls
    }

    /// Handles input lines until `quit`, the end of input, or `cancel`.
    ///
    /// `open` runs on its own task so a slow dialog does not block `health`.
    pub async fn run_commands(
        self: &Arc<Self>,
        mut input: mpsc::Receiver<String>,
        cancel: CancellationToken,
    ) {
        loop {
            let line = tokio::select! {
                _ = cancel.cancelled() => break,
                line = input.recv() => match line {
                    Some(line) => line,
                    None => break,
                },
            };
            if line.trim().is_empty() {
                continue;
            }

            match Command::parse(&line) {
                Some(Command::Open) => {
                    let adapter = Arc::clone(self);
                    tokio::spawn(async move {
                        match adapter.open_file().await {
                            OpenOutcome::Applied { .. } => adapter.render(),
                            OpenOutcome::Cancelled => info!("open cancelled"),
                            OpenOutcome::Superseded => {}
                            OpenOutcome::Failed(failure) => {
                                warn!("open failed: {} ({})", failure.message, failure.kind);
                            }
                        }
                    });
                }
                Some(Command::Health) => {
                    self.refresh_health().await;
                    self.render();
                }
                Some(Command::ShowConfig) => self.render(),
                Some(Command::Quit) => break,
                None => warn!("unknown command `{}`; try open, health, config, quit", line.trim()),
            }
        }
    }

    /// Logs the current view.
    pub fn render(&self) {
        let view = self.view();
        info!("backend health: {}", view.health);
        if let Some(path) = &view.opened_file {
            info!("config file: {path}");
        }
        match &view.config {
            Some(config) => match serde_json::to_string_pretty(config) {
                Ok(json) => info!("config:\n{json}"),
                Err(e) => warn!("could not render config: {e}"),
            },
            None => info!("config: (not loaded)"),
        }
        if let Some(error) = &view.last_error {
            warn!("last error: {error}");
        }
    }

    async fn request(&self, request: BridgeRequest) -> Result<BridgeReply, BridgeFailure> {
        let op = request.operation();
        let result = self.call(request).await;
        if let Err(failure) = &result {
            self.record_failure(op, failure);
        }
        result
    }

    async fn call(&self, request: BridgeRequest) -> Result<BridgeReply, BridgeFailure> {
        self.client.call(request).await.into_result()
    }

    fn record_failure(&self, op: Operation, failure: &BridgeFailure) {
        warn!("`{op}` failed: {}", failure.message);
        self.lock_view().last_error = Some(format!("{op}: {}", failure.message));
    }

    /// Records `failure` unless an open newer than `generation` has started.
    fn open_failed(&self, generation: u64, op: Operation, failure: BridgeFailure) -> OpenOutcome {
        if self.generation.load(Ordering::SeqCst) != generation {
            debug!("dropping `{op}` failure of superseded open (generation {generation})");
            return OpenOutcome::Superseded;
        }
        self.record_failure(op, &failure);
        OpenOutcome::Failed(failure)
    }

    fn unexpected(&self, reply: BridgeReply) -> BridgeFailure {
        let failure = mismatch(reply);
        self.lock_view().last_error = Some(failure.message.clone());
        failure
    }

    fn lock_view(&self) -> std::sync::MutexGuard<'_, ViewModel> {
        self.view.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn mismatch(reply: BridgeReply) -> BridgeFailure {
    BridgeFailure {
        kind: BridgeErrorKind::InvalidPayload,
        message: format!("unexpected reply {reply:?}"),
    }
}
