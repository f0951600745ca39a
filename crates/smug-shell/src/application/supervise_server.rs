//! SuperviseServerUseCase: backend address discovery and lifecycle tracking.
//!
//! The backend is launched with an ephemeral listen port, so the shell only
//! learns where to reach it by reading the handshake record the backend
//! prints on stdout.  [`ServerHandle`] owns the two pieces of state that come
//! out of supervision:
//!
//! - the **discovered address**, an atomically replaced cell that starts at
//!   the configured default and is overwritten by every accepted handshake;
//! - the **lifecycle state** (`Starting → Listening → Exited`), published on a
//!   `watch` channel so other tasks can wait for transitions.
//!
//! Only the supervisor writes to the handle.  Everything else reads snapshots.
//!
//! # Reading stdout
//!
//! Records are newline-delimited, but a backend may print its handshake
//! without a trailing newline and keep running.  [`pump_stdout`] therefore
//! also accepts a pending unterminated record as soon as it parses as a
//! complete JSON object.

use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use smug_core::{parse_handshake_line, ServerState};

/// Longest unterminated stdout record kept while waiting for more bytes.
const MAX_PENDING_RECORD: usize = 64 * 1024;

/// What a single stdout line did to the handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineOutcome {
    /// A handshake was accepted and the address replaced.
    Address(String),
    /// Valid record without `listen`, blank line, or a handshake after exit.
    Ignored,
    /// The line could not be parsed; it was logged.
    Malformed,
}

/// Shared view of the supervised backend.
pub struct ServerHandle {
    address: ArcSwap<String>,
    state: watch::Sender<ServerState>,
}

impl ServerHandle {
    /// Creates a handle in the `Starting` state pointing at `default_address`.
    pub fn new(default_address: impl Into<String>) -> Arc<Self> {
        let (state, _) = watch::channel(ServerState::Starting);
        Arc::new(Self {
            address: ArcSwap::from_pointee(default_address.into()),
            state,
        })
    }

    /// Snapshot of the current backend address.
    pub fn address(&self) -> String {
        self.address.load().as_ref().clone()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ServerState {
        *self.state.borrow()
    }

    /// Subscribes to lifecycle transitions.
    pub fn subscribe(&self) -> watch::Receiver<ServerState> {
        self.state.subscribe()
    }

    /// Feeds one stdout line through the handshake parser.
    pub fn apply_line(&self, line: &str) -> LineOutcome {
        let addr = match parse_handshake_line(line) {
            Ok(Some(addr)) => addr,
            Ok(None) => return LineOutcome::Ignored,
            Err(e) => {
                warn!("ignoring backend stdout line: {e}");
                return LineOutcome::Malformed;
            }
        };

        let mut accepted = false;
        self.state.send_if_modified(|state| match state.on_handshake() {
            Some(next) => {
                // Address goes in before the state flips so a reader that saw
                // `Listening` never reads the stale default.
                self.address.store(Arc::new(addr.clone()));
                accepted = true;
                let changed = *state != next;
                *state = next;
                changed
            }
            None => false,
        });

        if accepted {
            info!("backend listening on {addr}");
            LineOutcome::Address(addr)
        } else {
            debug!("backend already exited; ignoring handshake for {addr}");
            LineOutcome::Ignored
        }
    }

    /// Records that the backend process terminated.  Later calls keep the
    /// first exit code.
    pub fn mark_exited(&self, code: Option<i32>) {
        self.state.send_if_modified(|state| {
            let next = state.on_exit(code);
            let changed = *state != next;
            *state = next;
            changed
        });
    }
}

/// Reads backend stdout until EOF, applying every record to `handle`.
///
/// Returns the number of accepted handshakes.
pub async fn pump_stdout<R>(handle: &ServerHandle, reader: R) -> usize
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut pending: Vec<u8> = Vec::new();
    let mut accepted = 0;

    loop {
        let chunk = match reader.fill_buf().await {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!("backend stdout read failed: {e}");
                break;
            }
        };
        if chunk.is_empty() {
            break;
        }
        let len = chunk.len();
        pending.extend_from_slice(chunk);
        reader.consume(len);

        while let Some(pos) = pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = pending.drain(..=pos).collect();
            accepted += count(handle.apply_line(&String::from_utf8_lossy(&line)));
        }

        if is_complete_record(&pending) {
            accepted += count(handle.apply_line(&String::from_utf8_lossy(&pending)));
            pending.clear();
        } else if pending.len() > MAX_PENDING_RECORD {
            warn!(
                "dropping {} bytes of unterminated backend output",
                pending.len()
            );
            pending.clear();
        }
    }

    // Final line without a newline.
    if !pending.is_empty() {
        accepted += count(handle.apply_line(&String::from_utf8_lossy(&pending)));
    }
    accepted
}

/// Logs every backend stderr line until EOF.
///
/// Bytes that are not UTF-8 are replaced rather than ending the pump; the
/// backend would block on a full stderr pipe otherwise.  Returns the number
/// of lines logged.
pub async fn pump_stderr<R>(reader: R) -> usize
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    let mut logged = 0;
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                warn!(target: "backend", "{}", line.trim_end_matches(['\r', '\n']));
                logged += 1;
            }
            Err(e) => {
                warn!("backend stderr read failed: {e}");
                break;
            }
        }
    }
    logged
}

fn count(outcome: LineOutcome) -> usize {
    usize::from(matches!(outcome, LineOutcome::Address(_)))
}

fn is_complete_record(bytes: &[u8]) -> bool {
    let trimmed = bytes.trim_ascii();
    trimmed.first() == Some(&b'{')
        && serde_json::from_slice::<serde_json::Value>(trimmed).is_ok()
}
