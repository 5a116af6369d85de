//! Per-server status records.
//!
//! A record is created for every watched endpoint and shared between the
//! caller (through a [`RecordHandle`]) and the background loop. Identity
//! fields never change; everything observed from the network sits behind a
//! per-record lock and is read and written through accessor methods.

use crate::error::{Result, WatcherError};
use crate::notify::ChangeKind;
use parking_lot::Mutex;
use protocol::ServerInfo;
use serde::Serialize;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

static NEXT_RECORD_ID: AtomicU64 = AtomicU64::new(1);

/// Shared handle to a watched server.
pub type RecordHandle = Arc<ServerRecord>;

/// Liveness of a watched server as seen by the watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ServerState {
    /// No reply received yet.
    Unknown,
    Alive,
    /// No reply within the timeout window.
    TimedOut,
}

/// Point-in-time copy of a record's observed fields.
///
/// `last_ping` and `info` are only populated while the server is alive.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordStatus {
    pub state: ServerState,
    pub last_ping: Option<Duration>,
    pub last_probe_sent_at: Option<Instant>,
    pub last_success_at: Option<Instant>,
    pub info: Option<ServerInfo>,
}

impl RecordStatus {
    pub fn ping_successful(&self) -> bool {
        self.state == ServerState::Alive
    }
}

#[derive(Debug)]
struct Observed {
    state: ServerState,
    last_ping: Option<Duration>,
    last_probe_sent_at: Option<Instant>,
    last_success_at: Option<Instant>,
    info: Option<ServerInfo>,
}

/// Status of one watched endpoint.
#[derive(Debug)]
pub struct ServerRecord {
    id: u64,
    endpoint: SocketAddrV4,
    original_address: String,
    added_at: Instant,
    observed: Mutex<Observed>,
}

impl ServerRecord {
    /// Creates a record for `endpoint`. `original_address` is what the user
    /// typed and is kept verbatim for display and persistence.
    pub fn new(endpoint: SocketAddrV4, original_address: impl Into<String>) -> Result<Self> {
        let original_address = original_address.into();
        if original_address.is_empty() {
            return Err(WatcherError::Argument(
                "original address must not be empty".to_string(),
            ));
        }

        Ok(Self {
            id: NEXT_RECORD_ID.fetch_add(1, Ordering::Relaxed),
            endpoint,
            original_address,
            added_at: Instant::now(),
            observed: Mutex::new(Observed {
                state: ServerState::Unknown,
                last_ping: None,
                last_probe_sent_at: None,
                last_success_at: None,
                info: None,
            }),
        })
    }

    /// Process-unique identifier, handy for logging.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn endpoint(&self) -> SocketAddrV4 {
        self.endpoint
    }

    pub fn ip(&self) -> Ipv4Addr {
        *self.endpoint.ip()
    }

    pub fn port(&self) -> u16 {
        self.endpoint.port()
    }

    pub fn original_address(&self) -> &str {
        &self.original_address
    }

    pub fn added_at(&self) -> Instant {
        self.added_at
    }

    pub fn state(&self) -> ServerState {
        self.observed.lock().state
    }

    pub fn ping_successful(&self) -> bool {
        self.state() == ServerState::Alive
    }

    /// Round trip of the last answered ping, `None` unless alive.
    pub fn last_ping(&self) -> Option<Duration> {
        let observed = self.observed.lock();
        match observed.state {
            ServerState::Alive => observed.last_ping,
            _ => None,
        }
    }

    /// Last advertised server info, `None` unless alive.
    pub fn info(&self) -> Option<ServerInfo> {
        let observed = self.observed.lock();
        match observed.state {
            ServerState::Alive => observed.info.clone(),
            _ => None,
        }
    }

    pub fn last_probe_sent_at(&self) -> Option<Instant> {
        self.observed.lock().last_probe_sent_at
    }

    pub fn last_success_at(&self) -> Option<Instant> {
        self.observed.lock().last_success_at
    }

    pub fn status(&self) -> RecordStatus {
        let observed = self.observed.lock();
        let alive = observed.state == ServerState::Alive;

        RecordStatus {
            state: observed.state,
            last_ping: observed.last_ping.filter(|_| alive),
            last_probe_sent_at: observed.last_probe_sent_at,
            last_success_at: observed.last_success_at,
            info: observed.info.clone().filter(|_| alive),
        }
    }

    pub(crate) fn mark_probe_sent(&self, now: Instant) {
        self.observed.lock().last_probe_sent_at = Some(now);
    }

    /// Applies an answered ping received at `now`.
    pub(crate) fn apply_ping_reply(&self, now: Instant) -> Option<ChangeKind> {
        let mut observed = self.observed.lock();

        let sent_at = observed.last_probe_sent_at.unwrap_or(now);
        let latency = whole_millis(now.saturating_duration_since(sent_at));
        let was_alive = observed.state == ServerState::Alive;
        let latency_changed = observed.last_ping != Some(latency);

        observed.state = ServerState::Alive;
        observed.last_ping = Some(latency);
        observed.last_success_at = Some(now);

        if !was_alive {
            Some(ChangeKind::CameOnline)
        } else if latency_changed {
            Some(ChangeKind::Latency)
        } else {
            None
        }
    }

    /// Replaces the server info if it differs from the current one. Info
    /// replies from a server that is not alive are dropped.
    pub(crate) fn apply_info_reply(&self, info: ServerInfo) -> Option<ChangeKind> {
        let mut observed = self.observed.lock();

        if observed.state != ServerState::Alive || observed.info.as_ref() == Some(&info) {
            return None;
        }

        observed.info = Some(info);
        Some(ChangeKind::Info)
    }

    /// Moves the record to `TimedOut` if nothing has been heard for longer
    /// than `window`. Never-answering servers are measured from the time
    /// they were added.
    pub(crate) fn check_timeout(&self, now: Instant, window: Duration) -> Option<ChangeKind> {
        let mut observed = self.observed.lock();

        if observed.state == ServerState::TimedOut {
            return None;
        }

        let since = observed.last_success_at.unwrap_or(self.added_at);
        let elapsed = now.saturating_duration_since(since);
        if elapsed <= window {
            return None;
        }

        observed.state = ServerState::TimedOut;
        observed.info = None;
        observed.last_ping = Some(whole_millis(elapsed));
        Some(ChangeKind::TimedOut)
    }
}

fn whole_millis(duration: Duration) -> Duration {
    Duration::from_millis(duration.as_millis().min(u64::MAX as u128) as u64)
}
