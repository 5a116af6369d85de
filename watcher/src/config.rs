//! Tunables of the background loop.

use crate::error::{Result, WatcherError};
use protocol::DEFAULT_PORT;
use std::time::Duration;

/// Timing and addressing parameters held by the watcher.
///
/// Invariants: every interval is non-zero and `poll_interval` is strictly
/// greater than `ping_interval`. Setters reject values that would break
/// either rule and keep the previous value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatcherConfig {
    default_port: u16,
    ping_interval: Duration,
    poll_interval: Duration,
    server_timeout: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            default_port: DEFAULT_PORT,
            ping_interval: Duration::from_millis(100),
            poll_interval: Duration::from_millis(1000),
            server_timeout: Duration::from_millis(2000),
        }
    }
}

impl WatcherConfig {
    pub fn new(
        default_port: u16,
        ping_interval: Duration,
        poll_interval: Duration,
        server_timeout: Duration,
    ) -> Result<Self> {
        check_port(default_port)?;
        check_positive("ping interval", ping_interval)?;
        check_positive("poll interval", poll_interval)?;
        check_positive("server timeout", server_timeout)?;
        check_ordering(ping_interval, poll_interval)?;

        Ok(Self {
            default_port,
            ping_interval,
            poll_interval,
            server_timeout,
        })
    }

    /// Convenience constructor taking milliseconds.
    pub fn from_millis(
        default_port: u16,
        ping_ms: u64,
        poll_ms: u64,
        timeout_ms: u64,
    ) -> Result<Self> {
        Self::new(
            default_port,
            Duration::from_millis(ping_ms),
            Duration::from_millis(poll_ms),
            Duration::from_millis(timeout_ms),
        )
    }

    pub fn default_port(&self) -> u16 {
        self.default_port
    }

    pub fn ping_interval(&self) -> Duration {
        self.ping_interval
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn server_timeout(&self) -> Duration {
        self.server_timeout
    }

    /// Time without a successful reply after which a server counts as gone.
    /// Saturates at `Duration::MAX`.
    pub fn timeout_window(&self) -> Duration {
        self.poll_interval.saturating_add(self.server_timeout)
    }

    pub fn set_default_port(&mut self, port: u16) -> Result<()> {
        check_port(port)?;
        self.default_port = port;
        Ok(())
    }

    pub fn set_ping_interval(&mut self, interval: Duration) -> Result<()> {
        check_positive("ping interval", interval)?;
        check_ordering(interval, self.poll_interval)?;
        self.ping_interval = interval;
        Ok(())
    }

    pub fn set_poll_interval(&mut self, interval: Duration) -> Result<()> {
        check_positive("poll interval", interval)?;
        check_ordering(self.ping_interval, interval)?;
        self.poll_interval = interval;
        Ok(())
    }

    pub fn set_server_timeout(&mut self, timeout: Duration) -> Result<()> {
        check_positive("server timeout", timeout)?;
        self.server_timeout = timeout;
        Ok(())
    }
}

fn check_port(port: u16) -> Result<()> {
    if port == 0 {
        return Err(WatcherError::Range(
            "default port must not be 0".to_string(),
        ));
    }
    Ok(())
}

fn check_positive(name: &str, value: Duration) -> Result<()> {
    if value.is_zero() {
        return Err(WatcherError::Range(format!("{} must be positive", name)));
    }
    Ok(())
}

fn check_ordering(ping: Duration, poll: Duration) -> Result<()> {
    if poll <= ping {
        return Err(WatcherError::Range(format!(
            "poll interval ({:?}) must be greater than ping interval ({:?})",
            poll, ping
        )));
    }
    Ok(())
}
