//! Public entry point for watching a set of game servers.

use crate::config::WatcherConfig;
use crate::engine::{Engine, Transport};
use crate::error::{Result, WatcherError};
use crate::notify::{Notifier, StatusChange};
use crate::record::{RecordHandle, ServerRecord};
use crate::resolver;
use log::{info, warn};
use parking_lot::Mutex;
use std::net::{SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::mpsc;

/// Watches a changing list of game servers from a background thread.
///
/// All methods may be called from any thread. Status changes are delivered
/// to listeners on a dispatcher thread, never on the caller's thread.
pub struct ServerWatcher {
    engine: Arc<Engine>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ServerWatcher {
    pub fn new(config: WatcherConfig) -> Result<Self> {
        let notifier = Notifier::new()?;

        Ok(Self {
            engine: Arc::new(Engine::new(config, notifier)),
            worker: Mutex::new(None),
        })
    }

    /// Resolves `address` (`host` or `host:port`) and starts watching it.
    /// Adding the same endpoint twice yields two independent records.
    pub fn add_server(&self, address: &str) -> Result<RecordHandle> {
        let address = address.trim();
        let endpoint = resolver::resolve(address, self.default_port())?;
        self.insert(endpoint, address)
    }

    /// Starts watching an already resolved endpoint. Only IPv4 is supported.
    pub fn add_endpoint(&self, endpoint: SocketAddr) -> Result<RecordHandle> {
        match endpoint {
            SocketAddr::V4(v4) => self.insert(v4, v4.to_string()),
            SocketAddr::V6(_) => Err(WatcherError::Argument(format!(
                "{} is not an IPv4 endpoint",
                endpoint
            ))),
        }
    }

    fn insert(&self, endpoint: SocketAddrV4, original: impl Into<String>) -> Result<RecordHandle> {
        let record = Arc::new(ServerRecord::new(endpoint, original)?);
        info!(
            "Watching server {} ({})",
            record.endpoint(),
            record.original_address()
        );
        self.engine.insert(Arc::clone(&record));
        Ok(record)
    }

    /// Stops watching `server`. Unknown handles are ignored.
    pub fn remove_server(&self, server: &RecordHandle) -> bool {
        let removed = self.engine.remove(server);
        if removed {
            info!("Stopped watching server {}", server.endpoint());
        }
        removed
    }

    /// Stops watching every server.
    pub fn reset(&self) {
        self.engine.clear();
    }

    pub fn servers(&self) -> Vec<RecordHandle> {
        self.engine.snapshot()
    }

    pub fn len(&self) -> usize {
        self.engine.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Starts the background loop. Does nothing if it already runs.
    pub fn start(&self) -> Result<()> {
        let mut worker = self.worker.lock();
        if let Some(handle) = worker.as_ref() {
            if !handle.is_finished() {
                return Ok(());
            }
        }
        if let Some(handle) = worker.take() {
            if handle.join().is_err() {
                warn!("Server watcher thread had panicked, restarting");
            }
        }

        let transport = Transport::bind()?;
        self.engine.set_running(true);

        let engine = Arc::clone(&self.engine);
        let spawned = thread::Builder::new()
            .name("server-watcher".to_string())
            .spawn(move || engine.run(transport));

        match spawned {
            Ok(handle) => {
                *worker = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.engine.set_running(false);
                Err(e.into())
            }
        }
    }

    /// Stops the background loop and waits for its thread to exit. Does
    /// nothing if it is not running.
    pub fn stop(&self) {
        let mut worker = self.worker.lock();
        let Some(handle) = worker.take() else {
            return;
        };

        self.engine.set_running(false);
        if handle.join().is_err() {
            warn!("Server watcher thread panicked");
        }
    }

    /// `true` while the background loop thread is alive.
    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .map_or(false, |handle| !handle.is_finished())
    }

    /// Registers a callback for status changes.
    pub fn on_status_changed<F>(&self, listener: F)
    where
        F: Fn(&StatusChange) + Send + Sync + 'static,
    {
        self.engine.notifier().add_callback(listener);
    }

    /// Returns a channel receiving every future status change.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<StatusChange> {
        self.engine.notifier().subscribe()
    }

    pub fn config(&self) -> WatcherConfig {
        self.engine.config()
    }

    pub fn default_port(&self) -> u16 {
        self.config().default_port()
    }

    pub fn ping_interval(&self) -> Duration {
        self.config().ping_interval()
    }

    pub fn poll_interval(&self) -> Duration {
        self.config().poll_interval()
    }

    pub fn server_timeout(&self) -> Duration {
        self.config().server_timeout()
    }

    pub fn set_default_port(&self, port: u16) -> Result<()> {
        self.engine.update_config(|c| c.set_default_port(port))
    }

    pub fn set_ping_interval(&self, interval: Duration) -> Result<()> {
        self.engine.update_config(|c| c.set_ping_interval(interval))
    }

    pub fn set_poll_interval(&self, interval: Duration) -> Result<()> {
        self.engine.update_config(|c| c.set_poll_interval(interval))
    }

    pub fn set_server_timeout(&self, timeout: Duration) -> Result<()> {
        self.engine.update_config(|c| c.set_server_timeout(timeout))
    }
}

impl Drop for ServerWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}
