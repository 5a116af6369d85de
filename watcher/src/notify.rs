//! Delivery of status changes to listeners.
//!
//! The network loop only pushes onto an unbounded queue; a dedicated
//! dispatcher thread drains it and calls the registered listeners. A slow
//! or panicking listener therefore never holds up probing.

use crate::record::{RecordHandle, RecordStatus};
use log::{debug, warn};
use parking_lot::RwLock;
use std::io;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use tokio::sync::mpsc;

/// What changed about a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// First reply, or first reply after a timeout.
    CameOnline,
    /// Round trip time differs from the previous ping.
    Latency,
    /// Advertised server info differs from the previous poll.
    Info,
    /// Nothing heard within the timeout window.
    TimedOut,
}

/// A status change of one watched server.
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub server: RecordHandle,
    pub kind: ChangeKind,
    /// Record fields as they were when the change was detected.
    pub status: RecordStatus,
}

type Callback = Arc<dyn Fn(&StatusChange) + Send + Sync>;

#[derive(Clone)]
enum Listener {
    Callback(Callback),
    Channel(mpsc::UnboundedSender<StatusChange>),
}

pub(crate) struct Notifier {
    listeners: Arc<RwLock<Vec<Listener>>>,
    queue: mpsc::UnboundedSender<StatusChange>,
}

impl Notifier {
    /// Creates the queue and spawns the dispatcher thread. The thread exits
    /// once the notifier is dropped and the queue is drained.
    pub(crate) fn new() -> io::Result<Self> {
        let listeners = Arc::new(RwLock::new(Vec::new()));
        let (queue, rx) = mpsc::unbounded_channel();

        let dispatch_listeners = Arc::clone(&listeners);
        thread::Builder::new()
            .name("watcher-notify".to_string())
            .spawn(move || dispatch_loop(dispatch_listeners, rx))?;

        Ok(Self { listeners, queue })
    }

    pub(crate) fn add_callback<F>(&self, callback: F)
    where
        F: Fn(&StatusChange) + Send + Sync + 'static,
    {
        self.listeners
            .write()
            .push(Listener::Callback(Arc::new(callback)));
    }

    pub(crate) fn subscribe(&self) -> mpsc::UnboundedReceiver<StatusChange> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.listeners.write().push(Listener::Channel(tx));
        rx
    }

    /// Queues a change for `server`. Never blocks.
    pub(crate) fn notify(&self, server: &RecordHandle, kind: ChangeKind) {
        let change = StatusChange {
            server: Arc::clone(server),
            kind,
            status: server.status(),
        };

        if self.queue.send(change).is_err() {
            warn!("Notification dispatcher is gone, dropping {:?}", kind);
        }
    }
}

fn dispatch_loop(
    listeners: Arc<RwLock<Vec<Listener>>>,
    mut rx: mpsc::UnboundedReceiver<StatusChange>,
) {
    while let Some(change) = rx.blocking_recv() {
        let current = listeners.read().clone();
        let mut closed_channel = false;

        for listener in current {
            match listener {
                Listener::Callback(callback) => {
                    if catch_unwind(AssertUnwindSafe(|| (*callback)(&change))).is_err() {
                        warn!(
                            "Status listener panicked handling {:?} for {}",
                            change.kind,
                            change.server.endpoint()
                        );
                    }
                }
                Listener::Channel(tx) => {
                    closed_channel |= tx.send(change.clone()).is_err();
                }
            }
        }

        if closed_channel {
            listeners.write().retain(|listener| match listener {
                Listener::Channel(tx) => !tx.is_closed(),
                Listener::Callback(_) => true,
            });
        }
    }

    debug!("Notification dispatcher stopped");
}
