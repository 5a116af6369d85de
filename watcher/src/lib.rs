//! # Server Watcher Library
//!
//! This library keeps a live view of a list of game servers. It periodically
//! probes every watched server over UDP, parses the replies into structured
//! status and reports each change to registered listeners.
//!
//! ## Core Responsibilities
//!
//! ### Probing
//! A single background thread sends a lightweight ping to every server each
//! ping interval, and an info poll once per poll interval. Probes are
//! fire-and-forget datagrams; a lost probe is simply sent again next round.
//!
//! ### Reply Handling
//! Replies are matched to servers by source address and port. Ping replies
//! mark a server alive and measure its round trip time, info replies update
//! its advertised name, version and player counts. Anything else arriving
//! on the socket is ignored.
//!
//! ### Timeout Detection
//! A server that has not answered for longer than the poll interval plus the
//! server timeout is marked as timed out. It stays in the list until the
//! caller removes it and comes back to life with its next reply.
//!
//! ## Module Organization
//!
//! ### Server Watcher (`server_watcher`)
//! The public facade: add, remove and reset servers, start and stop the
//! background loop, tune intervals and register listeners.
//!
//! ### Engine (`engine`)
//! The loop itself, the socket it probes through and reply dispatch.
//!
//! ### Records (`record`)
//! Per-server state shared between callers and the loop.
//!
//! ### Notifications (`notify`)
//! A queue and dispatcher thread that deliver changes to listeners away
//! from the network loop.
//!
//! ### Resolver, Config, Status, Favorites, Launcher
//! Address parsing and lookup, validated tunables, display rows, the
//! persisted favorites list and the seam for starting the game client.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use watcher::{ServerWatcher, StatusRow, WatcherConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let watcher = ServerWatcher::new(WatcherConfig::default())?;
//!
//!     watcher.on_status_changed(|change| {
//!         println!("{:?}: {}", change.kind, StatusRow::from(&*change.server));
//!     });
//!
//!     watcher.add_server("play.example.org:28970")?;
//!     watcher.start()?;
//!
//!     std::thread::sleep(std::time::Duration::from_secs(10));
//!     watcher.stop();
//!     Ok(())
//! }
//! ```

pub mod config;
mod engine;
pub mod error;
pub mod favorites;
pub mod launcher;
pub mod notify;
pub mod record;
pub mod resolver;
pub mod server_watcher;
pub mod status;

pub use config::WatcherConfig;
pub use error::{Result, WatcherError};
pub use favorites::FavoriteServers;
pub use launcher::{launch_server, ClientLauncher, LaunchResult};
pub use notify::{ChangeKind, StatusChange};
pub use record::{RecordHandle, RecordStatus, ServerRecord, ServerState};
pub use server_watcher::ServerWatcher;
pub use status::StatusRow;
