//! Persisted list of favorite server addresses.

use crate::error::{Result, WatcherError};
use crate::server_watcher::ServerWatcher;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;

/// Server addresses exactly as the user entered them.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FavoriteServers {
    #[serde(default)]
    pub servers: Vec<String>,
}

impl FavoriteServers {
    /// Loads the list from a JSON file. A missing file is an empty list.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("No favorites file at {}, starting empty", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(WatcherError::Store(format!("{}: {}", path.display(), e))),
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents)
            .map_err(|e| WatcherError::Store(format!("{}: {}", path.display(), e)))
    }

    /// Collects the original addresses of every server `watcher` watches.
    pub fn from_watcher(watcher: &ServerWatcher) -> Self {
        Self {
            servers: watcher
                .servers()
                .iter()
                .map(|record| record.original_address().to_string())
                .collect(),
        }
    }

    /// Adds every address to `watcher`. Addresses that fail are skipped and
    /// returned together with their error.
    pub fn restore_into(&self, watcher: &ServerWatcher) -> Vec<(String, WatcherError)> {
        let mut failed = Vec::new();

        for address in &self.servers {
            if let Err(e) = watcher.add_server(address) {
                warn!("Skipping favorite '{}': {}", address, e);
                failed.push((address.clone(), e));
            }
        }

        failed
    }
}
