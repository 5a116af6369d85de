//! Display rows for watched servers.

use crate::record::{ServerRecord, ServerState};
use serde::Serialize;
use std::fmt;

const PLACEHOLDER: &str = "-";

/// One line of a server list, everything pre-formatted for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusRow {
    pub host: String,
    pub name: String,
    pub version: String,
    pub players: String,
    pub ping: String,
    pub state: ServerState,
}

impl From<&ServerRecord> for StatusRow {
    fn from(record: &ServerRecord) -> Self {
        let status = record.status();
        let info = status.info.as_ref();

        Self {
            host: record.original_address().to_string(),
            name: info.map_or_else(|| PLACEHOLDER.to_string(), |i| i.name.clone()),
            version: info.map_or_else(|| PLACEHOLDER.to_string(), |i| i.version_string()),
            players: info.map_or_else(|| PLACEHOLDER.to_string(), |i| i.players_string()),
            ping: status
                .last_ping
                .map_or_else(|| PLACEHOLDER.to_string(), |p| format!("{}ms", p.as_millis())),
            state: status.state,
        }
    }
}

impl fmt::Display for StatusRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<24} {:<24} {:>8} {:>7} {:>7}",
            self.host, self.name, self.version, self.players, self.ping
        )
    }
}
