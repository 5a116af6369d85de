//! Seam for starting the game client against a watched server.

use crate::error::{Result, WatcherError};
use crate::record::ServerRecord;
use log::info;

/// Outcome reported by the native client starter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchResult {
    Success = 0,
    WrongVersion = 1,
    ClientNotFound = 2,
    Unknown = 3,
}

impl From<i32> for LaunchResult {
    fn from(code: i32) -> Self {
        match code {
            0 => LaunchResult::Success,
            1 => LaunchResult::WrongVersion,
            2 => LaunchResult::ClientNotFound,
            _ => LaunchResult::Unknown,
        }
    }
}

/// Starts the game client and connects it to `ip_and_port`, which must
/// run server version `major.minor.patch`.
pub trait ClientLauncher {
    fn run(&self, major: u8, minor: u8, patch: u8, ip_and_port: &str) -> LaunchResult;
}

/// Launches the client for `server` using the version it last advertised.
pub fn launch_server(launcher: &dyn ClientLauncher, server: &ServerRecord) -> Result<LaunchResult> {
    let info = server.info().ok_or(WatcherError::MissingInfo)?;
    let target = server.endpoint().to_string();

    info!(
        "Launching client {} for {} ({})",
        info.version_string(),
        target,
        info.name
    );
    Ok(launcher.run(info.major, info.minor, info.patch, &target))
}
