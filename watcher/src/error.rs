use thiserror::Error;

/// Errors surfaced synchronously by the watcher's public operations.
///
/// Nothing that happens on the background loop is reported through this
/// type; transient socket faults are recovered there and timeouts are
/// ordinary status changes.
#[derive(Error, Debug)]
pub enum WatcherError {
    #[error("Invalid argument: {0}")]
    Argument(String),
    #[error("Can not resolve host name '{0}' to an IPv4 address")]
    Resolution(String),
    #[error("Value out of range: {0}")]
    Range(String),
    #[error("Server has not reported its info yet")]
    MissingInfo,
    #[error("Favorites store error: {0}")]
    Store(String),
    #[error("I/O Error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for WatcherError {
    fn from(e: serde_json::Error) -> Self {
        Self::Store(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, WatcherError>;
