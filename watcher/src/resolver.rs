//! Turns user supplied server addresses into IPv4 endpoints.

use crate::error::{Result, WatcherError};
use log::debug;
use std::net::{SocketAddr, SocketAddrV4, ToSocketAddrs};

/// Longest run of digits accepted as a port suffix.
const MAX_PORT_DIGITS: usize = 5;

/// Splits an optional `:port` suffix off `address`.
///
/// The first `:` followed by one to five digits is taken as the suffix. If
/// those digits do not fit a `u16` the suffix is left alone and
/// `default_port` is used instead.
pub fn split_port(address: &str, default_port: u16) -> (String, u16) {
    let bytes = address.as_bytes();

    for (colon, _) in address.match_indices(':') {
        let digits = bytes[colon + 1..]
            .iter()
            .take(MAX_PORT_DIGITS)
            .take_while(|b| b.is_ascii_digit())
            .count();

        if digits == 0 {
            continue;
        }

        let end = colon + 1 + digits;
        return match address[colon + 1..end].parse::<u16>() {
            Ok(port) => {
                let mut host = String::with_capacity(address.len());
                host.push_str(&address[..colon]);
                host.push_str(&address[end..]);
                (host, port)
            }
            Err(_) => (address.to_string(), default_port),
        };
    }

    (address.to_string(), default_port)
}

/// Resolves `address` (optionally suffixed with `:port`) to the first IPv4
/// endpoint it names. May block on name resolution.
pub fn resolve(address: &str, default_port: u16) -> Result<SocketAddrV4> {
    let address = address.trim();
    if address.is_empty() {
        return Err(WatcherError::Argument(
            "server address must not be empty".to_string(),
        ));
    }

    let (host, port) = split_port(address, default_port);
    if host.is_empty() {
        return Err(WatcherError::Resolution(host));
    }

    let candidates = (host.as_str(), port)
        .to_socket_addrs()
        .map_err(|e| {
            debug!("Lookup of {} failed: {}", host, e);
            WatcherError::Resolution(host.clone())
        })?;

    candidates
        .filter_map(|addr| match addr {
            SocketAddr::V4(v4) => Some(v4),
            SocketAddr::V6(_) => None,
        })
        .next()
        .ok_or(WatcherError::Resolution(host))
}
