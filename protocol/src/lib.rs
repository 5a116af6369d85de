use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_PORT: u16 = 28970;
pub const PING_TAG: &[u8; 3] = b"GOp";
pub const INFO_TAG: &[u8; 3] = b"GOi";
pub const PROTOCOL_VERSION: u8 = 1;

/// Tag, version byte and the five single-byte counters.
pub const INFO_HEADER_LEN: usize = 9;

/// Largest datagram either side expects to handle.
pub const MAX_DATAGRAM: usize = 2048;

/// Status advertised by a game server in reply to an info poll.
///
/// Every numeric field is a single byte on the wire, so versions and player
/// counts above 255 cannot be expressed by the peer.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Hash)]
pub struct ServerInfo {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
    pub players: u8,
    pub max_players: u8,
    pub name: String,
}

impl ServerInfo {
    pub fn new(
        major: u8,
        minor: u8,
        patch: u8,
        players: u8,
        max_players: u8,
        name: impl Into<String>,
    ) -> Self {
        Self {
            major,
            minor,
            patch,
            players,
            max_players,
            name: name.into(),
        }
    }

    pub fn version_string(&self) -> String {
        format!("{}.{}.{}", self.major, self.minor, self.patch)
    }

    pub fn players_string(&self) -> String {
        format!("{}/{}", self.players, self.max_players)
    }
}

impl fmt::Display for ServerInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] {}",
            self.name,
            self.version_string(),
            self.players_string()
        )
    }
}

/// Probes sent by the watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    Ping,
    Info,
}

impl Request {
    pub fn as_bytes(&self) -> &'static [u8] {
        match self {
            Request::Ping => PING_TAG,
            Request::Info => INFO_TAG,
        }
    }

    /// Recognises a probe by its tag; anything after the tag is ignored.
    pub fn parse(data: &[u8]) -> Option<Request> {
        if data.starts_with(PING_TAG) {
            Some(Request::Ping)
        } else if data.starts_with(INFO_TAG) {
            Some(Request::Info)
        } else {
            None
        }
    }
}

/// Replies sent back by a game server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Ping,
    Info(ServerInfo),
}

impl Reply {
    /// Decodes a reply datagram. Returns `None` for anything that is not a
    /// well-formed ping or info reply.
    pub fn parse(data: &[u8]) -> Option<Reply> {
        if data.len() > PING_TAG.len() && data.starts_with(PING_TAG) {
            return Some(Reply::Ping);
        }

        if data.len() < INFO_HEADER_LEN || !data.starts_with(INFO_TAG) {
            return None;
        }

        if data[3] != PROTOCOL_VERSION {
            return None;
        }

        Some(Reply::Info(ServerInfo {
            major: data[4],
            minor: data[5],
            patch: data[6],
            players: data[7],
            max_players: data[8],
            name: decode_name(&data[INFO_HEADER_LEN..]),
        }))
    }

    pub fn encode(&self) -> Vec<u8> {
        match self {
            Reply::Ping => {
                let mut data = PING_TAG.to_vec();
                data.push(PROTOCOL_VERSION);
                data
            }
            Reply::Info(info) => {
                let mut data = Vec::with_capacity(INFO_HEADER_LEN + info.name.len());
                data.extend_from_slice(INFO_TAG);
                data.extend_from_slice(&[
                    PROTOCOL_VERSION,
                    info.major,
                    info.minor,
                    info.patch,
                    info.players,
                    info.max_players,
                ]);
                data.extend(info.name.chars().map(encode_char));
                data
            }
        }
    }
}

// Name bytes are ASCII; NUL padding is dropped and anything outside ASCII
// becomes '?'.
fn decode_name(bytes: &[u8]) -> String {
    bytes
        .iter()
        .filter(|&&b| b != 0)
        .map(|&b| if b.is_ascii() { b as char } else { '?' })
        .collect()
}

fn encode_char(c: char) -> u8 {
    if c.is_ascii() {
        c as u8
    } else {
        b'?'
    }
}
