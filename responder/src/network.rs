//! UDP service answering watcher probes the way a game server does

use log::{debug, error, info, warn};
use protocol::{Reply, Request, ServerInfo, MAX_DATAGRAM};
use rand::Rng;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::RwLock;

/// Counts of probes answered so far
#[derive(Debug, Default)]
pub struct ProbeCounters {
    pings: AtomicU64,
    polls: AtomicU64,
    dropped: AtomicU64,
}

impl ProbeCounters {
    pub fn pings(&self) -> u64 {
        self.pings.load(Ordering::Relaxed)
    }

    pub fn polls(&self) -> u64 {
        self.polls.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Stand-in game server advertising a configurable [`ServerInfo`]
pub struct Responder {
    socket: Arc<UdpSocket>,
    info: RwLock<ServerInfo>,
    drop_rate: f64,
    counters: ProbeCounters,
}

impl Responder {
    /// Binds to `addr`. `drop_rate` is the probability (0.0 to 1.0) of
    /// silently ignoring a probe.
    pub async fn bind(addr: &str, info: ServerInfo, drop_rate: f64) -> io::Result<Self> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Responder listening on {}", socket.local_addr()?);

        Ok(Responder {
            socket,
            info: RwLock::new(info),
            drop_rate: drop_rate.clamp(0.0, 1.0),
            counters: ProbeCounters::default(),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn counters(&self) -> &ProbeCounters {
        &self.counters
    }

    pub async fn info(&self) -> ServerInfo {
        self.info.read().await.clone()
    }

    /// Changes what subsequent info replies advertise
    pub async fn set_info(&self, info: ServerInfo) {
        *self.info.write().await = info;
    }

    pub async fn set_players(&self, players: u8) {
        self.info.write().await.players = players;
    }

    /// Builds the reply for a probe, `None` for anything unrecognised
    pub async fn reply_for(&self, data: &[u8]) -> Option<Vec<u8>> {
        match Request::parse(data)? {
            Request::Ping => {
                self.counters.pings.fetch_add(1, Ordering::Relaxed);
                Some(Reply::Ping.encode())
            }
            Request::Info => {
                self.counters.polls.fetch_add(1, Ordering::Relaxed);
                Some(Reply::Info(self.info().await).encode())
            }
        }
    }

    fn should_drop(&self) -> bool {
        self.drop_rate > 0.0 && rand::thread_rng().gen_bool(self.drop_rate)
    }

    /// Answers probes; receive errors are logged and the loop carries on
    pub async fn run(&self) -> io::Result<()> {
        let mut buffer = [0u8; MAX_DATAGRAM];

        loop {
            let (len, addr) = match self.socket.recv_from(&mut buffer).await {
                Ok(received) => received,
                Err(e) => {
                    error!("Error receiving probe: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    continue;
                }
            };

            if self.should_drop() {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                debug!("Dropping probe from {}", addr);
                continue;
            }

            match self.reply_for(&buffer[..len]).await {
                Some(reply) => {
                    if let Err(e) = self.socket.send_to(&reply, addr).await {
                        warn!("Failed to reply to {}: {}", addr, e);
                    }
                }
                None => debug!("Ignoring {} byte datagram from {}", len, addr),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    fn test_info() -> ServerInfo {
        ServerInfo::new(0, 1, 4, 3, 32, "Test Server")
    }

    #[tokio::test]
    async fn test_ping_reply() {
        let responder = Responder::bind("127.0.0.1:0", test_info(), 0.0)
            .await
            .unwrap();

        let reply = responder.reply_for(b"GOp").await.unwrap();
        assert_eq!(Reply::parse(&reply), Some(Reply::Ping));
        assert_eq!(responder.counters().pings(), 1);
    }

    #[tokio::test]
    async fn test_info_reply_reflects_updates() {
        let responder = Responder::bind("127.0.0.1:0", test_info(), 0.0)
            .await
            .unwrap();

        let reply = responder.reply_for(b"GOi").await.unwrap();
        assert_eq!(Reply::parse(&reply), Some(Reply::Info(test_info())));

        responder.set_players(9).await;
        let reply = responder.reply_for(b"GOi").await.unwrap();
        match Reply::parse(&reply) {
            Some(Reply::Info(info)) => assert_eq!(info.players_string(), "9/32"),
            other => panic!("Unexpected reply: {:?}", other),
        }
        assert_eq!(responder.counters().polls(), 2);
    }

    #[tokio::test]
    async fn test_unknown_request_ignored() {
        let responder = Responder::bind("127.0.0.1:0", test_info(), 0.0)
            .await
            .unwrap();

        assert!(responder.reply_for(b"hello").await.is_none());
        assert!(responder.reply_for(b"").await.is_none());
        assert_eq!(responder.counters().pings(), 0);
        assert_eq!(responder.counters().polls(), 0);
    }

    #[tokio::test]
    async fn test_drop_rate_is_clamped() {
        let always = Responder::bind("127.0.0.1:0", test_info(), 7.0)
            .await
            .unwrap();
        assert!(always.should_drop());

        let never = Responder::bind("127.0.0.1:0", test_info(), -1.0)
            .await
            .unwrap();
        assert!(!never.should_drop());
    }

    #[tokio::test]
    async fn test_answers_over_udp() {
        let responder = Arc::new(
            Responder::bind("127.0.0.1:0", test_info(), 0.0)
                .await
                .unwrap(),
        );
        let addr = responder.local_addr().unwrap();

        let server = Arc::clone(&responder);
        tokio::spawn(async move { server.run().await });

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        assert_ok!(client.send_to(b"GOi", addr).await);

        let mut buf = [0u8; 64];
        let (len, from) = tokio::time::timeout(Duration::from_secs(1), client.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(from, addr);
        assert_eq!(Reply::parse(&buf[..len]), Some(Reply::Info(test_info())));
    }
}
