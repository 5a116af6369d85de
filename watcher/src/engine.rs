//! Background probe loop: sends pings and info polls, matches replies to
//! records and detects timeouts.

use crate::config::WatcherConfig;
use crate::error::Result;
use crate::notify::{ChangeKind, Notifier};
use crate::record::RecordHandle;
use log::{debug, error, info, warn};
use parking_lot::{Mutex, RwLock};
use protocol::{Reply, Request, MAX_DATAGRAM};
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Pause between receive attempts while nothing is pending.
const IDLE_SLEEP: Duration = Duration::from_millis(1);

/// Non-blocking UDP socket used by the loop.
///
/// Connectionless sockets on some platforms surface ICMP port unreachable
/// messages as receive errors; when that happens the socket is replaced.
pub(crate) struct Transport {
    socket: UdpSocket,
}

impl Transport {
    pub(crate) fn bind() -> io::Result<Self> {
        Ok(Self {
            socket: Self::open()?,
        })
    }

    fn open() -> io::Result<UdpSocket> {
        let socket = UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0))?;
        socket.set_nonblocking(true)?;
        Ok(socket)
    }

    pub(crate) fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    fn send(&self, request: Request, to: SocketAddrV4) -> io::Result<()> {
        self.socket.send_to(request.as_bytes(), to)?;
        Ok(())
    }

    fn try_recv(&self, buffer: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>> {
        match self.socket.recv_from(buffer) {
            Ok(received) => Ok(Some(received)),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn recreate(&mut self) -> io::Result<()> {
        self.socket = Self::open()?;
        Ok(())
    }
}

/// State shared between the public facade and the loop thread.
pub(crate) struct Engine {
    records: Mutex<Vec<RecordHandle>>,
    config: RwLock<WatcherConfig>,
    notifier: Notifier,
    running: AtomicBool,
}

impl Engine {
    pub(crate) fn new(config: WatcherConfig, notifier: Notifier) -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            config: RwLock::new(config),
            notifier,
            running: AtomicBool::new(false),
        }
    }

    pub(crate) fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub(crate) fn config(&self) -> WatcherConfig {
        *self.config.read()
    }

    /// Applies a validated change to the configuration. A failed update
    /// leaves the configuration untouched.
    pub(crate) fn update_config<F>(&self, update: F) -> Result<()>
    where
        F: FnOnce(&mut WatcherConfig) -> Result<()>,
    {
        update(&mut self.config.write())
    }

    pub(crate) fn insert(&self, record: RecordHandle) {
        self.records.lock().push(record);
    }

    pub(crate) fn remove(&self, record: &RecordHandle) -> bool {
        let mut records = self.records.lock();
        let before = records.len();
        records.retain(|r| !Arc::ptr_eq(r, record));
        records.len() != before
    }

    pub(crate) fn clear(&self) {
        self.records.lock().clear();
    }

    /// Copy of the current record set; the lock is released on return.
    pub(crate) fn snapshot(&self) -> Vec<RecordHandle> {
        self.records.lock().clone()
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub(crate) fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    /// Notifies listeners unless `record` was removed in the meantime.
    fn notify_if_watched(&self, record: &RecordHandle, kind: ChangeKind) {
        let records = self.records.lock();
        if records.iter().any(|r| Arc::ptr_eq(r, record)) {
            self.notifier.notify(record, kind);
        } else {
            debug!("Dropping {:?} change for removed server {}", kind, record.endpoint());
        }
    }

    fn matching(&self, from: SocketAddr) -> Vec<RecordHandle> {
        let SocketAddr::V4(from) = from else {
            return Vec::new();
        };

        self.records
            .lock()
            .iter()
            .filter(|record| record.endpoint() == from)
            .cloned()
            .collect()
    }

    /// Decodes a datagram from `from` and applies it to every record
    /// watching that endpoint. Returns the number of records updated.
    pub(crate) fn handle_datagram(&self, from: SocketAddr, data: &[u8], now: Instant) -> usize {
        let Some(reply) = Reply::parse(data) else {
            debug!("Ignoring unrecognised {} byte datagram from {}", data.len(), from);
            return 0;
        };

        let records = self.matching(from);
        if records.is_empty() {
            debug!("Ignoring reply from unwatched endpoint {}", from);
            return 0;
        }

        for record in &records {
            let change = match &reply {
                Reply::Ping => record.apply_ping_reply(now),
                Reply::Info(info) => record.apply_info_reply(info.clone()),
            };

            if let Some(kind) = change {
                debug!("Server {} changed: {:?}", record.endpoint(), kind);
                self.notify_if_watched(record, kind);
            }
        }

        records.len()
    }

    /// Times out silent records, then probes every record once.
    pub(crate) fn send_round(
        &self,
        transport: &Transport,
        records: &[RecordHandle],
        send_poll: bool,
        window: Duration,
    ) {
        for record in records {
            if let Some(kind) = record.check_timeout(Instant::now(), window) {
                info!("Server {} timed out", record.endpoint());
                self.notify_if_watched(record, kind);
            }

            if let Err(e) = transport.send(Request::Ping, record.endpoint()) {
                debug!("Failed to ping {}: {}", record.endpoint(), e);
            }
            record.mark_probe_sent(Instant::now());

            if send_poll {
                if let Err(e) = transport.send(Request::Info, record.endpoint()) {
                    debug!("Failed to poll {}: {}", record.endpoint(), e);
                }
            }
        }
    }

    /// Handles at most one pending datagram. Returns `false` when nothing
    /// was waiting.
    pub(crate) fn receive_once(&self, transport: &mut Transport, buffer: &mut [u8]) -> bool {
        match transport.try_recv(buffer) {
            Ok(Some((len, from))) => {
                let data = &buffer[..len];
                let handled = catch_unwind(AssertUnwindSafe(|| {
                    self.handle_datagram(from, data, Instant::now())
                }));
                if handled.is_err() {
                    warn!("Panic while handling datagram from {}", from);
                }
                true
            }
            Ok(None) => false,
            Err(e) => {
                self.recover(transport, e);
                true
            }
        }
    }

    /// Replaces the socket after a receive error.
    pub(crate) fn recover(&self, transport: &mut Transport, cause: io::Error) {
        debug!("Receive failed ({}), recreating socket", cause);
        if let Err(e) = transport.recreate() {
            error!("Failed to recreate watcher socket: {}", e);
        }
        thread::sleep(IDLE_SLEEP);
    }

    /// Loop body run on the watcher thread until `running` is cleared.
    pub(crate) fn run(&self, mut transport: Transport) {
        match transport.local_addr() {
            Ok(addr) => info!("Server watcher probing from {}", addr),
            Err(e) => info!("Server watcher started ({})", e),
        }

        let mut buffer = [0u8; MAX_DATAGRAM];
        let mut last_poll: Option<Instant> = None;

        while self.is_running() {
            let config = self.config();
            let records = self.snapshot();
            let round_start = Instant::now();

            let send_poll = last_poll
                .map_or(true, |at| round_start.duration_since(at) >= config.poll_interval());
            let sent = catch_unwind(AssertUnwindSafe(|| {
                self.send_round(&transport, &records, send_poll, config.timeout_window())
            }));
            if sent.is_err() {
                warn!("Panic during send round, continuing with the next one");
            }
            if send_poll {
                last_poll = Some(round_start);
            }

            // Collect replies until the next ping round is due.
            while self.is_running() && round_start.elapsed() < config.ping_interval() {
                if !self.receive_once(&mut transport, &mut buffer) {
                    thread::sleep(IDLE_SLEEP);
                }
            }
        }

        info!("Server watcher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{ServerRecord, ServerState};
    use protocol::ServerInfo;
    use std::net::IpAddr;
    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio::time::{sleep, timeout};

    use crate::notify::StatusChange;

    fn test_engine() -> (Engine, UnboundedReceiver<StatusChange>) {
        let notifier = Notifier::new().unwrap();
        let rx = notifier.subscribe();
        (Engine::new(WatcherConfig::default(), notifier), rx)
    }

    fn add_record(engine: &Engine, port: u16) -> RecordHandle {
        let record = Arc::new(
            ServerRecord::new(SocketAddrV4::new(Ipv4Addr::LOCALHOST, port), "localhost").unwrap(),
        );
        engine.insert(Arc::clone(&record));
        record
    }

    fn from(port: u16) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
    }

    fn info_reply(players: u8) -> Vec<u8> {
        protocol::Reply::Info(ServerInfo::new(0, 1, 0, players, 16, "Test")).encode()
    }

    async fn drain(rx: &mut UnboundedReceiver<StatusChange>) -> Vec<StatusChange> {
        sleep(Duration::from_millis(50)).await;
        let mut changes = Vec::new();
        while let Ok(change) = rx.try_recv() {
            changes.push(change);
        }
        changes
    }

    #[tokio::test]
    async fn test_ping_reply_updates_only_matching_record() {
        let (engine, mut rx) = test_engine();
        let target = add_record(&engine, 5000);
        let other = add_record(&engine, 5001);

        let updated = engine.handle_datagram(from(5000), b"GOp\x01", Instant::now());
        assert_eq!(updated, 1);

        let change = timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(change.kind, ChangeKind::CameOnline);
        assert!(Arc::ptr_eq(&change.server, &target));
        assert!(change.status.ping_successful());

        assert!(target.ping_successful());
        assert_eq!(other.state(), ServerState::Unknown);
        assert!(drain(&mut rx).await.is_empty());
    }

    #[tokio::test]
    async fn test_identical_info_replies_notify_once() {
        let (engine, mut rx) = test_engine();
        let record = add_record(&engine, 5000);
        engine.handle_datagram(from(5000), b"GOp\x01", Instant::now());

        engine.handle_datagram(from(5000), &info_reply(3), Instant::now());
        engine.handle_datagram(from(5000), &info_reply(3), Instant::now());

        let kinds: Vec<ChangeKind> = drain(&mut rx).await.iter().map(|c| c.kind).collect();
        assert_eq!(kinds, vec![ChangeKind::CameOnline, ChangeKind::Info]);
        assert_eq!(record.info().unwrap().players, 3);

        engine.handle_datagram(from(5000), &info_reply(4), Instant::now());
        let kinds: Vec<ChangeKind> = drain(&mut rx).await.iter().map(|c| c.kind).collect();
        assert_eq!(kinds, vec![ChangeKind::Info]);
    }

    #[tokio::test]
    async fn test_malformed_datagrams_are_ignored() {
        let (engine, mut rx) = test_engine();
        let record = add_record(&engine, 5000);

        let garbage: [&[u8]; 5] = [
            b"",
            b"GOp",
            b"XYZ\x01\x00\x01\x00\x03\x10",
            b"GOi\x01\x00\x01",
            b"GOi\x02\x00\x01\x00\x03\x10name",
        ];
        for data in garbage {
            assert_eq!(engine.handle_datagram(from(5000), data, Instant::now()), 0);
        }

        assert_eq!(record.state(), ServerState::Unknown);
        assert!(record.last_probe_sent_at().is_none());
        assert!(drain(&mut rx).await.is_empty());
    }

    #[tokio::test]
    async fn test_reply_after_removal_is_ignored() {
        let (engine, mut rx) = test_engine();
        let record = add_record(&engine, 5000);
        assert!(engine.remove(&record));
        assert!(!engine.remove(&record));

        assert_eq!(
            engine.handle_datagram(from(5000), b"GOp\x01", Instant::now()),
            0
        );
        assert!(!record.ping_successful());
        assert!(drain(&mut rx).await.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_endpoints_are_independent_records() {
        let (engine, mut rx) = test_engine();
        let first = add_record(&engine, 5000);
        let second = add_record(&engine, 5000);

        assert_eq!(
            engine.handle_datagram(from(5000), b"GOp\x01", Instant::now()),
            2
        );
        assert!(first.ping_successful());
        assert!(second.ping_successful());
        assert_eq!(drain(&mut rx).await.len(), 2);

        engine.remove(&first);
        assert_eq!(engine.snapshot().len(), 1);
        assert!(Arc::ptr_eq(&engine.snapshot()[0], &second));
    }

    #[tokio::test]
    async fn test_send_round_times_out_silent_records() {
        let (engine, mut rx) = test_engine();
        let transport = Transport::bind().unwrap();
        let record = add_record(&engine, 9);

        engine.handle_datagram(from(9), b"GOp\x01", Instant::now());
        assert_eq!(drain(&mut rx).await.len(), 1);

        let window = Duration::from_millis(20);
        sleep(Duration::from_millis(40)).await;

        engine.send_round(&transport, &engine.snapshot(), true, window);
        let changes = drain(&mut rx).await;
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].kind, ChangeKind::TimedOut);
        assert!(!changes[0].status.ping_successful());
        assert!(record.info().is_none());
        assert!(record.last_probe_sent_at().is_some());

        // a second round does not repeat the notification
        engine.send_round(&transport, &engine.snapshot(), false, window);
        assert!(drain(&mut rx).await.is_empty());
    }

    #[test]
    fn test_probes_reach_the_wire() {
        let (engine, _rx) = test_engine();
        let transport = Transport::bind().unwrap();

        let server = UdpSocket::bind("127.0.0.1:0").unwrap();
        server
            .set_read_timeout(Some(Duration::from_millis(500)))
            .unwrap();
        let port = server.local_addr().unwrap().port();
        add_record(&engine, port);

        engine.send_round(&transport, &engine.snapshot(), true, Duration::from_secs(5));

        let mut buf = [0u8; 16];
        let (len, _) = server.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..len], b"GOp");
        let (len, _) = server.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..len], b"GOi");
    }

    #[test]
    fn test_config_update_is_atomic() {
        let (engine, _rx) = test_engine();
        let result = engine.update_config(|c| c.set_poll_interval(Duration::from_millis(10)));
        assert!(result.is_err());
        assert_eq!(engine.config(), WatcherConfig::default());
    }

    #[tokio::test]
    async fn test_removed_record_does_not_time_out_loudly() {
        let (engine, mut rx) = test_engine();
        let transport = Transport::bind().unwrap();
        let record = add_record(&engine, 9);

        let snapshot = engine.snapshot();
        assert!(engine.remove(&record));
        sleep(Duration::from_millis(10)).await;

        engine.send_round(&transport, &snapshot, false, Duration::from_millis(1));
        assert_eq!(record.state(), ServerState::TimedOut);
        assert!(drain(&mut rx).await.is_empty());
    }

    /// Waits for `receive_once` to pick up a datagram.
    fn receive_within(engine: &Engine, transport: &mut Transport, limit: Duration) -> bool {
        let mut buffer = [0u8; MAX_DATAGRAM];
        let deadline = Instant::now() + limit;
        while Instant::now() < deadline {
            if engine.receive_once(transport, &mut buffer) {
                return true;
            }
            thread::sleep(IDLE_SLEEP);
        }
        false
    }

    /// Answers one ping with a ping reply.
    fn answer_ping(server: &UdpSocket) {
        let mut buf = [0u8; 16];
        let (len, from) = server.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..len], b"GOp");
        server.send_to(b"GOp\x01", from).unwrap();
    }

    #[test]
    fn test_recreated_transport_sends_and_receives() {
        let mut transport = Transport::bind().unwrap();
        transport.recreate().unwrap();

        let server = UdpSocket::bind("127.0.0.1:0").unwrap();
        server
            .set_read_timeout(Some(Duration::from_millis(500)))
            .unwrap();
        let SocketAddr::V4(server_addr) = server.local_addr().unwrap() else {
            panic!("expected an IPv4 address");
        };

        transport.send(Request::Ping, server_addr).unwrap();
        answer_ping(&server);

        let mut buf = [0u8; 16];
        let deadline = Instant::now() + Duration::from_millis(500);
        let received = loop {
            if let Some(received) = transport.try_recv(&mut buf).unwrap() {
                break Some(received);
            }
            if Instant::now() > deadline {
                break None;
            }
            thread::sleep(IDLE_SLEEP);
        };

        let (len, from) = received.unwrap();
        assert_eq!(&buf[..len], b"GOp\x01");
        assert_eq!(from, SocketAddr::V4(server_addr));
    }

    #[tokio::test]
    async fn test_probing_continues_after_receive_error() {
        let (engine, mut rx) = test_engine();
        let mut transport = Transport::bind().unwrap();

        let server = UdpSocket::bind("127.0.0.1:0").unwrap();
        server
            .set_read_timeout(Some(Duration::from_millis(500)))
            .unwrap();
        let record = add_record(&engine, server.local_addr().unwrap().port());

        engine.recover(
            &mut transport,
            io::Error::new(io::ErrorKind::ConnectionReset, "port unreachable"),
        );

        engine.send_round(&transport, &engine.snapshot(), false, Duration::from_secs(5));
        answer_ping(&server);

        assert!(receive_within(&engine, &mut transport, Duration::from_millis(500)));
        assert!(record.ping_successful());

        let kinds: Vec<ChangeKind> = drain(&mut rx).await.iter().map(|c| c.kind).collect();
        assert_eq!(kinds, vec![ChangeKind::CameOnline]);
    }
}
