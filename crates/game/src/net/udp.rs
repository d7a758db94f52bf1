use std::collections::{BTreeMap, HashMap};
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::net::UdpSocket;
use tokio::sync::mpsc::{self, UnboundedReceiver, error::TryRecvError};
use tokio::task::JoinHandle;

use super::packet::{PacketReader, PacketWriter};
use super::protocol::MAX_DATAGRAM_SIZE;
use super::simulator::{DelayQueue, LossModel};
use super::stats::{NetworkStats, PacketLossSimulation};
use super::transport::{Channel, ConnectionId, Transport, TransportError, TransportEvent};

const TAG_CONNECT: u8 = 1;
const TAG_ACCEPT: u8 = 2;
const TAG_UNRELIABLE: u8 = 3;
const TAG_RELIABLE: u8 = 4;
const TAG_ACK: u8 = 5;
const TAG_DISCONNECT: u8 = 6;
const TAG_KEEPALIVE: u8 = 7;

/// Largest payload that fits behind the biggest transport header.
pub const MAX_PAYLOAD_SIZE: usize = MAX_DATAGRAM_SIZE - 5;

#[derive(Debug, Clone)]
pub struct UdpConfig {
    pub resend_interval: Duration,
    pub keepalive_interval: Duration,
    /// Silence after which a peer is reported disconnected. Also bounds the connect attempt.
    pub timeout: Duration,
    pub connect_retry: Duration,
    pub max_connections: usize,
    /// Reliable sequences a peer may run ahead of delivery, and unacked sends kept per
    /// peer before it is dropped.
    pub max_reliable_window: u32,
    pub conditions: PacketLossSimulation,
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self {
            resend_interval: Duration::from_millis(100),
            keepalive_interval: Duration::from_secs(1),
            timeout: Duration::from_secs(10),
            connect_retry: Duration::from_millis(250),
            max_connections: 32,
            max_reliable_window: 256,
            conditions: PacketLossSimulation::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Datagram {
    Connect { salt: u32 },
    Accept { salt: u32, connection: ConnectionId },
    Unreliable(Vec<u8>),
    Reliable { sequence: u32, payload: Vec<u8> },
    Ack { sequence: u32 },
    Disconnect,
    Keepalive,
}

impl Datagram {
    fn encode(&self) -> Vec<u8> {
        let mut writer = PacketWriter::new();
        match self {
            Datagram::Connect { salt } => {
                writer.write_u8(TAG_CONNECT);
                writer.write_u32(*salt);
            }
            Datagram::Accept { salt, connection } => {
                writer.write_u8(TAG_ACCEPT);
                writer.write_u32(*salt);
                writer.write_u32(*connection);
            }
            Datagram::Unreliable(payload) => {
                writer.write_u8(TAG_UNRELIABLE);
                writer.write_bytes(payload);
            }
            Datagram::Reliable { sequence, payload } => {
                writer.write_u8(TAG_RELIABLE);
                writer.write_u32(*sequence);
                writer.write_bytes(payload);
            }
            Datagram::Ack { sequence } => {
                writer.write_u8(TAG_ACK);
                writer.write_u32(*sequence);
            }
            Datagram::Disconnect => writer.write_u8(TAG_DISCONNECT),
            Datagram::Keepalive => writer.write_u8(TAG_KEEPALIVE),
        }
        writer.into_inner()
    }

    fn decode(bytes: &[u8]) -> Option<Self> {
        let mut reader = PacketReader::new(bytes);
        let datagram = match reader.read_u8().ok()? {
            TAG_CONNECT => Datagram::Connect {
                salt: reader.read_u32().ok()?,
            },
            TAG_ACCEPT => Datagram::Accept {
                salt: reader.read_u32().ok()?,
                connection: reader.read_u32().ok()?,
            },
            TAG_UNRELIABLE => Datagram::Unreliable(reader.read_bytes(reader.remaining()).ok()?.to_vec()),
            TAG_RELIABLE => {
                let sequence = reader.read_u32().ok()?;
                let payload = reader.read_bytes(reader.remaining()).ok()?.to_vec();
                Datagram::Reliable { sequence, payload }
            }
            TAG_ACK => Datagram::Ack {
                sequence: reader.read_u32().ok()?,
            },
            TAG_DISCONNECT => Datagram::Disconnect,
            TAG_KEEPALIVE => Datagram::Keepalive,
            _ => return None,
        };
        Some(datagram)
    }
}

#[derive(Debug)]
struct Unacked {
    payload: Vec<u8>,
    sent_at: Instant,
}

#[derive(Debug)]
struct Peer {
    addr: SocketAddr,
    salt: u32,
    last_heard: Instant,
    last_sent: Instant,
    next_send: u32,
    unacked: BTreeMap<u32, Unacked>,
    next_receive: u32,
    held: BTreeMap<u32, Vec<u8>>,
}

impl Peer {
    fn new(addr: SocketAddr, salt: u32) -> Self {
        let now = Instant::now();
        Self {
            addr,
            salt,
            last_heard: now,
            last_sent: now,
            next_send: 0,
            unacked: BTreeMap::new(),
            next_receive: 0,
            held: BTreeMap::new(),
        }
    }
}

#[derive(Debug)]
enum Role {
    Server { next_connection: ConnectionId },
    Connecting { server: SocketAddr, salt: u32, started: Instant, last_attempt: Instant },
    Client,
    Closed,
}

/// Datagram transport over a tokio UDP socket.
///
/// A background task reads the socket into an unbounded queue; everything else happens in
/// [`Transport::poll`] and [`Transport::send`] on the caller's thread.
#[derive(Debug)]
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    inbound: UnboundedReceiver<(SocketAddr, Vec<u8>)>,
    reader: JoinHandle<()>,
    local_addr: SocketAddr,
    config: UdpConfig,
    role: Role,
    peers: HashMap<ConnectionId, Peer>,
    by_addr: HashMap<SocketAddr, ConnectionId>,
    outgoing: DelayQueue<(SocketAddr, Vec<u8>)>,
    loss: LossModel,
    events: Vec<TransportEvent>,
    stats: NetworkStats,
}

impl UdpTransport {
    /// Listens for clients on `addr`.
    pub async fn bind(addr: SocketAddr, config: UdpConfig) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(addr).await?;
        Self::spawn(socket, config, Role::Server { next_connection: 0 })
    }

    /// Starts connecting to `server`. `Connected` is reported by a later poll once the
    /// server answers.
    pub async fn connect(server: SocketAddr, config: UdpConfig) -> Result<Self, TransportError> {
        let local: SocketAddr = if server.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(local).await?;
        let now = Instant::now();
        let salt = rand::random::<u32>();
        let mut transport = Self::spawn(
            socket,
            config,
            Role::Connecting {
                server,
                salt,
                started: now,
                last_attempt: now,
            },
        )?;
        transport.transmit(server, Datagram::Connect { salt });
        Ok(transport)
    }

    fn spawn(socket: UdpSocket, config: UdpConfig, role: Role) -> Result<Self, TransportError> {
        let local_addr = socket.local_addr()?;
        let socket = Arc::new(socket);
        let (tx, inbound) = mpsc::unbounded_channel();

        let recv_socket = Arc::clone(&socket);
        let reader = tokio::spawn(async move {
            let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE];
            loop {
                match recv_socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if tx.send((addr, buffer[..len].to_vec())).is_err() {
                            break;
                        }
                    }
                    Err(err) => log::debug!("udp receive failed: {err}"),
                }
            }
        });

        log::info!("udp transport bound to {local_addr}");
        Ok(Self {
            socket,
            inbound,
            reader,
            local_addr,
            loss: LossModel::new(config.conditions.clone()),
            config,
            role,
            peers: HashMap::new(),
            by_addr: HashMap::new(),
            outgoing: DelayQueue::new(),
            events: Vec::new(),
            stats: NetworkStats::default(),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn connection_count(&self) -> usize {
        self.peers.len()
    }

    /// True once a connect attempt gave up or the socket reader stopped.
    pub fn is_closed(&self) -> bool {
        matches!(self.role, Role::Closed)
    }

    pub fn set_conditions(&mut self, conditions: PacketLossSimulation) {
        self.loss.set_config(conditions.clone());
        self.config.conditions = conditions;
    }

    fn transmit(&mut self, addr: SocketAddr, datagram: Datagram) {
        let unreliable = matches!(datagram, Datagram::Unreliable(_));
        let bytes = datagram.encode();
        self.stats.record_sent(bytes.len());

        if !self.loss.config().is_active() {
            self.send_now(addr, &bytes);
            return;
        }
        if unreliable && self.loss.should_drop() {
            self.stats.packets_dropped += 1;
            return;
        }
        let delay = if unreliable {
            self.loss.delay()
        } else {
            self.loss.ordered_delay()
        };
        self.outgoing.push((addr, bytes), delay);
    }

    fn send_now(&self, addr: SocketAddr, bytes: &[u8]) {
        match self.socket.try_send_to(bytes, addr) {
            Ok(_) => {}
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                log::debug!("udp send buffer full, dropping datagram to {addr}");
            }
            Err(err) => log::warn!("udp send to {addr} failed: {err}"),
        }
    }

    fn send_to_peer(&mut self, connection: ConnectionId, datagram: Datagram) {
        let Some(peer) = self.peers.get_mut(&connection) else {
            return;
        };
        peer.last_sent = Instant::now();
        let addr = peer.addr;
        self.transmit(addr, datagram);
    }

    fn remove_peer(&mut self, connection: ConnectionId) -> Option<Peer> {
        let peer = self.peers.remove(&connection)?;
        self.by_addr.remove(&peer.addr);
        self.events.push(TransportEvent::Disconnected(connection));
        Some(peer)
    }

    fn add_peer(&mut self, connection: ConnectionId, addr: SocketAddr, salt: u32) {
        self.peers.insert(connection, Peer::new(addr, salt));
        self.by_addr.insert(addr, connection);
        self.events.push(TransportEvent::Connected(connection));
    }

    fn handle_datagram(&mut self, addr: SocketAddr, bytes: &[u8]) {
        let Some(datagram) = Datagram::decode(bytes) else {
            log::debug!("ignoring malformed datagram from {addr}");
            return;
        };
        self.stats.record_received(bytes.len());

        match datagram {
            Datagram::Connect { salt } => self.handle_connect(addr, salt),
            Datagram::Accept { salt, connection } => {
                if let Role::Connecting {
                    server,
                    salt: expected,
                    ..
                } = self.role
                    && server == addr
                    && salt == expected
                {
                    log::info!("connected to {server} as connection {connection}");
                    self.role = Role::Client;
                    self.add_peer(connection, addr, salt);
                }
            }
            other => {
                let Some(&connection) = self.by_addr.get(&addr) else {
                    return;
                };
                self.handle_peer_datagram(connection, other);
            }
        }
    }

    fn handle_connect(&mut self, addr: SocketAddr, salt: u32) {
        if !matches!(self.role, Role::Server { .. }) {
            return;
        }

        if let Some(&connection) = self.by_addr.get(&addr) {
            // A retry of the handshake we already accepted.
            if self.peers.get(&connection).is_some_and(|peer| peer.salt == salt) {
                self.transmit(addr, Datagram::Accept { salt, connection });
                return;
            }
            // Same address, new salt: the old client restarted.
            self.remove_peer(connection);
        }

        if self.peers.len() >= self.config.max_connections {
            log::warn!("refusing {addr}: {} connections open", self.peers.len());
            self.transmit(addr, Datagram::Disconnect);
            return;
        }

        let Role::Server { next_connection } = &mut self.role else {
            return;
        };
        *next_connection += 1;
        let connection = *next_connection;
        log::info!("accepted {addr} as connection {connection}");
        self.add_peer(connection, addr, salt);
        self.send_to_peer(connection, Datagram::Accept { salt, connection });
    }

    fn handle_peer_datagram(&mut self, connection: ConnectionId, datagram: Datagram) {
        let Some(peer) = self.peers.get_mut(&connection) else {
            return;
        };
        peer.last_heard = Instant::now();

        match datagram {
            Datagram::Unreliable(payload) => self.events.push(TransportEvent::Message {
                connection,
                channel: Channel::Unreliable,
                payload,
            }),
            Datagram::Reliable { sequence, payload } => {
                if sequence >= peer.next_receive {
                    if sequence - peer.next_receive >= self.config.max_reliable_window {
                        // Unacked, so a well-behaved sender resends it once the gap closes.
                        log::debug!(
                            "connection {connection}: reliable {sequence} too far ahead of {}",
                            peer.next_receive
                        );
                        return;
                    }
                    peer.held.entry(sequence).or_insert(payload);
                }
                let mut ready = Vec::new();
                while let Some(payload) = peer.held.remove(&peer.next_receive) {
                    ready.push(payload);
                    peer.next_receive += 1;
                }
                self.events.extend(ready.into_iter().map(|payload| TransportEvent::Message {
                    connection,
                    channel: Channel::Reliable,
                    payload,
                }));
                self.send_to_peer(connection, Datagram::Ack { sequence });
            }
            Datagram::Ack { sequence } => {
                peer.unacked.remove(&sequence);
            }
            Datagram::Disconnect => {
                log::info!("connection {connection} closed by peer");
                self.remove_peer(connection);
                if matches!(self.role, Role::Client) {
                    self.role = Role::Closed;
                }
            }
            Datagram::Keepalive => {}
            Datagram::Connect { .. } | Datagram::Accept { .. } => {}
        }
    }

    fn maintain(&mut self) {
        let now = Instant::now();

        if let Role::Connecting {
            server,
            salt,
            started,
            last_attempt,
        } = self.role
        {
            if now.duration_since(started) > self.config.timeout {
                log::warn!("no answer from {server}, giving up");
                self.role = Role::Closed;
            } else if now.duration_since(last_attempt) >= self.config.connect_retry {
                self.role = Role::Connecting {
                    server,
                    salt,
                    started,
                    last_attempt: now,
                };
                self.transmit(server, Datagram::Connect { salt });
            }
        }

        let timed_out: Vec<ConnectionId> = self
            .peers
            .iter()
            .filter(|(_, peer)| now.duration_since(peer.last_heard) > self.config.timeout)
            .map(|(&connection, _)| connection)
            .collect();
        for connection in timed_out {
            log::info!("connection {connection} timed out");
            self.remove_peer(connection);
            if matches!(self.role, Role::Client) {
                self.role = Role::Closed;
            }
        }

        let window = self.config.max_reliable_window as usize;
        let overflowing: Vec<ConnectionId> = self
            .peers
            .iter()
            .filter(|(_, peer)| peer.unacked.len() > window)
            .map(|(&connection, _)| connection)
            .collect();
        for connection in overflowing {
            log::warn!("connection {connection} stopped acking reliable messages, dropping it");
            if let Some(peer) = self.remove_peer(connection) {
                self.send_now(peer.addr, &Datagram::Disconnect.encode());
            }
            if matches!(self.role, Role::Client) {
                self.role = Role::Closed;
            }
        }

        let mut resends = Vec::new();
        let mut keepalives = Vec::new();
        for (&connection, peer) in &mut self.peers {
            for (&sequence, unacked) in &mut peer.unacked {
                if now.duration_since(unacked.sent_at) >= self.config.resend_interval {
                    unacked.sent_at = now;
                    resends.push((
                        connection,
                        Datagram::Reliable {
                            sequence,
                            payload: unacked.payload.clone(),
                        },
                    ));
                }
            }
            if now.duration_since(peer.last_sent) >= self.config.keepalive_interval {
                keepalives.push(connection);
            }
        }
        self.stats.reliable_resends += resends.len() as u64;
        for (connection, datagram) in resends {
            self.send_to_peer(connection, datagram);
        }
        for connection in keepalives {
            self.send_to_peer(connection, Datagram::Keepalive);
        }

        for (addr, bytes) in self.outgoing.take_ready() {
            self.send_now(addr, &bytes);
        }
    }
}

impl Transport for UdpTransport {
    fn send(
        &mut self,
        connection: ConnectionId,
        channel: Channel,
        payload: Vec<u8>,
    ) -> Result<(), TransportError> {
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(TransportError::TooLarge(payload.len()));
        }
        let Some(peer) = self.peers.get_mut(&connection) else {
            return Err(TransportError::UnknownConnection(connection));
        };

        let datagram = match channel {
            Channel::Unreliable => Datagram::Unreliable(payload),
            Channel::Reliable => {
                let sequence = peer.next_send;
                peer.next_send += 1;
                peer.unacked.insert(
                    sequence,
                    Unacked {
                        payload: payload.clone(),
                        sent_at: Instant::now(),
                    },
                );
                Datagram::Reliable { sequence, payload }
            }
        };
        self.send_to_peer(connection, datagram);
        Ok(())
    }

    fn poll(&mut self) -> Vec<TransportEvent> {
        loop {
            match self.inbound.try_recv() {
                Ok((addr, bytes)) => self.handle_datagram(addr, &bytes),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    log::warn!("udp reader stopped");
                    let open: Vec<ConnectionId> = self.peers.keys().copied().collect();
                    for connection in open {
                        self.remove_peer(connection);
                    }
                    self.role = Role::Closed;
                    break;
                }
            }
        }
        self.maintain();
        std::mem::take(&mut self.events)
    }

    fn disconnect(&mut self, connection: ConnectionId) {
        if let Some(peer) = self.peers.remove(&connection) {
            self.by_addr.remove(&peer.addr);
            self.send_now(peer.addr, &Datagram::Disconnect.encode());
        }
    }

    fn stats(&self) -> &NetworkStats {
        &self.stats
    }
}

impl Drop for UdpTransport {
    fn drop(&mut self) {
        for peer in self.peers.values() {
            self.send_now(peer.addr, &Datagram::Disconnect.encode());
        }
        self.reader.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(30)).await;
    }

    #[test]
    fn datagram_encoding() {
        let reliable = Datagram::Reliable {
            sequence: 2,
            payload: vec![9, 8],
        };
        assert_eq!(reliable.encode(), vec![TAG_RELIABLE, 2, 0, 0, 0, 9, 8]);
        assert_eq!(Datagram::decode(&reliable.encode()), Some(reliable));
        assert_eq!(Datagram::decode(&[0xFF]), None);
        assert_eq!(Datagram::decode(&[TAG_ACK, 1]), None);
    }

    #[tokio::test]
    async fn handshake_and_both_channels() {
        let localhost: SocketAddr = (Ipv4Addr::LOCALHOST, 0).into();
        let mut server = UdpTransport::bind(localhost, UdpConfig::default()).await.unwrap();
        let mut client = UdpTransport::connect(server.local_addr(), UdpConfig::default())
            .await
            .unwrap();

        settle().await;
        assert_eq!(server.poll(), vec![TransportEvent::Connected(1)]);
        settle().await;
        assert_eq!(client.poll(), vec![TransportEvent::Connected(1)]);

        client.send(1, Channel::Reliable, vec![1]).unwrap();
        client.send(1, Channel::Reliable, vec![2]).unwrap();
        client.send(1, Channel::Unreliable, vec![3]).unwrap();
        settle().await;

        let payloads: Vec<(Channel, Vec<u8>)> = server
            .poll()
            .into_iter()
            .filter_map(|event| match event {
                TransportEvent::Message { channel, payload, .. } => Some((channel, payload)),
                _ => None,
            })
            .collect();
        assert_eq!(
            payloads,
            vec![
                (Channel::Reliable, vec![1]),
                (Channel::Reliable, vec![2]),
                (Channel::Unreliable, vec![3]),
            ]
        );

        settle().await;
        client.poll();
        assert!(client.peers.get(&1).is_some_and(|peer| peer.unacked.is_empty()));

        drop(client);
        settle().await;
        assert_eq!(server.poll(), vec![TransportEvent::Disconnected(1)]);
    }

    #[tokio::test]
    async fn reliable_payloads_wait_for_gaps() {
        let localhost: SocketAddr = (Ipv4Addr::LOCALHOST, 0).into();
        let mut server = UdpTransport::bind(localhost, UdpConfig::default()).await.unwrap();
        let addr: SocketAddr = (Ipv4Addr::LOCALHOST, 40_000).into();
        server.handle_connect(addr, 7);
        server.poll();

        server.handle_peer_datagram(
            1,
            Datagram::Reliable {
                sequence: 1,
                payload: vec![b'b'],
            },
        );
        assert!(server.poll().is_empty());

        server.handle_peer_datagram(
            1,
            Datagram::Reliable {
                sequence: 0,
                payload: vec![b'a'],
            },
        );
        let delivered: Vec<Vec<u8>> = server
            .poll()
            .into_iter()
            .filter_map(|event| match event {
                TransportEvent::Message { payload, .. } => Some(payload),
                _ => None,
            })
            .collect();
        assert_eq!(delivered, vec![vec![b'a'], vec![b'b']]);
    }

    #[tokio::test]
    async fn far_ahead_reliables_are_not_held() {
        let localhost: SocketAddr = (Ipv4Addr::LOCALHOST, 0).into();
        let config = UdpConfig {
            max_reliable_window: 16,
            ..UdpConfig::default()
        };
        let mut server = UdpTransport::bind(localhost, config).await.unwrap();
        let addr: SocketAddr = (Ipv4Addr::LOCALHOST, 40_001).into();
        server.handle_connect(addr, 7);
        server.poll();

        for n in 0..5_000u32 {
            server.handle_peer_datagram(
                1,
                Datagram::Reliable {
                    sequence: n * 7919 + 1_000_000,
                    payload: vec![0; 64],
                },
            );
        }
        // Inside the window: held until the gap closes.
        server.handle_peer_datagram(
            1,
            Datagram::Reliable {
                sequence: 15,
                payload: vec![b'z'],
            },
        );
        let held = server.peers.get(&1).map(|peer| peer.held.len());
        assert_eq!(held, Some(1));
        assert!(server.poll().is_empty());
    }

    #[tokio::test]
    async fn peer_that_never_acks_is_dropped() {
        let localhost: SocketAddr = (Ipv4Addr::LOCALHOST, 0).into();
        let config = UdpConfig {
            max_reliable_window: 8,
            ..UdpConfig::default()
        };
        let mut server = UdpTransport::bind(localhost, config).await.unwrap();
        let addr: SocketAddr = (Ipv4Addr::LOCALHOST, 40_002).into();
        server.handle_connect(addr, 7);
        server.poll();

        for n in 0..8u8 {
            server.send(1, Channel::Reliable, vec![n]).unwrap();
        }
        assert!(server.poll().is_empty());
        assert_eq!(server.connection_count(), 1);

        server.send(1, Channel::Reliable, vec![8]).unwrap();
        assert_eq!(server.poll(), vec![TransportEvent::Disconnected(1)]);
        assert_eq!(server.connection_count(), 0);
    }
}
