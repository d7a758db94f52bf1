use std::collections::VecDeque;

use glam::Vec2;

use rift::net::{
    CommandKind, ControlMessage, PacketError, PacketReader, PacketWriter, ProtocolError,
    read_control, write_control, write_input, write_resync_request, write_snapshot_ack,
};
use rift::snapshot::{DeltaError, read_snapshot_body, read_snapshot_header};
use rift::{
    AbilityRegistry, Channel, ConnectionId, InputId, NetworkStats, PlayerInput, Snapshot,
    SnapshotHistory, SnapshotId, Tick, Transport, TransportError, TransportEvent, UniqueId,
    WorldState,
};

use super::config::ClientConfig;
use super::input::InputState;
use super::interpolation::{InterpolationConfig, Interpolator};
use super::prediction::{Prediction, Reconciliation};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("not connected")]
    NotConnected,
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Link open, no welcome yet.
    Connecting,
    Connected,
    Disconnected,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Welcomed {
        client_id: ConnectionId,
        controlled_entity: UniqueId,
    },
    /// Released once the snapshot the server named has been applied.
    MatchStarted { snapshot_id: SnapshotId },
    ResyncRequested { missing: SnapshotId },
    Reconciled {
        input_id: InputId,
        outcome: Reconciliation,
    },
    Disconnected { reason: String },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientStats {
    pub snapshots_received: u64,
    pub full_updates: u64,
    /// Duplicates and snapshots older than the newest one applied.
    pub stale_snapshots: u64,
    pub resync_requests: u64,
    pub crc_rejects: u64,
    pub decode_errors: u64,
    pub inputs_sent: u64,
    pub last_snapshot_id: SnapshotId,
    pub last_applied_input: InputId,
}

/// Predicting side of the snapshot protocol.
///
/// [`tick`](Self::tick) runs once per simulation tick: it applies whatever the server
/// sent, predicts the sampled input and sends it. [`frame`](Self::frame) runs once per
/// rendered frame and moves the interpolation clock and the visual correction.
pub struct SyncClient<T: Transport> {
    transport: T,
    config: ClientConfig,
    registry: AbilityRegistry,
    connection: Option<ConnectionId>,
    state: ConnectionState,
    controlled: Option<UniqueId>,
    tick_rate: u32,
    references: SnapshotHistory,
    world: WorldState,
    world_time: Tick,
    newest: SnapshotId,
    resync_pending: bool,
    match_start: Option<SnapshotId>,
    match_started: bool,
    next_input_id: InputId,
    unacked: VecDeque<PlayerInput>,
    prediction: Prediction,
    interpolation: Interpolator,
    events: VecDeque<ClientEvent>,
    stats: ClientStats,
}

impl<T: Transport> SyncClient<T> {
    pub fn new(transport: T, config: ClientConfig) -> Self {
        Self::with_registry(transport, config, AbilityRegistry::standard())
    }

    pub fn with_registry(transport: T, config: ClientConfig, registry: AbilityRegistry) -> Self {
        Self {
            transport,
            registry,
            connection: None,
            state: ConnectionState::Connecting,
            controlled: None,
            tick_rate: config.tick_rate,
            references: SnapshotHistory::new(config.reference_history),
            world: WorldState::new(),
            world_time: 0,
            newest: 0,
            resync_pending: false,
            match_start: None,
            match_started: false,
            next_input_id: 1,
            unacked: VecDeque::with_capacity(config.max_pending_inputs),
            prediction: Prediction::new(&config),
            interpolation: Interpolator::new(InterpolationConfig::from(&config)),
            events: VecDeque::new(),
            stats: ClientStats::default(),
            config,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn registry(&self) -> &AbilityRegistry {
        &self.registry
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn connection(&self) -> Option<ConnectionId> {
        self.connection
    }

    pub fn controlled_entity(&self) -> Option<UniqueId> {
        self.controlled
    }

    pub fn tick_rate(&self) -> u32 {
        self.tick_rate
    }

    /// Newest authoritative world.
    pub fn world(&self) -> &WorldState {
        &self.world
    }

    pub fn world_time(&self) -> Tick {
        self.world_time
    }

    pub fn newest_snapshot(&self) -> SnapshotId {
        self.newest
    }

    pub fn references(&self) -> &SnapshotHistory {
        &self.references
    }

    pub fn match_started(&self) -> bool {
        self.match_started
    }

    pub fn prediction(&self) -> &Prediction {
        &self.prediction
    }

    pub fn interpolation(&self) -> &Interpolator {
        &self.interpolation
    }

    /// Where the controlled hero should be drawn.
    pub fn display_position(&self) -> Option<Vec2> {
        self.prediction.display_position()
    }

    pub fn stats(&self) -> &ClientStats {
        &self.stats
    }

    pub fn network_stats(&self) -> &NetworkStats {
        self.transport.stats()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn drain_events(&mut self) -> impl Iterator<Item = ClientEvent> + '_ {
        self.events.drain(..)
    }

    /// Snaps the controlled hero to its corrected position at the next reconciliation.
    pub fn force_snap(&mut self) {
        self.prediction.force_snap();
    }

    /// Runs one input step: receive, predict `input`, send.
    pub fn tick(&mut self, input: &InputState) {
        self.receive();
        if self.state == ConnectionState::Disconnected || self.connection.is_none() {
            return;
        }
        if self.prediction.hero().is_some() {
            let player_input = input.to_input(self.next_input_id);
            self.next_input_id += 1;
            self.prediction.predict(player_input, &self.registry);
            self.unacked.push_back(player_input);
            while self.unacked.len() > self.config.max_pending_inputs {
                self.unacked.pop_front();
            }
        }
        if let Err(err) = self.send_update() {
            log::warn!("input packet not sent: {err}");
        }
    }

    /// Advances rendering by `dt` seconds.
    pub fn frame(&mut self, dt: f32) {
        self.interpolation
            .advance(f64::from(dt) * f64::from(self.tick_rate));
        self.prediction.update_visual();
    }

    /// Says goodbye and closes the link.
    pub fn disconnect(&mut self) -> Result<(), ClientError> {
        let connection = self.connection.ok_or(ClientError::NotConnected)?;
        if self.state == ConnectionState::Disconnected {
            return Err(ClientError::NotConnected);
        }
        let mut writer = PacketWriter::new();
        write_control(
            &mut writer,
            &ControlMessage::Goodbye {
                reason: "client quit".to_string(),
            },
        )?;
        let sent = self
            .transport
            .send(connection, Channel::Reliable, writer.finish());
        self.transport.disconnect(connection);
        self.state = ConnectionState::Disconnected;
        sent.map_err(ClientError::from)
    }

    fn receive(&mut self) {
        for event in self.transport.poll() {
            match event {
                TransportEvent::Connected(connection) => {
                    log::debug!("link {connection} open, waiting for welcome");
                    self.connection = Some(connection);
                }
                TransportEvent::Message { payload, .. } => self.handle_packet(&payload),
                TransportEvent::Disconnected(_) => {
                    self.drop_connection("connection lost".to_string());
                }
            }
        }
    }

    fn drop_connection(&mut self, reason: String) {
        if self.state == ConnectionState::Disconnected {
            return;
        }
        log::info!("disconnected: {reason}");
        self.state = ConnectionState::Disconnected;
        self.events.push_back(ClientEvent::Disconnected { reason });
    }

    fn handle_packet(&mut self, datagram: &[u8]) {
        let mut reader = match PacketReader::open(datagram) {
            Ok(reader) => reader,
            Err(err) => {
                self.stats.crc_rejects += 1;
                log::debug!("dropping server packet: {err}");
                return;
            }
        };

        while !reader.is_at_end() {
            if let Err(err) = self.read_command(&mut reader) {
                match err {
                    CommandError::MissingReference(missing) => self.request_resync(missing),
                    CommandError::Stale(id) => {
                        log::debug!("skipping snapshot {id}, already at {}", self.newest);
                    }
                    err => {
                        self.stats.decode_errors += 1;
                        log::debug!(
                            "dropping rest of server packet at byte {}: {err}",
                            reader.offset()
                        );
                    }
                }
                return;
            }
        }
    }

    fn read_command(&mut self, reader: &mut PacketReader<'_>) -> Result<(), CommandError> {
        let kind = CommandKind::try_from(reader.read_u8()?)?;
        match kind {
            CommandKind::Snapshot => self.read_snapshot(reader),
            CommandKind::Control => {
                let message = read_control(reader)?;
                self.handle_control(message);
                Ok(())
            }
            other => Err(ProtocolError::UnexpectedCommand(other).into()),
        }
    }

    fn read_snapshot(&mut self, reader: &mut PacketReader<'_>) -> Result<(), CommandError> {
        let header = read_snapshot_header(reader)?;
        if header.snapshot_id <= self.newest {
            self.stats.stale_snapshots += 1;
            return Err(CommandError::Stale(header.snapshot_id));
        }

        let reference = self.reference_for(header.prev_snapshot_id)?;
        let state = read_snapshot_body(reader, reference)?;

        self.stats.snapshots_received += 1;
        self.stats.last_snapshot_id = header.snapshot_id;
        self.stats.last_applied_input = header.applied_input_id;
        if header.prev_snapshot_id == 0 {
            self.stats.full_updates += 1;
            self.resync_pending = false;
        }

        self.newest = header.snapshot_id;
        self.world_time = header.world_time;
        if header.controlled_entity.is_some() && self.controlled != Some(header.controlled_entity)
        {
            self.take_control(header.controlled_entity);
        }

        self.interpolation.push(header.world_time, &state);
        self.prediction.sync_world(&state);
        self.reconcile(&state, header.applied_input_id);
        self.references
            .push(Snapshot::capture(header.snapshot_id, header.world_time, &state));
        self.world = state;

        if let Some(snapshot_id) = self.match_start
            && self.newest >= snapshot_id
        {
            self.match_start = None;
            self.begin_match(snapshot_id);
        }
        Ok(())
    }

    fn reference_for(&self, prev: SnapshotId) -> Result<Option<&WorldState>, CommandError> {
        if prev == 0 {
            return Ok(None);
        }
        self.references
            .get(prev)
            .map(|s| Some(&s.state))
            .ok_or(CommandError::MissingReference(prev))
    }

    fn reconcile(&mut self, state: &WorldState, applied: InputId) {
        while self.unacked.front().is_some_and(|i| i.id <= applied) {
            self.unacked.pop_front();
        }
        let Some(id) = self.controlled else {
            return;
        };
        let Some(hero) = state.entity(id) else {
            log::debug!("controlled hero {id} is not in the snapshot");
            self.prediction.reset();
            return;
        };
        let outcome = self.prediction.reconcile(hero, applied, &self.registry);
        match outcome {
            Reconciliation::Corrected | Reconciliation::Snapped => {
                self.events.push_back(ClientEvent::Reconciled {
                    input_id: applied,
                    outcome,
                });
            }
            Reconciliation::Adopted | Reconciliation::Confirmed | Reconciliation::Stale => {}
        }
    }

    fn take_control(&mut self, entity: UniqueId) {
        log::debug!("controlling hero {entity}");
        self.controlled = Some(entity);
        self.interpolation.exclude(Some(entity));
        self.prediction.reset();
    }

    fn request_resync(&mut self, missing: SnapshotId) {
        log::debug!("snapshot reference {missing} unknown, asking for a full update");
        self.stats.resync_requests += 1;
        self.resync_pending = true;
        self.events
            .push_back(ClientEvent::ResyncRequested { missing });
    }

    fn handle_control(&mut self, message: ControlMessage) {
        match message {
            ControlMessage::Welcome {
                client_id,
                controlled_entity,
                tick_rate,
                snapshot_id,
            } => {
                let entity = UniqueId(controlled_entity);
                log::info!(
                    "welcomed as client {client_id}, hero {entity}, {tick_rate} Hz from snapshot {snapshot_id}"
                );
                self.state = ConnectionState::Connected;
                self.tick_rate = tick_rate;
                if self.controlled != Some(entity) {
                    self.take_control(entity);
                }
                self.events.push_back(ClientEvent::Welcomed {
                    client_id,
                    controlled_entity: entity,
                });
            }
            ControlMessage::MatchStart { snapshot_id } => {
                if self.newest >= snapshot_id {
                    self.begin_match(snapshot_id);
                } else {
                    self.match_start = Some(snapshot_id);
                }
            }
            ControlMessage::Goodbye { reason } => self.drop_connection(reason),
        }
    }

    fn begin_match(&mut self, snapshot_id: SnapshotId) {
        log::info!("match started at snapshot {snapshot_id}");
        self.match_started = true;
        self.events
            .push_back(ClientEvent::MatchStarted { snapshot_id });
    }

    /// Acks the newest snapshot and sends the latest inputs plus a few older unacked ones.
    fn send_update(&mut self) -> Result<(), ClientError> {
        let connection = self.connection.ok_or(ClientError::NotConnected)?;
        let mut writer = PacketWriter::with_capacity(64);
        if self.newest > 0 {
            write_snapshot_ack(&mut writer, self.newest);
        }
        if self.resync_pending {
            write_resync_request(&mut writer);
        }
        let skip = self
            .unacked
            .len()
            .saturating_sub(self.config.input_redundancy + 1);
        for input in self.unacked.iter().skip(skip) {
            write_input(&mut writer, input);
            self.stats.inputs_sent += 1;
        }
        if writer.is_empty() {
            return Ok(());
        }
        self.transport
            .send(connection, Channel::Unreliable, writer.finish())?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
enum CommandError {
    #[error("snapshot {0} is not newer than the last one applied")]
    Stale(SnapshotId),
    #[error("delta reference {0} is not available")]
    MissingReference(SnapshotId),
    #[error(transparent)]
    Delta(DeltaError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl From<DeltaError> for CommandError {
    fn from(err: DeltaError) -> Self {
        match err {
            DeltaError::MissingReference(id) => CommandError::MissingReference(id),
            other => CommandError::Delta(other),
        }
    }
}

impl From<PacketError> for CommandError {
    fn from(err: PacketError) -> Self {
        CommandError::Protocol(err.into())
    }
}

#[cfg(test)]
mod tests {
    use rift::net::{ClientMessage, decode_client_packet};
    use rift::snapshot::pack_snapshot;
    use rift::world::Team;
    use rift::{Entity, LoopbackNetwork, LoopbackTransport};

    use super::*;

    /// Server end of a loopback link, driven by hand.
    struct Peer {
        transport: LoopbackTransport,
        connection: ConnectionId,
        registry: AbilityRegistry,
        sent: Vec<Snapshot>,
    }

    const HERO: UniqueId = UniqueId(5);

    fn pair() -> (Peer, SyncClient<LoopbackTransport>) {
        let network = LoopbackNetwork::new();
        let mut listener = network.listen();
        let client = SyncClient::new(network.connect().unwrap(), ClientConfig::default());
        let connection = match listener.poll().as_slice() {
            [TransportEvent::Connected(connection)] => *connection,
            other => panic!("unexpected {other:?}"),
        };
        let peer = Peer {
            transport: listener,
            connection,
            registry: AbilityRegistry::standard(),
            sent: Vec::new(),
        };
        (peer, client)
    }

    impl Peer {
        fn send(&mut self, writer: PacketWriter, channel: Channel) {
            self.transport
                .send(self.connection, channel, writer.finish())
                .unwrap();
        }

        fn control(&mut self, message: ControlMessage) {
            let mut writer = PacketWriter::new();
            write_control(&mut writer, &message).unwrap();
            self.send(writer, Channel::Reliable);
        }

        fn welcome(&mut self) {
            self.control(ControlMessage::Welcome {
                client_id: self.connection,
                controlled_entity: HERO.get(),
                tick_rate: 30,
                snapshot_id: 1,
            });
        }

        fn world_at(&self, x: f32) -> WorldState {
            let mut state = WorldState::new();
            let hero = Entity::hero(HERO, &self.registry.classes()[0], Team(1), Vec2::new(x, 200.0));
            state.entities.add_entity(hero).ok().unwrap();
            state
        }

        /// Sends snapshot `id` packed against `prev` (0 for full).
        fn snapshot(&mut self, id: SnapshotId, prev: SnapshotId, x: f32, applied: InputId) {
            let snapshot = Snapshot::capture(id, id, &self.world_at(x));
            let reference = self.sent.iter().find(|s| s.id == prev);
            let mut writer = PacketWriter::new();
            pack_snapshot(&mut writer, &snapshot, reference, applied, HERO).unwrap();
            self.send(writer, Channel::Unreliable);
            self.sent.push(snapshot);
        }

        fn received(&mut self) -> Vec<ClientMessage> {
            self.transport
                .poll()
                .into_iter()
                .flat_map(|event| match event {
                    TransportEvent::Message { payload, .. } => {
                        let payload = rift::net::open(&payload).unwrap().to_vec();
                        decode_client_packet(&payload).messages
                    }
                    _ => Vec::new(),
                })
                .collect()
        }
    }

    #[test]
    fn welcome_and_first_snapshot_give_control() {
        let (mut peer, mut client) = pair();
        peer.welcome();
        peer.snapshot(1, 0, 100.0, 0);
        client.tick(&InputState::default());

        assert!(client.is_connected());
        assert_eq!(client.tick_rate(), 30);
        assert_eq!(client.controlled_entity(), Some(HERO));
        assert_eq!(client.display_position(), Some(Vec2::new(100.0, 200.0)));
        assert!(client.interpolation().entity(HERO).is_none());

        // The first input rides along with the ack.
        let messages = peer.received();
        assert_eq!(messages[0], ClientMessage::SnapshotAck(1));
        assert!(matches!(messages[1], ClientMessage::Input(ref input) if input.id == 1));
    }

    #[test]
    fn inputs_are_repeated_until_applied() {
        let (mut peer, mut client) = pair();
        peer.welcome();
        peer.snapshot(1, 0, 100.0, 0);
        let right = InputState {
            right: true,
            ..InputState::default()
        };
        for _ in 0..6 {
            client.tick(&right);
        }
        let inputs = |messages: Vec<ClientMessage>| -> Vec<InputId> {
            messages
                .into_iter()
                .filter_map(|m| match m {
                    ClientMessage::Input(input) => Some(input.id),
                    _ => None,
                })
                .collect()
        };
        let all = inputs(peer.received());
        // Last packet: the newest input plus three older ones.
        assert_eq!(all[all.len() - 4..], [3, 4, 5, 6]);

        let speed = peer.registry.classes()[0].speed;
        peer.snapshot(2, 1, 100.0 + 4.0 * speed, 4);
        client.tick(&right);
        let all = inputs(peer.received());
        assert_eq!(all, vec![5, 6, 7]);
        assert_eq!(client.stats().last_applied_input, 4);
        assert_eq!(client.prediction().stats().corrections, 0);
    }

    #[test]
    fn unknown_reference_triggers_resync() {
        let (mut peer, mut client) = pair();
        peer.welcome();
        peer.snapshot(1, 0, 100.0, 0);
        client.tick(&InputState::default());
        peer.received();

        // Packed against a snapshot the client never saw.
        peer.sent.push(Snapshot::capture(7, 7, &peer.world_at(50.0)));
        peer.snapshot(8, 7, 60.0, 0);
        client.tick(&InputState::default());

        assert_eq!(client.newest_snapshot(), 1);
        assert_eq!(client.stats().resync_requests, 1);
        let events: Vec<ClientEvent> = client.drain_events().collect();
        assert!(events.contains(&ClientEvent::ResyncRequested { missing: 7 }));
        assert!(peer.received().contains(&ClientMessage::ResyncRequest));

        // Still asking until a full update arrives.
        client.tick(&InputState::default());
        assert!(peer.received().contains(&ClientMessage::ResyncRequest));
        peer.snapshot(9, 0, 60.0, 0);
        client.tick(&InputState::default());
        assert_eq!(client.newest_snapshot(), 9);
        assert!(!peer.received().contains(&ClientMessage::ResyncRequest));
    }

    #[test]
    fn old_and_duplicate_snapshots_are_skipped() {
        let (mut peer, mut client) = pair();
        peer.welcome();
        peer.snapshot(1, 0, 100.0, 0);
        peer.snapshot(3, 1, 120.0, 0);
        client.tick(&InputState::default());
        assert_eq!(client.newest_snapshot(), 3);

        peer.snapshot(2, 1, 110.0, 0);
        peer.snapshot(3, 1, 120.0, 0);
        client.tick(&InputState::default());
        assert_eq!(client.newest_snapshot(), 3);
        assert_eq!(client.stats().stale_snapshots, 2);
        assert_eq!(client.world().entity(HERO).unwrap().position.x, 120.0);
    }

    #[test]
    fn match_start_waits_for_its_snapshot() {
        let (mut peer, mut client) = pair();
        peer.welcome();
        peer.control(ControlMessage::MatchStart { snapshot_id: 2 });
        peer.snapshot(1, 0, 100.0, 0);
        client.tick(&InputState::default());
        assert!(!client.match_started());

        peer.snapshot(2, 1, 100.0, 0);
        client.tick(&InputState::default());
        assert!(client.match_started());
        let events: Vec<ClientEvent> = client.drain_events().collect();
        assert!(events.contains(&ClientEvent::MatchStarted { snapshot_id: 2 }));
    }

    #[test]
    fn corrupt_packets_are_counted() {
        let (mut peer, mut client) = pair();
        let mut writer = PacketWriter::new();
        write_snapshot_ack(&mut writer, 1);
        let mut datagram = writer.finish();
        datagram[0] ^= 1;
        peer.transport
            .send(peer.connection, Channel::Unreliable, datagram)
            .unwrap();
        client.tick(&InputState::default());
        assert_eq!(client.stats().crc_rejects, 1);
        // Client-only command from the server.
        let mut writer = PacketWriter::new();
        write_snapshot_ack(&mut writer, 1);
        peer.send(writer, Channel::Unreliable);
        client.tick(&InputState::default());
        assert_eq!(client.stats().decode_errors, 1);
    }

    #[test]
    fn goodbye_and_disconnect() {
        let (mut peer, mut client) = pair();
        peer.welcome();
        peer.control(ControlMessage::Goodbye {
            reason: "kicked".into(),
        });
        client.tick(&InputState::default());
        assert_eq!(client.state(), ConnectionState::Disconnected);
        let events: Vec<ClientEvent> = client.drain_events().collect();
        assert_eq!(
            events.last(),
            Some(&ClientEvent::Disconnected {
                reason: "kicked".into()
            })
        );
        assert!(matches!(client.disconnect(), Err(ClientError::NotConnected)));
    }

    #[test]
    fn disconnect_says_goodbye() {
        let (mut peer, mut client) = pair();
        peer.welcome();
        client.tick(&InputState::default());
        peer.received();
        client.disconnect().unwrap();

        let messages = peer.received();
        assert!(matches!(
            messages.as_slice(),
            [ClientMessage::Control(ControlMessage::Goodbye { .. })]
        ));
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }
}
