use std::collections::HashMap;

use rift::net::{
    CommandKind, ControlMessage, PacketReader, PacketWriter, read_control, write_control,
    write_input, write_resync_request, write_snapshot_ack,
};
use rift::snapshot::{SnapshotHeader, unpack_snapshot};
use rift::{
    Channel, ConnectionId, EntityType, InputFlags, LoopbackNetwork, LoopbackTransport, PlayerInput,
    SnapshotId, Transport, TransportEvent, UniqueId, WorldState,
};
use rift_server::{DisconnectReason, MatchPhase, ServerConfig, ServerEvent, SyncServer};

/// Bare protocol client that records everything the server sends.
struct Probe {
    transport: LoopbackTransport,
    connection: ConnectionId,
    states: HashMap<SnapshotId, WorldState>,
    headers: Vec<SnapshotHeader>,
    controls: Vec<ControlMessage>,
    disconnected: bool,
}

impl Probe {
    fn connect(network: &LoopbackNetwork) -> Self {
        let transport = network.connect().unwrap();
        let connection = transport.connection_id().unwrap();
        Self {
            transport,
            connection,
            states: HashMap::new(),
            headers: Vec::new(),
            controls: Vec::new(),
            disconnected: false,
        }
    }

    fn pump(&mut self) {
        for event in self.transport.poll() {
            match event {
                TransportEvent::Connected(_) => {}
                TransportEvent::Message { payload, .. } => self.read(&payload),
                TransportEvent::Disconnected(_) => self.disconnected = true,
            }
        }
    }

    fn read(&mut self, datagram: &[u8]) {
        let mut reader = PacketReader::open(datagram).unwrap();
        while !reader.is_at_end() {
            match CommandKind::try_from(reader.read_u8().unwrap()).unwrap() {
                CommandKind::Snapshot => {
                    let states = &self.states;
                    let decoded = unpack_snapshot(&mut reader, |id| states.get(&id)).unwrap();
                    self.states
                        .insert(decoded.header.snapshot_id, decoded.state);
                    self.headers.push(decoded.header);
                }
                CommandKind::Control => self.controls.push(read_control(&mut reader).unwrap()),
                other => panic!("server sent {other:?}"),
            }
        }
    }

    fn last_header(&self) -> &SnapshotHeader {
        self.headers.last().unwrap()
    }

    fn send(&mut self, build: impl FnOnce(&mut PacketWriter)) {
        let mut writer = PacketWriter::new();
        build(&mut writer);
        self.transport
            .send(self.connection, Channel::Unreliable, writer.finish())
            .unwrap();
    }

    fn ack(&mut self, snapshot_id: SnapshotId) {
        self.send(|w| write_snapshot_ack(w, snapshot_id));
    }
}

fn server_with(config: ServerConfig) -> (LoopbackNetwork, SyncServer<LoopbackTransport>) {
    let network = LoopbackNetwork::new();
    let server = SyncServer::new(network.listen(), config);
    (network, server)
}

fn small_arena() -> ServerConfig {
    ServerConfig {
        crate_count: 2,
        units_per_wave: 1,
        ..ServerConfig::default()
    }
}

#[test]
fn new_client_is_welcomed_and_sent_a_full_update() {
    let (network, mut server) = server_with(small_arena());
    let mut probe = Probe::connect(&network);
    server.tick();
    probe.pump();

    let ControlMessage::Welcome {
        client_id,
        controlled_entity,
        snapshot_id,
        ..
    } = probe.controls[0].clone()
    else {
        panic!("expected welcome, got {:?}", probe.controls);
    };
    assert_eq!(client_id, probe.connection);
    assert_eq!(snapshot_id, 1);
    assert!(matches!(probe.controls[1], ControlMessage::MatchStart { snapshot_id: 1 }));
    assert_eq!(server.phase(), MatchPhase::Running);

    let header = probe.last_header();
    assert_eq!(header.snapshot_id, 1);
    assert_eq!(header.prev_snapshot_id, 0);
    assert!(header.force_full);
    assert_eq!(header.controlled_entity, UniqueId(controlled_entity));

    let state = &probe.states[&1];
    assert!(state.entity(UniqueId(controlled_entity)).is_some());
    assert_eq!(state.count_of(EntityType::Crate), 2);
    assert_eq!(state.count_of(EntityType::Unit), 2);

    let events: Vec<ServerEvent> = server.drain_events().collect();
    assert!(events.contains(&ServerEvent::MatchStarted { snapshot_id: 1 }));
}

#[test]
fn acknowledged_snapshots_become_delta_references() {
    let (network, mut server) = server_with(small_arena());
    let mut probe = Probe::connect(&network);
    server.tick();
    probe.pump();
    probe.ack(1);

    server.tick();
    probe.pump();
    let header = probe.last_header();
    assert_eq!(header.snapshot_id, 2);
    assert_eq!(header.prev_snapshot_id, 1);
    assert!(!header.force_full);

    let ids: Vec<SnapshotId> = server.history().iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![1, 2]);

    probe.ack(2);
    server.tick();
    let ids: Vec<SnapshotId> = server.history().iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![2, 3]);

    // Stale and future acks are ignored.
    probe.ack(1);
    probe.ack(99);
    server.tick();
    assert_eq!(server.clients().get(probe.connection).unwrap().acked_snapshot, 2);
}

#[test]
fn retention_follows_the_slowest_client() {
    let (network, mut server) = server_with(small_arena());
    let mut fast = Probe::connect(&network);
    let mut slow = Probe::connect(&network);
    server.tick();
    fast.pump();
    slow.pump();
    slow.ack(1);

    for id in 2..=5 {
        fast.ack(id - 1);
        server.tick();
        fast.pump();
        slow.pump();
    }
    assert_eq!(server.history().oldest().map(|s| s.id), Some(1));
    assert_eq!(slow.last_header().prev_snapshot_id, 1);
    assert_eq!(fast.last_header().prev_snapshot_id, 4);
}

#[test]
fn resync_request_forces_one_full_update() {
    let (network, mut server) = server_with(small_arena());
    let mut probe = Probe::connect(&network);
    server.tick();
    probe.pump();
    probe.ack(1);
    probe.send(write_resync_request);

    server.tick();
    probe.pump();
    assert_eq!(probe.last_header().prev_snapshot_id, 0);
    assert!(probe.last_header().force_full);
    let events: Vec<ServerEvent> = server.drain_events().collect();
    assert!(events.contains(&ServerEvent::ResyncRequested {
        client_id: probe.connection
    }));

    server.tick();
    probe.pump();
    assert_eq!(probe.last_header().prev_snapshot_id, 1);
}

#[test]
fn inputs_apply_once_and_are_reported() {
    let (network, mut server) = server_with(small_arena());
    let mut probe = Probe::connect(&network);
    server.tick();
    probe.pump();
    let hero = probe.last_header().controlled_entity;
    let start = probe.states[&1].entity(hero).unwrap().position;

    let right = |id| PlayerInput::new(id, InputFlags::RIGHT, 0.0);
    probe.send(|w| {
        write_input(w, &right(1));
        write_input(w, &right(2));
    });
    // Redundant copy of input 2 plus the next one.
    probe.send(|w| {
        write_input(w, &right(2));
        write_input(w, &right(3));
    });
    server.tick();
    probe.pump();

    let header = probe.last_header();
    assert_eq!(header.applied_input_id, 3);
    let moved = probe.states[&header.snapshot_id].entity(hero).unwrap().position;
    let speed = server.game().registry().classes()[0].speed;
    assert!((moved.x - start.x - 3.0 * speed).abs() < 1e-4);
    assert_eq!(moved.y, start.y);
}

#[test]
fn corrupt_packets_are_counted_and_ignored() {
    let (network, mut server) = server_with(small_arena());
    let mut probe = Probe::connect(&network);
    server.tick();
    probe.pump();

    let mut writer = PacketWriter::new();
    write_snapshot_ack(&mut writer, 1);
    let mut datagram = writer.finish();
    datagram[2] ^= 0x40;
    probe
        .transport
        .send(probe.connection, Channel::Unreliable, datagram)
        .unwrap();

    let mut writer = PacketWriter::new();
    write_snapshot_ack(&mut writer, 1);
    writer.write_u8(77);
    probe
        .transport
        .send(probe.connection, Channel::Unreliable, writer.finish())
        .unwrap();

    server.tick();
    let stats = server.stats();
    assert_eq!(stats.crc_rejects, 1);
    assert_eq!(stats.decode_errors, 1);
    // The ack in front of the bad command still counts.
    assert_eq!(server.clients().get(probe.connection).unwrap().acked_snapshot, 1);
}

#[test]
fn dropped_connection_is_removed_at_the_next_tick() {
    let (network, mut server) = server_with(small_arena());
    let probe = Probe::connect(&network);
    let connection = probe.connection;
    server.tick();
    let hero = server.clients().get(connection).unwrap().entity;
    server.drain_events().for_each(drop);

    drop(probe);
    assert!(server.game().world().entity(hero).is_some());
    server.tick();

    assert!(server.clients().is_empty());
    assert!(server.game().world().entity(hero).is_none());
    assert!(server.history().latest().unwrap().state.entity(hero).is_none());
    let events: Vec<ServerEvent> = server.drain_events().collect();
    assert_eq!(
        events,
        vec![ServerEvent::ClientDisconnected {
            client_id: connection,
            reason: DisconnectReason::Lost,
        }]
    );
    // Nobody left to hold history back.
    assert_eq!(server.history().len(), 1);
}

#[test]
fn goodbye_and_kick_remove_clients() {
    let (network, mut server) = server_with(small_arena());
    let mut leaving = Probe::connect(&network);
    let mut kicked = Probe::connect(&network);
    server.tick();

    let mut writer = PacketWriter::new();
    write_control(
        &mut writer,
        &ControlMessage::Goodbye {
            reason: "bye".into(),
        },
    )
    .unwrap();
    leaving
        .transport
        .send(leaving.connection, Channel::Reliable, writer.finish())
        .unwrap();
    server.kick(kicked.connection);
    server.drain_events().for_each(drop);
    server.tick();

    let mut reasons: Vec<DisconnectReason> = server
        .drain_events()
        .filter_map(|event| match event {
            ServerEvent::ClientDisconnected { reason, .. } => Some(reason),
            _ => None,
        })
        .collect();
    reasons.sort_by_key(|reason| reason.as_str());
    assert_eq!(reasons, vec![DisconnectReason::Graceful, DisconnectReason::Kicked]);

    kicked.pump();
    assert!(kicked.disconnected);
    assert!(
        kicked
            .controls
            .contains(&ControlMessage::Goodbye {
                reason: "kicked".into()
            })
    );
}

#[test]
fn full_server_denies_connections() {
    let (network, mut server) = server_with(ServerConfig {
        max_clients: 1,
        ..small_arena()
    });
    let _first = Probe::connect(&network);
    let mut second = Probe::connect(&network);
    server.tick();
    second.pump();

    assert_eq!(server.clients().len(), 1);
    assert!(second.disconnected);
    assert!(matches!(second.controls[..], [ControlMessage::Goodbye { .. }]));
    assert!(second.headers.is_empty());
}

#[test]
fn lobby_waits_for_enough_players() {
    let (network, mut server) = server_with(ServerConfig {
        min_players_to_start: 2,
        ..small_arena()
    });
    let _first = Probe::connect(&network);
    server.tick();
    assert_eq!(server.phase(), MatchPhase::Lobby);
    assert_eq!(server.game().world().count_of(EntityType::Crate), 0);

    let _second = Probe::connect(&network);
    server.tick();
    assert_eq!(server.phase(), MatchPhase::Running);
    assert_eq!(server.game().world().count_of(EntityType::Crate), 2);
}
