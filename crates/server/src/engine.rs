use std::collections::VecDeque;

use rift::net::{
    ClientMessage, ControlMessage, PacketWriter, decode_client_packet, open, write_control,
};
use rift::snapshot::pack_snapshot;
use rift::{
    AbilityRegistry, Channel, ConnectionId, NetworkStats, Snapshot, SnapshotHistory, SnapshotId,
    Tick, Transport, TransportEvent,
};

use crate::clients::{ClientRecord, ClientRegistry};
use crate::config::ServerConfig;
use crate::events::{DisconnectReason, ServerEvent};
use crate::simulation::GameWorld;
use crate::tui::ClientInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPhase {
    /// Heroes can move around; no units or crates yet.
    Lobby,
    Running,
}

impl MatchPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchPhase::Lobby => "lobby",
            MatchPhase::Running => "running",
        }
    }
}

/// Authoritative side of the snapshot protocol.
///
/// Each [`tick`](Self::tick) drains the transport, applies inputs, steps the world,
/// captures a snapshot and sends every client a delta against the last snapshot it
/// acknowledged.
pub struct SyncServer<T: Transport> {
    transport: T,
    config: ServerConfig,
    game: GameWorld,
    clients: ClientRegistry,
    history: SnapshotHistory,
    next_snapshot_id: SnapshotId,
    phase: MatchPhase,
    events: VecDeque<ServerEvent>,
    crc_rejects: u64,
    decode_errors: u64,
}

impl<T: Transport> SyncServer<T> {
    pub fn new(transport: T, config: ServerConfig) -> Self {
        Self::with_registry(transport, config, AbilityRegistry::standard())
    }

    pub fn with_registry(transport: T, config: ServerConfig, registry: AbilityRegistry) -> Self {
        Self {
            transport,
            game: GameWorld::new(config.arena_size, registry),
            clients: ClientRegistry::new(),
            history: SnapshotHistory::new(config.max_snapshot_history),
            next_snapshot_id: 1,
            phase: MatchPhase::Lobby,
            events: VecDeque::new(),
            crc_rejects: 0,
            decode_errors: 0,
            config,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn game(&self) -> &GameWorld {
        &self.game
    }

    pub fn clients(&self) -> &ClientRegistry {
        &self.clients
    }

    pub fn history(&self) -> &SnapshotHistory {
        &self.history
    }

    pub fn phase(&self) -> MatchPhase {
        self.phase
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn world_time(&self) -> Tick {
        self.game.tick()
    }

    pub fn drain_events(&mut self) -> impl Iterator<Item = ServerEvent> + '_ {
        self.events.drain(..)
    }

    /// Runs one whole server tick.
    pub fn tick(&mut self) {
        self.receive();
        self.simulate();
        self.capture_snapshot();
        self.send_snapshots();
        self.prune_history();
    }

    fn receive(&mut self) {
        for event in self.transport.poll() {
            match event {
                TransportEvent::Connected(connection) => self.accept(connection),
                TransportEvent::Message {
                    connection,
                    payload,
                    ..
                } => self.handle_packet(connection, &payload),
                TransportEvent::Disconnected(connection) => {
                    self.clients
                        .mark_for_removal(connection, DisconnectReason::Lost);
                }
            }
        }

        for client in self.clients.take_marked() {
            self.game.despawn(client.entity);
            let reason = client.removal.unwrap_or(DisconnectReason::Lost);
            log::info!("client {} {}", client.connection, reason.as_str());
            self.events.push_back(ServerEvent::ClientDisconnected {
                client_id: client.connection,
                reason,
            });
        }

        for client in self.clients.iter_mut() {
            for input in client.take_pending_inputs() {
                self.game.apply_hero_input(client.entity, &input);
            }
        }
    }

    fn accept(&mut self, connection: ConnectionId) {
        if self.clients.len() >= self.config.max_clients {
            self.deny(connection, "server full");
            return;
        }
        let Some(entity) = self.game.spawn_hero() else {
            self.deny(connection, "no room for another hero");
            return;
        };

        self.clients.add(ClientRecord::new(connection, entity));
        self.send_control(
            connection,
            &ControlMessage::Welcome {
                client_id: connection,
                controlled_entity: entity.get(),
                tick_rate: self.config.tick_rate,
                snapshot_id: self.next_snapshot_id,
            },
        );
        log::info!("client {connection} connected, controlling {entity}");
        self.events.push_back(ServerEvent::ClientConnected {
            client_id: connection,
            entity,
        });

        if self.phase == MatchPhase::Lobby
            && self.clients.active_count() >= self.config.min_players_to_start
        {
            self.start_match();
        }
    }

    fn deny(&mut self, connection: ConnectionId, reason: &str) {
        log::warn!("denying connection {connection}: {reason}");
        self.send_control(
            connection,
            &ControlMessage::Goodbye {
                reason: reason.to_string(),
            },
        );
        self.transport.disconnect(connection);
        self.events.push_back(ServerEvent::ConnectionDenied {
            client_id: connection,
            reason: reason.to_string(),
        });
    }

    fn start_match(&mut self) {
        self.phase = MatchPhase::Running;
        self.game.spawn_crates(self.config.crate_count);
        self.game.spawn_wave(self.config.units_per_wave);

        let snapshot_id = self.next_snapshot_id;
        let message = ControlMessage::MatchStart { snapshot_id };
        let connections: Vec<ConnectionId> = self
            .clients
            .iter()
            .filter(|c| c.is_active())
            .map(|c| c.connection)
            .collect();
        for connection in connections {
            self.send_control(connection, &message);
        }
        log::info!("match started at snapshot {snapshot_id}");
        self.events
            .push_back(ServerEvent::MatchStarted { snapshot_id });
    }

    fn handle_packet(&mut self, connection: ConnectionId, datagram: &[u8]) {
        let newest = self.next_snapshot_id.saturating_sub(1);
        let Some(client) = self.clients.get_mut(connection) else {
            log::debug!("packet from unknown connection {connection}");
            return;
        };
        let payload = match open(datagram) {
            Ok(payload) => payload,
            Err(err) => {
                self.crc_rejects += 1;
                log::debug!("dropping packet from client {connection}: {err}");
                return;
            }
        };

        let decoded = decode_client_packet(payload);
        if decoded.error.is_some() {
            self.decode_errors += 1;
        }
        for message in decoded.messages {
            match message {
                ClientMessage::Input(input) => {
                    client.queue_input(input);
                }
                ClientMessage::SnapshotAck(snapshot_id) => {
                    client.acknowledge(snapshot_id, newest);
                }
                ClientMessage::ResyncRequest => {
                    log::debug!("client {connection} asked for a full update");
                    client.force_full = true;
                    self.events
                        .push_back(ServerEvent::ResyncRequested { client_id: connection });
                }
                ClientMessage::Control(ControlMessage::Goodbye { reason }) => {
                    log::debug!("client {connection} leaving: {reason}");
                    if client.removal.is_none() {
                        client.removal = Some(DisconnectReason::Graceful);
                    }
                }
                ClientMessage::Control(other) => {
                    log::warn!("client {connection} sent a server-only message: {other:?}");
                }
            }
        }
    }

    fn simulate(&mut self) {
        self.confirm_respawns();
        self.game.step();
        let interval = self.config.wave_interval_ticks;
        if self.phase == MatchPhase::Running && interval > 0 && self.game.tick() % interval == 0 {
            self.game.spawn_wave(self.config.units_per_wave);
        }
    }

    fn confirm_respawns(&mut self) {
        for client in self.clients.iter().filter(|c| c.is_active()) {
            if let Some(seen) = self.history.get(client.acked_snapshot) {
                self.game.confirm_respawn(client.entity, seen.world_time);
            }
        }
    }

    fn capture_snapshot(&mut self) {
        let id = self.next_snapshot_id;
        self.next_snapshot_id += 1;
        self.history
            .push(Snapshot::capture(id, self.game.tick(), self.game.world()));
    }

    fn send_snapshots(&mut self) {
        let Some(current) = self.history.latest() else {
            return;
        };

        for client in self.clients.iter_mut().filter(|c| c.is_active()) {
            let reference = if client.force_full || client.acked_snapshot == 0 {
                None
            } else {
                let reference = self.history.get(client.acked_snapshot);
                if reference.is_none() {
                    log::debug!(
                        "snapshot {} acked by client {} is gone, sending full update",
                        client.acked_snapshot,
                        client.connection
                    );
                }
                reference
            };

            let mut writer = PacketWriter::with_capacity(1024);
            if let Err(err) = pack_snapshot(
                &mut writer,
                current,
                reference,
                client.applied_input,
                client.entity,
            ) {
                self.events.push_back(ServerEvent::Error {
                    message: format!("packing snapshot {} failed: {err}", current.id),
                });
                continue;
            }

            let datagram = writer.finish();
            client.last_snapshot_bytes = datagram.len();
            client.snapshots_sent += 1;
            if reference.is_none() {
                client.full_updates_sent += 1;
            }
            client.force_full = false;

            if let Err(err) = self
                .transport
                .send(client.connection, Channel::Unreliable, datagram)
            {
                log::warn!("snapshot to client {} not sent: {err}", client.connection);
            }
        }
    }

    fn prune_history(&mut self) {
        let Some(latest) = self.history.latest().map(|s| s.id) else {
            return;
        };
        let floor = self.clients.min_acked().unwrap_or(latest);
        let pruned = self.history.prune_below(floor);
        if pruned > 0 {
            log::trace!("pruned {pruned} snapshots below {floor}");
        }
    }

    fn send_control(&mut self, connection: ConnectionId, message: &ControlMessage) {
        let mut writer = PacketWriter::new();
        if let Err(err) = write_control(&mut writer, message) {
            self.events.push_back(ServerEvent::Error {
                message: format!("encoding control message failed: {err}"),
            });
            return;
        }
        if let Err(err) = self
            .transport
            .send(connection, Channel::Reliable, writer.finish())
        {
            log::warn!("control message to {connection} not sent: {err}");
        }
    }

    /// Says goodbye to a client and drops it at the next tick boundary.
    pub fn kick(&mut self, connection: ConnectionId) {
        if !self.clients.contains(connection) {
            return;
        }
        self.send_control(
            connection,
            &ControlMessage::Goodbye {
                reason: "kicked".into(),
            },
        );
        self.clients
            .mark_for_removal(connection, DisconnectReason::Kicked);
        self.transport.disconnect(connection);
    }

    pub fn shutdown(&mut self) {
        let connections: Vec<ConnectionId> = self.clients.iter().map(|c| c.connection).collect();
        for connection in connections {
            self.send_control(
                connection,
                &ControlMessage::Goodbye {
                    reason: "server shutting down".into(),
                },
            );
            self.clients
                .mark_for_removal(connection, DisconnectReason::Kicked);
            self.transport.disconnect(connection);
        }
        for client in self.clients.take_marked() {
            self.game.despawn(client.entity);
        }
    }

    pub fn stats(&self) -> ServerStats {
        let world = self.game.world();
        ServerStats {
            tick: self.game.tick(),
            phase: self.phase,
            client_count: self.clients.active_count(),
            max_clients: self.config.max_clients,
            entity_count: world.entities.len(),
            projectile_count: world.projectiles.len(),
            retained_snapshots: self.history.len(),
            oldest_snapshot: self.history.oldest().map_or(0, |s| s.id),
            latest_snapshot: self.history.latest().map_or(0, |s| s.id),
            crc_rejects: self.crc_rejects,
            decode_errors: self.decode_errors,
            network: self.transport.stats().clone(),
        }
    }

    pub fn client_infos(&self) -> Vec<ClientInfo> {
        self.clients
            .iter()
            .filter(|c| c.is_active())
            .map(|c| ClientInfo {
                client_id: c.connection,
                entity: c.entity,
                acked_snapshot: c.acked_snapshot,
                applied_input: c.applied_input,
                snapshots_sent: c.snapshots_sent,
                full_updates_sent: c.full_updates_sent,
                last_snapshot_bytes: c.last_snapshot_bytes,
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct ServerStats {
    pub tick: Tick,
    pub phase: MatchPhase,
    pub client_count: usize,
    pub max_clients: usize,
    pub entity_count: usize,
    pub projectile_count: usize,
    pub retained_snapshots: usize,
    pub oldest_snapshot: SnapshotId,
    pub latest_snapshot: SnapshotId,
    pub crc_rejects: u64,
    pub decode_errors: u64,
    pub network: NetworkStats,
}
