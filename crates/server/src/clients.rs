use std::collections::BTreeMap;

use rift::{Bucket, ConnectionId, InputId, PlayerInput, SnapshotId, UniqueId};

use crate::events::DisconnectReason;

/// Server-side state of one connection.
#[derive(Debug, Clone)]
pub struct ClientRecord {
    pub connection: ConnectionId,
    pub entity: UniqueId,
    /// Highest snapshot the client reported as processed. Never moves backwards.
    pub acked_snapshot: SnapshotId,
    /// Highest input id applied to the simulation.
    pub applied_input: InputId,
    /// Inputs received this tick, waiting to be applied in id order.
    pub pending_inputs: BTreeMap<InputId, PlayerInput>,
    /// Next snapshot goes out full regardless of the ack.
    pub force_full: bool,
    pub removal: Option<DisconnectReason>,
    pub snapshots_sent: u64,
    pub full_updates_sent: u64,
    pub last_snapshot_bytes: usize,
}

impl ClientRecord {
    pub fn new(connection: ConnectionId, entity: UniqueId) -> Self {
        Self {
            connection,
            entity,
            acked_snapshot: 0,
            applied_input: 0,
            pending_inputs: BTreeMap::new(),
            force_full: false,
            removal: None,
            snapshots_sent: 0,
            full_updates_sent: 0,
            last_snapshot_bytes: 0,
        }
    }

    /// Records an ack, ignoring anything older than what was already acknowledged or
    /// newer than the server ever produced.
    pub fn acknowledge(&mut self, snapshot_id: SnapshotId, newest: SnapshotId) -> bool {
        if snapshot_id <= self.acked_snapshot || snapshot_id > newest {
            return false;
        }
        self.acked_snapshot = snapshot_id;
        true
    }

    /// Queues an input unless it was applied already. Redundant copies collapse.
    pub fn queue_input(&mut self, input: PlayerInput) -> bool {
        if input.id <= self.applied_input {
            return false;
        }
        self.pending_inputs.entry(input.id).or_insert(input);
        true
    }

    pub fn take_pending_inputs(&mut self) -> Vec<PlayerInput> {
        let inputs: Vec<PlayerInput> = std::mem::take(&mut self.pending_inputs)
            .into_values()
            .collect();
        if let Some(last) = inputs.last() {
            self.applied_input = last.id;
        }
        inputs
    }

    pub fn is_active(&self) -> bool {
        self.removal.is_none()
    }
}

/// Connected clients in a dense store keyed by connection id.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: Bucket<ClientRecord, ConnectionId>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, record: ClientRecord) -> bool {
        self.clients.add_element(record.connection, record).is_ok()
    }

    pub fn get(&self, connection: ConnectionId) -> Option<&ClientRecord> {
        self.clients.at_unique_id(connection)
    }

    pub fn get_mut(&mut self, connection: ConnectionId) -> Option<&mut ClientRecord> {
        self.clients.at_unique_id_mut(connection)
    }

    pub fn contains(&self, connection: ConnectionId) -> bool {
        self.clients.contains(connection)
    }

    pub fn remove(&mut self, connection: ConnectionId) -> Option<ClientRecord> {
        self.clients.remove_element(connection)
    }

    pub fn mark_for_removal(&mut self, connection: ConnectionId, reason: DisconnectReason) {
        if let Some(client) = self.clients.at_unique_id_mut(connection)
            && client.removal.is_none()
        {
            client.removal = Some(reason);
        }
    }

    /// Removes and returns every client marked since the last call.
    pub fn take_marked(&mut self) -> Vec<ClientRecord> {
        let marked: Vec<ConnectionId> = self
            .clients
            .iter()
            .filter(|c| c.removal.is_some())
            .map(|c| c.connection)
            .collect();
        marked
            .into_iter()
            .filter_map(|connection| self.clients.remove_element(connection))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.clients.iter().filter(|c| c.is_active()).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClientRecord> {
        self.clients.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ClientRecord> {
        self.clients.iter_mut()
    }

    /// Oldest snapshot any client may still pack against.
    pub fn min_acked(&self) -> Option<SnapshotId> {
        self.clients
            .iter()
            .filter(|c| c.is_active())
            .map(|c| c.acked_snapshot)
            .min()
    }
}
