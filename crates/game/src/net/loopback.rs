use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::simulator::{DelayQueue, LossModel};
use super::stats::{NetworkStats, PacketLossSimulation};
use super::transport::{Channel, ConnectionId, Transport, TransportError, TransportEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Side {
    Listener,
    Client(ConnectionId),
}

#[derive(Debug)]
struct Link {
    open: bool,
    to_client: LossModel,
    to_listener: LossModel,
}

#[derive(Debug, Default)]
struct Hub {
    listening: bool,
    next_connection: ConnectionId,
    links: HashMap<ConnectionId, Link>,
    inboxes: HashMap<Side, DelayQueue<TransportEvent>>,
    default_conditions: PacketLossSimulation,
    seed: Option<u64>,
}

impl Hub {
    fn loss_model(&self, salt: u64) -> LossModel {
        match self.seed {
            Some(seed) => LossModel::seeded(self.default_conditions.clone(), seed ^ salt),
            None => LossModel::new(self.default_conditions.clone()),
        }
    }

    fn deliver(&mut self, to: Side, event: TransportEvent, delay: std::time::Duration) {
        self.inboxes.entry(to).or_default().push(event, delay);
    }
}

/// In-process network joining one listener with any number of clients.
///
/// Cloning shares the same network.
#[derive(Debug, Clone, Default)]
pub struct LoopbackNetwork {
    hub: Arc<Mutex<Hub>>,
}

impl LoopbackNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every link created afterwards starts with these conditions, sampled from `seed`
    /// when one is given.
    pub fn with_conditions(conditions: PacketLossSimulation, seed: Option<u64>) -> Self {
        let network = Self::default();
        {
            let mut hub = network.lock();
            hub.default_conditions = conditions;
            hub.seed = seed;
        }
        network
    }

    fn lock(&self) -> MutexGuard<'_, Hub> {
        self.hub.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn listen(&self) -> LoopbackTransport {
        self.lock().listening = true;
        LoopbackTransport {
            network: self.clone(),
            side: Side::Listener,
            stats: NetworkStats::default(),
        }
    }

    /// Opens a link to the listener. Both ends see `Connected` on their next poll.
    pub fn connect(&self) -> Result<LoopbackTransport, TransportError> {
        let mut hub = self.lock();
        if !hub.listening {
            return Err(TransportError::Closed);
        }
        hub.next_connection += 1;
        let connection = hub.next_connection;
        let link = Link {
            open: true,
            to_client: hub.loss_model(u64::from(connection) << 1),
            to_listener: hub.loss_model((u64::from(connection) << 1) | 1),
        };
        hub.links.insert(connection, link);

        let side = Side::Client(connection);
        hub.deliver(side, TransportEvent::Connected(connection), Default::default());
        hub.deliver(Side::Listener, TransportEvent::Connected(connection), Default::default());
        drop(hub);

        Ok(LoopbackTransport {
            network: self.clone(),
            side,
            stats: NetworkStats::default(),
        })
    }

    /// Replaces the conditions on both directions of one link.
    pub fn set_conditions(&self, connection: ConnectionId, conditions: PacketLossSimulation) {
        if let Some(link) = self.lock().links.get_mut(&connection) {
            link.to_client.set_config(conditions.clone());
            link.to_listener.set_config(conditions);
        }
    }

    pub fn conditions(&self, connection: ConnectionId) -> Option<PacketLossSimulation> {
        self.lock()
            .links
            .get(&connection)
            .map(|link| link.to_client.config().clone())
    }
}

#[derive(Debug)]
pub struct LoopbackTransport {
    network: LoopbackNetwork,
    side: Side,
    stats: NetworkStats,
}

impl LoopbackTransport {
    pub fn is_listener(&self) -> bool {
        self.side == Side::Listener
    }

    /// The link id a client end was assigned.
    pub fn connection_id(&self) -> Option<ConnectionId> {
        match self.side {
            Side::Listener => None,
            Side::Client(connection) => Some(connection),
        }
    }

    fn close(&mut self, connection: ConnectionId) {
        let mut hub = self.network.lock();
        let Some(link) = hub.links.get_mut(&connection) else {
            return;
        };
        if !link.open {
            return;
        }
        link.open = false;
        let peer = match self.side {
            Side::Listener => Side::Client(connection),
            Side::Client(_) => Side::Listener,
        };
        hub.deliver(peer, TransportEvent::Disconnected(connection), Default::default());
    }
}

impl Transport for LoopbackTransport {
    fn send(
        &mut self,
        connection: ConnectionId,
        channel: Channel,
        payload: Vec<u8>,
    ) -> Result<(), TransportError> {
        if let Side::Client(own) = self.side
            && own != connection
        {
            return Err(TransportError::UnknownConnection(connection));
        }

        let mut hub = self.network.lock();
        let Some(link) = hub.links.get_mut(&connection).filter(|link| link.open) else {
            return Err(TransportError::UnknownConnection(connection));
        };

        let (model, to) = match self.side {
            Side::Listener => (&mut link.to_client, Side::Client(connection)),
            Side::Client(_) => (&mut link.to_listener, Side::Listener),
        };

        self.stats.record_sent(payload.len());
        let delay = match channel {
            Channel::Reliable => model.ordered_delay(),
            Channel::Unreliable => {
                if model.should_drop() {
                    self.stats.packets_dropped += 1;
                    return Ok(());
                }
                model.delay()
            }
        };

        hub.deliver(
            to,
            TransportEvent::Message {
                connection,
                channel,
                payload,
            },
            delay,
        );
        Ok(())
    }

    fn poll(&mut self) -> Vec<TransportEvent> {
        let events = {
            let mut hub = self.network.lock();
            hub.inboxes
                .get_mut(&self.side)
                .map(DelayQueue::take_ready)
                .unwrap_or_default()
        };
        for event in &events {
            if let TransportEvent::Message { payload, .. } = event {
                self.stats.record_received(payload.len());
            }
        }
        events
    }

    fn disconnect(&mut self, connection: ConnectionId) {
        self.close(connection);
    }

    fn stats(&self) -> &NetworkStats {
        &self.stats
    }
}

impl Drop for LoopbackTransport {
    fn drop(&mut self) {
        match self.side {
            Side::Client(connection) => self.close(connection),
            Side::Listener => {
                let open: Vec<ConnectionId> = {
                    let mut hub = self.network.lock();
                    hub.listening = false;
                    hub.links
                        .iter()
                        .filter(|(_, link)| link.open)
                        .map(|(&id, _)| id)
                        .collect()
                };
                for connection in open {
                    self.close(connection);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(connection: ConnectionId, payload: &[u8]) -> TransportEvent {
        TransportEvent::Message {
            connection,
            channel: Channel::Unreliable,
            payload: payload.to_vec(),
        }
    }

    #[test]
    fn connect_exchange_disconnect() {
        let network = LoopbackNetwork::new();
        let mut server = network.listen();
        let mut client = network.connect().unwrap();
        let id = client.connection_id().unwrap();

        assert_eq!(server.poll(), vec![TransportEvent::Connected(id)]);
        assert_eq!(client.poll(), vec![TransportEvent::Connected(id)]);

        client.send(id, Channel::Unreliable, vec![1, 2]).unwrap();
        server.send(id, Channel::Unreliable, vec![3]).unwrap();
        assert_eq!(server.poll(), vec![message(id, &[1, 2])]);
        assert_eq!(client.poll(), vec![message(id, &[3])]);
        assert_eq!(server.stats().bytes_received, 2);

        drop(client);
        assert_eq!(server.poll(), vec![TransportEvent::Disconnected(id)]);
        assert!(matches!(
            server.send(id, Channel::Unreliable, vec![0]),
            Err(TransportError::UnknownConnection(_))
        ));
    }

    #[test]
    fn connect_without_listener_fails() {
        let network = LoopbackNetwork::new();
        assert!(matches!(network.connect(), Err(TransportError::Closed)));
    }

    #[test]
    fn loss_spares_the_reliable_channel() {
        let network =
            LoopbackNetwork::with_conditions(PacketLossSimulation::lossy(100.0), Some(3));
        let mut server = network.listen();
        let mut client = network.connect().unwrap();
        let id = client.connection_id().unwrap();
        server.poll();

        client.send(id, Channel::Unreliable, vec![9]).unwrap();
        client.send(id, Channel::Reliable, vec![7]).unwrap();
        let events = server.poll();
        assert_eq!(
            events,
            vec![TransportEvent::Message {
                connection: id,
                channel: Channel::Reliable,
                payload: vec![7],
            }]
        );
        assert_eq!(client.stats().packets_dropped, 1);
    }
}
