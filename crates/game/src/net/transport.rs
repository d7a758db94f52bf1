use std::io;

use super::stats::NetworkStats;

pub type ConnectionId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// May be lost, duplicated or reordered. Snapshots and inputs.
    Unreliable,
    /// Delivered once, in order. Control messages.
    Reliable,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Connected(ConnectionId),
    Message {
        connection: ConnectionId,
        channel: Channel,
        payload: Vec<u8>,
    },
    Disconnected(ConnectionId),
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("no open connection {0}")]
    UnknownConnection(ConnectionId),
    #[error("datagram of {0} bytes is too large")]
    TooLarge(usize),
    #[error("transport closed")]
    Closed,
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Datagram transport consumed by the sync engines.
///
/// `poll` drains whatever arrived since the last call; it never blocks.
pub trait Transport {
    fn send(
        &mut self,
        connection: ConnectionId,
        channel: Channel,
        payload: Vec<u8>,
    ) -> Result<(), TransportError>;

    fn poll(&mut self) -> Vec<TransportEvent>;

    fn disconnect(&mut self, connection: ConnectionId);

    fn stats(&self) -> &NetworkStats;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(
        &mut self,
        connection: ConnectionId,
        channel: Channel,
        payload: Vec<u8>,
    ) -> Result<(), TransportError> {
        (**self).send(connection, channel, payload)
    }

    fn poll(&mut self) -> Vec<TransportEvent> {
        (**self).poll()
    }

    fn disconnect(&mut self, connection: ConnectionId) {
        (**self).disconnect(connection)
    }

    fn stats(&self) -> &NetworkStats {
        (**self).stats()
    }
}
