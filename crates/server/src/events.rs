use rift::{ConnectionId, SnapshotId, UniqueId};

#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    ClientConnected {
        client_id: ConnectionId,
        entity: UniqueId,
    },
    ClientDisconnected {
        client_id: ConnectionId,
        reason: DisconnectReason,
    },
    ConnectionDenied {
        client_id: ConnectionId,
        reason: String,
    },
    ResyncRequested {
        client_id: ConnectionId,
    },
    MatchStarted {
        snapshot_id: SnapshotId,
    },
    Error {
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    Graceful,
    Lost,
    Kicked,
}

impl DisconnectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisconnectReason::Graceful => "disconnected",
            DisconnectReason::Lost => "lost connection",
            DisconnectReason::Kicked => "kicked",
        }
    }
}
