mod delta;
mod history;

pub use delta::{
    DecodedSnapshot, DeltaError, SnapshotHeader, pack_snapshot, read_snapshot_body,
    read_snapshot_header, unpack_snapshot,
};
pub use history::SnapshotHistory;

use crate::id::{SnapshotId, Tick};
use crate::world::WorldState;

/// Immutable copy of every simulated container, tagged with a strictly increasing id.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub id: SnapshotId,
    pub world_time: Tick,
    pub state: WorldState,
}

impl Snapshot {
    pub fn capture(id: SnapshotId, world_time: Tick, state: &WorldState) -> Self {
        let mut copy = WorldState::new();
        copy.copy_from(state);
        Self {
            id,
            world_time,
            state: copy,
        }
    }
}
