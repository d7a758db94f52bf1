use std::collections::VecDeque;

use crate::id::SnapshotId;

use super::Snapshot;

/// Snapshots ordered by id, oldest first.
///
/// The server keeps every snapshot a client might still reference; the client keeps the
/// ones the server might pack against.
#[derive(Debug)]
pub struct SnapshotHistory {
    snapshots: VecDeque<Snapshot>,
    capacity: usize,
}

impl SnapshotHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            snapshots: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Appends `snapshot`, evicting the oldest entry when full. Ids must grow; a stale or
    /// repeated id is refused.
    pub fn push(&mut self, snapshot: Snapshot) -> bool {
        if self.latest().is_some_and(|latest| latest.id >= snapshot.id) {
            log::debug!("refusing snapshot {} behind the newest", snapshot.id);
            return false;
        }
        if self.snapshots.len() == self.capacity {
            self.snapshots.pop_front();
        }
        self.snapshots.push_back(snapshot);
        true
    }

    pub fn get(&self, id: SnapshotId) -> Option<&Snapshot> {
        let index = self.snapshots.binary_search_by_key(&id, |s| s.id).ok()?;
        self.snapshots.get(index)
    }

    pub fn latest(&self) -> Option<&Snapshot> {
        self.snapshots.back()
    }

    pub fn oldest(&self) -> Option<&Snapshot> {
        self.snapshots.front()
    }

    /// Drops every snapshot older than `min_id` and reports how many went.
    pub fn prune_below(&mut self, min_id: SnapshotId) -> usize {
        let keep_from = self.snapshots.partition_point(|s| s.id < min_id);
        self.snapshots.drain(..keep_from);
        keep_from
    }

    pub fn iter(&self) -> impl Iterator<Item = &Snapshot> {
        self.snapshots.iter()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn clear(&mut self) {
        self.snapshots.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::WorldState;

    fn snapshot(id: SnapshotId) -> Snapshot {
        Snapshot::capture(id, id, &WorldState::new())
    }

    #[test]
    fn lookup_and_prune() {
        let mut history = SnapshotHistory::new(16);
        for id in [1, 2, 4, 7] {
            assert!(history.push(snapshot(id)));
        }
        assert!(!history.push(snapshot(7)));
        assert!(history.get(4).is_some());
        assert!(history.get(3).is_none());

        assert_eq!(history.prune_below(4), 2);
        assert_eq!(history.oldest().map(|s| s.id), Some(4));
        assert_eq!(history.prune_below(100), 2);
        assert!(history.is_empty());
    }

    #[test]
    fn full_history_evicts_oldest() {
        let mut history = SnapshotHistory::new(2);
        for id in 1..=3 {
            history.push(snapshot(id));
        }
        let ids: Vec<SnapshotId> = history.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![2, 3]);
    }
}
