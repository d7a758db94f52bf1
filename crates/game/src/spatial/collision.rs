use std::collections::HashMap;

use crate::id::UniqueId;

use super::quadtree::{LooseQuadtree, QuadtreeConfig};
use super::shape::Shape;
use super::terrain::Terrain;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpatialRecord {
    pub id: UniqueId,
    pub shape: Shape,
    /// Whether the shape stops movement; projectiles and pickups do not.
    pub blocking: bool,
}

/// Keeps the quadtree in step with the simulation, one record per collidable id.
#[derive(Debug, Clone, Default)]
pub struct CollisionManager {
    tree: LooseQuadtree,
    records: HashMap<UniqueId, SpatialRecord>,
}

impl CollisionManager {
    pub fn new(config: QuadtreeConfig) -> Self {
        Self {
            tree: LooseQuadtree::new(config),
            records: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn tree(&self) -> &LooseQuadtree {
        &self.tree
    }

    pub fn record(&self, id: UniqueId) -> Option<&SpatialRecord> {
        self.records.get(&id)
    }

    pub fn records(&self) -> impl Iterator<Item = &SpatialRecord> {
        self.records.values()
    }

    /// Inserts or repositions the record for `id`.
    pub fn update_entity(&mut self, id: UniqueId, shape: Shape, blocking: bool) {
        if !self.tree.update(id, shape) {
            self.tree.insert(id, shape);
        }
        self.records.insert(
            id,
            SpatialRecord {
                id,
                shape,
                blocking,
            },
        );
    }

    pub fn remove_entity(&mut self, id: UniqueId) -> Option<SpatialRecord> {
        let removed = self.records.remove(&id);
        let in_tree = self.tree.remove(id);
        if removed.is_some() != in_tree {
            log::warn!("collision index out of step for {id}");
        }
        removed
    }

    /// Ids whose shapes touch `region`, ascending.
    pub fn query_intersecting(&mut self, region: Shape) -> Vec<UniqueId> {
        let mut ids: Vec<UniqueId> = self
            .tree
            .query_intersects_region(region)
            .map(|(id, _)| id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Lowest blocking id touching `shape` that `filter` accepts.
    pub fn first_blocking<F>(&mut self, shape: Shape, mut filter: F) -> Option<UniqueId>
    where
        F: FnMut(&SpatialRecord) -> bool,
    {
        let records = &self.records;
        self.tree
            .query_intersects_region(shape)
            .filter_map(|(id, _)| records.get(&id))
            .filter(|record| record.blocking && filter(record))
            .map(|record| record.id)
            .min()
    }

    pub fn is_blocked(&mut self, shape: Shape, ignore: UniqueId, terrain: &dyn Terrain) -> bool {
        terrain.is_colliding(&shape) || self.first_blocking(shape, |r| r.id != ignore).is_some()
    }

    pub fn force_cleanup(&mut self) {
        self.tree.force_cleanup();
    }

    pub fn clear(&mut self) {
        self.tree.clear();
        self.records.clear();
    }
}
