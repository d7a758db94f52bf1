use crate::id::UniqueId;
use crate::spatial::CollisionManager;
use crate::store::{Bucket, EntityTable};

use super::entity::{Entity, EntityType};
use super::projectile::Projectile;

/// Every container the simulation mutates; a snapshot is a deep copy of this.
#[derive(Debug, Clone, Default)]
pub struct WorldState {
    pub entities: EntityTable<Entity>,
    pub projectiles: Bucket<Projectile>,
}

impl WorldState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrites `self` with `source`, reusing the projectile allocation.
    pub fn copy_from(&mut self, source: &WorldState) {
        source.projectiles.copy_valid_data_to(&mut self.projectiles);
        self.entities.clone_from(&source.entities);
    }

    pub fn entity(&self, id: UniqueId) -> Option<&Entity> {
        self.entities.at_unique_id(id)
    }

    pub fn entity_mut(&mut self, id: UniqueId) -> Option<&mut Entity> {
        self.entities.at_unique_id_mut(id)
    }

    pub fn count_of(&self, entity_type: EntityType) -> usize {
        self.entities
            .iter()
            .filter(|e| e.entity_type() == entity_type)
            .count()
    }

    /// Rebuilds `collisions` from scratch so it mirrors this state.
    pub fn populate_collisions(&self, collisions: &mut CollisionManager) {
        collisions.clear();
        for entity in &self.entities {
            if !entity.is_dead() {
                collisions.update_entity(entity.id, entity.shape(), entity.blocks_movement());
            }
        }
        for projectile in &self.projectiles {
            collisions.update_entity(projectile.id, projectile.shape(), false);
        }
    }
}
