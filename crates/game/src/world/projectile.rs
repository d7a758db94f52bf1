use glam::Vec2;

use crate::id::{InputId, UniqueId};
use crate::spatial::Shape;

use super::ability::{AbilityId, ProjectileDef};
use super::entity::Team;

#[derive(Debug, Clone, PartialEq)]
pub struct Projectile {
    pub id: UniqueId,
    pub owner: UniqueId,
    pub team: Team,
    pub ability: AbilityId,
    pub position: Vec2,
    /// World units per tick.
    pub velocity: Vec2,
    pub radius: f32,
    pub damage: u16,
    pub remaining_ticks: u32,
    /// Input that fired it, or 0 when the server spawned it on its own.
    pub input_id: InputId,
}

/// Projectile produced by a cast, not yet given an id.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectileSpawn {
    pub owner: UniqueId,
    pub team: Team,
    pub ability: AbilityId,
    pub position: Vec2,
    pub velocity: Vec2,
    pub radius: f32,
    pub damage: u16,
    pub lifetime_ticks: u32,
    pub input_id: InputId,
}

impl ProjectileSpawn {
    pub fn from_def(
        def: &ProjectileDef,
        ability: AbilityId,
        owner: UniqueId,
        team: Team,
        origin: Vec2,
        direction: Vec2,
        input_id: InputId,
    ) -> Self {
        Self {
            owner,
            team,
            ability,
            position: origin,
            velocity: direction * def.speed,
            radius: def.radius,
            damage: def.damage,
            lifetime_ticks: def.lifetime_ticks,
            input_id,
        }
    }

    pub fn into_projectile(self, id: UniqueId) -> Projectile {
        Projectile {
            id,
            owner: self.owner,
            team: self.team,
            ability: self.ability,
            position: self.position,
            velocity: self.velocity,
            radius: self.radius,
            damage: self.damage,
            remaining_ticks: self.lifetime_ticks,
            input_id: self.input_id,
        }
    }
}

impl Projectile {
    pub fn shape(&self) -> Shape {
        Shape::circle(self.position, self.radius)
    }

    /// Moves one tick. Returns false once the projectile has burnt out.
    pub fn advance(&mut self) -> bool {
        if self.remaining_ticks == 0 {
            return false;
        }
        self.position += self.velocity;
        self.remaining_ticks -= 1;
        true
    }

    pub fn is_expired(&self) -> bool {
        self.remaining_ticks == 0
    }
}
