mod ability;
mod entity;
mod projectile;
mod state;

pub use ability::{
    ABILITY_SLOTS, AbilityDef, AbilityEffect, AbilityId, AbilityRegistry, CrateDef, HeroClass,
    HeroClassDef, ProjectileDef, Recharge, UnitDef,
};
pub use entity::{Crate, Entity, EntityKind, EntityType, Hero, StatusFlags, Team, Unit};
pub use projectile::{Projectile, ProjectileSpawn};
pub use state::WorldState;
