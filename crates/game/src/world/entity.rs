use bitflags::bitflags;
use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::id::UniqueId;
use crate::spatial::Shape;
use crate::store::Identified;

use super::ability::{ABILITY_SLOTS, AbilityRegistry, HeroClass, HeroClassDef};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Team(pub u8);

impl Team {
    pub const NEUTRAL: Team = Team(0);

    /// Neutral objects are hostile to everyone.
    pub fn is_hostile_to(self, other: Team) -> bool {
        self != other || self == Team::NEUTRAL
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct StatusFlags: u8 {
        const DEAD = 1 << 0;
        const STUNNED = 1 << 1;
        const INVULNERABLE = 1 << 2;
        const REVEALED = 1 << 3;
        /// Set for the tick a hero comes back; clients snap instead of blending.
        const RESPAWNED = 1 << 4;
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityType {
    Hero = 1,
    Unit = 2,
    Crate = 3,
}

impl TryFrom<u8> for EntityType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(EntityType::Hero),
            2 => Ok(EntityType::Unit),
            3 => Ok(EntityType::Crate),
            other => Err(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Hero {
    pub class: HeroClass,
    /// 0 right after a cast, 1 when ready.
    pub ability_percentages: [f32; ABILITY_SLOTS],
    pub respawn_ticks: u32,
    pub spawn_point: Vec2,
}

impl Hero {
    pub fn new(class: HeroClass, spawn_point: Vec2) -> Self {
        Self {
            class,
            ability_percentages: [1.0; ABILITY_SLOTS],
            respawn_ticks: 0,
            spawn_point,
        }
    }
}

/// Lane walker following a fixed route.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Unit {
    pub waypoints: Vec<Vec2>,
    pub next_waypoint: usize,
    pub speed: f32,
}

impl Unit {
    pub fn target(&self) -> Option<Vec2> {
        self.waypoints.get(self.next_waypoint).copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Crate;

#[derive(Debug, Clone, PartialEq)]
pub enum EntityKind {
    Hero(Hero),
    Unit(Unit),
    Crate(Crate),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub id: UniqueId,
    pub position: Vec2,
    pub team: Team,
    pub max_health: u16,
    pub health: u16,
    /// Degrees in [0, 360). Crates use it as their rotation.
    pub aim_angle: f32,
    pub radius: f32,
    pub status: StatusFlags,
    pub kind: EntityKind,
}

impl Entity {
    /// Blank instance of `entity_type`, filled in field by field by the delta decoder.
    pub fn blank(id: UniqueId, entity_type: EntityType, class: HeroClass) -> Self {
        let kind = match entity_type {
            EntityType::Hero => EntityKind::Hero(Hero::new(class, Vec2::ZERO)),
            EntityType::Unit => EntityKind::Unit(Unit::default()),
            EntityType::Crate => EntityKind::Crate(Crate),
        };
        Self {
            id,
            position: Vec2::ZERO,
            team: Team::NEUTRAL,
            max_health: 0,
            health: 0,
            aim_angle: 0.0,
            radius: 0.0,
            status: StatusFlags::empty(),
            kind,
        }
    }

    pub fn hero(id: UniqueId, def: &HeroClassDef, team: Team, spawn_point: Vec2) -> Self {
        Self {
            id,
            position: spawn_point,
            team,
            max_health: def.max_health,
            health: def.max_health,
            aim_angle: 0.0,
            radius: def.radius,
            status: StatusFlags::empty(),
            kind: EntityKind::Hero(Hero::new(def.class, spawn_point)),
        }
    }

    pub fn unit(id: UniqueId, registry: &AbilityRegistry, team: Team, waypoints: Vec<Vec2>) -> Self {
        let def = registry.unit;
        Self {
            id,
            position: waypoints.first().copied().unwrap_or(Vec2::ZERO),
            team,
            max_health: def.max_health,
            health: def.max_health,
            aim_angle: 0.0,
            radius: def.radius,
            status: StatusFlags::empty(),
            kind: EntityKind::Unit(Unit {
                waypoints,
                next_waypoint: 1,
                speed: def.speed,
            }),
        }
    }

    pub fn crate_at(id: UniqueId, registry: &AbilityRegistry, position: Vec2, rotation: f32) -> Self {
        let def = registry.crate_def;
        Self {
            id,
            position,
            team: Team::NEUTRAL,
            max_health: def.max_health,
            health: def.max_health,
            aim_angle: rotation.rem_euclid(360.0),
            radius: def.half_size,
            status: StatusFlags::empty(),
            kind: EntityKind::Crate(Crate),
        }
    }

    pub fn entity_type(&self) -> EntityType {
        match self.kind {
            EntityKind::Hero(_) => EntityType::Hero,
            EntityKind::Unit(_) => EntityType::Unit,
            EntityKind::Crate(_) => EntityType::Crate,
        }
    }

    pub fn as_hero(&self) -> Option<&Hero> {
        match &self.kind {
            EntityKind::Hero(hero) => Some(hero),
            _ => None,
        }
    }

    pub fn as_hero_mut(&mut self) -> Option<&mut Hero> {
        match &mut self.kind {
            EntityKind::Hero(hero) => Some(hero),
            _ => None,
        }
    }

    pub fn as_unit(&self) -> Option<&Unit> {
        match &self.kind {
            EntityKind::Unit(unit) => Some(unit),
            _ => None,
        }
    }

    pub fn as_unit_mut(&mut self) -> Option<&mut Unit> {
        match &mut self.kind {
            EntityKind::Unit(unit) => Some(unit),
            _ => None,
        }
    }

    pub fn is_dead(&self) -> bool {
        self.status.contains(StatusFlags::DEAD)
    }

    pub fn shape(&self) -> Shape {
        self.shape_at(self.position)
    }

    pub fn shape_at(&self, position: Vec2) -> Shape {
        match self.kind {
            EntityKind::Crate(_) => {
                Shape::rect(position, Vec2::splat(self.radius), self.aim_angle.to_radians())
            }
            EntityKind::Hero(_) | EntityKind::Unit(_) => Shape::circle(position, self.radius),
        }
    }

    /// Heroes and crates stop movement while alive; units walk through everything.
    pub fn blocks_movement(&self) -> bool {
        !self.is_dead() && !matches!(self.kind, EntityKind::Unit(_))
    }

    pub fn can_be_hit(&self) -> bool {
        !self.status.intersects(StatusFlags::DEAD | StatusFlags::INVULNERABLE)
    }

    /// Applies damage and reports whether this blow emptied the health bar.
    pub fn take_damage(&mut self, amount: u16) -> bool {
        if self.health == 0 {
            return false;
        }
        self.health = self.health.saturating_sub(amount);
        self.health == 0
    }
}

impl Identified for Entity {
    fn unique_id(&self) -> UniqueId {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_tag_follows_kind() {
        let registry = AbilityRegistry::standard();
        let def = registry.class(0).unwrap();
        let hero = Entity::hero(UniqueId(1), def, Team(1), Vec2::new(5.0, 5.0));
        assert_eq!(hero.entity_type(), EntityType::Hero);
        assert!(hero.as_hero().is_some());
        assert!(hero.as_unit().is_none());

        let crate_ = Entity::crate_at(UniqueId(2), &registry, Vec2::ZERO, 405.0);
        assert_eq!(crate_.entity_type(), EntityType::Crate);
        assert_eq!(crate_.aim_angle, 45.0);
        assert!(matches!(crate_.shape(), Shape::Rect(_)));

        assert_eq!(EntityType::try_from(2), Ok(EntityType::Unit));
        assert_eq!(EntityType::try_from(9), Err(9));
    }

    #[test]
    fn damage_reports_only_the_killing_blow() {
        let mut unit = Entity::unit(
            UniqueId(3),
            &AbilityRegistry::standard(),
            Team(2),
            vec![Vec2::ZERO, Vec2::X],
        );
        assert!(!unit.take_damage(30));
        assert!(unit.take_damage(30));
        assert!(!unit.take_damage(30));
        assert_eq!(unit.health, 0);
    }

    #[test]
    fn neutral_is_hostile_to_everyone() {
        assert!(Team::NEUTRAL.is_hostile_to(Team::NEUTRAL));
        assert!(Team(1).is_hostile_to(Team(2)));
        assert!(!Team(1).is_hostile_to(Team(1)));
    }
}
