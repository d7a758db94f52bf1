//! Hero rules run identically by the server and by client-side prediction.

use glam::Vec2;

use crate::spatial::{CollisionManager, Terrain};
use crate::world::{
    ABILITY_SLOTS, AbilityEffect, AbilityRegistry, Entity, ProjectileSpawn, StatusFlags,
};

use super::input::PlayerInput;

/// Slack when comparing a charge bar against an ability's cost.
const CAST_EPSILON: f32 = 1e-5;

/// Everything a hero's input needs to see of the world around it.
pub struct MovementContext<'a> {
    pub collisions: &'a mut CollisionManager,
    pub terrain: &'a dyn Terrain,
    pub registry: &'a AbilityRegistry,
}

impl MovementContext<'_> {
    fn is_blocked(&mut self, entity: &Entity, position: Vec2) -> bool {
        self.collisions
            .is_blocked(entity.shape_at(position), entity.id, self.terrain)
    }
}

/// Applies one input, advancing the hero by exactly one tick.
///
/// Returns the projectiles the input's casts produced; the caller assigns their ids.
pub fn apply_input(
    entity: &mut Entity,
    input: &PlayerInput,
    ctx: &mut MovementContext<'_>,
) -> Vec<ProjectileSpawn> {
    entity.aim_angle = input.aim_angle;
    if entity.is_dead() {
        return Vec::new();
    }
    let Some(class) = entity.as_hero().map(|h| h.class) else {
        return Vec::new();
    };
    let Some(def) = ctx.registry.class(class) else {
        log::warn!("hero {} has unknown class {class}", entity.id);
        return Vec::new();
    };
    let speed = def.speed;

    recharge_abilities(entity, ctx.registry);

    let mut spawns = Vec::new();
    if !entity.status.contains(StatusFlags::STUNNED) {
        move_entity(entity, input.movement() * speed, ctx);
        spawns = cast_abilities(entity, input, ctx);
    }

    ctx.collisions
        .update_entity(entity.id, entity.shape(), entity.blocks_movement());
    spawns
}

pub fn recharge_abilities(entity: &mut Entity, registry: &AbilityRegistry) {
    let Some(hero) = entity.as_hero_mut() else {
        return;
    };
    for slot in 0..ABILITY_SLOTS {
        if let Some(ability) = registry.slot_ability(hero.class, slot) {
            let bar = &mut hero.ability_percentages[slot];
            *bar = (*bar + ability.recharge.per_tick()).min(1.0);
        }
    }
}

/// Moves by `delta`, sliding along whichever axis stays clear when the full step is
/// blocked. Returns the distance actually travelled.
pub fn move_entity(entity: &mut Entity, delta: Vec2, ctx: &mut MovementContext<'_>) -> Vec2 {
    if delta == Vec2::ZERO {
        return Vec2::ZERO;
    }
    let start = entity.position;

    // Already overlapping something: let the entity walk out of it.
    if ctx.is_blocked(entity, start) {
        entity.position = start + delta;
        return delta;
    }

    let full = start + delta;
    if !ctx.is_blocked(entity, full) {
        entity.position = full;
        return delta;
    }

    let mut position = start;
    let along_x = position + Vec2::new(delta.x, 0.0);
    if delta.x != 0.0 && !ctx.is_blocked(entity, along_x) {
        position = along_x;
    }
    let along_y = position + Vec2::new(0.0, delta.y);
    if delta.y != 0.0 && !ctx.is_blocked(entity, along_y) {
        position = along_y;
    }
    entity.position = position;
    position - start
}

fn cast_abilities(
    entity: &mut Entity,
    input: &PlayerInput,
    ctx: &mut MovementContext<'_>,
) -> Vec<ProjectileSpawn> {
    let mut spawns = Vec::new();
    let Some(class) = entity.as_hero().map(|h| h.class) else {
        return spawns;
    };

    for slot in 0..ABILITY_SLOTS {
        if !input.casts(slot) {
            continue;
        }
        let Some(ability) = ctx.registry.slot_ability(class, slot) else {
            continue;
        };
        let cost = ability.recharge.cost();
        let effect = ability.effect;
        let ability_id = ability.id;

        let Some(hero) = entity.as_hero_mut() else {
            break;
        };
        let bar = &mut hero.ability_percentages[slot];
        if *bar + CAST_EPSILON < cost {
            continue;
        }
        *bar = (*bar - cost).max(0.0);

        let direction = input.aim_direction();
        match effect {
            AbilityEffect::Projectile(def) => {
                let origin = entity.position + direction * (entity.radius + def.radius);
                spawns.push(ProjectileSpawn::from_def(
                    &def,
                    ability_id,
                    entity.id,
                    entity.team,
                    origin,
                    direction,
                    input.id,
                ));
            }
            AbilityEffect::Dash { distance } => dash(entity, direction, distance, ctx),
        }
    }
    spawns
}

fn dash(entity: &mut Entity, direction: Vec2, distance: f32, ctx: &mut MovementContext<'_>) {
    let step_length = (entity.radius * 0.5).max(1.0);
    let steps = (distance / step_length).ceil() as u32;
    let step = direction * (distance / steps.max(1) as f32);

    for _ in 0..steps {
        let next = entity.position + step;
        if ctx.is_blocked(entity, next) {
            break;
        }
        entity.position = next;
    }
}
