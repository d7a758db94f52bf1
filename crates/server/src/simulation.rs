use std::collections::HashMap;

use glam::Vec2;

use rift::spatial::{Aabb, ArenaBounds, QuadtreeConfig};
use rift::world::{ABILITY_SLOTS, EntityKind, ProjectileSpawn, StatusFlags};
use rift::{
    AbilityRegistry, CollisionManager, Entity, EntityType, MovementContext, PlayerInput, Team,
    Terrain, Tick, UniqueId, UniqueIdAllocator, WorldState, apply_input,
};

pub const TEAMS: [Team; 2] = [Team(1), Team(2)];

/// The authoritative world plus everything needed to step it.
#[derive(Debug)]
pub struct GameWorld {
    world: WorldState,
    collisions: CollisionManager,
    terrain: ArenaBounds,
    registry: AbilityRegistry,
    ids: UniqueIdAllocator,
    tick: Tick,
    /// Heroes still flagged `RESPAWNED`, with the tick they came back on.
    respawns: HashMap<UniqueId, Tick>,
}

impl GameWorld {
    pub fn new(arena_size: Vec2, registry: AbilityRegistry) -> Self {
        let collisions = CollisionManager::new(QuadtreeConfig {
            bounds: Aabb::new(Vec2::ZERO, arena_size),
            ..QuadtreeConfig::default()
        });
        Self {
            world: WorldState::new(),
            collisions,
            terrain: ArenaBounds::new(arena_size),
            registry,
            ids: UniqueIdAllocator::new(),
            tick: 0,
            respawns: HashMap::new(),
        }
    }

    pub fn world(&self) -> &WorldState {
        &self.world
    }

    pub fn registry(&self) -> &AbilityRegistry {
        &self.registry
    }

    pub fn terrain(&self) -> &ArenaBounds {
        &self.terrain
    }

    pub fn collisions(&self) -> &CollisionManager {
        &self.collisions
    }

    pub fn tick(&self) -> Tick {
        self.tick
    }

    fn arena_size(&self) -> Vec2 {
        self.terrain.floor.max - self.terrain.floor.min
    }

    fn allocate_id(&mut self) -> Option<UniqueId> {
        let id = self.ids.allocate();
        if id.is_none() {
            log::error!("unique id space exhausted");
        }
        id
    }

    fn add_entity(&mut self, entity: Entity) -> Option<UniqueId> {
        let shape = entity.shape();
        let blocking = entity.blocks_movement();
        match self.world.entities.add_entity(entity) {
            Ok(id) => {
                self.collisions.update_entity(id, shape, blocking);
                Some(id)
            }
            Err(duplicate) => {
                log::warn!("{duplicate}");
                None
            }
        }
    }

    /// Base of `team`, where its heroes spawn and its units set off.
    pub fn base_of(&self, team: Team) -> Vec2 {
        let size = self.arena_size();
        let x = if team == TEAMS[0] { 0.1 } else { 0.9 };
        Vec2::new(size.x * x, size.y * 0.5)
    }

    /// Adds a hero for a new player on the smaller team.
    pub fn spawn_hero(&mut self) -> Option<UniqueId> {
        let heroes: Vec<Team> = self
            .world
            .entities
            .iter()
            .filter(|e| e.entity_type() == EntityType::Hero)
            .map(|e| e.team)
            .collect();
        let on_team = |team: Team| heroes.iter().filter(|&&t| t == team).count();
        let team = if on_team(TEAMS[0]) <= on_team(TEAMS[1]) {
            TEAMS[0]
        } else {
            TEAMS[1]
        };
        let slot = on_team(team);
        let class_count = self.registry.classes().len().max(1);
        let class = self.registry.classes().get(heroes.len() % class_count)?.clone();

        let offset = (slot % 5) as f32 - 2.0;
        let spawn_point = self.base_of(team) + Vec2::new(0.0, offset * (class.radius * 3.0));
        let id = self.allocate_id()?;
        self.add_entity(Entity::hero(id, &class, team, spawn_point))
    }

    /// Lays out crates in two staggered columns across the middle of the arena.
    pub fn spawn_crates(&mut self, count: usize) {
        let size = self.arena_size();
        let spacing = size.y / (count + 1) as f32;
        for index in 0..count {
            let side = if index % 2 == 0 { -1.0 } else { 1.0 };
            let position = Vec2::new(size.x * 0.5 + side * 120.0, spacing * (index + 1) as f32);
            let Some(id) = self.allocate_id() else {
                return;
            };
            let crate_ = Entity::crate_at(id, &self.registry, position, index as f32 * 30.0);
            self.add_entity(crate_);
        }
    }

    /// Sends `per_team` units down the lane from each base.
    pub fn spawn_wave(&mut self, per_team: usize) {
        let size = self.arena_size();
        for team in TEAMS {
            let enemy = if team == TEAMS[0] { TEAMS[1] } else { TEAMS[0] };
            let start = self.base_of(team);
            let end = self.base_of(enemy);
            let bend = Vec2::new(size.x * 0.5, size.y * 0.25);
            for index in 0..per_team {
                let stagger = Vec2::new(0.0, index as f32 * 24.0);
                let route = vec![start + stagger, bend + stagger, end + stagger];
                let Some(id) = self.allocate_id() else {
                    return;
                };
                let unit = Entity::unit(id, &self.registry, team, route);
                self.add_entity(unit);
            }
        }
    }

    pub fn despawn(&mut self, id: UniqueId) -> Option<Entity> {
        self.respawns.remove(&id);
        self.collisions.remove_entity(id);
        self.world.entities.remove_entity(id)
    }

    /// Applies one client input to its hero.
    pub fn apply_hero_input(&mut self, hero: UniqueId, input: &PlayerInput) {
        let Some(entity) = self.world.entities.at_unique_id_mut(hero) else {
            return;
        };
        let mut ctx = MovementContext {
            collisions: &mut self.collisions,
            terrain: &self.terrain,
            registry: &self.registry,
        };
        let spawns = apply_input(entity, input, &mut ctx);
        for spawn in spawns {
            self.spawn_projectile(spawn);
        }
    }

    fn spawn_projectile(&mut self, spawn: ProjectileSpawn) {
        let Some(id) = self.allocate_id() else {
            return;
        };
        let projectile = spawn.into_projectile(id);
        self.collisions.update_entity(id, projectile.shape(), false);
        if let Err(err) = self.world.projectiles.add_element(id, projectile) {
            log::warn!("projectile {id}: {err}");
        }
    }

    /// Clears `RESPAWNED` on `hero` once its owner has processed a snapshot taken at or
    /// after the respawn tick, so a lost snapshot cannot hide the jump.
    pub fn confirm_respawn(&mut self, hero: UniqueId, seen_tick: Tick) -> bool {
        if self.respawns.get(&hero).is_none_or(|&tick| seen_tick < tick) {
            return false;
        }
        self.respawns.remove(&hero);
        if let Some(entity) = self.world.entities.at_unique_id_mut(hero) {
            entity.status.remove(StatusFlags::RESPAWNED);
        }
        true
    }

    /// Advances everything that moves without player input by one tick.
    pub fn step(&mut self) {
        self.tick += 1;
        self.respawn_heroes();
        self.walk_units();
        self.fly_projectiles();
        self.resolve_deaths();
    }

    fn respawn_heroes(&mut self) {
        for entity in self.world.entities.iter_mut() {
            if !entity.is_dead() {
                continue;
            }
            let Some(hero) = entity.as_hero_mut() else {
                continue;
            };
            hero.respawn_ticks = hero.respawn_ticks.saturating_sub(1);
            if hero.respawn_ticks > 0 {
                continue;
            }
            hero.ability_percentages = [1.0; ABILITY_SLOTS];
            let spawn_point = hero.spawn_point;

            entity.position = spawn_point;
            entity.health = entity.max_health;
            entity.status = StatusFlags::RESPAWNED;
            self.respawns.insert(entity.id, self.tick);
            log::debug!("hero {} respawned", entity.id);
            self.collisions
                .update_entity(entity.id, entity.shape(), entity.blocks_movement());
        }
    }

    fn walk_units(&mut self) {
        let mut finished = Vec::new();
        for entity in self.world.entities.iter_mut() {
            if entity.is_dead() {
                continue;
            }
            let EntityKind::Unit(unit) = &mut entity.kind else {
                continue;
            };
            let Some(target) = unit.target() else {
                finished.push(entity.id);
                continue;
            };
            let to_target = target - entity.position;
            if to_target.length() <= unit.speed {
                entity.position = target;
                unit.next_waypoint += 1;
            } else {
                entity.position += to_target.normalize_or_zero() * unit.speed;
            }
            if to_target != Vec2::ZERO {
                entity.aim_angle = to_target.y.atan2(to_target.x).to_degrees().rem_euclid(360.0);
            }
            self.collisions
                .update_entity(entity.id, entity.shape(), entity.blocks_movement());
        }
        for id in finished {
            log::debug!("unit {id} reached the end of its lane");
            self.despawn(id);
        }
    }

    fn fly_projectiles(&mut self) {
        let mut spent = Vec::new();
        let mut hits = Vec::new();

        for projectile in self.world.projectiles.iter_mut() {
            if !projectile.advance() || self.terrain.is_colliding(&projectile.shape()) {
                spent.push(projectile.id);
                continue;
            }
            self.collisions
                .update_entity(projectile.id, projectile.shape(), false);

            let target = self
                .collisions
                .query_intersecting(projectile.shape())
                .into_iter()
                .filter(|&id| id != projectile.owner)
                .find(|&id| {
                    self.world.entities.at_unique_id(id).is_some_and(|target| {
                        target.can_be_hit() && projectile.team.is_hostile_to(target.team)
                    })
                });
            if let Some(target) = target {
                hits.push((target, projectile.damage));
                spent.push(projectile.id);
            }
        }

        for (target, damage) in hits {
            if let Some(entity) = self.world.entities.at_unique_id_mut(target)
                && entity.take_damage(damage)
            {
                log::debug!("{target} destroyed");
            }
        }
        for id in spent {
            self.collisions.remove_entity(id);
            self.world.projectiles.remove_element(id);
        }
    }

    fn resolve_deaths(&mut self) {
        let dying: Vec<(UniqueId, EntityType)> = self
            .world
            .entities
            .iter()
            .filter(|e| e.health == 0 && !e.is_dead())
            .map(|e| (e.id, e.entity_type()))
            .collect();

        for (id, entity_type) in dying {
            match entity_type {
                EntityType::Hero => {
                    let respawn_ticks = self.registry.respawn_ticks;
                    self.respawns.remove(&id);
                    if let Some(entity) = self.world.entities.at_unique_id_mut(id) {
                        entity.status = StatusFlags::DEAD;
                        if let Some(hero) = entity.as_hero_mut() {
                            hero.respawn_ticks = respawn_ticks;
                        }
                    }
                    self.collisions.remove_entity(id);
                }
                EntityType::Unit | EntityType::Crate => {
                    self.despawn(id);
                }
            }
        }
    }
}

#[cfg(test)]
impl GameWorld {
    /// Neutral bolt that hits `target` on the next step.
    pub(crate) fn fire_at(&mut self, target: UniqueId, damage: u16) {
        let Some(position) = self.world.entity(target).map(|e| e.position) else {
            return;
        };
        self.spawn_projectile(ProjectileSpawn {
            owner: UniqueId::NONE,
            team: Team::NEUTRAL,
            ability: 0,
            position: position - Vec2::new(30.0, 0.0),
            velocity: Vec2::new(20.0, 0.0),
            radius: 4.0,
            damage,
            lifetime_ticks: 10,
            input_id: 0,
        });
    }
}
