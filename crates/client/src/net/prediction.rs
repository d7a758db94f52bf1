use std::collections::VecDeque;

use glam::Vec2;

use rift::spatial::{ArenaBounds, Terrain};
use rift::world::{ABILITY_SLOTS, ProjectileSpawn, StatusFlags};
use rift::{
    AbilityRegistry, CollisionManager, Entity, InputId, MovementContext, PlayerInput, Projectile,
    UniqueId, WorldState, apply_input,
};

use super::config::ClientConfig;

/// Inputs kept after acknowledgement so interpolation always has two samples.
const MIN_KEPT_INPUTS: usize = 2;
const POSITION_EPSILON: f32 = 1e-4;

#[derive(Debug, Clone)]
struct PredictedInput {
    input: PlayerInput,
    end_position: Vec2,
    percentages: [f32; ABILITY_SLOTS],
}

/// A projectile spawned locally ahead of the server's copy.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictedProjectile {
    pub input_id: InputId,
    pub projectile: Projectile,
}

/// Outcome of comparing a prediction with the server's result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// First authoritative state for the hero.
    Adopted,
    Confirmed,
    /// Replayed; the visible position blends towards the corrected one.
    Corrected,
    /// Replayed and moved on screen at once.
    Snapped,
    /// Older than what was already reconciled.
    Stale,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PredictionStats {
    pub predicted: u64,
    pub corrections: u64,
    pub snaps: u64,
    pub replayed_inputs: u64,
}

/// Local prediction of the controlled hero plus reconciliation against the server.
#[derive(Debug)]
pub struct Prediction {
    hero: Option<Entity>,
    pending: VecDeque<PredictedInput>,
    /// Display position minus logical position; shrinks every frame.
    visual_offset: Vec2,
    last_applied: InputId,
    projectiles: Vec<PredictedProjectile>,
    next_local_id: u32,
    collisions: CollisionManager,
    terrain: ArenaBounds,
    snap_requested: bool,
    /// Whether the last reconciled hero carried `RESPAWNED`.
    respawn_seen: bool,
    max_pending: usize,
    snap_distance: f32,
    correction_rate: f32,
    min_correction_step: f32,
    percentage_epsilon: f32,
    stats: PredictionStats,
}

impl Prediction {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            hero: None,
            pending: VecDeque::with_capacity(config.max_pending_inputs),
            visual_offset: Vec2::ZERO,
            last_applied: 0,
            projectiles: Vec::new(),
            next_local_id: u32::MAX,
            collisions: CollisionManager::default(),
            terrain: ArenaBounds::new(config.arena_size),
            snap_requested: false,
            respawn_seen: false,
            max_pending: config.max_pending_inputs.max(MIN_KEPT_INPUTS),
            snap_distance: config.snap_distance,
            correction_rate: config.correction_rate,
            min_correction_step: config.min_correction_step,
            percentage_epsilon: config.percentage_epsilon,
            stats: PredictionStats::default(),
        }
    }

    pub fn hero(&self) -> Option<&Entity> {
        self.hero.as_ref()
    }

    pub fn logical_position(&self) -> Option<Vec2> {
        self.hero.as_ref().map(|h| h.position)
    }

    /// Where the hero should be drawn.
    pub fn display_position(&self) -> Option<Vec2> {
        self.logical_position().map(|p| p + self.visual_offset)
    }

    pub fn visual_offset(&self) -> Vec2 {
        self.visual_offset
    }

    pub fn percentages(&self) -> Option<[f32; ABILITY_SLOTS]> {
        self.hero
            .as_ref()
            .and_then(|h| h.as_hero())
            .map(|h| h.ability_percentages)
    }

    /// Predicted position after `input_id`, while it is still buffered.
    pub fn predicted_end(&self, input_id: InputId) -> Option<Vec2> {
        self.pending
            .iter()
            .find(|p| p.input.id == input_id)
            .map(|p| p.end_position)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn last_applied(&self) -> InputId {
        self.last_applied
    }

    pub fn projectiles(&self) -> &[PredictedProjectile] {
        &self.projectiles
    }

    pub fn stats(&self) -> &PredictionStats {
        &self.stats
    }

    /// Makes the next correction, and any current blend, jump straight to the target.
    pub fn force_snap(&mut self) {
        self.visual_offset = Vec2::ZERO;
        self.snap_requested = true;
    }

    /// Rebuilds the collision context from the newest server state.
    pub fn sync_world(&mut self, state: &WorldState) {
        state.populate_collisions(&mut self.collisions);
        if let Some(hero) = &self.hero
            && !hero.is_dead()
        {
            self.collisions
                .update_entity(hero.id, hero.shape(), hero.blocks_movement());
        }
    }

    /// Runs one input locally and buffers the result. Returns how many projectiles the
    /// input spawned.
    pub fn predict(&mut self, input: PlayerInput, registry: &AbilityRegistry) -> usize {
        let Some(hero) = self.hero.as_mut() else {
            return 0;
        };
        let mut ctx = MovementContext {
            collisions: &mut self.collisions,
            terrain: &self.terrain,
            registry,
        };
        let spawns = apply_input(hero, &input, &mut ctx);
        self.pending.push_back(PredictedInput {
            input,
            end_position: hero.position,
            percentages: bars_of(hero),
        });
        while self.pending.len() > self.max_pending {
            self.pending.pop_front();
        }
        self.stats.predicted += 1;

        let terrain = &self.terrain;
        self.projectiles.retain_mut(|p| {
            p.projectile.advance() && !terrain.is_colliding(&p.projectile.shape())
        });
        let spawned = spawns.len();
        for spawn in spawns {
            self.spawn_local(spawn);
        }
        spawned
    }

    fn spawn_local(&mut self, spawn: ProjectileSpawn) {
        let id = UniqueId(self.next_local_id);
        self.next_local_id = self.next_local_id.wrapping_sub(1);
        let input_id = spawn.input_id;
        self.projectiles.push(PredictedProjectile {
            input_id,
            projectile: spawn.into_projectile(id),
        });
    }

    /// Compares the server's hero after `applied` with what was predicted for it and
    /// corrects the inputs still in flight.
    pub fn reconcile(
        &mut self,
        authoritative: &Entity,
        applied: InputId,
        registry: &AbilityRegistry,
    ) -> Reconciliation {
        if applied < self.last_applied {
            return Reconciliation::Stale;
        }
        self.last_applied = applied;
        self.projectiles.retain(|p| p.input_id > applied);

        while self.pending.len() > MIN_KEPT_INPUTS
            && self.pending.front().is_some_and(|p| p.input.id < applied)
        {
            self.pending.pop_front();
        }

        let confirmed = self
            .pending
            .iter()
            .find(|p| p.input.id == applied)
            .cloned();
        let respawned = authoritative.status.contains(StatusFlags::RESPAWNED);
        let force = self.snap_requested || (respawned && !self.respawn_seen);
        self.respawn_seen = respawned;

        if self.hero.is_none() {
            self.rebase(authoritative, applied, registry);
            self.visual_offset = Vec2::ZERO;
            self.snap_requested = false;
            return Reconciliation::Adopted;
        }
        let Some(hero) = self.hero.as_mut() else {
            return Reconciliation::Stale;
        };

        let matches = confirmed.as_ref().is_some_and(|c| {
            c.end_position.distance(authoritative.position) <= POSITION_EPSILON
        });
        if matches && !force {
            adopt_server_fields(hero, authoritative);
            if let Some(confirmed) = &confirmed {
                self.correct_percentages(authoritative, confirmed.percentages, applied);
            }
            return Reconciliation::Confirmed;
        }

        let old_display = hero.position + self.visual_offset;
        self.rebase(authoritative, applied, registry);
        let new_position = self.logical_position().unwrap_or(authoritative.position);
        let error = old_display - new_position;

        if force || error.length() > self.snap_distance {
            log::debug!("snapping predicted hero by {:.2}", error.length());
            self.visual_offset = Vec2::ZERO;
            self.snap_requested = false;
            self.stats.snaps += 1;
            Reconciliation::Snapped
        } else if error.length() <= POSITION_EPSILON && confirmed.is_none() {
            self.visual_offset = Vec2::ZERO;
            Reconciliation::Confirmed
        } else {
            log::debug!("correcting predicted hero by {:.2}", error.length());
            self.visual_offset = error;
            self.stats.corrections += 1;
            Reconciliation::Corrected
        }
    }

    /// Restarts the prediction from `authoritative` and replays every buffered input the
    /// server has not applied yet.
    fn rebase(&mut self, authoritative: &Entity, applied: InputId, registry: &AbilityRegistry) {
        let mut hero = authoritative.clone();
        hero.status.remove(StatusFlags::RESPAWNED);
        if !hero.is_dead() {
            self.collisions
                .update_entity(hero.id, hero.shape(), hero.blocks_movement());
        }

        let mut ctx = MovementContext {
            collisions: &mut self.collisions,
            terrain: &self.terrain,
            registry,
        };
        for entry in self.pending.iter_mut().filter(|p| p.input.id > applied) {
            // Projectiles from the first run are still flying locally.
            let _ = apply_input(&mut hero, &entry.input, &mut ctx);
            entry.end_position = hero.position;
            entry.percentages = bars_of(&hero);
            self.stats.replayed_inputs += 1;
        }
        self.hero = Some(hero);
    }

    fn correct_percentages(
        &mut self,
        authoritative: &Entity,
        predicted: [f32; ABILITY_SLOTS],
        applied: InputId,
    ) {
        let server = bars_of(authoritative);
        for slot in 0..ABILITY_SLOTS {
            let diff = server[slot] - predicted[slot];
            if diff.abs() < self.percentage_epsilon {
                continue;
            }
            for entry in self.pending.iter_mut().filter(|p| p.input.id >= applied) {
                entry.percentages[slot] = (entry.percentages[slot] + diff).clamp(0.0, 1.0);
            }
            if let Some(hero) = self.hero.as_mut().and_then(Entity::as_hero_mut) {
                hero.ability_percentages[slot] =
                    (hero.ability_percentages[slot] + diff).clamp(0.0, 1.0);
            }
        }
    }

    /// Moves the drawn hero towards its logical position, faster the further it is off.
    pub fn update_visual(&mut self) {
        let distance = self.visual_offset.length();
        if distance == 0.0 {
            return;
        }
        let step = (distance * self.correction_rate).max(self.min_correction_step);
        if step >= distance {
            self.visual_offset = Vec2::ZERO;
        } else {
            self.visual_offset -= self.visual_offset / distance * step;
        }
    }

    pub fn reset(&mut self) {
        self.hero = None;
        self.pending.clear();
        self.visual_offset = Vec2::ZERO;
        self.last_applied = 0;
        self.projectiles.clear();
        self.collisions.clear();
        self.snap_requested = false;
        self.respawn_seen = false;
    }
}

fn bars_of(entity: &Entity) -> [f32; ABILITY_SLOTS] {
    entity
        .as_hero()
        .map_or([0.0; ABILITY_SLOTS], |h| h.ability_percentages)
}

/// Copies what only the server decides onto the predicted hero.
fn adopt_server_fields(hero: &mut Entity, authoritative: &Entity) {
    hero.team = authoritative.team;
    hero.max_health = authoritative.max_health;
    hero.health = authoritative.health;
    hero.radius = authoritative.radius;
    hero.status = authoritative.status;
}
