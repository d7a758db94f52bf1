use std::collections::{HashMap, VecDeque};

use rift::net::quantize::angle_delta;
use rift::world::StatusFlags;
use rift::{Entity, Projectile, Tick, UniqueId, WorldState};

use super::config::ClientConfig;

#[derive(Debug, Clone)]
pub struct InterpolationConfig {
    /// How far behind the newest snapshot the render clock runs, in ticks.
    pub delay_ticks: f64,
    pub max_drift_ticks: f64,
    pub time_correction_rate: f64,
    pub max_buffered: usize,
}

impl Default for InterpolationConfig {
    fn default() -> Self {
        Self::from(&ClientConfig::default())
    }
}

impl From<&ClientConfig> for InterpolationConfig {
    fn from(config: &ClientConfig) -> Self {
        Self {
            delay_ticks: f64::from(config.interpolation_delay_ticks),
            max_drift_ticks: f64::from(config.max_render_drift_ticks),
            time_correction_rate: f64::from(config.time_correction_rate),
            max_buffered: 32,
        }
    }
}

/// Where an entity is in its life between the two bracketing snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Only in the newer snapshot.
    Created,
    Steady,
    /// Only in the older snapshot.
    Destroyed,
}

#[derive(Debug, Clone)]
pub struct InterpolatedEntity {
    pub entity: Entity,
    pub lifecycle: Lifecycle,
}

#[derive(Debug, Clone)]
pub struct InterpolatedProjectile {
    pub projectile: Projectile,
    pub lifecycle: Lifecycle,
}

#[derive(Debug)]
struct Frame {
    world_time: Tick,
    state: WorldState,
}

/// Renders remote entities between the two snapshots bracketing a render clock that
/// trails the server.
#[derive(Debug)]
pub struct Interpolator {
    config: InterpolationConfig,
    frames: VecDeque<Frame>,
    render_time: f64,
    excluded: Option<UniqueId>,
    entities: Vec<InterpolatedEntity>,
    projectiles: Vec<InterpolatedProjectile>,
    clock_jumps: u64,
}

impl Interpolator {
    pub fn new(config: InterpolationConfig) -> Self {
        Self {
            frames: VecDeque::with_capacity(config.max_buffered),
            config,
            render_time: 0.0,
            excluded: None,
            entities: Vec::new(),
            projectiles: Vec::new(),
            clock_jumps: 0,
        }
    }

    /// Leaves `id` out of the output; the prediction pipeline draws it.
    pub fn exclude(&mut self, id: Option<UniqueId>) {
        self.excluded = id;
    }

    pub fn push(&mut self, world_time: Tick, state: &WorldState) {
        if self.frames.back().is_some_and(|f| f.world_time >= world_time) {
            log::debug!("ignoring out-of-order frame at tick {world_time}");
            return;
        }
        if self.frames.is_empty() {
            self.render_time = world_time as f64 - self.config.delay_ticks;
        }
        let mut copy = WorldState::new();
        copy.copy_from(state);
        self.frames.push_back(Frame {
            world_time,
            state: copy,
        });
        while self.frames.len() > self.config.max_buffered.max(2) {
            self.frames.pop_front();
        }
    }

    /// Moves the render clock by `dt_ticks` and resamples every entity.
    pub fn advance(&mut self, dt_ticks: f64) {
        let Some(latest) = self.frames.back() else {
            return;
        };
        let target = latest.world_time as f64 - self.config.delay_ticks;
        self.render_time += dt_ticks;

        let drift = target - self.render_time;
        if drift.abs() > self.config.max_drift_ticks {
            log::debug!("render clock off by {drift:.1} ticks, jumping");
            self.render_time = target;
            self.clock_jumps += 1;
        } else {
            self.render_time += drift * self.config.time_correction_rate;
        }

        while self.frames.len() > 2
            && self
                .frames
                .get(1)
                .is_some_and(|f| f.world_time as f64 <= self.render_time)
        {
            self.frames.pop_front();
        }
        self.sample();
    }

    fn sample(&mut self) {
        self.entities.clear();
        self.projectiles.clear();
        let Some(from) = self.frames.front() else {
            return;
        };
        let Some(to) = self.frames.get(1) else {
            for entity in from.state.entities.iter() {
                if Some(entity.id) != self.excluded {
                    self.entities.push(InterpolatedEntity {
                        entity: entity.clone(),
                        lifecycle: Lifecycle::Steady,
                    });
                }
            }
            for projectile in from.state.projectiles.iter() {
                self.projectiles.push(InterpolatedProjectile {
                    projectile: projectile.clone(),
                    lifecycle: Lifecycle::Steady,
                });
            }
            return;
        };

        let span = (to.world_time - from.world_time) as f64;
        let t = ((self.render_time - from.world_time as f64) / span).clamp(0.0, 1.0) as f32;

        for newer in to.state.entities.iter() {
            if Some(newer.id) == self.excluded {
                continue;
            }
            let (entity, lifecycle) = match from.state.entity(newer.id) {
                Some(older) => (blend_entity(older, newer, t), Lifecycle::Steady),
                None => (newer.clone(), Lifecycle::Created),
            };
            self.entities.push(InterpolatedEntity { entity, lifecycle });
        }
        for older in from.state.entities.iter() {
            if Some(older.id) != self.excluded && to.state.entity(older.id).is_none() {
                self.entities.push(InterpolatedEntity {
                    entity: older.clone(),
                    lifecycle: Lifecycle::Destroyed,
                });
            }
        }

        let older_projectiles: HashMap<UniqueId, &Projectile> =
            from.state.projectiles.iter_with_ids().collect();
        for (id, newer) in to.state.projectiles.iter_with_ids() {
            let (projectile, lifecycle) = match older_projectiles.get(&id) {
                Some(older) => {
                    let mut projectile = newer.clone();
                    projectile.position = older.position.lerp(newer.position, t);
                    (projectile, Lifecycle::Steady)
                }
                None => (newer.clone(), Lifecycle::Created),
            };
            self.projectiles
                .push(InterpolatedProjectile { projectile, lifecycle });
        }
        for (id, older) in from.state.projectiles.iter_with_ids() {
            if !to.state.projectiles.contains(id) {
                self.projectiles.push(InterpolatedProjectile {
                    projectile: older.clone(),
                    lifecycle: Lifecycle::Destroyed,
                });
            }
        }
    }

    pub fn entities(&self) -> &[InterpolatedEntity] {
        &self.entities
    }

    pub fn entity(&self, id: UniqueId) -> Option<&InterpolatedEntity> {
        self.entities.iter().find(|e| e.entity.id == id)
    }

    pub fn projectiles(&self) -> &[InterpolatedProjectile] {
        &self.projectiles
    }

    pub fn render_time(&self) -> f64 {
        self.render_time
    }

    pub fn is_ready(&self) -> bool {
        self.frames.len() >= 2
    }

    pub fn reset(&mut self) {
        self.frames.clear();
        self.entities.clear();
        self.projectiles.clear();
        self.render_time = 0.0;
    }

    pub fn stats(&self) -> InterpolationStats {
        InterpolationStats {
            buffered: self.frames.len(),
            render_time: self.render_time,
            latest_time: self.frames.back().map_or(0, |f| f.world_time),
            entity_count: self.entities.len(),
            clock_jumps: self.clock_jumps,
            is_ready: self.is_ready(),
        }
    }
}

/// Position and aim blend; everything discrete switches halfway.
fn blend_entity(older: &Entity, newer: &Entity, t: f32) -> Entity {
    // The flag stays up for a few snapshots; only its first appearance is a jump.
    if newer.status.contains(StatusFlags::RESPAWNED)
        && !older.status.contains(StatusFlags::RESPAWNED)
    {
        return newer.clone();
    }
    let mut entity = if t < 0.5 { older.clone() } else { newer.clone() };
    entity.position = older.position.lerp(newer.position, t);
    entity.aim_angle = lerp_angle(older.aim_angle, newer.aim_angle, t);
    entity
}

/// Degrees, along the shorter arc.
pub fn lerp_angle(from: f32, to: f32, t: f32) -> f32 {
    (from + angle_delta(from, to) * t).rem_euclid(360.0)
}

#[derive(Debug, Clone)]
pub struct InterpolationStats {
    pub buffered: usize,
    pub render_time: f64,
    pub latest_time: Tick,
    pub entity_count: usize,
    pub clock_jumps: u64,
    pub is_ready: bool,
}
