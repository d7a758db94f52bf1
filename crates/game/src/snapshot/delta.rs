//! Snapshot command encoding.
//!
//! Every record carries one dirty bit per mutable field, compared against the reference
//! snapshot the client acknowledged. Ids missing from the reference are sent as new, with
//! their type and every field. Ids in the reference but not in the current snapshot are
//! simply not written; the decoder drops them.

use glam::Vec2;

use crate::id::{InputId, SnapshotId, Tick, UniqueId};
use crate::net::quantize::{
    dequantize_angle, dequantize_percentage, quantize_angle, quantize_percentage,
};
use crate::net::{CommandKind, PacketError, PacketReader, PacketWriter};
use crate::world::{
    ABILITY_SLOTS, Entity, EntityType, Projectile, StatusFlags, Team, WorldState,
};

use super::Snapshot;

const ENTITY_FIELDS: usize = 8;
const HERO_FIELDS: usize = ENTITY_FIELDS + ABILITY_SLOTS;
const PROJECTILE_FIELDS: usize = 2;

#[derive(Debug, thiserror::Error)]
pub enum DeltaError {
    #[error(transparent)]
    Packet(#[from] PacketError),
    #[error("delta reference snapshot {0} is not available")]
    MissingReference(SnapshotId),
    #[error("unknown entity type {0}")]
    UnknownEntityType(u8),
    #[error("entity {0} is not new but is missing from the reference")]
    UnknownEntity(UniqueId),
    #[error("projectile {0} is not new but is missing from the reference")]
    UnknownProjectile(UniqueId),
    #[error("record {0} appears twice")]
    DuplicateRecord(UniqueId),
    #[error("{count} {what} do not fit in one snapshot")]
    TooManyRecords { what: &'static str, count: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotHeader {
    pub snapshot_id: SnapshotId,
    /// 0 when the update is full.
    pub prev_snapshot_id: SnapshotId,
    pub applied_input_id: InputId,
    pub controlled_entity: UniqueId,
    pub force_full: bool,
    pub world_time: Tick,
}

#[derive(Debug, Clone)]
pub struct DecodedSnapshot {
    pub header: SnapshotHeader,
    pub state: WorldState,
}

impl DecodedSnapshot {
    pub fn into_snapshot(self) -> Snapshot {
        Snapshot {
            id: self.header.snapshot_id,
            world_time: self.header.world_time,
            state: self.state,
        }
    }
}

/// Entity fields in their wire representation, so equality means "same bytes on the wire".
#[derive(Debug, Clone, Copy, PartialEq)]
struct WireEntity {
    pos_x: u32,
    pos_y: u32,
    team: u8,
    max_health: u16,
    health: u16,
    aim: u16,
    radius: u32,
    status: u8,
    abilities: [u16; ABILITY_SLOTS],
}

impl WireEntity {
    fn of(entity: &Entity) -> Self {
        let mut abilities = [0; ABILITY_SLOTS];
        if let Some(hero) = entity.as_hero() {
            for (slot, value) in abilities.iter_mut().enumerate() {
                *value = quantize_percentage(hero.ability_percentages[slot]);
            }
        }
        Self {
            pos_x: entity.position.x.to_bits(),
            pos_y: entity.position.y.to_bits(),
            team: entity.team.0,
            max_health: entity.max_health,
            health: entity.health,
            aim: quantize_angle(entity.aim_angle),
            radius: entity.radius.to_bits(),
            status: entity.status.bits(),
            abilities,
        }
    }

    fn differs(&self, other: &Self, field: usize) -> bool {
        match field {
            0 => self.pos_x != other.pos_x,
            1 => self.pos_y != other.pos_y,
            2 => self.team != other.team,
            3 => self.max_health != other.max_health,
            4 => self.health != other.health,
            5 => self.aim != other.aim,
            6 => self.radius != other.radius,
            7 => self.status != other.status,
            slot => self.abilities[slot - ENTITY_FIELDS] != other.abilities[slot - ENTITY_FIELDS],
        }
    }

    fn write_field(&self, writer: &mut PacketWriter, field: usize) {
        match field {
            0 => writer.write_u32(self.pos_x),
            1 => writer.write_u32(self.pos_y),
            2 => writer.write_u8(self.team),
            3 => writer.write_u16(self.max_health),
            4 => writer.write_u16(self.health),
            5 => writer.write_u16(self.aim),
            6 => writer.write_u32(self.radius),
            7 => writer.write_u8(self.status),
            slot => writer.write_u16(self.abilities[slot - ENTITY_FIELDS]),
        }
    }
}

fn read_entity_field(
    reader: &mut PacketReader<'_>,
    entity: &mut Entity,
    field: usize,
) -> Result<(), PacketError> {
    match field {
        0 => entity.position.x = reader.read_f32()?,
        1 => entity.position.y = reader.read_f32()?,
        2 => entity.team = Team(reader.read_u8()?),
        3 => entity.max_health = reader.read_u16()?,
        4 => entity.health = reader.read_u16()?,
        5 => entity.aim_angle = dequantize_angle(reader.read_u16()?),
        6 => entity.radius = reader.read_f32()?,
        7 => entity.status = StatusFlags::from_bits_retain(reader.read_u8()?),
        slot => {
            let value = dequantize_percentage(reader.read_u16()?);
            if let Some(hero) = entity.as_hero_mut() {
                hero.ability_percentages[slot - ENTITY_FIELDS] = value;
            }
        }
    }
    Ok(())
}

fn field_count(entity_type: EntityType) -> usize {
    match entity_type {
        EntityType::Hero => HERO_FIELDS,
        EntityType::Unit | EntityType::Crate => ENTITY_FIELDS,
    }
}

fn record_count(what: &'static str, count: usize) -> Result<u16, DeltaError> {
    u16::try_from(count).map_err(|_| DeltaError::TooManyRecords { what, count })
}

/// Writes a snapshot command. With no `reference` every record is sent as new and the
/// update is flagged full.
pub fn pack_snapshot(
    writer: &mut PacketWriter,
    current: &Snapshot,
    reference: Option<&Snapshot>,
    applied_input_id: InputId,
    controlled_entity: UniqueId,
) -> Result<(), DeltaError> {
    let entity_count = record_count("entities", current.state.entities.len())?;
    let projectile_count = record_count("projectiles", current.state.projectiles.len())?;

    writer.write_u8(CommandKind::Snapshot as u8);
    writer.write_u32(current.id);
    writer.write_u32(reference.map_or(0, |r| r.id));
    writer.write_u32(applied_input_id);
    writer.write_u32(controlled_entity.get());
    writer.write_bool(reference.is_none());
    writer.write_u32(current.world_time);

    writer.write_u16(entity_count);
    for entity in &current.state.entities {
        let previous = reference.and_then(|r| r.state.entity(entity.id));
        pack_entity(writer, entity, previous);
    }

    writer.write_u16(projectile_count);
    for projectile in &current.state.projectiles {
        let previous = reference.and_then(|r| r.state.projectiles.at_unique_id(projectile.id));
        pack_projectile(writer, projectile, previous);
    }
    Ok(())
}

fn pack_entity(writer: &mut PacketWriter, entity: &Entity, previous: Option<&Entity>) {
    let entity_type = entity.entity_type();
    writer.write_u32(entity.id.get());
    writer.write_bool(previous.is_none());
    if previous.is_none() {
        writer.write_u8(entity_type as u8);
        if let Some(hero) = entity.as_hero() {
            writer.write_u8(hero.class);
        }
    }

    let wire = WireEntity::of(entity);
    let previous = previous.map(WireEntity::of);
    let fields = field_count(entity_type);
    let mut dirty = [true; HERO_FIELDS];
    if let Some(previous) = &previous {
        for (field, bit) in dirty.iter_mut().enumerate().take(fields) {
            *bit = wire.differs(previous, field);
        }
    }

    for &bit in &dirty[..fields] {
        writer.write_bool(bit);
    }
    for field in (0..fields).filter(|&field| dirty[field]) {
        wire.write_field(writer, field);
    }
}

fn pack_projectile(writer: &mut PacketWriter, projectile: &Projectile, previous: Option<&Projectile>) {
    writer.write_u32(projectile.id.get());
    writer.write_bool(previous.is_none());
    if previous.is_none() {
        writer.write_u8(projectile.ability);
        writer.write_u32(projectile.owner.get());
        writer.write_u32(projectile.input_id);
        writer.write_u8(projectile.team.0);
        writer.write_f32(projectile.velocity.x);
        writer.write_f32(projectile.velocity.y);
        writer.write_f32(projectile.radius);
        writer.write_u16(projectile.damage);
    }

    let dirty: [bool; PROJECTILE_FIELDS] = match previous {
        Some(previous) => [
            projectile.position.x.to_bits() != previous.position.x.to_bits(),
            projectile.position.y.to_bits() != previous.position.y.to_bits(),
        ],
        None => [true; PROJECTILE_FIELDS],
    };
    for bit in dirty {
        writer.write_bool(bit);
    }
    if dirty[0] {
        writer.write_f32(projectile.position.x);
    }
    if dirty[1] {
        writer.write_f32(projectile.position.y);
    }
}

/// Reads the header of a snapshot command whose command byte was already consumed.
pub fn read_snapshot_header(reader: &mut PacketReader<'_>) -> Result<SnapshotHeader, PacketError> {
    Ok(SnapshotHeader {
        snapshot_id: reader.read_u32()?,
        prev_snapshot_id: reader.read_u32()?,
        applied_input_id: reader.read_u32()?,
        controlled_entity: UniqueId(reader.read_u32()?),
        force_full: reader.read_bool()?,
        world_time: reader.read_u32()?,
    })
}

/// Rebuilds the world from the records following a header. `reference` must be the
/// snapshot named by `prev_snapshot_id`, or `None` for a full update.
pub fn read_snapshot_body(
    reader: &mut PacketReader<'_>,
    reference: Option<&WorldState>,
) -> Result<WorldState, DeltaError> {
    let mut state = WorldState::new();

    let entity_count = reader.read_u16()?;
    for _ in 0..entity_count {
        let entity = unpack_entity(reader, reference)?;
        let id = entity.id;
        state
            .entities
            .add_entity(entity)
            .map_err(|_| DeltaError::DuplicateRecord(id))?;
    }

    let projectile_count = reader.read_u16()?;
    for _ in 0..projectile_count {
        let projectile = unpack_projectile(reader, reference)?;
        let id = projectile.id;
        state
            .projectiles
            .add_element(id, projectile)
            .map_err(|_| DeltaError::DuplicateRecord(id))?;
    }
    Ok(state)
}

fn unpack_entity(
    reader: &mut PacketReader<'_>,
    reference: Option<&WorldState>,
) -> Result<Entity, DeltaError> {
    let id = UniqueId(reader.read_u32()?);
    let is_new = reader.read_bool()?;

    let mut entity = if is_new {
        let tag = reader.read_u8()?;
        let entity_type = EntityType::try_from(tag).map_err(DeltaError::UnknownEntityType)?;
        let class = if entity_type == EntityType::Hero {
            reader.read_u8()?
        } else {
            0
        };
        Entity::blank(id, entity_type, class)
    } else {
        reference
            .and_then(|r| r.entity(id))
            .cloned()
            .ok_or(DeltaError::UnknownEntity(id))?
    };

    let fields = field_count(entity.entity_type());
    let mut dirty = [false; HERO_FIELDS];
    for bit in dirty.iter_mut().take(fields) {
        *bit = reader.read_bool()?;
    }
    for field in (0..fields).filter(|&field| dirty[field]) {
        read_entity_field(reader, &mut entity, field)?;
    }
    Ok(entity)
}

fn unpack_projectile(
    reader: &mut PacketReader<'_>,
    reference: Option<&WorldState>,
) -> Result<Projectile, DeltaError> {
    let id = UniqueId(reader.read_u32()?);
    let is_new = reader.read_bool()?;

    let mut projectile = if is_new {
        Projectile {
            id,
            ability: reader.read_u8()?,
            owner: UniqueId(reader.read_u32()?),
            input_id: reader.read_u32()?,
            team: Team(reader.read_u8()?),
            velocity: Vec2::new(reader.read_f32()?, reader.read_f32()?),
            radius: reader.read_f32()?,
            damage: reader.read_u16()?,
            position: Vec2::ZERO,
            remaining_ticks: 0,
        }
    } else {
        reference
            .and_then(|r| r.projectiles.at_unique_id(id))
            .cloned()
            .ok_or(DeltaError::UnknownProjectile(id))?
    };

    let moved_x = reader.read_bool()?;
    let moved_y = reader.read_bool()?;
    if moved_x {
        projectile.position.x = reader.read_f32()?;
    }
    if moved_y {
        projectile.position.y = reader.read_f32()?;
    }
    Ok(projectile)
}

/// Reads a whole snapshot command (after its command byte). `resolve` looks up the
/// reference the server packed against; an unknown reference is a
/// [`DeltaError::MissingReference`] and the caller should ask for a resync.
pub fn unpack_snapshot<'r, F>(
    reader: &mut PacketReader<'_>,
    resolve: F,
) -> Result<DecodedSnapshot, DeltaError>
where
    F: FnOnce(SnapshotId) -> Option<&'r WorldState>,
{
    let header = read_snapshot_header(reader)?;
    let reference = if header.prev_snapshot_id == 0 {
        None
    } else {
        Some(resolve(header.prev_snapshot_id).ok_or(DeltaError::MissingReference(header.prev_snapshot_id))?)
    };
    let state = read_snapshot_body(reader, reference)?;
    Ok(DecodedSnapshot { header, state })
}
