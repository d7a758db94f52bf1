use glam::Vec2;
use rift::net::{PacketError, PacketReader, PacketWriter, open};
use rift::snapshot::{Snapshot, pack_snapshot};
use rift::world::{AbilityRegistry, Entity, Team, WorldState};
use rift::UniqueId;

fn sealed_snapshot() -> Vec<u8> {
    let registry = AbilityRegistry::standard();
    let mut state = WorldState::new();
    let def = registry.class(1).unwrap();
    state
        .entities
        .add_entity(Entity::hero(UniqueId(1), def, Team(1), Vec2::new(12.0, 34.0)))
        .unwrap();
    state
        .entities
        .add_entity(Entity::crate_at(UniqueId(2), &registry, Vec2::new(300.0, 80.0), 30.0))
        .unwrap();

    let mut writer = PacketWriter::new();
    pack_snapshot(&mut writer, &Snapshot::capture(1, 1, &state), None, 0, UniqueId(1)).unwrap();
    writer.finish()
}

#[test]
fn any_single_bit_flip_is_rejected() {
    let datagram = sealed_snapshot();
    assert!(open(&datagram).is_ok());

    for byte in 0..datagram.len() {
        for bit in 0..8 {
            let mut corrupted = datagram.clone();
            corrupted[byte] ^= 1 << bit;
            assert!(
                matches!(open(&corrupted), Err(PacketError::ChecksumMismatch { .. })),
                "flip of bit {bit} in byte {byte} went unnoticed"
            );
        }
    }
}

#[test]
fn short_datagrams_are_rejected() {
    assert!(matches!(open(&[1, 2, 3]), Err(PacketError::TooShort(3))));
    assert!(PacketReader::open(&[]).is_err());
}

#[test]
fn bools_pack_until_a_wider_write() {
    let mut writer = PacketWriter::new();
    for bit in 0..10 {
        writer.write_bool(bit % 3 == 0);
    }
    writer.write_u8(0xAB);
    writer.write_bool(true);
    assert_eq!(writer.as_bytes(), &[0b0100_1001, 0b10, 0xAB, 0b1]);

    let bytes = writer.into_inner();
    let mut reader = PacketReader::new(&bytes);
    let bools: Vec<bool> = (0..10).map(|_| reader.read_bool().unwrap()).collect();
    assert_eq!(bools, (0..10).map(|bit| bit % 3 == 0).collect::<Vec<_>>());
    assert_eq!(reader.read_u8().unwrap(), 0xAB);
    assert!(reader.read_bool().unwrap());
    assert!(reader.is_at_end());
}
