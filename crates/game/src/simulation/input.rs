use bitflags::bitflags;
use glam::Vec2;

use crate::id::InputId;
use crate::net::quantize::{dequantize_angle, quantize_angle};
use crate::world::ABILITY_SLOTS;

bitflags! {
    /// Wire order matches bit order: movement first, then the four cast slots.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct InputFlags: u8 {
        const UP = 1 << 0;
        const DOWN = 1 << 1;
        const LEFT = 1 << 2;
        const RIGHT = 1 << 3;
        const CAST_0 = 1 << 4;
        const CAST_1 = 1 << 5;
        const CAST_2 = 1 << 6;
        const CAST_3 = 1 << 7;
    }
}

impl InputFlags {
    pub fn cast_slot(slot: usize) -> InputFlags {
        match slot {
            0 => InputFlags::CAST_0,
            1 => InputFlags::CAST_1,
            2 => InputFlags::CAST_2,
            3 => InputFlags::CAST_3,
            _ => InputFlags::empty(),
        }
    }

    /// Unit-length movement direction; screen space, so up is -y.
    pub fn movement(self) -> Vec2 {
        let mut direction = Vec2::ZERO;
        if self.contains(InputFlags::UP) {
            direction.y -= 1.0;
        }
        if self.contains(InputFlags::DOWN) {
            direction.y += 1.0;
        }
        if self.contains(InputFlags::LEFT) {
            direction.x -= 1.0;
        }
        if self.contains(InputFlags::RIGHT) {
            direction.x += 1.0;
        }
        direction.normalize_or_zero()
    }
}

/// One tick's worth of player intent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerInput {
    pub id: InputId,
    pub flags: InputFlags,
    /// Degrees, already snapped to the wire precision so prediction sees what the
    /// server will see.
    pub aim_angle: f32,
}

impl PlayerInput {
    pub fn new(id: InputId, flags: InputFlags, aim_angle: f32) -> Self {
        Self {
            id,
            flags,
            aim_angle: dequantize_angle(quantize_angle(aim_angle)),
        }
    }

    pub fn movement(&self) -> Vec2 {
        self.flags.movement()
    }

    pub fn casts(&self, slot: usize) -> bool {
        slot < ABILITY_SLOTS && self.flags.contains(InputFlags::cast_slot(slot))
    }

    pub fn aim_direction(&self) -> Vec2 {
        Vec2::from_angle(self.aim_angle.to_radians())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opposite_keys_cancel() {
        let flags = InputFlags::UP | InputFlags::DOWN | InputFlags::RIGHT;
        assert_eq!(flags.movement(), Vec2::X);
        let diagonal = (InputFlags::UP | InputFlags::LEFT).movement();
        assert!((diagonal.length() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn aim_is_snapped_to_wire_precision() {
        let input = PlayerInput::new(1, InputFlags::CAST_2, 123.456_78);
        assert_eq!(input.aim_angle, dequantize_angle(quantize_angle(123.456_78)));
        assert!(input.casts(2));
        assert!(!input.casts(0));
        assert!(!input.casts(7));
    }
}
