use rift::{InputFlags, InputId, PlayerInput};

/// Raw controls sampled once per tick.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InputState {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
    pub casts: [bool; 4],
    /// Degrees.
    pub aim_angle: f32,
}

impl InputState {
    pub fn to_input(&self, id: InputId) -> PlayerInput {
        let mut flags = InputFlags::empty();
        flags.set(InputFlags::UP, self.up);
        flags.set(InputFlags::DOWN, self.down);
        flags.set(InputFlags::LEFT, self.left);
        flags.set(InputFlags::RIGHT, self.right);
        for (slot, &cast) in self.casts.iter().enumerate() {
            flags.set(InputFlags::cast_slot(slot), cast);
        }
        PlayerInput::new(id, flags, self.aim_angle)
    }
}
