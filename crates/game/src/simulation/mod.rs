mod clock;
mod input;
pub mod rules;

pub use clock::FixedTimestep;
pub use input::{InputFlags, PlayerInput};
pub use rules::{MovementContext, apply_input};
