//! Input source for headless clients.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::net::InputState;

/// Walks in a random direction for a while, then picks another, casting now and then.
#[derive(Debug)]
pub struct Wanderer {
    rng: StdRng,
    current: InputState,
    ticks_left: u32,
    cast_chance: f64,
}

impl Wanderer {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            current: InputState::default(),
            ticks_left: 0,
            cast_chance: 0.05,
        }
    }

    pub fn with_cast_chance(mut self, chance: f64) -> Self {
        self.cast_chance = chance.clamp(0.0, 1.0);
        self
    }

    pub fn next_input(&mut self) -> InputState {
        if self.ticks_left == 0 {
            self.ticks_left = self.rng.gen_range(10..60);
            let heading = self.rng.gen_range(0..9);
            self.current = InputState {
                up: matches!(heading, 0 | 1 | 7),
                right: matches!(heading, 1 | 2 | 3),
                down: matches!(heading, 3 | 4 | 5),
                left: matches!(heading, 5 | 6 | 7),
                // 8 stands still.
                casts: [false; 4],
                aim_angle: self.rng.gen_range(0.0..360.0),
            };
        }
        self.ticks_left -= 1;

        let mut input = self.current;
        for cast in &mut input.casts {
            *cast = self.rng.gen_bool(self.cast_chance);
        }
        input
    }
}
