use std::time::Duration;

use crate::id::Tick;

/// Turns wall-clock deltas into whole simulation ticks.
#[derive(Debug, Clone)]
pub struct FixedTimestep {
    tick_rate: u32,
    dt: f32,
    accumulator: f32,
}

impl FixedTimestep {
    /// Longest frame fed into the accumulator, so a stall does not trigger a tick storm.
    const MAX_FRAME: f32 = 0.25;

    pub fn new(tick_rate: u32) -> Self {
        let tick_rate = tick_rate.max(1);
        Self {
            tick_rate,
            dt: 1.0 / tick_rate as f32,
            accumulator: 0.0,
        }
    }

    pub fn tick_rate(&self) -> u32 {
        self.tick_rate
    }

    pub fn dt(&self) -> f32 {
        self.dt
    }

    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate as f64)
    }

    pub fn accumulate(&mut self, delta: f32) {
        self.accumulator += delta.min(Self::MAX_FRAME);
    }

    pub fn consume_tick(&mut self) -> bool {
        if self.accumulator >= self.dt {
            self.accumulator -= self.dt;
            true
        } else {
            false
        }
    }

    /// Fraction of the next tick already elapsed.
    pub fn alpha(&self) -> f32 {
        self.accumulator / self.dt
    }

    pub fn ticks_to_secs(&self, ticks: Tick) -> f32 {
        ticks as f32 * self.dt
    }

    pub fn reset(&mut self) {
        self.accumulator = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_whole_ticks() {
        let mut timestep = FixedTimestep::new(60);
        timestep.accumulate(1.0 / 30.0);
        assert!(timestep.consume_tick());
        assert!(timestep.consume_tick());
        assert!(!timestep.consume_tick());
    }

    #[test]
    fn long_stalls_are_capped() {
        let mut timestep = FixedTimestep::new(8);
        timestep.accumulate(5.0);
        let mut ticks = 0;
        while timestep.consume_tick() {
            ticks += 1;
        }
        assert_eq!(ticks, 2);
    }
}
