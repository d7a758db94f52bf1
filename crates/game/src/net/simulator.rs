use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::stats::PacketLossSimulation;

/// Samples drop and delay decisions for one direction of a link.
#[derive(Debug, Clone)]
pub struct LossModel {
    config: PacketLossSimulation,
    rng: StdRng,
}

impl LossModel {
    pub fn new(config: PacketLossSimulation) -> Self {
        Self {
            config,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn seeded(config: PacketLossSimulation, seed: u64) -> Self {
        Self {
            config,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn config(&self) -> &PacketLossSimulation {
        &self.config
    }

    pub fn set_config(&mut self, config: PacketLossSimulation) {
        self.config = config;
    }

    pub fn should_drop(&mut self) -> bool {
        if !self.config.enabled || self.config.loss_percent <= 0.0 {
            return false;
        }
        self.rng.gen_range(0.0..100.0) < self.config.loss_percent
    }

    pub fn delay(&mut self) -> Duration {
        if !self.config.enabled || self.config.max_latency_ms == 0 {
            return Duration::ZERO;
        }
        let base = self.config.min_latency_ms.min(self.config.max_latency_ms);
        let spread = self.config.max_latency_ms - base;
        let latency = base + self.rng.gen_range(0..=spread);
        let jitter = if self.config.jitter_ms > 0 {
            self.rng.gen_range(0..=self.config.jitter_ms)
        } else {
            0
        };
        Duration::from_millis(u64::from(latency + jitter))
    }

    /// Fixed latency for traffic that must stay in order.
    pub fn ordered_delay(&self) -> Duration {
        if !self.config.enabled {
            return Duration::ZERO;
        }
        Duration::from_millis(u64::from(self.config.min_latency_ms))
    }
}

#[derive(Debug)]
struct Delayed<T> {
    release_time: Instant,
    sequence: u64,
    item: T,
}

impl<T> PartialEq for Delayed<T> {
    fn eq(&self, other: &Self) -> bool {
        self.release_time == other.release_time && self.sequence == other.sequence
    }
}

impl<T> Eq for Delayed<T> {}

impl<T> PartialOrd for Delayed<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Delayed<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so the heap pops the earliest release first; ties keep send order.
        other
            .release_time
            .cmp(&self.release_time)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

/// Holds items until their release time.
#[derive(Debug)]
pub struct DelayQueue<T> {
    queue: BinaryHeap<Delayed<T>>,
    next_sequence: u64,
}

impl<T> Default for DelayQueue<T> {
    fn default() -> Self {
        Self {
            queue: BinaryHeap::new(),
            next_sequence: 0,
        }
    }
}

impl<T> DelayQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, item: T, delay: Duration) {
        self.push_at(item, Instant::now() + delay);
    }

    pub fn push_at(&mut self, item: T, release_time: Instant) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.queue.push(Delayed {
            release_time,
            sequence,
            item,
        });
    }

    pub fn take_ready(&mut self) -> Vec<T> {
        self.take_ready_at(Instant::now())
    }

    pub fn take_ready_at(&mut self, now: Instant) -> Vec<T> {
        let mut ready = Vec::new();
        while self.queue.peek().is_some_and(|d| d.release_time <= now) {
            if let Some(delayed) = self.queue.pop() {
                ready.push(delayed.item);
            }
        }
        ready
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn releases_in_time_then_send_order() {
        let mut queue = DelayQueue::new();
        let now = Instant::now();
        queue.push_at("late", now + Duration::from_millis(50));
        queue.push_at("first", now);
        queue.push_at("second", now);

        assert_eq!(queue.take_ready_at(now), vec!["first", "second"]);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.take_ready_at(now + Duration::from_millis(50)), vec!["late"]);
    }

    #[test]
    fn seeded_loss_is_reproducible() {
        let config = PacketLossSimulation::lossy(30.0);
        let mut a = LossModel::seeded(config.clone(), 11);
        let mut b = LossModel::seeded(config, 11);
        let drops_a: Vec<bool> = (0..64).map(|_| a.should_drop()).collect();
        let drops_b: Vec<bool> = (0..64).map(|_| b.should_drop()).collect();
        assert_eq!(drops_a, drops_b);
        assert!(drops_a.iter().any(|&d| d));
        assert!(drops_a.iter().any(|&d| !d));
    }

    #[test]
    fn disabled_model_never_interferes() {
        let mut model = LossModel::new(PacketLossSimulation::default());
        assert!(!(0..100).any(|_| model.should_drop()));
        assert_eq!(model.delay(), Duration::ZERO);
    }
}
