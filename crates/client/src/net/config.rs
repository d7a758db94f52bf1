use glam::Vec2;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Assumed until the server's welcome says otherwise.
    pub tick_rate: u32,
    /// Must match the server's arena; prediction collides against its walls.
    pub arena_size: Vec2,
    /// Decoded snapshots kept as possible delta references.
    pub reference_history: usize,
    /// Older unacknowledged inputs repeated in every input packet.
    pub input_redundancy: usize,
    pub max_pending_inputs: usize,
    pub interpolation_delay_ticks: f32,
    /// Render clock error beyond which it jumps instead of being nudged.
    pub max_render_drift_ticks: f32,
    /// Fraction of the render clock error removed per frame.
    pub time_correction_rate: f32,
    /// Corrections longer than this are applied at once.
    pub snap_distance: f32,
    /// Fraction of the remaining visual error removed per frame.
    pub correction_rate: f32,
    /// Smallest per-frame step of the visual correction, in world units.
    pub min_correction_step: f32,
    /// Ability bar differences below this are treated as quantization noise.
    pub percentage_epsilon: f32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            tick_rate: rift::DEFAULT_TICK_RATE,
            arena_size: Vec2::new(2048.0, 1024.0),
            reference_history: 64,
            input_redundancy: 3,
            max_pending_inputs: 128,
            interpolation_delay_ticks: 2.0,
            max_render_drift_ticks: 10.0,
            time_correction_rate: 0.1,
            snap_distance: 64.0,
            correction_rate: 0.2,
            min_correction_step: 0.25,
            percentage_epsilon: 0.01,
        }
    }
}
