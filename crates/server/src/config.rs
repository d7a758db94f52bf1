use glam::Vec2;
use rift::PacketLossSimulation;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub tick_rate: u32,
    pub max_clients: usize,
    /// Connected clients needed before the match leaves the lobby.
    pub min_players_to_start: usize,
    /// Upper bound on retained snapshots when some client stops acknowledging.
    pub max_snapshot_history: usize,
    pub arena_size: Vec2,
    pub crate_count: usize,
    pub units_per_wave: usize,
    pub wave_interval_ticks: u32,
    pub packet_loss: Option<PacketLossSimulation>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tick_rate: rift::DEFAULT_TICK_RATE,
            max_clients: 32,
            min_players_to_start: 1,
            max_snapshot_history: 256,
            arena_size: Vec2::new(2048.0, 1024.0),
            crate_count: 6,
            units_per_wave: 3,
            wave_interval_ticks: 600,
            packet_loss: None,
        }
    }
}
