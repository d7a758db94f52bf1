use serde::{Deserialize, Serialize};

/// Artificial network conditions applied on send.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PacketLossSimulation {
    pub enabled: bool,
    /// Chance in percent (0-100) that an unreliable datagram is dropped.
    pub loss_percent: f32,
    pub min_latency_ms: u32,
    pub max_latency_ms: u32,
    pub jitter_ms: u32,
}

impl PacketLossSimulation {
    pub fn lossy(loss_percent: f32) -> Self {
        Self {
            enabled: true,
            loss_percent,
            ..Self::default()
        }
    }

    pub fn is_active(&self) -> bool {
        self.enabled && (self.loss_percent > 0.0 || self.max_latency_ms > 0 || self.jitter_ms > 0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkStats {
    pub packets_sent: u64,
    pub packets_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    /// Dropped on purpose by the loss simulation.
    pub packets_dropped: u64,
    pub reliable_resends: u64,
}

impl NetworkStats {
    pub fn record_sent(&mut self, bytes: usize) {
        self.packets_sent += 1;
        self.bytes_sent += bytes as u64;
    }

    pub fn record_received(&mut self, bytes: usize) {
        self.packets_received += 1;
        self.bytes_received += bytes as u64;
    }
}
