//! Authoritative game server: simulation, client bookkeeping and snapshot delivery.

pub mod clients;
pub mod config;
pub mod engine;
pub mod events;
pub mod simulation;
pub mod tui;

pub use clients::{ClientRecord, ClientRegistry};
pub use config::ServerConfig;
pub use engine::{MatchPhase, ServerStats, SyncServer};
pub use events::{DisconnectReason, ServerEvent};
pub use simulation::GameWorld;
