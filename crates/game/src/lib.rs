pub mod id;
pub mod net;
pub mod simulation;
pub mod snapshot;
pub mod spatial;
pub mod store;
pub mod world;

pub use id::{InputId, SnapshotId, Tick, UniqueId, UniqueIdAllocator};
pub use net::{
    Channel, ConnectionId, ControlMessage, DEFAULT_PORT, DEFAULT_TICK_RATE, LoopbackNetwork,
    LoopbackTransport, NetworkStats, PacketLossSimulation, Transport, TransportError,
    TransportEvent, UdpConfig, UdpTransport,
};
pub use simulation::{FixedTimestep, InputFlags, MovementContext, PlayerInput, apply_input};
pub use snapshot::{Snapshot, SnapshotHistory};
pub use spatial::{CollisionManager, LooseQuadtree, Shape, Terrain};
pub use store::{Bucket, EntityTable, Identified};
pub use world::{AbilityRegistry, Entity, EntityKind, EntityType, Projectile, Team, WorldState};
