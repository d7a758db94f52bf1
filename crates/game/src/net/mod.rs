mod loopback;
mod packet;
mod protocol;
pub mod quantize;
mod simulator;
mod stats;
mod transport;
mod udp;

pub use loopback::{LoopbackNetwork, LoopbackTransport};
pub use packet::{CRC_LEN, PacketError, PacketReader, PacketWriter, open, seal};
pub use protocol::{
    ClientMessage, CommandKind, ControlMessage, DEFAULT_PORT, DEFAULT_TICK_RATE, Decoded,
    MAX_DATAGRAM_SIZE, ProtocolError, decode_client_packet, read_control, read_input,
    write_control, write_input, write_resync_request, write_snapshot_ack,
};
pub use simulator::{DelayQueue, LossModel};
pub use stats::{NetworkStats, PacketLossSimulation};
pub use transport::{Channel, ConnectionId, Transport, TransportError, TransportEvent};
pub use udp::{MAX_PAYLOAD_SIZE, UdpConfig, UdpTransport};
