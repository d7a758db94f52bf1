use rkyv::util::AlignedVec;
use rkyv::{Archive, Deserialize, Serialize, rancor};

use crate::id::SnapshotId;
use crate::simulation::{InputFlags, PlayerInput};

use super::packet::{PacketError, PacketReader, PacketWriter};
use super::quantize::{dequantize_angle, quantize_angle};

pub const DEFAULT_PORT: u16 = 27015;
pub const DEFAULT_TICK_RATE: u32 = 30;
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Snapshot = 1,
    Control = 2,
    Input = 10,
    SnapshotAck = 11,
    ResyncRequest = 12,
}

impl TryFrom<u8> for CommandKind {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(CommandKind::Snapshot),
            2 => Ok(CommandKind::Control),
            10 => Ok(CommandKind::Input),
            11 => Ok(CommandKind::SnapshotAck),
            12 => Ok(CommandKind::ResyncRequest),
            other => Err(ProtocolError::UnknownCommand(other)),
        }
    }
}

/// Reliable-channel messages. Each carries the snapshot id it should be ordered against.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub enum ControlMessage {
    Welcome {
        client_id: u32,
        controlled_entity: u32,
        tick_rate: u32,
        snapshot_id: u32,
    },
    MatchStart {
        snapshot_id: u32,
    },
    Goodbye {
        reason: String,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error(transparent)]
    Packet(#[from] PacketError),
    #[error("unknown command byte {0}")]
    UnknownCommand(u8),
    #[error("command {0:?} is not valid in this direction")]
    UnexpectedCommand(CommandKind),
    #[error("control message serialization failed: {0}")]
    Serialize(rancor::Error),
    #[error("control message deserialization failed: {0}")]
    Deserialize(rancor::Error),
    #[error("control message of {0} bytes exceeds the length prefix")]
    ControlTooLarge(usize),
}

impl ControlMessage {
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        rkyv::to_bytes::<rancor::Error>(self)
            .map(|aligned| aligned.into_vec())
            .map_err(ProtocolError::Serialize)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let mut aligned = AlignedVec::<16>::with_capacity(bytes.len());
        aligned.extend_from_slice(bytes);
        rkyv::from_bytes::<Self, rancor::Error>(&aligned).map_err(ProtocolError::Deserialize)
    }
}

pub fn write_control(writer: &mut PacketWriter, message: &ControlMessage) -> Result<(), ProtocolError> {
    let bytes = message.to_bytes()?;
    let len = u16::try_from(bytes.len()).map_err(|_| ProtocolError::ControlTooLarge(bytes.len()))?;
    writer.write_u8(CommandKind::Control as u8);
    writer.write_u16(len);
    writer.write_bytes(&bytes);
    Ok(())
}

/// Reads a control body; the command byte has already been consumed.
pub fn read_control(reader: &mut PacketReader<'_>) -> Result<ControlMessage, ProtocolError> {
    let len = reader.read_u16()? as usize;
    let bytes = reader.read_bytes(len)?;
    ControlMessage::from_bytes(bytes)
}

pub fn write_input(writer: &mut PacketWriter, input: &PlayerInput) {
    writer.write_u8(CommandKind::Input as u8);
    writer.write_u32(input.id);
    let bits = input.flags.bits();
    for bit in 0..8 {
        writer.write_bool(bits & (1 << bit) != 0);
    }
    writer.write_u16(quantize_angle(input.aim_angle));
}

pub fn read_input(reader: &mut PacketReader<'_>) -> Result<PlayerInput, PacketError> {
    let id = reader.read_u32()?;
    let mut bits = 0u8;
    for bit in 0..8 {
        if reader.read_bool()? {
            bits |= 1 << bit;
        }
    }
    let aim_angle = dequantize_angle(reader.read_u16()?);
    Ok(PlayerInput {
        id,
        flags: InputFlags::from_bits_retain(bits),
        aim_angle,
    })
}

pub fn write_snapshot_ack(writer: &mut PacketWriter, snapshot_id: SnapshotId) {
    writer.write_u8(CommandKind::SnapshotAck as u8);
    writer.write_u32(snapshot_id);
}

pub fn write_resync_request(writer: &mut PacketWriter) {
    writer.write_u8(CommandKind::ResyncRequest as u8);
}

/// Commands a client can send.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    Input(PlayerInput),
    SnapshotAck(SnapshotId),
    ResyncRequest,
    Control(ControlMessage),
}

/// Commands recovered from one packet. Decoding stops at the first bad command; whatever
/// was read before it is still returned.
#[derive(Debug, Default)]
pub struct Decoded<T> {
    pub messages: Vec<T>,
    pub error: Option<ProtocolError>,
}

pub fn decode_client_packet(payload: &[u8]) -> Decoded<ClientMessage> {
    let mut reader = PacketReader::new(payload);
    let mut decoded = Decoded {
        messages: Vec::new(),
        error: None,
    };

    while !reader.is_at_end() {
        match read_client_message(&mut reader) {
            Ok(message) => decoded.messages.push(message),
            Err(err) => {
                log::debug!("dropping rest of client packet at byte {}: {err}", reader.offset());
                decoded.error = Some(err);
                break;
            }
        }
    }
    decoded
}

fn read_client_message(reader: &mut PacketReader<'_>) -> Result<ClientMessage, ProtocolError> {
    let kind = CommandKind::try_from(reader.read_u8()?)?;
    match kind {
        CommandKind::Input => Ok(ClientMessage::Input(read_input(reader)?)),
        CommandKind::SnapshotAck => Ok(ClientMessage::SnapshotAck(reader.read_u32()?)),
        CommandKind::ResyncRequest => Ok(ClientMessage::ResyncRequest),
        CommandKind::Control => Ok(ClientMessage::Control(read_control(reader)?)),
        CommandKind::Snapshot => Err(ProtocolError::UnexpectedCommand(kind)),
    }
}
