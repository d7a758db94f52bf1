use thiserror::Error;

pub const CRC_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PacketError {
    #[error("packet shorter than its checksum ({0} bytes)")]
    TooShort(usize),
    #[error("checksum mismatch: expected {expected:#010x}, computed {computed:#010x}")]
    ChecksumMismatch { expected: u32, computed: u32 },
    #[error("read of {wanted} bytes past end of payload at offset {offset}")]
    Truncated { offset: usize, wanted: usize },
}

/// Appends the little-endian CRC32 trailer over `payload`.
pub fn seal(mut payload: Vec<u8>) -> Vec<u8> {
    let crc = crc32fast::hash(&payload);
    payload.extend_from_slice(&crc.to_le_bytes());
    payload
}

/// Verifies the CRC32 trailer and returns the payload in front of it.
pub fn open(datagram: &[u8]) -> Result<&[u8], PacketError> {
    if datagram.len() < CRC_LEN {
        return Err(PacketError::TooShort(datagram.len()));
    }
    let (payload, trailer) = datagram.split_at(datagram.len() - CRC_LEN);
    let expected = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
    let computed = crc32fast::hash(payload);
    if expected != computed {
        return Err(PacketError::ChecksumMismatch { expected, computed });
    }
    Ok(payload)
}

/// Little-endian byte writer with bit-packed booleans.
///
/// Consecutive `write_bool` calls share one byte (bit 0 first) until eight are written
/// or any other value is written, which starts the next boolean on a fresh byte.
#[derive(Debug, Default, Clone)]
pub struct PacketWriter {
    buf: Vec<u8>,
    bit_byte: Option<usize>,
    bit_index: u8,
}

impl PacketWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn write_bool(&mut self, value: bool) {
        let byte = match self.bit_byte {
            Some(index) if self.bit_index < 8 => index,
            _ => {
                self.buf.push(0);
                self.bit_index = 0;
                let index = self.buf.len() - 1;
                self.bit_byte = Some(index);
                index
            }
        };
        if value {
            self.buf[byte] |= 1 << self.bit_index;
        }
        self.bit_index += 1;
    }

    #[inline]
    fn put(&mut self, bytes: &[u8]) {
        self.bit_byte = None;
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_u8(&mut self, value: u8) {
        self.put(&[value]);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.put(&value.to_le_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.put(&value.to_le_bytes());
    }

    pub fn write_f32(&mut self, value: f32) {
        self.put(&value.to_le_bytes());
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.put(bytes);
    }

    /// Finishes the payload without a checksum.
    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    /// Finishes the payload with its CRC32 trailer.
    pub fn finish(self) -> Vec<u8> {
        seal(self.buf)
    }
}

/// Reader mirroring [`PacketWriter`]'s cursor discipline.
#[derive(Debug, Clone)]
pub struct PacketReader<'a> {
    buf: &'a [u8],
    offset: usize,
    bit_byte: Option<u8>,
    bit_index: u8,
}

impl<'a> PacketReader<'a> {
    pub fn new(payload: &'a [u8]) -> Self {
        Self {
            buf: payload,
            offset: 0,
            bit_byte: None,
            bit_index: 0,
        }
    }

    /// Checks the CRC trailer and reads the payload in front of it.
    pub fn open(datagram: &'a [u8]) -> Result<Self, PacketError> {
        open(datagram).map(Self::new)
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.offset
    }

    pub fn is_at_end(&self) -> bool {
        self.remaining() == 0
    }

    fn take(&mut self, wanted: usize) -> Result<&'a [u8], PacketError> {
        self.bit_byte = None;
        if self.remaining() < wanted {
            return Err(PacketError::Truncated {
                offset: self.offset,
                wanted,
            });
        }
        let bytes = &self.buf[self.offset..self.offset + wanted];
        self.offset += wanted;
        Ok(bytes)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], PacketError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn read_bool(&mut self) -> Result<bool, PacketError> {
        let byte = match self.bit_byte {
            Some(byte) if self.bit_index < 8 => byte,
            _ => {
                let [byte] = self.take_array::<1>()?;
                self.bit_byte = Some(byte);
                self.bit_index = 0;
                byte
            }
        };
        let value = byte & (1 << self.bit_index) != 0;
        self.bit_index += 1;
        Ok(value)
    }

    pub fn read_u8(&mut self) -> Result<u8, PacketError> {
        self.take_array::<1>().map(|[b]| b)
    }

    pub fn read_u16(&mut self) -> Result<u16, PacketError> {
        self.take_array().map(u16::from_le_bytes)
    }

    pub fn read_u32(&mut self) -> Result<u32, PacketError> {
        self.take_array().map(u32::from_le_bytes)
    }

    pub fn read_f32(&mut self) -> Result<f32, PacketError> {
        self.take_array().map(f32::from_le_bytes)
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], PacketError> {
        self.take(len)
    }
}
