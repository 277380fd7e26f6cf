use crate::{EncodeError, Opcode};
use bytes::{BufMut, BytesMut};

/// Largest payload a control frame may carry.
pub const MAX_CONTROL_PAYLOAD: usize = 125;

/// Largest payload length accepted in either direction. The 64-bit length
/// form is used, but its upper 32 bits must stay zero.
pub const MAX_FRAME_PAYLOAD: u64 = u32::MAX as u64;

/// One decoded (or to be encoded) frame header.
///
/// Control frames (`Close`, `Ping`, `Pong`) always have `fin` set and a
/// payload of at most [MAX_CONTROL_PAYLOAD] bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Indicates that this is the final fragment in a message.
    pub fin: bool,

    /// MUST be `0` unless an extension is negotiated that defines meanings
    /// for non-zero values.
    pub rsv: u8,

    pub opcode: Opcode,

    /// Length of the "Payload data" in bytes.
    pub len: usize,

    /// Present if and only if the "Payload data" is masked.
    pub mask_key: Option<[u8; 4]>,
}

impl FrameHeader {
    /// Header of a single, final frame.
    pub fn new(opcode: Opcode, len: usize, mask_key: Option<[u8; 4]>) -> Self {
        Self {
            fin: true,
            rsv: 0,
            opcode,
            len,
            mask_key,
        }
    }

    #[inline]
    pub fn is_masked(&self) -> bool {
        self.mask_key.is_some()
    }

    /// Number of bytes [Self::encode_into] writes.
    pub fn encoded_len(&self) -> usize {
        let len = match self.len {
            0..=125 => 2,
            126..=0xFFFF => 4,
            _ => 10,
        };
        if self.is_masked() {
            len + 4
        } else {
            len
        }
    }

    /// Writes the base header, the extended length and the masking key.
    pub fn encode_into(&self, dst: &mut BytesMut) -> Result<(), EncodeError> {
        if self.len as u64 > MAX_FRAME_PAYLOAD {
            return Err(EncodeError::FrameTooLarge(self.len));
        }
        dst.reserve(self.encoded_len());

        let mask_bit = if self.is_masked() { 0x80 } else { 0 };
        dst.put_u8(((self.fin as u8) << 7) | ((self.rsv & 0b111) << 4) | u8::from(self.opcode));

        match self.len {
            len @ 0..=125 => dst.put_u8(mask_bit | len as u8),
            len @ 126..=0xFFFF => {
                dst.put_u8(mask_bit | 126);
                dst.put_u16(len as u16);
            }
            len => {
                dst.put_u8(mask_bit | 127);
                dst.put_u32(0);
                dst.put_u32(len as u32);
            }
        }
        if let Some(key) = self.mask_key {
            dst.put_slice(&key);
        }
        Ok(())
    }
}
