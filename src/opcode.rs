use crate::DecodeError;

/// Defines the interpretation of the "Payload data".  If an unknown
/// opcode is received, the receiving endpoint MUST _Fail the WebSocket Connection_.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// Continuation of a fragmented message. Never produced here, and
    /// rejected when received, since multi-frame messages are not supported.
    Continue = 0x0,
    Text = 0x1,
    Binary = 0x2,

    // 3-7 are reserved for further non-control frames.
    /// Starts (or answers) the close handshake.
    ///
    /// If there is a body, the first two bytes MUST be a big endian status
    /// code, optionally followed by a UTF-8 reason.
    Close = 0x8,

    /// A Ping frame may serve either as a keepalive or as a means to verify
    /// that the remote endpoint is still responsive.
    Ping = 0x9,

    /// A Pong frame sent in response to a Ping frame must have identical
    /// "Application data" as found in the message body of the Ping frame being replied to.
    Pong = 0xA,
    // 11-15 are reserved for further control frames
}

impl Opcode {
    /// Whether the opcode indicates a control frame.
    ///
    /// All control frame opcodes have the most significant bit of the nibble set.
    #[inline]
    pub fn is_control(self) -> bool {
        self as u8 & 0b1000 != 0
    }

    pub fn name(self) -> &'static str {
        match self {
            Opcode::Continue => "CONT",
            Opcode::Text => "TEXT",
            Opcode::Binary => "BINARY",
            Opcode::Close => "CLOSE",
            Opcode::Ping => "PING",
            Opcode::Pong => "PONG",
        }
    }
}

impl TryFrom<u8> for Opcode {
    type Error = DecodeError;

    #[inline]
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0x0 => Opcode::Continue,
            0x1 => Opcode::Text,
            0x2 => Opcode::Binary,
            0x8 => Opcode::Close,
            0x9 => Opcode::Ping,
            0xA => Opcode::Pong,
            opcode => return Err(DecodeError::ReceivedUnknownFrameOpcode(opcode)),
        })
    }
}

impl From<Opcode> for u8 {
    #[inline]
    fn from(opcode: Opcode) -> Self {
        opcode as u8
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
