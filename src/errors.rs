use crate::{CloseCode, Opcode};
use bytes::Bytes;
use std::io;
use thiserror::Error;

/// Protocol violation found while parsing incoming frames.
///
/// All of these are fatal: the [Decoder](crate::Decoder) produces no further
/// frames after returning one.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("client did not mask according to the RFC")]
    ClientDidNotMask,

    #[error("server masked, in conflict with the RFC")]
    ServerMaskedInError,

    #[error("multi-part messages are not implemented")]
    MultiPartNotImplemented,

    #[error("continuation frames are not supported")]
    ContinuationFramesNotImplemented,

    #[error("reserved bits must be `0` (got {0:#05b})")]
    ReservedBitsSet(u8),

    #[error("length field was larger than 32 bits")]
    ReceivedFrameTooLong,

    #[error("payload of {len} bytes exceeds the limit of {max} bytes")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("control frames must have a payload of 125 bytes or less (got {0})")]
    ControlFrameTooLong(usize),

    #[error("invalid close frame (length 1)")]
    ReceivedInvalidCloseFrame,

    #[error("unknown frame opcode: {0}")]
    ReceivedUnknownFrameOpcode(u8),

    #[error("invalid utf-8 payload")]
    InvalidUtf8,

    #[error("connection reset after partial frame received ({} bytes)", partial.len())]
    ConnectionResetPartialFrame { partial: Bytes },
}

impl DecodeError {
    /// Status code sent to the peer when failing the connection on this error.
    pub fn close_code(&self) -> CloseCode {
        match self {
            DecodeError::InvalidUtf8 => CloseCode::InvalidPayload,
            DecodeError::ReceivedFrameTooLong | DecodeError::PayloadTooLarge { .. } => {
                CloseCode::MessageTooBig
            }
            DecodeError::MultiPartNotImplemented
            | DecodeError::ContinuationFramesNotImplemented => CloseCode::Unsupported,
            DecodeError::ClientDidNotMask
            | DecodeError::ServerMaskedInError
            | DecodeError::ReservedBitsSet(_)
            | DecodeError::ControlFrameTooLong(_)
            | DecodeError::ReceivedInvalidCloseFrame
            | DecodeError::ReceivedUnknownFrameOpcode(_)
            | DecodeError::ConnectionResetPartialFrame { .. } => CloseCode::ProtocolError,
        }
    }
}

/// Outgoing message rejected before anything was written.
///
/// These are caller mistakes, the connection stays usable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("frame type \"{opcode}\" requires {expected}")]
    InvalidPayloadShape {
        opcode: Opcode,
        expected: &'static str,
    },

    #[error("close frame with \"reason\" requires a close code")]
    ReasonWithoutCode,

    #[error("invalid close code name \"{0}\"")]
    UnknownCloseCodeName(String),

    #[error("frame payload must have length less than 32-bits (got {0})")]
    FrameTooLarge(usize),

    #[error("control frames must have a payload of 125 bytes or less (got {0})")]
    ControlFrameTooLong(usize),
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("handshake failed: {0}")]
    Handshake(&'static str),

    #[error("connection is closed")]
    Closed,
}

/// Low level failures that only mean the peer went away.
pub(crate) fn is_benign(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::NotConnected
            | io::ErrorKind::UnexpectedEof
    )
}
