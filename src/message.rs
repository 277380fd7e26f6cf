use crate::{close_code_name, CloseCode, Opcode};
use bytes::Bytes;

/// A complete application-level message. Always exactly one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Text(String),
    Binary(Bytes),
    Ping(Bytes),
    Pong(Bytes),
    Close(CloseFrame),
}

impl Message {
    pub fn opcode(&self) -> Opcode {
        match self {
            Message::Text(_) => Opcode::Text,
            Message::Binary(_) => Opcode::Binary,
            Message::Ping(_) => Opcode::Ping,
            Message::Pong(_) => Opcode::Pong,
            Message::Close(_) => Opcode::Close,
        }
    }
}

/// Body of a `Close` frame.
///
/// `code` is `None` when the frame carried no status code, in which case
/// `codename` is `"NONE"`. Codes outside [CloseCode] are named `"UNKNOWN"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFrame {
    pub code: Option<u16>,
    pub codename: String,
    pub reason: Option<String>,
}

impl CloseFrame {
    /// A `Close` frame with an empty body.
    pub fn empty() -> Self {
        Self {
            code: None,
            codename: "NONE".into(),
            reason: None,
        }
    }

    pub fn new(code: impl Into<u16>, reason: Option<String>) -> Self {
        let code = code.into();
        Self {
            code: Some(code),
            codename: close_code_name(code).into(),
            reason: reason.filter(|reason| !reason.is_empty()),
        }
    }

    /// Close by symbolic name only, resolved to a code when encoding.
    pub fn named(codename: impl Into<String>, reason: Option<String>) -> Self {
        Self {
            code: None,
            codename: codename.into(),
            reason,
        }
    }
}

impl From<CloseCode> for CloseFrame {
    fn from(code: CloseCode) -> Self {
        CloseFrame::new(code, None)
    }
}

/// Data message accepted by [Connection::send](crate::Connection::send).
///
/// Strings go out as `Text` frames, bytes as `Binary` frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Binary(Bytes),
}

impl From<Payload> for Message {
    fn from(payload: Payload) -> Self {
        match payload {
            Payload::Text(text) => Message::Text(text),
            Payload::Binary(data) => Message::Binary(data),
        }
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_owned())
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<&[u8]> for Payload {
    fn from(data: &[u8]) -> Self {
        Payload::Binary(Bytes::copy_from_slice(data))
    }
}

impl<const N: usize> From<&[u8; N]> for Payload {
    fn from(data: &[u8; N]) -> Self {
        Payload::Binary(Bytes::copy_from_slice(data))
    }
}

impl From<Vec<u8>> for Payload {
    fn from(data: Vec<u8>) -> Self {
        Payload::Binary(data.into())
    }
}

impl From<Bytes> for Payload {
    fn from(data: Bytes) -> Self {
        Payload::Binary(data)
    }
}
