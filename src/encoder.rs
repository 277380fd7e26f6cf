use crate::{
    mask::{apply_mask, random_key},
    CloseCode, CloseFrame, EncodeError, FrameHeader, Message, Opcode, Role, MAX_CONTROL_PAYLOAD,
};
use bytes::{BufMut, BytesMut};

/// Turns [Message]s into single, final frames.
///
/// Clients mask every frame with a fresh random key; servers never mask.
///
/// ### Example
///
/// ```rust
/// use web_socket_wire::{Encoder, Message, Role};
///
/// let bytes = Encoder::new(Role::Server).encode(&Message::Text("Hello".into())).unwrap();
/// assert_eq!(bytes[..], [0x81, 0x05, 0x48, 0x65, 0x6c, 0x6c, 0x6f]);
/// ```
#[derive(Debug, Clone)]
pub struct Encoder {
    local_must_mask: bool,
    mask_key: Option<[u8; 4]>,
}

impl Encoder {
    pub fn new(role: Role) -> Self {
        Self {
            local_must_mask: role.local_must_mask(),
            mask_key: None,
        }
    }

    /// Use `key` instead of a random masking key, for reproducible output.
    pub fn with_mask_key(mut self, key: [u8; 4]) -> Self {
        self.mask_key = Some(key);
        self
    }

    pub fn encode(&self, msg: &Message) -> Result<BytesMut, EncodeError> {
        let mut dst = BytesMut::new();
        self.encode_into(msg, &mut dst)?;
        Ok(dst)
    }

    /// Appends the frame for `msg` to `dst`. Nothing is written on error.
    pub fn encode_into(&self, msg: &Message, dst: &mut BytesMut) -> Result<(), EncodeError> {
        match msg {
            Message::Text(text) => self.write_frame(Opcode::Text, text.as_bytes(), dst),
            Message::Binary(data) => self.write_frame(Opcode::Binary, data, dst),
            Message::Ping(data) => self.write_frame(Opcode::Ping, data, dst),
            Message::Pong(data) => self.write_frame(Opcode::Pong, data, dst),
            Message::Close(frame) => {
                let body = close_body(frame)?;
                self.write_frame(Opcode::Close, &body, dst)
            }
        }
    }

    /// Frame an already serialized payload, checking it fits the opcode.
    ///
    /// Backs [Sender::send_frame](crate::Sender::send_frame), which
    /// [Connection::forward](crate::Connection::forward) relays through.
    pub fn encode_raw(
        &self,
        opcode: Opcode,
        payload: &[u8],
        dst: &mut BytesMut,
    ) -> Result<(), EncodeError> {
        let shape_error = |expected| EncodeError::InvalidPayloadShape { opcode, expected };
        match opcode {
            Opcode::Continue => return Err(shape_error("a complete message")),
            Opcode::Text if std::str::from_utf8(payload).is_err() => {
                return Err(shape_error("string payload"))
            }
            Opcode::Close if payload.len() == 1 => {
                return Err(shape_error("empty payload or a close code"))
            }
            _ => {}
        }
        self.write_frame(opcode, payload, dst)
    }

    fn write_frame(
        &self,
        opcode: Opcode,
        payload: &[u8],
        dst: &mut BytesMut,
    ) -> Result<(), EncodeError> {
        if opcode.is_control() && payload.len() > MAX_CONTROL_PAYLOAD {
            return Err(EncodeError::ControlFrameTooLong(payload.len()));
        }
        let mask_key = self
            .local_must_mask
            .then(|| self.mask_key.unwrap_or_else(random_key));

        let header = FrameHeader::new(opcode, payload.len(), mask_key);
        dst.reserve(header.encoded_len() + payload.len());
        header.encode_into(dst)?;

        let start = dst.len();
        dst.put_slice(payload);
        if let Some(key) = mask_key {
            apply_mask(&mut dst[start..], key);
        }
        Ok(())
    }
}

/// `code` wins over `codename`; `"NONE"` means no status code at all.
fn close_body(frame: &CloseFrame) -> Result<Vec<u8>, EncodeError> {
    let code = match frame.code {
        Some(code) => Some(code),
        None => match frame.codename.as_str() {
            "NONE" | "" => None,
            name => Some(
                CloseCode::from_name(name)
                    .ok_or_else(|| EncodeError::UnknownCloseCodeName(name.to_owned()))?
                    .into(),
            ),
        },
    };
    let reason = frame.reason.as_deref().unwrap_or_default();

    match code {
        None if reason.is_empty() => Ok(vec![]),
        None => Err(EncodeError::ReasonWithoutCode),
        Some(code) => {
            let mut body = Vec::with_capacity(2 + reason.len());
            body.extend_from_slice(&code.to_be_bytes());
            body.extend_from_slice(reason.as_bytes());
            Ok(body)
        }
    }
}
