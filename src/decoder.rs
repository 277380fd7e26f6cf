use crate::{
    close_code_name, mask::apply_mask, CloseFrame, DecodeError, FrameHeader, Message, Opcode,
    Role, MAX_CONTROL_PAYLOAD, MAX_FRAME_PAYLOAD,
};
use bytes::{Buf, Bytes, BytesMut};

/// Incremental frame parser.
///
/// Bytes are [ingested](Self::ingest) as they arrive from the channel, in
/// chunks of any size; [Self::try_read_frame] hands out one complete
/// message at a time. Nothing is consumed from the pending buffer until a
/// whole frame (header and payload) is available.
///
/// ### Example
///
/// ```rust
/// use web_socket_wire::{Decoder, Message, Role};
///
/// let mut decoder = Decoder::new(Role::Client);
/// decoder.ingest(&[0x81, 0x05, b'H', b'e']);
/// assert_eq!(decoder.try_read_frame(), Ok(None));
///
/// decoder.ingest(b"llo");
/// assert_eq!(decoder.try_read_frame(), Ok(Some(Message::Text("Hello".into()))));
/// ```
#[derive(Debug)]
pub struct Decoder {
    buf: BytesMut,
    remote_must_mask: bool,
    max_payload_len: usize,
    failed: bool,
}

impl Decoder {
    pub fn new(role: Role) -> Self {
        Self {
            buf: BytesMut::new(),
            remote_must_mask: role.remote_must_mask(),
            max_payload_len: MAX_FRAME_PAYLOAD as usize,
            failed: false,
        }
    }

    /// Reject frames declaring a payload longer than `max`, before buffering it.
    pub fn with_max_payload_len(mut self, max: usize) -> Self {
        self.max_payload_len = max;
        self
    }

    /// Append newly received bytes. Ignored once decoding has failed.
    pub fn ingest(&mut self, bytes: &[u8]) {
        if !self.failed {
            self.buf.extend_from_slice(bytes);
        }
    }

    /// Number of buffered bytes not yet turned into messages.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    pub fn is_failed(&self) -> bool {
        self.failed
    }

    /// Parse the next complete frame.
    ///
    /// - `Ok(None)`: more input is needed.
    /// - `Ok(Some(..))`: one frame, removed from the pending buffer.
    /// - `Err(..)`: a protocol violation. The pending buffer is dropped and
    ///   every later call returns `Ok(None)`.
    pub fn try_read_frame(&mut self) -> Result<Option<Message>, DecodeError> {
        if self.failed {
            return Ok(None);
        }
        self.read_frame().map_err(|err| {
            tracing::trace!(pending = self.buf.len(), "decode error: {err}");
            self.failed = true;
            self.buf = BytesMut::new();
            err
        })
    }

    /// The channel ended. Leftover bytes mean the peer vanished mid-frame.
    pub fn finish(&mut self) -> Result<(), DecodeError> {
        if self.failed || self.buf.is_empty() {
            return Ok(());
        }
        self.failed = true;
        Err(DecodeError::ConnectionResetPartialFrame {
            partial: self.buf.split().freeze(),
        })
    }

    fn read_frame(&mut self) -> Result<Option<Message>, DecodeError> {
        let Some((header, header_len)) = self.read_header()? else {
            return Ok(None);
        };
        if self.buf.len() < header_len + header.len {
            return Ok(None);
        }

        let mut payload = self.buf.split_to(header_len + header.len);
        payload.advance(header_len);
        if let Some(key) = header.mask_key {
            apply_mask(&mut payload, key);
        }
        tracing::trace!(opcode = %header.opcode, len = header.len, "frame");

        let payload = payload.freeze();
        match header.opcode {
            Opcode::Continue => Err(DecodeError::ContinuationFramesNotImplemented),
            Opcode::Text => utf8(&payload).map(|text| Some(Message::Text(text.to_owned()))),
            Opcode::Binary => Ok(Some(Message::Binary(payload))),
            Opcode::Ping => Ok(Some(Message::Ping(payload))),
            Opcode::Pong => Ok(Some(Message::Pong(payload))),
            Opcode::Close => parse_close(payload).map(|frame| Some(Message::Close(frame))),
        }
    }

    /// Returns the header and its encoded length, once all of it is buffered.
    fn read_header(&self) -> Result<Option<(FrameHeader, usize)>, DecodeError> {
        let buf = &self.buf[..];
        let [b1, b2] = match buf {
            [b1, b2, ..] => [*b1, *b2],
            _ => return Ok(None),
        };

        let fin = b1 & 0b_1000_0000 != 0;
        let rsv = (b1 & 0b_111_0000) >> 4;
        let opcode = b1 & 0b_1111;
        let is_masked = b2 & 0b_1000_0000 != 0;
        let len7 = b2 & 0b_111_1111;

        // A client MUST mask all frames that it sends to the server, and a
        // server MUST NOT mask any frames that it sends to the client.
        if self.remote_must_mask && !is_masked {
            return Err(DecodeError::ClientDidNotMask);
        }
        if !self.remote_must_mask && is_masked {
            return Err(DecodeError::ServerMaskedInError);
        }
        if !fin {
            return Err(DecodeError::MultiPartNotImplemented);
        }
        if rsv != 0 {
            return Err(DecodeError::ReservedBitsSet(rsv));
        }
        let opcode = Opcode::try_from(opcode)?;

        let mut pos = 2;
        let len = match len7 {
            126 => {
                let Some(bytes) = buf.get(2..4) else {
                    return Ok(None);
                };
                pos += 2;
                u16::from_be_bytes([bytes[0], bytes[1]]) as u64
            }
            127 => {
                // The upper half can be judged before the lower half arrives.
                let Some(upper) = buf.get(2..6) else {
                    return Ok(None);
                };
                if upper.iter().any(|&byte| byte != 0) {
                    return Err(DecodeError::ReceivedFrameTooLong);
                }
                let Some(lower) = buf.get(6..10) else {
                    return Ok(None);
                };
                pos += 8;
                u32::from_be_bytes([lower[0], lower[1], lower[2], lower[3]]) as u64
            }
            len => len as u64,
        };
        let len = usize::try_from(len).map_err(|_| DecodeError::ReceivedFrameTooLong)?;

        if opcode.is_control() && len > MAX_CONTROL_PAYLOAD {
            return Err(DecodeError::ControlFrameTooLong(len));
        }
        if len > self.max_payload_len {
            return Err(DecodeError::PayloadTooLarge {
                len,
                max: self.max_payload_len,
            });
        }

        let mask_key = if is_masked {
            let Some(key) = buf.get(pos..pos + 4) else {
                return Ok(None);
            };
            pos += 4;
            Some([key[0], key[1], key[2], key[3]])
        } else {
            None
        };

        Ok(Some((
            FrameHeader {
                fin,
                rsv,
                opcode,
                len,
                mask_key,
            },
            pos,
        )))
    }
}

fn utf8(bytes: &[u8]) -> Result<&str, DecodeError> {
    std::str::from_utf8(bytes).map_err(|_| DecodeError::InvalidUtf8)
}

/// An empty body is allowed. Otherwise it MUST start with a 2-byte big
/// endian status code, followed by an optional UTF-8 reason.
fn parse_close(payload: Bytes) -> Result<CloseFrame, DecodeError> {
    match &payload[..] {
        [] => Ok(CloseFrame::empty()),
        [_] => Err(DecodeError::ReceivedInvalidCloseFrame),
        [hi, lo, reason @ ..] => {
            let code = u16::from_be_bytes([*hi, *lo]);
            let reason = utf8(reason)?;
            Ok(CloseFrame {
                code: Some(code),
                codename: close_code_name(code).into(),
                reason: (!reason.is_empty()).then(|| reason.to_owned()),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(decoder: &mut Decoder) -> Vec<Message> {
        let mut messages = vec![];
        while let Some(msg) = decoder.try_read_frame().unwrap() {
            messages.push(msg);
        }
        messages
    }

    #[test]
    fn masked_text_with_zero_key() {
        let mut decoder = Decoder::new(Role::Server);
        decoder.ingest(&[
            0x81, 0x89, 0x00, 0x00, 0x00, 0x00, 0x48, 0x69, 0x20, 0x74, 0x68, 0x65, 0x72, 0x65,
            0x21,
        ]);
        assert_eq!(decode_all(&mut decoder), [Message::Text("Hi there!".into())]);
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn masked_text() {
        let mut decoder = Decoder::new(Role::Server);
        decoder.ingest(&[0x81, 0x85, 0x37, 0xfa, 0x21, 0x3d, 0x7f, 0x9f, 0x4d, 0x51, 0x58]);
        assert_eq!(decode_all(&mut decoder), [Message::Text("Hello".into())]);
    }

    #[test]
    fn empty_close() {
        let mut decoder = Decoder::new(Role::Client);
        decoder.ingest(&[0x88, 0x00]);
        let frame = CloseFrame {
            code: None,
            codename: "NONE".into(),
            reason: None,
        };
        assert_eq!(decode_all(&mut decoder), [Message::Close(frame)]);
    }

    #[test]
    fn masked_close_with_code() {
        let mut decoder = Decoder::new(Role::Server);
        // 1000 = [0x03, 0xe8], masked with [1, 2, 3, 4]
        decoder.ingest(&[0x88, 0x82, 1, 2, 3, 4, 0x03 ^ 1, 0xe8 ^ 2]);
        let frame = CloseFrame {
            code: Some(1000),
            codename: "NORMAL".into(),
            reason: None,
        };
        assert_eq!(decode_all(&mut decoder), [Message::Close(frame)]);
    }

    #[test]
    fn close_with_reason_and_unknown_code() {
        let mut decoder = Decoder::new(Role::Client);
        decoder.ingest(&[0x88, 0x05, 0x0f, 0xa0, b'b', b'y', b'e']);
        let frame = CloseFrame {
            code: Some(4000),
            codename: "UNKNOWN".into(),
            reason: Some("bye".into()),
        };
        assert_eq!(decode_all(&mut decoder), [Message::Close(frame)]);
    }

    #[test]
    fn close_of_length_one() {
        let mut decoder = Decoder::new(Role::Client);
        decoder.ingest(&[0x88, 0x01, 0x03]);
        assert_eq!(
            decoder.try_read_frame(),
            Err(DecodeError::ReceivedInvalidCloseFrame)
        );
    }

    #[test]
    fn unmasked_frame_to_server() {
        let mut decoder = Decoder::new(Role::Server);
        decoder.ingest(&[0x81, 0x05, 0x48, 0x65, 0x6c, 0x6c, 0x6f]);
        assert_eq!(decoder.try_read_frame(), Err(DecodeError::ClientDidNotMask));
        // fatal: nothing more comes out, and later input is ignored
        decoder.ingest(&[0x81, 0x80, 0, 0, 0, 0]);
        assert_eq!(decoder.try_read_frame(), Ok(None));
        assert_eq!(decoder.pending(), 0);
        assert_eq!(decoder.finish(), Ok(()));
    }

    #[test]
    fn masked_frame_to_client() {
        let mut decoder = Decoder::new(Role::Client);
        decoder.ingest(&[0x81, 0x80, 0, 0, 0, 0]);
        assert_eq!(decoder.try_read_frame(), Err(DecodeError::ServerMaskedInError));
    }

    #[test]
    fn fragments_are_rejected() {
        let mut decoder = Decoder::new(Role::Client);
        decoder.ingest(&[0x01, 0x03, 0x48, 0x65, 0x6c]);
        assert_eq!(
            decoder.try_read_frame(),
            Err(DecodeError::MultiPartNotImplemented)
        );

        let mut decoder = Decoder::new(Role::Client);
        decoder.ingest(&[0x80, 0x02, 0x6c, 0x6f]);
        assert_eq!(
            decoder.try_read_frame(),
            Err(DecodeError::ContinuationFramesNotImplemented)
        );
    }

    #[test]
    fn unknown_opcode() {
        let mut decoder = Decoder::new(Role::Client);
        decoder.ingest(&[0x83, 0x00]);
        assert_eq!(
            decoder.try_read_frame(),
            Err(DecodeError::ReceivedUnknownFrameOpcode(3))
        );
    }

    #[test]
    fn reserved_bits() {
        let mut decoder = Decoder::new(Role::Client);
        decoder.ingest(&[0xC1, 0x00]);
        assert_eq!(decoder.try_read_frame(), Err(DecodeError::ReservedBitsSet(0b100)));
    }

    #[test]
    fn control_frame_too_long_before_payload() {
        for opcode in [0x88, 0x89, 0x8A] {
            let mut decoder = Decoder::new(Role::Client);
            decoder.ingest(&[opcode, 126]);
            assert_eq!(decoder.try_read_frame(), Ok(None));
            decoder.ingest(&[0x00, 126]);
            assert_eq!(
                decoder.try_read_frame(),
                Err(DecodeError::ControlFrameTooLong(126))
            );
        }
    }

    #[test]
    fn length_over_32_bits() {
        let mut decoder = Decoder::new(Role::Client);
        decoder.ingest(&[0x82, 127, 0, 0, 0, 1]);
        assert_eq!(decoder.try_read_frame(), Err(DecodeError::ReceivedFrameTooLong));
    }

    #[test]
    fn payload_limit() {
        let mut decoder = Decoder::new(Role::Client).with_max_payload_len(4);
        decoder.ingest(&[0x82, 5]);
        assert_eq!(
            decoder.try_read_frame(),
            Err(DecodeError::PayloadTooLarge { len: 5, max: 4 })
        );
    }

    #[test]
    fn invalid_utf8_text() {
        let mut decoder = Decoder::new(Role::Client);
        decoder.ingest(&[0x81, 0x02, 0xc3, 0x28]);
        assert_eq!(decoder.try_read_frame(), Err(DecodeError::InvalidUtf8));
    }

    #[test]
    fn split_at_every_boundary() {
        let frame = [
            0x82, 0x85, 0x37, 0xfa, 0x21, 0x3d, 0x7f, 0x9f, 0x4d, 0x51, 0x58,
        ];
        for at in 0..=frame.len() {
            let mut decoder = Decoder::new(Role::Server);
            decoder.ingest(&frame[..at]);
            let mut messages = decode_all(&mut decoder);
            decoder.ingest(&frame[at..]);
            messages.extend(decode_all(&mut decoder));
            assert_eq!(messages, [Message::Binary(Bytes::from_static(b"Hello"))], "split at {at}");
        }
    }

    #[test]
    fn byte_by_byte_extended_length() {
        let mut frame = vec![0x82, 126, 0x01, 0x00];
        frame.extend(std::iter::repeat(7).take(256));

        let mut decoder = Decoder::new(Role::Client);
        let mut messages = vec![];
        for byte in &frame {
            decoder.ingest(std::slice::from_ref(byte));
            messages.extend(decode_all(&mut decoder));
        }
        assert_eq!(messages, [Message::Binary(vec![7; 256].into())]);
    }

    #[test]
    fn partial_frame_at_end() {
        let mut decoder = Decoder::new(Role::Client);
        decoder.ingest(&[0x81, 0x02, b'h', b'i']);
        decoder.ingest(&[0x89, 0x00]);
        decoder.ingest(&[0x82, 0x05]);

        assert_eq!(
            decode_all(&mut decoder),
            [Message::Text("hi".into()), Message::Ping(Bytes::new())]
        );
        assert_eq!(
            decoder.finish(),
            Err(DecodeError::ConnectionResetPartialFrame {
                partial: Bytes::from_static(&[0x82, 0x05])
            })
        );
    }
}
