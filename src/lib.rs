//! WebSocket ([RFC 6455](https://datatracker.ietf.org/doc/html/rfc6455)) framing layer.
//!
//! Turns an already upgraded byte channel into a sequence of typed [Message]s
//! and back, and runs the close handshake on top of it.
//!
//! - [Decoder] parses frames incrementally out of arbitrarily split input.
//! - [Encoder] produces single-frame messages, masking them when the [Role] says so.
//! - [Connection] drives both halves over one stream and reports [Event]s.
//! - [handshake] builds and checks the HTTP Upgrade exchange.
//!
//! ### WebSocket Frame Header
//!
//! ```txt
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |             (16/64)           |
//! |N|V|V|V|       |S|             |   (if payload len==126/127)   |
//! | |1|2|3|       |K|             |                               |
//! +-+-+-+-+-------+-+-------------+ - - - - - - - - - - - - - - - +
//! |     Extended payload length continued, if payload len == 127  |
//! + - - - - - - - - - - - - - - - +-------------------------------+
//! |                               |Masking-key, if MASK set to 1  |
//! +-------------------------------+-------------------------------+
//! | Masking-key (continued)       |          Payload Data         |
//! +-------------------------------- - - - - - - - - - - - - - - - +
//! :                     Payload Data continued ...                :
//! + - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - +
//! |                     Payload Data continued ...                |
//! +---------------------------------------------------------------+
//! ```

mod close_code;
mod connection;
mod decoder;
mod encoder;
mod errors;
mod header;
mod mask;
mod message;
mod opcode;

pub mod handshake;
pub mod http;

pub use close_code::*;
pub use connection::*;
pub use decoder::*;
pub use encoder::*;
pub use errors::*;
pub use header::*;
pub use mask::apply_mask;
pub use message::*;
pub use opcode::*;

/// Which end of the connection we are.
///
/// A client MUST mask all frames that it sends to the server, and a server
/// MUST NOT mask any frames that it sends to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Server,
    Client,
}

impl Role {
    /// Frames we write must carry a masking key.
    #[inline]
    pub fn local_must_mask(self) -> bool {
        matches!(self, Role::Client)
    }

    /// Frames we read must carry a masking key.
    #[inline]
    pub fn remote_must_mask(self) -> bool {
        matches!(self, Role::Server)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Role::Server => "server",
            Role::Client => "client",
        })
    }
}
