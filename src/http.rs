//! Just enough HTTP to carry the Upgrade exchange.

use std::{collections::HashMap, fmt, io};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// Extra header field for a handshake request or response.
///
/// Implemented for `(name, value)` tuples and `[name, value]` arrays.
///
/// # Example
///
/// ```rust
/// use web_socket_wire::http::Header;
///
/// assert_eq!(("Origin", "http://example.com").line(), "Origin: http://example.com\r\n");
/// assert_eq!(["Sec-WebSocket-Protocol", "chat"].line(), "Sec-WebSocket-Protocol: chat\r\n");
/// ```
pub trait Header {
    /// The field as one `name: value` line, CRLF included.
    fn line(&self) -> String;
}

impl<T: Header + ?Sized> Header for &T {
    fn line(&self) -> String {
        (**self).line()
    }
}

impl<N: fmt::Display, V: fmt::Display> Header for (N, V) {
    fn line(&self) -> String {
        format!("{}: {}\r\n", self.0, self.1)
    }
}

impl<T: fmt::Display> Header for [T; 2] {
    fn line(&self) -> String {
        format!("{}: {}\r\n", self[0], self[1])
    }
}

/// Head of an HTTP request or response.
///
/// ### Example
///
/// ```rust
/// use web_socket_wire::http::Http;
///
/// let head = Http::parse("HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\n\r\n").unwrap();
/// assert_eq!(head.prefix, "HTTP/1.1 101 Switching Protocols");
/// assert_eq!(head.get("Upgrade"), Some("websocket"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Http {
    /// Request line or status line.
    pub prefix: String,
    /// Field values keyed by lowercase field name.
    pub headers: HashMap<String, String>,
}

impl Http {
    /// Field value, looked up case-insensitively.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Field value, compared case-insensitively against `expected`.
    pub fn has(&self, name: &str, expected: &str) -> bool {
        self.get(name)
            .is_some_and(|value| value.trim().eq_ignore_ascii_case(expected))
    }

    /// Whether a comma separated field contains `token`, e.g. `Connection: keep-alive, Upgrade`.
    pub fn has_token(&self, name: &str, token: &str) -> bool {
        self.get(name).is_some_and(|value| {
            value
                .split(',')
                .any(|item| item.trim().eq_ignore_ascii_case(token))
        })
    }

    fn push_field(&mut self, line: &str) -> Option<()> {
        let (name, value) = line.split_once(':')?;
        self.headers
            .insert(name.trim().to_ascii_lowercase(), value.trim().to_owned());
        Some(())
    }

    /// Parse a complete head. Anything after the empty line is ignored.
    pub fn parse(text: &str) -> Option<Self> {
        let mut lines = text.lines();
        let mut head = Self {
            prefix: lines.next()?.to_owned(),
            headers: HashMap::new(),
        };
        for line in lines.take_while(|line| !line.is_empty()) {
            head.push_field(line)?;
        }
        Some(head)
    }

    /// Read a message head, stopping right after the empty line.
    ///
    /// Bytes following the head stay in `reader`, so a buffered stream can
    /// be handed to a [Connection](crate::Connection) afterwards.
    pub async fn read<R>(reader: &mut R) -> io::Result<Self>
    where
        R: Unpin + AsyncBufRead,
    {
        let invalid = |msg| io::Error::new(io::ErrorKind::InvalidData, msg);
        let mut lines = reader.lines();

        let prefix = lines
            .next_line()
            .await?
            .ok_or_else(|| invalid("connection closed before http head"))?;
        let mut head = Self {
            prefix,
            headers: HashMap::new(),
        };
        while let Some(line) = lines.next_line().await? {
            if line.is_empty() {
                return Ok(head);
            }
            head.push_field(&line)
                .ok_or_else(|| invalid("malformed http header"))?;
        }
        Err(invalid("connection closed inside http head"))
    }
}
