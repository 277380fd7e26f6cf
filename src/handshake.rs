//! # Client handshake request
//!
//! A client sends a handshake request to the server. It includes the following information:
//!
//! ```yml
//! GET /chat HTTP/1.1
//! Host: example.com:8000
//! Upgrade: websocket
//! Connection: Upgrade
//! Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==
//! Sec-WebSocket-Version: 13
//! ```
//!
//! The server answers with `101 Switching Protocols` and a `Sec-WebSocket-Accept`
//! header derived from the key. From then on the stream carries frames, and
//! [accept] / [connect] wrap it into a [Connection] with the matching [Role].

use crate::{http::Header, http::Http, Config, Connection, Error, Role};
use base64::{engine::general_purpose::STANDARD, Engine};
use sha1::{Digest, Sha1};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

/// WebSocket magic string used during the WebSocket handshake
pub const MAGIC_STRING: &[u8; 36] = b"258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Length in bytes of the decoded `Sec-WebSocket-Key` nonce.
pub const NONCE_LEN: usize = 16;

/// Create `Sec-WebSocket-Accept` key from `Sec-WebSocket-Key` http header value.
///
/// ### Example
///
/// ```rust
/// use web_socket_wire::handshake::accept_key_from;
/// assert_eq!(accept_key_from("dGhlIHNhbXBsZSBub25jZQ=="), "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
/// ```
pub fn accept_key_from(sec_ws_key: impl AsRef<[u8]>) -> String {
    let mut sha1 = Sha1::new();
    sha1.update(sec_ws_key.as_ref());
    sha1.update(MAGIC_STRING);
    STANDARD.encode(sha1.finalize())
}

/// Random, base64 encoded 16-byte nonce for the `Sec-WebSocket-Key` header.
pub fn generate_key() -> String {
    STANDARD.encode(rand::random::<[u8; NONCE_LEN]>())
}

/// Whether `accept` is the right `Sec-WebSocket-Accept` value for `key`.
pub fn validate_accept_response(key: &str, accept: &str) -> bool {
    accept_key_from(key) == accept
}

/// ## Server handshake response
///
/// ### Example
///
/// ```rust
/// let res = [
///     "HTTP/1.1 101 Switching Protocols",
///     "Upgrade: websocket",
///     "Connection: Upgrade",
///     "Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=",
///     "",
///     ""
/// ];
/// let field: Option<(&str, &str)> = None;
/// assert_eq!(web_socket_wire::handshake::response("dGhlIHNhbXBsZSBub25jZQ==", field), res.join("\r\n"));
/// ```
pub fn response(
    sec_ws_key: impl AsRef<str>,
    headers: impl IntoIterator<Item = impl Header>,
) -> String {
    let key = accept_key_from(sec_ws_key.as_ref());
    let headers: String = headers.into_iter().map(|field| field.line()).collect();
    format!("HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Accept: {key}\r\n{headers}\r\n")
}

/// Create websocket handshake request, returning it with the generated key.
///
/// ### Example
///
/// ```rust
/// use web_socket_wire::handshake::request;
/// let (req, key) = request("example.com", "/path", [("key", "value")]);
/// assert!(req.starts_with("GET /path HTTP/1.1\r\nHost: example.com\r\n"));
/// assert!(req.contains(&format!("Sec-WebSocket-Key: {key}\r\n")));
/// assert!(req.ends_with("key: value\r\n\r\n"));
/// ```
pub fn request(
    host: impl AsRef<str>,
    path: impl AsRef<str>,
    headers: impl IntoIterator<Item = impl Header>,
) -> (String, String) {
    let host = host.as_ref();
    let path = path.as_ref().trim_start_matches('/');
    let sec_key = generate_key();
    let headers: String = headers.into_iter().map(|field| field.line()).collect();
    (format!("GET /{path} HTTP/1.1\r\nHost: {host}\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Version: 13\r\nSec-WebSocket-Key: {sec_key}\r\n{headers}\r\n"), sec_key)
}

fn check_version(http: &Http) -> Result<(), Error> {
    match http.get("sec-websocket-version") {
        Some(version) if version.trim() != "13" => {
            Err(Error::Handshake("unsupported Sec-WebSocket-Version"))
        }
        _ => Ok(()),
    }
}

/// Check an Upgrade request, returning its `Sec-WebSocket-Key`.
pub fn validate_request(req: &Http) -> Result<&str, Error> {
    if !req.has("upgrade", "websocket") {
        return Err(Error::Handshake("missing Upgrade header"));
    }
    let key = req
        .get("sec-websocket-key")
        .ok_or(Error::Handshake("missing Sec-WebSocket-Key header"))?;
    check_version(req)?;
    Ok(key)
}

/// Check the server's answer to a request made with `key`.
pub fn validate_response(res: &Http, key: &str) -> Result<(), Error> {
    if !res.has_token("connection", "upgrade") {
        return Err(Error::Handshake("missing Connection header"));
    }
    if !res.has("upgrade", "websocket") {
        return Err(Error::Handshake("missing Upgrade header"));
    }
    match res.get("sec-websocket-accept") {
        Some(accept) if validate_accept_response(key, accept) => {}
        _ => return Err(Error::Handshake("missing Sec-WebSocket-Accept header")),
    }
    check_version(res)
}

/// Answer an Upgrade request on `stream` and start a server side [Connection].
pub async fn accept<IO>(req: &Http, mut stream: IO, config: Config) -> Result<Connection, Error>
where
    IO: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let key = validate_request(req)?;
    let field: Option<(&str, &str)> = None;
    stream.write_all(response(key, field).as_bytes()).await?;
    stream.flush().await?;
    Ok(Connection::new(stream, Role::Server, config))
}

/// Start a client side [Connection] once the server accepted the request made with `key`.
pub fn connect<IO>(res: &Http, stream: IO, key: &str, config: Config) -> Result<Connection, Error>
where
    IO: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    validate_response(res, key)?;
    Ok(Connection::new(stream, Role::Client, config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc_sample_key() {
        assert_eq!(
            accept_key_from("dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
        assert!(validate_accept_response(
            "dGhlIHNhbXBsZSBub25jZQ==",
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        ));
        assert!(!validate_accept_response("dGhlIHNhbXBsZSBub25jZQ==", "nope"));
    }

    #[test]
    fn generated_keys_are_16_byte_nonces() {
        let key = generate_key();
        assert_eq!(STANDARD.decode(&key).unwrap().len(), NONCE_LEN);
        assert_ne!(key, generate_key());
    }

    #[test]
    fn request_validation() {
        let req = |extra: &str| {
            Http::parse(&format!("GET / HTTP/1.1\r\nHost: a\r\n{extra}\r\n")).unwrap()
        };

        let ok = req("Upgrade: websocket\r\nSec-WebSocket-Key: abc\r\nSec-WebSocket-Version: 13\r\n");
        assert_eq!(validate_request(&ok).unwrap(), "abc");

        let no_version = req("Upgrade: WebSocket\r\nSec-WebSocket-Key: abc\r\n");
        assert_eq!(validate_request(&no_version).unwrap(), "abc");

        let no_upgrade = req("Sec-WebSocket-Key: abc\r\n");
        assert!(matches!(validate_request(&no_upgrade), Err(Error::Handshake(_))));

        let no_key = req("Upgrade: websocket\r\n");
        assert!(matches!(validate_request(&no_key), Err(Error::Handshake(_))));

        let old = req("Upgrade: websocket\r\nSec-WebSocket-Key: abc\r\nSec-WebSocket-Version: 8\r\n");
        assert!(matches!(validate_request(&old), Err(Error::Handshake(_))));
    }

    #[test]
    fn response_validation() {
        let key = "dGhlIHNhbXBsZSBub25jZQ==";
        let field: Option<(&str, &str)> = None;
        let res = Http::parse(&response(key, field)).unwrap();
        assert!(validate_response(&res, key).is_ok());
        assert!(validate_response(&res, "c29tZSBvdGhlciBrZXk=").is_err());

        let mut missing = res.clone();
        missing.headers.remove("connection");
        assert!(matches!(validate_response(&missing, key), Err(Error::Handshake(_))));
    }
}
