use crate::{
    errors::is_benign, CloseCode, CloseCodeClass, CloseFrame, DecodeError, Decoder, EncodeError,
    Encoder, Error, Message, Opcode, Payload, Role, MAX_FRAME_PAYLOAD,
};
use bytes::{Bytes, BytesMut};
use std::{
    io,
    sync::atomic::{AtomicU64, Ordering},
};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    sync::{mpsc, oneshot},
};
use tracing::Instrument;

/// Tunables of a [Connection].
#[derive(Debug, Clone)]
pub struct Config {
    /// Answer every `Ping` with a `Pong` carrying the same payload.
    ///
    /// Default: `true`
    pub auto_pong: bool,

    /// Maximum allowed payload length in bytes.
    ///
    /// Default: `u32::MAX`
    pub max_payload_len: usize,

    /// How many received events may wait for [Connection::recv] before the
    /// connection stops reading from the stream.
    ///
    /// Default: `16`
    pub event_capacity: usize,

    /// Queue size for outgoing requests (`send`, `end`, ...).
    ///
    /// Default: `16`
    pub command_capacity: usize,

    /// Size of the buffer each stream read goes into.
    ///
    /// Default: 8 KB
    pub read_buffer_size: usize,

    /// Fixed masking key for outgoing frames, instead of a random one per frame.
    pub mask_key: Option<[u8; 4]>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            auto_pong: true,
            max_payload_len: MAX_FRAME_PAYLOAD as usize,
            event_capacity: 16,
            command_capacity: 16,
            read_buffer_size: 8 * 1024,
            mask_key: None,
        }
    }
}

impl Config {
    pub fn auto_pong(mut self, enabled: bool) -> Self {
        self.auto_pong = enabled;
        self
    }

    pub fn max_payload_len(mut self, len: usize) -> Self {
        self.max_payload_len = len;
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    pub fn command_capacity(mut self, capacity: usize) -> Self {
        self.command_capacity = capacity.max(1);
        self
    }

    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.max(1);
        self
    }

    pub fn mask_key(mut self, key: [u8; 4]) -> Self {
        self.mask_key = Some(key);
        self
    }
}

/// Everything a [Connection] reports, in arrival order.
#[derive(Debug)]
pub enum Event {
    Text(String),
    Binary(Bytes),
    Ping(Bytes),
    Pong(Bytes),
    /// The stream ended (or failed) before the peer sent a `Close` frame.
    ConnectionReset,
    /// A fatal failure. Always followed by [Event::End].
    Error(Error),
    /// Last event of every connection, carrying the last known close status.
    End {
        code: Option<u16>,
        reason: Option<String>,
    },
}

type Reply = oneshot::Sender<Result<(), Error>>;

#[derive(Debug)]
enum Command {
    Send {
        msg: Message,
        reply: Reply,
    },
    Frame {
        opcode: Opcode,
        payload: Bytes,
        reply: Reply,
    },
    End {
        reason: Option<String>,
        reply: Reply,
    },
}

/// Cloneable write half of a [Connection].
#[derive(Debug, Clone)]
pub struct Sender {
    commands: mpsc::Sender<Command>,
}

impl Sender {
    async fn request(&self, make: impl FnOnce(Reply) -> Command) -> Result<(), Error> {
        let (reply, result) = oneshot::channel();
        self.commands
            .send(make(reply))
            .await
            .map_err(|_| Error::Closed)?;
        result.await.map_err(|_| Error::Closed)?
    }

    async fn send_message(&self, msg: Message) -> Result<(), Error> {
        self.request(|reply| Command::Send { msg, reply }).await
    }

    /// Send a `Text` frame for strings, a `Binary` frame for bytes.
    ///
    /// ### Example
    ///
    /// ```no_run
    /// # async fn run(ws: web_socket_wire::Connection) -> Result<(), web_socket_wire::Error> {
    /// ws.send("Text Message").await?;
    /// ws.send(b"Binary Data").await?;
    /// # Ok(()) }
    /// ```
    pub async fn send(&self, payload: impl Into<Payload>) -> Result<(), Error> {
        self.send_message(payload.into().into()).await
    }

    pub async fn ping(&self, data: impl Into<Bytes>) -> Result<(), Error> {
        self.send_message(Message::Ping(data.into())).await
    }

    pub async fn pong(&self, data: impl Into<Bytes>) -> Result<(), Error> {
        self.send_message(Message::Pong(data.into())).await
    }

    /// Send one frame with an already serialized payload.
    ///
    /// The payload must fit `opcode`: UTF-8 for `Text`, nothing or a status
    /// code (plus reason) for `Close`. A `Close` sent this way counts as ours,
    /// later sends fail with [Error::Closed].
    pub async fn send_frame(&self, opcode: Opcode, payload: impl Into<Bytes>) -> Result<(), Error> {
        let payload = payload.into();
        self.request(|reply| Command::Frame {
            opcode,
            payload,
            reply,
        })
        .await
    }

    /// Start the close handshake with status `1000` and an optional reason.
    ///
    /// Only the first call writes a `Close` frame; later calls, and calls
    /// after the connection ended, do nothing.
    pub async fn end(&self, reason: Option<&str>) -> Result<(), Error> {
        let reason = reason.map(str::to_owned);
        match self.request(|reply| Command::End { reason, reply }).await {
            Err(Error::Closed) => Ok(()),
            result => result,
        }
    }
}

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// A WebSocket session over an already upgraded stream.
///
/// The stream is owned by a background task which decodes frames, runs the
/// close handshake and reports [Event]s through [Self::recv]. Writes go through
/// the same task, so they are never interleaved with automatic replies.
///
/// Dropping the connection tears the stream down, like [Self::destroy].
///
/// ### Example
///
/// ```no_run
/// use web_socket_wire::{Config, Connection, Event, Role};
/// # async fn run(stream: tokio::net::TcpStream) -> Result<(), web_socket_wire::Error> {
///
/// let mut ws = Connection::new(stream, Role::Server, Config::default());
/// while let Some(event) = ws.recv().await {
///     match event {
///         Event::Text(text) => ws.send(text).await?,
///         Event::Binary(data) => ws.send(data).await?,
///         Event::End { code, reason } => println!("closed: {code:?} {reason:?}"),
///         _ => {}
///     }
/// }
/// # Ok(()) }
/// ```
#[derive(Debug)]
pub struct Connection {
    id: u64,
    sender: Sender,
    events: mpsc::Receiver<Event>,
    kill: Option<oneshot::Sender<()>>,
}

impl Connection {
    /// Start driving `stream`. Must be called from within a tokio runtime.
    pub fn new<IO>(stream: IO, role: Role, config: Config) -> Self
    where
        IO: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        let (commands_tx, commands) = mpsc::channel(config.command_capacity.max(1));
        let (events, events_rx) = mpsc::channel(config.event_capacity.max(1));
        let (kill_tx, kill) = oneshot::channel();

        let mut encoder = Encoder::new(role);
        if let Some(key) = config.mask_key {
            encoder = encoder.with_mask_key(key);
        }
        let driver = Driver {
            stream,
            decoder: Decoder::new(role).with_max_payload_len(config.max_payload_len),
            encoder,
            state: State::default(),
            auto_pong: config.auto_pong,
            scratch: vec![0; config.read_buffer_size.max(1)].into_boxed_slice(),
            pending: None,
            close_code: None,
            close_reason: None,
            events,
            commands,
            kill,
        };
        tokio::spawn(driver.run().instrument(tracing::debug_span!("ws", id, %role)));

        Self {
            id,
            sender: Sender {
                commands: commands_tx,
            },
            events: events_rx,
            kill: Some(kill_tx),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next event, `None` once [Event::End] has been delivered.
    ///
    /// Events are buffered up to [Config::event_capacity]; past that the
    /// connection stops reading until this is called again.
    pub async fn recv(&mut self) -> Option<Event> {
        self.events.recv().await
    }

    pub fn sender(&self) -> Sender {
        self.sender.clone()
    }

    /// Tear the stream down right away, without a close handshake, even in
    /// the middle of a write the peer is not reading.
    /// [Event::End] is still delivered, exactly once.
    pub fn destroy(&mut self) {
        if let Some(kill) = self.kill.take() {
            let _ = kill.send(());
        }
    }

    /// Relay every message received here to `to`, framed again for its role,
    /// and end `to` once this connection ends.
    pub async fn forward(mut self, to: Sender) -> Result<(), Error> {
        while let Some(event) = self.recv().await {
            match event {
                Event::Text(text) => to.send_frame(Opcode::Text, text).await?,
                Event::Binary(data) => to.send_frame(Opcode::Binary, data).await?,
                Event::Ping(data) => to.send_frame(Opcode::Ping, data).await?,
                Event::Pong(data) => to.send_frame(Opcode::Pong, data).await?,
                Event::End { reason, .. } => to.end(reason.as_deref()).await?,
                Event::ConnectionReset | Event::Error(_) => {}
            }
        }
        Ok(())
    }
}

impl std::ops::Deref for Connection {
    type Target = Sender;

    fn deref(&self) -> &Self::Target {
        &self.sender
    }
}

/// Every flag only ever goes from `false` to `true`.
#[derive(Debug, Default)]
struct State {
    close_written: bool,
    close_received: bool,
    end_emitted: bool,
    /// `kill` resolved; it must not be polled again.
    killed: bool,
}

/// Why the driver stopped.
#[derive(Debug)]
enum Exit {
    /// Both `Close` frames were exchanged.
    Closed,
    /// The stream reached EOF.
    Eof,
    Io(io::Error),
    Protocol(DecodeError),
    /// `destroy()`, or nobody is listening anymore.
    Destroyed,
}

/// Outcome of one wait in [Driver::drive].
enum Step {
    Continue,
    Command(Command),
    Exit(Exit),
}

struct Driver<IO> {
    stream: IO,
    decoder: Decoder,
    encoder: Encoder,
    state: State,
    auto_pong: bool,
    scratch: Box<[u8]>,
    /// Event waiting for room in the queue.
    pending: Option<Event>,
    close_code: Option<u16>,
    close_reason: Option<String>,
    events: mpsc::Sender<Event>,
    commands: mpsc::Receiver<Command>,
    kill: oneshot::Receiver<()>,
}

impl<IO> Driver<IO>
where
    IO: AsyncRead + AsyncWrite + Unpin,
{
    async fn run(mut self) {
        let exit = self.drive().await;
        self.finish(exit).await;
    }

    async fn drive(&mut self) -> Exit {
        loop {
            if self.state.killed {
                return Exit::Destroyed;
            }
            let step = if self.pending.is_some() {
                self.deliver().await
            } else {
                match self.decoder.try_read_frame() {
                    Ok(Some(msg)) => match self.dispatch(msg).await {
                        Some(exit) => Step::Exit(exit),
                        None => Step::Continue,
                    },
                    Ok(None) => self.read().await,
                    Err(err) => Step::Exit(Exit::Protocol(err)),
                }
            };
            match step {
                Step::Continue => {}
                Step::Command(cmd) => {
                    if let Some(exit) = self.command(cmd).await {
                        return exit;
                    }
                }
                Step::Exit(exit) => return exit,
            }
        }
    }

    /// Wait for room in the event queue. Commands are still served meanwhile.
    async fn deliver(&mut self) -> Step {
        tokio::select! {
            biased;
            _ = &mut self.kill => {
                self.state.killed = true;
                Step::Exit(Exit::Destroyed)
            }
            permit = self.events.reserve() => match permit {
                Ok(permit) => {
                    if let Some(event) = self.pending.take() {
                        permit.send(event);
                    }
                    Step::Continue
                }
                Err(_) => Step::Exit(Exit::Destroyed),
            },
            Some(cmd) = self.commands.recv() => Step::Command(cmd),
        }
    }

    async fn read(&mut self) -> Step {
        tokio::select! {
            biased;
            _ = &mut self.kill => {
                self.state.killed = true;
                Step::Exit(Exit::Destroyed)
            }
            Some(cmd) = self.commands.recv() => Step::Command(cmd),
            read = self.stream.read(&mut self.scratch) => match read {
                Ok(0) => Step::Exit(Exit::Eof),
                Ok(amt) => {
                    self.decoder.ingest(&self.scratch[..amt]);
                    Step::Continue
                }
                Err(err) => Step::Exit(Exit::Io(err)),
            },
            _ = self.events.closed() => Step::Exit(Exit::Destroyed),
        }
    }

    async fn dispatch(&mut self, msg: Message) -> Option<Exit> {
        let event = match msg {
            Message::Text(text) => Event::Text(text),
            Message::Binary(data) => Event::Binary(data),
            Message::Pong(data) => Event::Pong(data),
            Message::Ping(data) => {
                if self.auto_pong && !self.state.close_written {
                    match self.encoder.encode(&Message::Pong(data.clone())) {
                        Ok(bytes) => {
                            if let Err(exit) = self.write_bytes(&bytes).await {
                                return Some(exit);
                            }
                        }
                        Err(err) => tracing::debug!("pong not sent: {err}"),
                    }
                }
                Event::Ping(data)
            }
            Message::Close(frame) => return Some(self.on_close(frame).await),
        };
        self.pending = Some(event);
        None
    }

    /// If an endpoint receives a Close frame and did not previously send a
    /// Close frame, the endpoint MUST send a Close frame in response. After
    /// both sending and receiving a Close message, the endpoint closes the
    /// underlying stream.
    async fn on_close(&mut self, frame: CloseFrame) -> Exit {
        tracing::debug!(code = ?frame.code, reason = ?frame.reason, "close received");
        self.state.close_received = true;
        self.close_code = frame.code;
        self.close_reason = frame.reason;

        if !self.state.close_written {
            // Echo the status code, unless it may never appear on the wire.
            let echo = match frame.code {
                None => CloseFrame::empty(),
                Some(code) if CloseCodeClass::may_be_sent(code) => CloseFrame::new(code, None),
                Some(code) => {
                    tracing::warn!(code, "peer sent a status code not allowed on the wire");
                    CloseCode::ProtocolError.into()
                }
            };
            match self.close_frame(echo) {
                Ok(bytes) => {
                    if let Err(exit) = self.write_bytes(&bytes).await {
                        tracing::debug!("close echo not written: {exit:?}");
                    }
                }
                Err(err) => tracing::debug!("close echo not encoded: {err}"),
            }
        }
        self.shutdown().await;
        Exit::Closed
    }

    async fn command(&mut self, cmd: Command) -> Option<Exit> {
        match cmd {
            Command::Send { msg, reply } => {
                if self.state.close_written {
                    let _ = reply.send(Err(Error::Closed));
                    return None;
                }
                match self.encoder.encode(&msg) {
                    Ok(bytes) => {
                        tracing::trace!(opcode = %msg.opcode(), len = bytes.len(), "write");
                        settle(reply, self.write_bytes(&bytes).await)
                    }
                    Err(err) => reject(reply, err),
                }
            }
            Command::Frame {
                opcode,
                payload,
                reply,
            } => {
                if self.state.close_written {
                    let _ = reply.send(Err(Error::Closed));
                    return None;
                }
                let mut bytes = BytesMut::new();
                if let Err(err) = self.encoder.encode_raw(opcode, &payload, &mut bytes) {
                    return reject(reply, err);
                }
                if opcode == Opcode::Close {
                    let code = payload.get(..2).map(|code| u16::from_be_bytes([code[0], code[1]]));
                    let reason = payload
                        .get(2..)
                        .and_then(|reason| std::str::from_utf8(reason).ok())
                        .filter(|reason| !reason.is_empty())
                        .map(str::to_owned);
                    self.mark_close_written(code, reason);
                }
                tracing::trace!(%opcode, len = bytes.len(), "write");
                settle(reply, self.write_bytes(&bytes).await)
            }
            Command::End { reason, reply } => {
                if self.state.close_written {
                    let _ = reply.send(Ok(()));
                    return None;
                }
                match self.close_frame(CloseFrame::new(CloseCode::Normal, reason)) {
                    Ok(bytes) => settle(reply, self.write_bytes(&bytes).await),
                    Err(err) => reject(reply, err),
                }
            }
        }
    }

    /// Write and flush `bytes`, unless `destroy()` comes first.
    async fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), Exit> {
        if self.state.killed {
            return Err(Exit::Destroyed);
        }
        let stream = &mut self.stream;
        let write = async move {
            stream.write_all(bytes).await?;
            stream.flush().await
        };
        tokio::select! {
            biased;
            _ = &mut self.kill => {
                self.state.killed = true;
                Err(Exit::Destroyed)
            }
            written = write => written.map_err(Exit::Io),
        }
    }

    async fn shutdown(&mut self) {
        if self.state.killed {
            return;
        }
        tokio::select! {
            biased;
            _ = &mut self.kill => self.state.killed = true,
            _ = self.stream.shutdown() => {}
        }
    }

    /// Encode our `Close` frame. At most one is written per connection.
    fn close_frame(&mut self, frame: CloseFrame) -> Result<BytesMut, EncodeError> {
        let bytes = self.encoder.encode(&Message::Close(frame.clone()))?;
        self.mark_close_written(frame.code, frame.reason);
        Ok(bytes)
    }

    fn mark_close_written(&mut self, code: Option<u16>, reason: Option<String>) {
        self.state.close_written = true;
        if !self.state.close_received {
            self.close_code = code;
            self.close_reason = reason;
        }
        tracing::debug!(?code, "close written");
    }

    async fn finish(&mut self, exit: Exit) {
        // Refuse new requests, and fail the queued ones.
        self.commands.close();
        while let Ok(cmd) = self.commands.try_recv() {
            let (Command::Send { reply, .. }
            | Command::Frame { reply, .. }
            | Command::End { reply, .. }) = cmd;
            let _ = reply.send(Err(Error::Closed));
        }

        let mut failure = None;
        let mut reset = false;
        match exit {
            Exit::Closed => {}
            Exit::Destroyed => tracing::debug!("destroyed"),
            Exit::Eof => {
                failure = self.decoder.finish().err().map(Error::from);
                reset = !self.state.close_received;
            }
            Exit::Io(err) if is_benign(&err) => {
                tracing::debug!("stream ended abruptly: {err}");
                reset = !self.state.close_received;
            }
            Exit::Io(err) => {
                tracing::warn!("stream failed: {err}");
                failure = Some(Error::Io(err));
                reset = !self.state.close_received;
            }
            Exit::Protocol(err) => {
                tracing::warn!("protocol error: {err}");
                if !self.state.close_written {
                    match self.close_frame(CloseFrame::new(err.close_code(), None)) {
                        Ok(bytes) => {
                            if let Err(exit) = self.write_bytes(&bytes).await {
                                tracing::debug!("close after protocol error not written: {exit:?}");
                            }
                        }
                        Err(encode_err) => tracing::debug!("close not encoded: {encode_err}"),
                    }
                }
                failure = Some(Error::Decode(err));
            }
        }
        self.shutdown().await;

        if let Some(event) = self.pending.take() {
            self.emit(event).await;
        }
        if let Some(err) = failure {
            self.emit(Event::Error(err)).await;
        }
        if reset {
            self.emit(Event::ConnectionReset).await;
        }
        if !self.state.end_emitted {
            self.state.end_emitted = true;
            let code = self.close_code;
            let reason = self.close_reason.take();
            tracing::debug!(?code, "end");
            self.emit(Event::End { code, reason }).await;
        }
    }

    async fn emit(&mut self, event: Event) {
        // The receiver may be gone already, nothing left to tell then.
        let _ = self.events.send(event).await;
    }
}

/// Hand the outcome of a write back. A failed write also ends the connection.
fn settle(reply: Reply, written: Result<(), Exit>) -> Option<Exit> {
    match written {
        Ok(()) => {
            let _ = reply.send(Ok(()));
            None
        }
        Err(Exit::Io(err)) => {
            let _ = reply.send(Err(Error::Io(io::Error::from(err.kind()))));
            Some(Exit::Io(err))
        }
        Err(exit) => {
            let _ = reply.send(Err(Error::Closed));
            Some(exit)
        }
    }
}

/// The message was refused before anything was written; the connection goes on.
fn reject(reply: Reply, err: EncodeError) -> Option<Exit> {
    let _ = reply.send(Err(err.into()));
    None
}
