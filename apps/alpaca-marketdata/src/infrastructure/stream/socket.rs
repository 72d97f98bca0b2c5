//! `socket` Backend
//!
//! Dials and tunes the TCP socket itself, then runs the handshake with
//! `tokio-websockets`. The receive buffer is sized before connecting so the
//! kernel can advertise a large window from the first segment. Sizes are
//! tried from largest to smallest; the first one the kernel accepts wins.
//!
//! `tokio-websockets` answers pings on its own and enforces the frame
//! ceiling through its payload limit. Both frame kinds are still yielded
//! here, so every inbound frame moves the read deadline.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use http::header::CONTENT_TYPE;
use http::{HeaderValue, Uri};
use tokio::net::{TcpSocket, TcpStream, lookup_host};
use tokio::sync::Mutex;
use tokio::time::{Instant, timeout_at};
use tokio_websockets::{ClientBuilder, Connector, Limits, MaybeTlsStream, Message, WebSocketStream};

use super::backend::MSGPACK_CONTENT_TYPE;
use super::conn::{Conn, TransportError};
use super::context::CallContext;
use super::keepalive::{KeepaliveClock, KeepaliveTiming};

/// Receive buffer sizes to try, in KiB.
pub const RECV_BUFFER_LADDER_KIB: [u32; 6] = [16384, 8192, 4092, 2048, 1024, 512];

type SocketStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Where a `ws`/`wss` URL points.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Target {
    uri: Uri,
    host: String,
    port: u16,
    secure: bool,
}

impl Target {
    fn parse(url: &str) -> Result<Self, TransportError> {
        let uri: Uri = url
            .parse()
            .map_err(|e| TransportError::InvalidUrl(format!("{url}: {e}")))?;
        let secure = match uri.scheme_str() {
            Some("wss") => true,
            Some("ws") => false,
            other => {
                return Err(TransportError::InvalidUrl(format!(
                    "unsupported scheme {other:?} in {url}"
                )));
            }
        };
        let host = uri
            .host()
            .map(|host| host.trim_start_matches('[').trim_end_matches(']').to_string())
            .ok_or_else(|| TransportError::InvalidUrl(format!("missing host in {url}")))?;
        let port = uri.port_u16().unwrap_or(if secure { 443 } else { 80 });

        Ok(Self {
            uri,
            host,
            port,
            secure,
        })
    }
}

/// Dial the tuned TCP connection for `url` and run the handshake over it
/// (TLS for `wss`).
pub(super) async fn dial(url: &str, timing: KeepaliveTiming) -> Result<SocketConn, TransportError> {
    let target = Target::parse(url)?;
    let tcp = connect_tuned(&target.host, target.port).await?;

    let connector = if target.secure {
        Connector::new()?
    } else {
        Connector::Plain
    };
    let transport = connector.wrap(&target.host, tcp).await?;

    let (stream, _response) = ClientBuilder::from_uri(target.uri)
        .add_header(CONTENT_TYPE, HeaderValue::from_static(MSGPACK_CONTENT_TYPE))?
        .limits(Limits::default().max_payload_len(Some(timing.max_frame_size)))
        .connect_on(transport)
        .await?;

    Ok(SocketConn::new(stream, timing))
}

/// Connect to the first reachable address for `host:port` with a tuned
/// receive buffer and Nagle disabled.
async fn connect_tuned(host: &str, port: u16) -> Result<TcpStream, TransportError> {
    let mut last_error = None;

    for addr in lookup_host((host, port)).await? {
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        let recv_buffer = tune_recv_buffer(&socket);

        match socket.connect(addr).await {
            Ok(stream) => {
                stream.set_nodelay(true)?;
                tracing::debug!(%addr, recv_buffer = ?recv_buffer, "Socket connected");
                return Ok(stream);
            }
            Err(e) => {
                tracing::debug!(%addr, error = %e, "Socket connect failed");
                last_error = Some(e);
            }
        }
    }

    Err(last_error.map_or_else(
        || TransportError::InvalidUrl(format!("no addresses for {host}:{port}")),
        TransportError::Io,
    ))
}

/// Apply the largest accepted receive buffer size, returning it in bytes.
pub fn tune_recv_buffer(socket: &TcpSocket) -> Option<u32> {
    RECV_BUFFER_LADDER_KIB
        .iter()
        .map(|kib| kib * 1024)
        .find(|&size| socket.set_recv_buffer_size(size).is_ok())
}

// =============================================================================
// Connection
// =============================================================================

/// Connection over an established `tokio-websockets` stream.
pub struct SocketConn {
    reader: Mutex<SplitStream<SocketStream>>,
    writer: Mutex<SplitSink<SocketStream, Message>>,
    clock: KeepaliveClock,
    timing: KeepaliveTiming,
}

impl SocketConn {
    fn new(stream: SocketStream, timing: KeepaliveTiming) -> Self {
        let (writer, reader) = stream.split();
        Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            clock: KeepaliveClock::new(),
            timing,
        }
    }

    async fn send(&self, ctx: &CallContext, message: Message) -> Result<(), TransportError> {
        let deadline = ctx.clamp(Instant::now() + self.timing.write_wait);
        let write = async {
            let mut writer = self.writer.lock().await;
            writer.send(message).await
        };

        tokio::select! {
            biased;
            () = ctx.cancelled() => Err(TransportError::Cancelled),
            result = timeout_at(deadline, write) => match result {
                Ok(sent) => sent.map_err(TransportError::from),
                Err(_) => Err(TransportError::WriteDeadline),
            },
        }
    }
}

#[async_trait]
impl Conn for SocketConn {
    async fn close(&self) -> Result<(), TransportError> {
        let deadline = Instant::now() + self.timing.write_wait;
        let close = async {
            let mut writer = self.writer.lock().await;
            writer.close().await
        };

        match timeout_at(deadline, close).await {
            Err(_) => Err(TransportError::WriteDeadline),
            Ok(result) => match result.map_err(TransportError::from) {
                Ok(()) | Err(TransportError::Closed) => Ok(()),
                Err(other) => Err(other),
            },
        }
    }

    async fn ping(&self, ctx: &CallContext) -> Result<(), TransportError> {
        self.send(ctx, Message::ping(Bytes::new())).await
    }

    async fn read_message(&self, ctx: &CallContext) -> Result<Bytes, TransportError> {
        let mut reader = tokio::select! {
            biased;
            () = ctx.cancelled() => return Err(TransportError::Cancelled),
            reader = self.reader.lock() => reader,
        };

        loop {
            let deadline = ctx.clamp(self.clock.read_deadline(&self.timing));
            let next = tokio::select! {
                biased;
                () = ctx.cancelled() => return Err(TransportError::Cancelled),
                next = timeout_at(deadline, reader.next()) => {
                    next.map_err(|_| TransportError::ReadDeadline)?
                }
            };
            let message = next.ok_or(TransportError::Closed)??;

            self.clock.touch();
            if message.is_binary() {
                return Ok(Bytes::copy_from_slice(message.as_payload()));
            }
            if message.is_text() {
                return Err(TransportError::UnexpectedText);
            }
            if message.is_close() {
                tracing::debug!("Server sent close frame");
                return Err(TransportError::Closed);
            }
        }
    }

    async fn write_message(&self, ctx: &CallContext, data: Bytes) -> Result<(), TransportError> {
        self.send(ctx, Message::binary(data)).await
    }
}
