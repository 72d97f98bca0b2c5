//! `tungstenite` Backend
//!
//! Dial and [`Conn`] over `tokio-tungstenite`. The library manages the TCP
//! and TLS connect; the frame ceiling goes in through `WebSocketConfig` and
//! deadlines are applied around each stream poll.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::{Instant, timeout_at};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::CONTENT_TYPE;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::backend::MSGPACK_CONTENT_TYPE;
use super::conn::{Conn, TransportError};
use super::context::CallContext;
use super::keepalive::{KeepaliveClock, KeepaliveTiming};

/// Stream produced by the `tungstenite` dial.
pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Build the upgrade request for `url`.
///
/// # Errors
///
/// Returns [`TransportError::InvalidUrl`] when `url` is not a `ws`/`wss`
/// URL.
pub fn handshake_request(url: &str) -> Result<Request, TransportError> {
    let mut request = url
        .into_client_request()
        .map_err(|e| TransportError::InvalidUrl(format!("{url}: {e}")))?;
    request
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(MSGPACK_CONTENT_TYPE));
    Ok(request)
}

fn websocket_config(timing: &KeepaliveTiming) -> WebSocketConfig {
    WebSocketConfig::default()
        .max_frame_size(Some(timing.max_frame_size))
        .max_message_size(Some(timing.max_frame_size))
}

/// Connect with the library-managed dial, Nagle disabled.
pub(super) async fn dial(
    url: &str,
    timing: KeepaliveTiming,
) -> Result<WsConn<MaybeTlsStream<TcpStream>>, TransportError> {
    let request = handshake_request(url)?;
    let (stream, _response) =
        tokio_tungstenite::connect_async_with_config(request, Some(websocket_config(&timing)), true)
            .await?;
    Ok(WsConn::new(stream, timing))
}

/// Connection over an established `tokio-tungstenite` stream.
pub struct WsConn<S> {
    reader: Mutex<SplitStream<WebSocketStream<S>>>,
    writer: Mutex<SplitSink<WebSocketStream<S>, Message>>,
    clock: KeepaliveClock,
    timing: KeepaliveTiming,
}

impl<S> WsConn<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Wrap a handshaken stream. The read clock starts now.
    #[must_use]
    pub fn new(stream: WebSocketStream<S>, timing: KeepaliveTiming) -> Self {
        let (writer, reader) = stream.split();
        Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            clock: KeepaliveClock::new(),
            timing,
        }
    }

    /// Write one frame within the write window.
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
impl<S> Conn for WsConn<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn close(&self) -> Result<(), TransportError> {
        let deadline = Instant::now() + self.timing.write_wait;
        let close = async {
            let mut writer = self.writer.lock().await;
            writer.close().await
        };

        match timeout_at(deadline, close).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => match TransportError::from(e) {
                TransportError::Closed => Ok(()),
                other => Err(other),
            },
            Err(_) => Err(TransportError::WriteDeadline),
        }
    }

    async fn ping(&self, ctx: &CallContext) -> Result<(), TransportError> {
        self.send(ctx, Message::Ping(Bytes::new())).await
    }

    async fn read_message(&self, ctx: &CallContext) -> Result<Bytes, TransportError> {
        let mut reader = tokio::select! {
            biased;
            () = ctx.cancelled() => return Err(TransportError::Cancelled),
            reader = self.reader.lock() => reader,
        };

        loop {
            let deadline = ctx.clamp(self.clock.read_deadline(&self.timing));
            let frame = tokio::select! {
                biased;
                () = ctx.cancelled() => return Err(TransportError::Cancelled),
                frame = timeout_at(deadline, reader.next()) => frame,
            };

            let message = match frame {
                Err(_) => return Err(TransportError::ReadDeadline),
                Ok(None) => return Err(TransportError::Closed),
                Ok(Some(Err(e))) => return Err(e.into()),
                Ok(Some(Ok(message))) => message,
            };

            // tungstenite queues the pong reply to a ping itself
            self.clock.touch();
            match message {
                Message::Binary(data) => return Ok(data),
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
                Message::Close(frame) => {
                    tracing::debug!(frame = ?frame, "Server sent close frame");
                    return Err(TransportError::Closed);
                }
                Message::Text(_) => return Err(TransportError::UnexpectedText),
            }
        }
    }

    async fn write_message(&self, ctx: &CallContext, data: Bytes) -> Result<(), TransportError> {
        self.send(ctx, Message::Binary(data)).await
    }
}
