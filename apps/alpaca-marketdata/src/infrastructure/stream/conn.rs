//! Transport Capability
//!
//! The four operations every streaming backend exposes, and the errors they
//! surface. Handles are shared as `Arc<dyn Conn>`: one receive loop calls
//! [`Conn::read_message`] while a timer-driven task calls [`Conn::ping`] or
//! [`Conn::write_message`].

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio_tungstenite::tungstenite;

use super::backend::Backend;
use super::context::CallContext;

/// Errors surfaced by transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Backend identifier outside the supported set.
    #[error("invalid websocket backend: {0:?}")]
    InvalidBackend(String),

    /// The selected backend has no implementation.
    #[error("websocket backend {0} is not implemented")]
    NotImplemented(Backend),

    /// Stream URL could not be used for a handshake.
    #[error("invalid stream url: {0}")]
    InvalidUrl(String),

    /// Socket-level failure while dialing.
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),

    /// The handshake did not finish in time.
    #[error("websocket dial timed out after {0:?}")]
    DialTimeout(Duration),

    /// No inbound traffic within the read window.
    #[error("read deadline exceeded")]
    ReadDeadline,

    /// An outbound frame could not be written within the write window.
    #[error("write deadline exceeded")]
    WriteDeadline,

    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,

    /// The peer closed the connection.
    #[error("connection closed")]
    Closed,

    /// A text frame arrived on a binary-only stream.
    #[error("unexpected text frame")]
    UnexpectedText,

    /// An inbound frame exceeded the frame ceiling.
    #[error("inbound frame exceeds the frame size limit")]
    FrameTooLarge,

    /// Any other failure reported by `tokio-tungstenite`.
    #[error("websocket error: {0}")]
    WebSocket(#[source] tungstenite::Error),

    /// Any other failure reported by `tokio-websockets`.
    #[error("websocket protocol error: {0}")]
    Protocol(#[source] tokio_websockets::Error),
}

impl From<tungstenite::Error> for TransportError {
    fn from(err: tungstenite::Error) -> Self {
        match err {
            tungstenite::Error::Capacity(_) => Self::FrameTooLarge,
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                Self::Closed
            }
            tungstenite::Error::Io(io) => Self::Io(io),
            other => Self::WebSocket(other),
        }
    }
}

impl From<tokio_websockets::Error> for TransportError {
    fn from(err: tokio_websockets::Error) -> Self {
        match err {
            tokio_websockets::Error::PayloadTooLong { .. } => Self::FrameTooLarge,
            tokio_websockets::Error::AlreadyClosed => Self::Closed,
            tokio_websockets::Error::Io(io) => Self::Io(io),
            other => Self::Protocol(other),
        }
    }
}

impl TransportError {
    /// Whether the error is a configuration error, raised before any I/O.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::InvalidBackend(_) | Self::InvalidUrl(_))
    }

    /// Whether the error came from a keepalive or caller deadline.
    #[must_use]
    pub const fn is_deadline(&self) -> bool {
        matches!(
            self,
            Self::ReadDeadline | Self::WriteDeadline | Self::DialTimeout(_)
        )
    }

    /// Short label used for metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidBackend(_) => "invalid_backend",
            Self::NotImplemented(_) => "not_implemented",
            Self::InvalidUrl(_) => "invalid_url",
            Self::Io(_) => "io",
            Self::DialTimeout(_) => "dial_timeout",
            Self::ReadDeadline => "read_deadline",
            Self::WriteDeadline => "write_deadline",
            Self::Cancelled => "cancelled",
            Self::Closed => "closed",
            Self::UnexpectedText => "unexpected_text",
            Self::FrameTooLarge => "frame_too_large",
            Self::WebSocket(_) => "websocket",
            Self::Protocol(_) => "protocol",
        }
    }
}

/// A live streaming connection.
///
/// Single-reader/single-writer: one task may read while another writes, but
/// concurrent readers (or concurrent writers) are serialised.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Conn: Send + Sync {
    /// Send a close frame and shut the connection down.
    async fn close(&self) -> Result<(), TransportError>;

    /// Send a ping frame. Does not wait for the pong.
    async fn ping(&self, ctx: &CallContext) -> Result<(), TransportError>;

    /// Block until one full binary message arrives.
    ///
    /// Ping and pong frames are consumed internally and reset the read
    /// deadline.
    async fn read_message(&self, ctx: &CallContext) -> Result<Bytes, TransportError>;

    /// Write one binary message.
    async fn write_message(&self, ctx: &CallContext, data: Bytes) -> Result<(), TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_tungstenite::tungstenite::error::CapacityError;

    #[test]
    fn capacity_error_is_frame_too_large() {
        let err = TransportError::from(tungstenite::Error::Capacity(
            CapacityError::MessageTooLong {
                size: 2048,
                max_size: 1024,
            },
        ));
        assert!(matches!(err, TransportError::FrameTooLarge));
    }

    #[test]
    fn closed_errors_collapse() {
        assert!(matches!(
            TransportError::from(tungstenite::Error::ConnectionClosed),
            TransportError::Closed
        ));
        assert!(matches!(
            TransportError::from(tungstenite::Error::AlreadyClosed),
            TransportError::Closed
        ));
    }

    #[test]
    fn payload_limit_is_frame_too_large() {
        let err = TransportError::from(tokio_websockets::Error::PayloadTooLong {
            len: 2048,
            max_len: 1024,
        });
        assert!(matches!(err, TransportError::FrameTooLarge));
        assert!(matches!(
            TransportError::from(tokio_websockets::Error::AlreadyClosed),
            TransportError::Closed
        ));
    }

    #[test]
    fn classification() {
        assert!(TransportError::InvalidBackend("x".into()).is_config());
        assert!(!TransportError::NotImplemented(Backend::FastWebSockets).is_config());
        assert!(TransportError::ReadDeadline.is_deadline());
        assert_eq!(TransportError::WriteDeadline.kind(), "write_deadline");
    }
}
