//! Backend Selection
//!
//! The closed set of streaming backends, identifier resolution, and the
//! dial wrapper every backend shares (dial timeout, cancellation).
//!
//! | Identifier       | Library              | Dial                                  |
//! |------------------|----------------------|---------------------------------------|
//! | `tungstenite`    | `tokio-tungstenite`  | library-managed connect, Nagle off    |
//! | `socket`         | `tokio-websockets`   | self-dialed TCP, receive-buffer tuned |
//! | `fastwebsockets` | none                 | not implemented                       |

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, timeout_at};

use super::conn::{Conn, TransportError};
use super::context::CallContext;
use super::keepalive::{KEEPALIVE, KeepaliveTiming};
use super::{socket, ws};

/// Upper bound on a websocket dial, independent of the caller deadline.
pub const DIAL_TIMEOUT: Duration = Duration::from_secs(3);

/// Content type declared on the upgrade request.
pub const MSGPACK_CONTENT_TYPE: &str = "application/msgpack";

/// Streaming backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Backend {
    /// `tokio-tungstenite` manages the TCP and TLS dial.
    #[default]
    Tungstenite,
    /// The TCP socket is dialed and tuned here, then handed to the
    /// `tokio-websockets` handshake.
    Socket,
    /// Reserved; every dial fails with [`TransportError::NotImplemented`].
    FastWebSockets,
}

impl Backend {
    /// Every backend, in identifier order.
    pub const ALL: [Self; 3] = [Self::Tungstenite, Self::Socket, Self::FastWebSockets];

    /// Identifier used in configuration.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tungstenite => "tungstenite",
            Self::Socket => "socket",
            Self::FastWebSockets => "fastwebsockets",
        }
    }

    /// Whether dialing this backend can succeed.
    #[must_use]
    pub const fn is_implemented(self) -> bool {
        !matches!(self, Self::FastWebSockets)
    }

    /// Dial `url` with the process-wide keepalive timing.
    ///
    /// # Errors
    ///
    /// See [`Backend::dial_with`].
    pub async fn dial(self, ctx: &CallContext, url: &str) -> Result<Arc<dyn Conn>, TransportError> {
        self.dial_with(ctx, url, KEEPALIVE).await
    }

    /// Dial `url` with explicit keepalive timing.
    ///
    /// The handshake declares [`MSGPACK_CONTENT_TYPE`] and applies
    /// `timing.max_frame_size` as the inbound ceiling. The dial gives up
    /// after [`DIAL_TIMEOUT`] or the caller deadline, whichever is earlier.
    ///
    /// # Errors
    ///
    /// - [`TransportError::NotImplemented`] immediately for an unimplemented
    ///   backend
    /// - [`TransportError::InvalidUrl`] for a URL that cannot be upgraded
    /// - [`TransportError::DialTimeout`] carrying the bound that expired, or
    ///   [`TransportError::Cancelled`]
    /// - socket and handshake failures
    pub async fn dial_with(
        self,
        ctx: &CallContext,
        url: &str,
        timing: KeepaliveTiming,
    ) -> Result<Arc<dyn Conn>, TransportError> {
        if !self.is_implemented() {
            return Err(TransportError::NotImplemented(self));
        }

        let started = Instant::now();
        let deadline = ctx.clamp(started + DIAL_TIMEOUT);

        let handshake = async {
            let conn: Arc<dyn Conn> = match self {
                Self::Tungstenite => Arc::new(ws::dial(url, timing).await?),
                Self::Socket => Arc::new(socket::dial(url, timing).await?),
                Self::FastWebSockets => return Err(TransportError::NotImplemented(self)),
            };
            Ok::<_, TransportError>(conn)
        };

        let conn = tokio::select! {
            biased;
            () = ctx.cancelled() => return Err(TransportError::Cancelled),
            result = timeout_at(deadline, handshake) => result.map_err(|_| {
                TransportError::DialTimeout(deadline.saturating_duration_since(started))
            })??,
        };

        tracing::info!(backend = %self, url, "Stream connected");
        Ok(conn)
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|backend| backend.as_str() == s)
            .ok_or_else(|| TransportError::InvalidBackend(s.to_string()))
    }
}

/// Resolve a backend identifier.
///
/// # Errors
///
/// Returns [`TransportError::InvalidBackend`] for identifiers outside the
/// supported set.
pub fn resolve_backend(id: &str) -> Result<Backend, TransportError> {
    id.parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("tungstenite" => Backend::Tungstenite; "managed dial")]
    #[test_case("socket" => Backend::Socket; "tuned socket")]
    #[test_case("fastwebsockets" => Backend::FastWebSockets; "unimplemented")]
    fn resolves_known_identifiers(id: &str) -> Backend {
        resolve_backend(id).unwrap()
    }

    #[test]
    fn rejects_unknown_identifier() {
        let err = resolve_backend("unknown-x").unwrap_err();
        assert!(matches!(err, TransportError::InvalidBackend(ref id) if id == "unknown-x"));
        assert!(err.is_config());
    }

    #[test]
    fn identifiers_round_trip_through_display() {
        for backend in Backend::ALL {
            assert_eq!(backend.to_string().parse::<Backend>().unwrap(), backend);
        }
    }

    #[test_case(Backend::Tungstenite; "managed dial")]
    #[test_case(Backend::Socket; "tuned socket")]
    #[tokio::test]
    async fn invalid_url_is_config_error(backend: Backend) {
        let Err(err) = backend.dial(&CallContext::new(), "not a url").await else {
            panic!("dial must fail");
        };
        assert!(err.is_config());
    }

    #[tokio::test]
    async fn unimplemented_backend_fails_without_dialing() {
        let ctx = CallContext::new();
        let result = tokio::time::timeout(
            Duration::from_millis(100),
            Backend::FastWebSockets.dial(&ctx, "ws://192.0.2.1:9/never"),
        )
        .await
        .expect("must not hang");

        assert!(matches!(
            result,
            Err(TransportError::NotImplemented(Backend::FastWebSockets))
        ));
    }

    #[tokio::test]
    async fn cancelled_context_aborts_dial() {
        let cancel = tokio_util::sync::CancellationToken::new();
        cancel.cancel();
        let ctx = CallContext::with_cancel(cancel);

        let result = Backend::Tungstenite
            .dial(&ctx, "ws://192.0.2.1:9/never")
            .await;
        assert!(matches!(result, Err(TransportError::Cancelled)));
    }
}
