//! Streaming Transport
//!
//! A single capability ([`Conn`]) over persistent binary websocket
//! connections, several interchangeable backends selected by identifier,
//! and the keepalive rules every backend honors.
//!
//! - `backend`: backend set, identifier resolution, dial
//! - `conn`: the capability trait and its errors
//! - `context`: cancellation and deadlines for blocking calls
//! - `keepalive`: timing constants, inbound clock, ping monitor
//! - `socket`: the `socket` backend over `tokio-websockets`
//! - `ws`: the `tungstenite` backend over `tokio-tungstenite`

mod backend;
mod conn;
mod context;
mod keepalive;
mod socket;
mod ws;

pub use backend::{Backend, DIAL_TIMEOUT, MSGPACK_CONTENT_TYPE, resolve_backend};
pub use conn::{Conn, TransportError};
pub use context::CallContext;
pub use keepalive::{KEEPALIVE, KeepaliveClock, KeepaliveMonitor, KeepaliveTiming};
pub use socket::{RECV_BUFFER_LADDER_KIB, SocketConn, tune_recv_buffer};
pub use ws::{WsConn, WsStream, handshake_request};
