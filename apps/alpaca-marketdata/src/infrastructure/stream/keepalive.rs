//! Keepalive
//!
//! Fixed timing shared by every backend, the per-connection clock that
//! tracks inbound traffic, and the monitor that pings a connection on a
//! timer.
//!
//! # Rules
//!
//! - Every inbound frame (data, ping, pong) resets the read deadline to
//!   `now + ping_period + pong_wait`.
//! - Every outbound frame uses `now + write_wait`.
//! - `ping_period < pong_wait`, so a healthy peer answers a ping before
//!   the read window closes.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::conn::{Conn, TransportError};
use super::context::CallContext;

/// Timing windows and frame ceiling applied to a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepaliveTiming {
    /// Time allowed to write one frame.
    pub write_wait: Duration,
    /// Interval between pings.
    pub ping_period: Duration,
    /// Time allowed for the peer to answer after a ping period.
    pub pong_wait: Duration,
    /// Largest inbound frame accepted, in bytes.
    pub max_frame_size: usize,
}

/// Process-wide keepalive timing.
pub const KEEPALIVE: KeepaliveTiming = KeepaliveTiming {
    write_wait: Duration::from_secs(5),
    ping_period: Duration::from_secs(10),
    pong_wait: Duration::from_secs(15),
    max_frame_size: 1024 * 1024,
};

impl Default for KeepaliveTiming {
    fn default() -> Self {
        KEEPALIVE
    }
}

impl KeepaliveTiming {
    /// How long a read may go without inbound traffic.
    #[must_use]
    pub const fn read_window(&self) -> Duration {
        self.ping_period.saturating_add(self.pong_wait)
    }
}

// =============================================================================
// Clock
// =============================================================================

/// Inbound-traffic clock for one connection.
///
/// Backends touch it for every frame they receive, whichever primitive
/// their library surfaces that frame through.
#[derive(Debug)]
pub struct KeepaliveClock {
    last_seen: RwLock<Instant>,
}

impl Default for KeepaliveClock {
    fn default() -> Self {
        Self::new()
    }
}

impl KeepaliveClock {
    /// Start the clock now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            last_seen: RwLock::new(Instant::now()),
        }
    }

    /// Record inbound traffic of any kind.
    pub fn touch(&self) {
        *self.last_seen.write() = Instant::now();
    }

    /// Time of the last inbound frame.
    #[must_use]
    pub fn last_seen(&self) -> Instant {
        *self.last_seen.read()
    }

    /// When a read with no further traffic must give up.
    #[must_use]
    pub fn read_deadline(&self, timing: &KeepaliveTiming) -> Instant {
        self.last_seen() + timing.read_window()
    }
}

// =============================================================================
// Monitor
// =============================================================================

/// Pings a connection every `ping_period` until cancelled or a ping fails.
///
/// ```rust,no_run
/// use alpaca_marketdata::infrastructure::stream::{Backend, CallContext, KeepaliveMonitor};
/// use tokio_util::sync::CancellationToken;
///
/// async fn example() -> Result<(), Box<dyn std::error::Error>> {
///     let cancel = CancellationToken::new();
///     let ctx = CallContext::with_cancel(cancel.clone());
///     let conn = Backend::Tungstenite
///         .dial(&ctx, "wss://stream.data.alpaca.markets/v2/sip")
///         .await?;
///
///     tokio::spawn(KeepaliveMonitor::new(conn.clone(), cancel.clone()).run());
///
///     while let Ok(message) = conn.read_message(&ctx).await {
///         println!("{} bytes", message.len());
///     }
///     cancel.cancel();
///     Ok(())
/// }
/// ```
pub struct KeepaliveMonitor {
    conn: Arc<dyn Conn>,
    period: Duration,
    cancel: CancellationToken,
}

impl KeepaliveMonitor {
    /// Create a monitor using the process-wide ping period.
    #[must_use]
    pub fn new(conn: Arc<dyn Conn>, cancel: CancellationToken) -> Self {
        Self {
            conn,
            period: KEEPALIVE.ping_period,
            cancel,
        }
    }

    /// Override the ping period.
    #[must_use]
    pub const fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// Run the ping loop.
    ///
    /// Returns `Ok(())` on cancellation.
    ///
    /// # Errors
    ///
    /// Returns the first ping failure.
    pub async fn run(self) -> Result<(), TransportError> {
        let mut interval = tokio::time::interval_at(Instant::now() + self.period, self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let ctx = CallContext::with_cancel(self.cancel.clone());

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::debug!("Keepalive monitor cancelled");
                    return Ok(());
                }
                _ = interval.tick() => {
                    match self.conn.ping(&ctx).await {
                        Ok(()) => tracing::trace!("Keepalive ping sent"),
                        Err(TransportError::Cancelled) => return Ok(()),
                        Err(e) => {
                            tracing::warn!(error = %e, "Keepalive ping failed");
                            return Err(e);
                        }
                    }
                }
            }
        }
    }
}
