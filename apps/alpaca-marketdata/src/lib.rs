#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Alpaca Market Data - Pagination and Stream Transport
//!
//! Client-side plumbing for Alpaca's market data service: a cursor
//! paginator that drives the historical REST collection endpoints to
//! completion under caller limits, and a WebSocket transport with three
//! selectable backends and a ping/pong keepalive.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Pure pagination types
//!   - `pagination`: Cursor, limit policy, page accumulator
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: `QueryExecutor`, the one-GET-per-page seam
//!   - `services`: The cursor paginator
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `alpaca`: REST endpoints, request parameters, `reqwest` executor
//!   - `stream`: WebSocket backends, connection contract, keepalive
//!   - `config`: Environment-driven configuration
//!   - `metrics`: Prometheus counters
//!   - `telemetry`: `tracing` subscriber setup
//!
//! # Data Flow
//!
//! ```text
//! caller ──► MarketDataClient ──► Paginator ──► QueryExecutor ──► GET page
//!                                    ▲                               │
//!                                    └──── next_page_token ◄─────────┘
//!
//! caller ──► Backend::dial ──► Conn ◄── KeepaliveMonitor (ping every period)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Pagination types with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::pagination::{Accumulated, Cursor, LimitConfig, LimitError};

// Ports and services
pub use application::ports::{QueryError, QueryExecutor};
pub use application::services::{PageRequest, PaginationError, Paginator};

// REST client
pub use infrastructure::alpaca::{HttpQueryExecutor, MarketDataClient};

// Stream transport
pub use infrastructure::stream::{Backend, CallContext, Conn, KeepaliveMonitor, TransportError};

// Infrastructure config
pub use infrastructure::config::{ClientConfig, ConfigError};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, init as init_telemetry};
