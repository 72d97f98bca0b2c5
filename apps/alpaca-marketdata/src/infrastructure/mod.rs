//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer, plus the streaming transport.

/// Alpaca REST adapters (collection endpoints, HTTP executor).
pub mod alpaca;

/// Streaming transport: backends, keepalive, connection core.
pub mod stream;

/// Configuration loading.
pub mod config;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Tracing subscriber setup.
pub mod telemetry;
