//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the pagination service and the port interface it
//! drives to reach the market data service.

/// Port interfaces for external systems (HTTP query execution).
pub mod ports;

/// Application services (cursor pagination).
pub mod services;
