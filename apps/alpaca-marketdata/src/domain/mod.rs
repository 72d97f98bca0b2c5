//! Domain Layer - Core pagination types and policy.
//!
//! This layer contains the pure types for cursor pagination with no I/O.
//! Everything here is plain Rust with serialization support.

/// Cursor, limit policy, pages, and the multi-key accumulator.
pub mod pagination;
