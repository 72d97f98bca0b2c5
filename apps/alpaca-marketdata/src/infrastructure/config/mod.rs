//! Configuration Module
//!
//! Environment-driven configuration for the client and binary.

mod settings;

pub use settings::{
    ClientConfig, ConfigError, Credentials, DEFAULT_DATA_URL, DEFAULT_STREAM_URL,
    PaginationSettings,
};
