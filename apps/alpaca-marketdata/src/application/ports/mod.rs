//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - `QueryExecutor`: performs one HTTP GET against a collection endpoint
//!   and hands back the decoded JSON document.

use async_trait::async_trait;
use reqwest::Url;

/// Errors surfaced by a single query.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// The request could not be sent or the response body not read.
    #[error("network error: {0}")]
    Network(String),

    /// The service answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, verbatim.
        body: String,
    },

    /// The response body was not valid JSON or did not have the expected
    /// shape.
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// The response was valid JSON but not a page object.
    #[error("malformed page: {0}")]
    MalformedPage(String),
}

impl QueryError {
    /// Short label used for metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Network(_) => "network",
            Self::Status { .. } => "status",
            Self::Decode(_) => "decode",
            Self::MalformedPage(_) => "malformed_page",
        }
    }
}

impl From<reqwest::Error> for QueryError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

/// Executes fully-formed GET requests against the market data service.
///
/// Implementations must not retry internally; every failure is surfaced to
/// the paginator, which surfaces it to the caller.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Perform a GET for `url` and return the decoded response document.
    async fn get(&self, url: &Url) -> Result<serde_json::Value, QueryError>;
}
