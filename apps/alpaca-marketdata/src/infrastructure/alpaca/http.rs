//! HTTP Query Executor
//!
//! `reqwest`-backed [`QueryExecutor`]. Sends one GET per call, with the
//! caller's default headers attached verbatim, and decodes the body as
//! JSON. No retries.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use reqwest::{Client, Url};

use crate::application::ports::{QueryError, QueryExecutor};
use crate::infrastructure::metrics;

/// Default request timeout.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client for collection endpoints.
#[derive(Debug, Clone)]
pub struct HttpQueryExecutor {
    client: Client,
}

impl HttpQueryExecutor {
    /// Create an executor with `timeout` per request and `headers` sent on
    /// every request.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Network`] if the client cannot be built.
    pub fn new(timeout: Duration, mut headers: HeaderMap) -> Result<Self, QueryError> {
        headers
            .entry(ACCEPT)
            .or_insert(HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self { client })
    }

    /// Wrap an existing client.
    #[must_use]
    pub const fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl QueryExecutor for HttpQueryExecutor {
    async fn get(&self, url: &Url) -> Result<serde_json::Value, QueryError> {
        tracing::debug!(path = url.path(), "GET");

        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        if !status.is_success() {
            let body = String::from_utf8_lossy(&body).into_owned();
            tracing::warn!(status = status.as_u16(), path = url.path(), "Query rejected");
            return Err(QueryError::Status {
                status: status.as_u16(),
                body,
            });
        }

        metrics::record_page_fetched(url.path());
        Ok(serde_json::from_slice(&body)?)
    }
}
