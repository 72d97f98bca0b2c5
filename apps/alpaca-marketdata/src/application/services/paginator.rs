//! Cursor Paginator
//!
//! Drives one collection endpoint to completion: issues successive queries
//! through a [`QueryExecutor`], folds each page into an accumulator, follows
//! the continuation cursor, and stops when the server omits the cursor or
//! the caller's total budget is spent.
//!
//! The total budget counts records across *all* requested keys combined,
//! not per key.
//!
//! On a failed query the records gathered so far are discarded; the error
//! carries the cursor as it stood before the failing call so the caller can
//! resume manually.

use std::collections::HashMap;

use reqwest::Url;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::application::ports::{QueryError, QueryExecutor};
use crate::domain::pagination::{
    Accumulated, Accumulator, Cursor, LimitConfig, LimitError, Limits, Page, V2_MAX_LIMIT,
    effective_page_size,
};

/// Response field carrying the continuation token.
pub const NEXT_PAGE_TOKEN_FIELD: &str = "next_page_token";

/// Query parameter for the page size.
const LIMIT_PARAM: &str = "limit";

/// Query parameter for the continuation token.
const PAGE_TOKEN_PARAM: &str = "page_token";

/// Query parameter for the key list.
const SYMBOLS_PARAM: &str = "symbols";

/// Errors surfaced by a paginated call.
#[derive(Debug, thiserror::Error)]
pub enum PaginationError {
    /// Limits were rejected before any request was made.
    #[error("invalid limits: {0}")]
    Limits(#[from] LimitError),

    /// A query failed mid-pagination.
    #[error("query failed, resume from cursor {cursor:?}: {source}")]
    Query {
        /// Cursor in effect before the failing request.
        cursor: Cursor,
        /// Underlying query failure.
        #[source]
        source: QueryError,
    },
}

impl PaginationError {
    /// Cursor to resume from, when the failure happened after validation.
    #[must_use]
    pub const fn resume_cursor(&self) -> Option<&Cursor> {
        match self {
            Self::Limits(_) => None,
            Self::Query { cursor, .. } => Some(cursor),
        }
    }

    /// Whether the error is a configuration error (never retryable).
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Limits(_))
    }

    /// Short label used for metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Limits(_) => "limits",
            Self::Query { source, .. } => source.kind(),
        }
    }
}

/// Everything the paginator needs to drive one endpoint.
#[derive(Debug, Clone)]
pub struct PageRequest {
    /// Endpoint URL with its fixed query parameters already applied.
    pub url: Url,
    /// Response field holding the records.
    pub records_field: &'static str,
    /// Protocol maximum for `limit`.
    pub hard_max: usize,
    /// Total cap applied when the caller gives neither a total nor the
    /// unbounded flag.
    pub default_total_cap: Option<usize>,
    /// Caller limits.
    pub limits: LimitConfig,
    /// Cursor to start from (empty = first page).
    pub cursor: Cursor,
}

impl PageRequest {
    /// A request for `url` reading `records_field`, unbounded, from the
    /// first page.
    #[must_use]
    pub const fn new(url: Url, records_field: &'static str) -> Self {
        Self {
            url,
            records_field,
            hard_max: V2_MAX_LIMIT,
            default_total_cap: None,
            limits: LimitConfig {
                total_limit: 0,
                page_limit: 0,
                no_total_limit: false,
            },
            cursor: Cursor::empty(),
        }
    }

    /// Set caller limits.
    #[must_use]
    pub fn with_limits(mut self, limits: LimitConfig) -> Self {
        self.limits = limits;
        self
    }

    /// Resume from `cursor`.
    #[must_use]
    pub fn with_cursor(mut self, cursor: Cursor) -> Self {
        self.cursor = cursor;
        self
    }

    /// Override the protocol maximum.
    #[must_use]
    pub fn with_hard_max(mut self, hard_max: usize) -> Self {
        self.hard_max = hard_max;
        self
    }

    /// Cap the total when the caller does not choose one.
    #[must_use]
    pub fn with_default_total_cap(mut self, cap: usize) -> Self {
        self.default_total_cap = Some(cap);
        self
    }
}

/// Cursor paginator over a [`QueryExecutor`].
///
/// One request is in flight at a time. Independent paginators may run
/// concurrently; they share nothing but the executor.
#[derive(Debug)]
pub struct Paginator<'a, E: ?Sized> {
    executor: &'a E,
}

impl<'a, E> Paginator<'a, E>
where
    E: QueryExecutor + ?Sized,
{
    /// Create a paginator issuing queries through `executor`.
    #[must_use]
    pub const fn new(executor: &'a E) -> Self {
        Self { executor }
    }

    /// Paginate a multi-key endpoint, merging each key's records across all
    /// pages.
    ///
    /// # Errors
    ///
    /// Returns [`PaginationError::Limits`] before any I/O when the limits are
    /// invalid, and [`PaginationError::Query`] on the first failed query.
    pub async fn paginate_keys<R>(
        &self,
        request: PageRequest,
        keys: &[String],
    ) -> Result<Accumulated<R>, PaginationError>
    where
        R: DeserializeOwned + Send,
    {
        let limits = request.limits.validate(request.default_total_cap)?;

        let mut url = request.url.clone();
        if !keys.is_empty() {
            url.query_pairs_mut()
                .append_pair(SYMBOLS_PARAM, &keys.join(","));
        }

        let mut acc = Accumulator::with_capacity(keys.len());
        let cursor = self
            .drive(&request, url, limits, |records| {
                let per_key = decode_per_key::<R>(records)?;
                Ok(acc.merge(per_key))
            })
            .await?;

        let result = acc.finish(cursor);
        tracing::debug!(
            endpoint = request.records_field,
            keys = keys.len(),
            records = result.record_count(),
            exhausted = result.cursor.is_empty(),
            "Pagination complete"
        );
        Ok(result)
    }

    /// Paginate a multi-key endpoint for a single key.
    ///
    /// A key absent from every page yields an empty sequence.
    ///
    /// # Errors
    ///
    /// Same as [`Paginator::paginate_keys`].
    pub async fn paginate_key<R>(
        &self,
        request: PageRequest,
        key: &str,
    ) -> Result<(Vec<R>, Cursor), PaginationError>
    where
        R: DeserializeOwned + Send,
    {
        let mut result = self
            .paginate_keys::<R>(request, &[key.to_string()])
            .await?;
        let records = result.take_key(key);
        Ok((records, result.cursor))
    }

    /// Paginate a single-stream endpoint whose records field is a flat
    /// array (e.g. news).
    ///
    /// # Errors
    ///
    /// Same as [`Paginator::paginate_keys`].
    pub async fn paginate_stream<R>(
        &self,
        request: PageRequest,
    ) -> Result<(Vec<R>, Cursor), PaginationError>
    where
        R: DeserializeOwned + Send,
    {
        let limits = request.limits.validate(request.default_total_cap)?;

        let mut records = Vec::with_capacity(limits.total.min(request.hard_max));
        let cursor = self
            .drive(&request, request.url.clone(), limits, |page| {
                let batch = decode_flat::<R>(page)?;
                let count = batch.len();
                records.extend(batch);
                Ok(count)
            })
            .await?;

        tracing::debug!(
            endpoint = request.records_field,
            records = records.len(),
            exhausted = cursor.is_empty(),
            "Pagination complete"
        );
        Ok((records, cursor))
    }

    /// Run the request loop, handing each page's records to `fold`.
    ///
    /// `fold` returns how many records it consumed. Returns the cursor at
    /// the stopping point: empty when the server signalled the last page.
    async fn drive<F>(
        &self,
        request: &PageRequest,
        base_url: Url,
        limits: Limits,
        mut fold: F,
    ) -> Result<Cursor, PaginationError>
    where
        F: FnMut(Value) -> Result<usize, QueryError> + Send,
    {
        let mut received = 0usize;
        let mut cursor = request.cursor.clone();
        let mut pages = 0u32;

        while limits.has_budget(received) {
            let size = effective_page_size(limits.total, limits.page, received, request.hard_max);
            let url = page_url(&base_url, size, &cursor);

            tracing::debug!(
                endpoint = request.records_field,
                page = pages,
                limit = size,
                received,
                "Requesting page"
            );

            let step = self.executor.get(&url).await.and_then(|document| {
                split_page(document, request.records_field)
                    .and_then(|(records, next)| fold(records).map(|count| (count, next)))
            });

            let (count, next) = match step {
                Ok(step) => step,
                Err(source) => {
                    tracing::warn!(
                        endpoint = request.records_field,
                        page = pages,
                        cursor = %cursor,
                        error = %source,
                        "Page query failed"
                    );
                    return Err(PaginationError::Query { cursor, source });
                }
            };

            pages += 1;
            received += count;

            match next {
                Some(next) => cursor = next,
                None => return Ok(Cursor::empty()),
            }
        }

        Ok(cursor)
    }
}

/// Decode a response document into a [`Page`] of per-key records.
///
/// # Errors
///
/// Returns [`QueryError`] when the document is not a page object or its
/// records do not decode as `R`.
pub fn decode_page<R: DeserializeOwned>(
    document: Value,
    records_field: &str,
) -> Result<Page<R>, QueryError> {
    let (records, next_cursor) = split_page(document, records_field)?;
    Ok(Page {
        per_key: decode_per_key(records)?,
        next_cursor,
    })
}

fn page_url(base: &Url, limit: usize, cursor: &Cursor) -> Url {
    let mut url = base.clone();
    {
        let mut pairs = url.query_pairs_mut();
        pairs.append_pair(LIMIT_PARAM, &limit.to_string());
        if !cursor.is_empty() {
            pairs.append_pair(PAGE_TOKEN_PARAM, cursor.as_str());
        }
    }
    url
}

/// Split a page document into its records value and continuation cursor.
fn split_page(document: Value, records_field: &str) -> Result<(Value, Option<Cursor>), QueryError> {
    let Value::Object(mut fields) = document else {
        return Err(QueryError::MalformedPage(format!(
            "expected a JSON object, got {document}"
        )));
    };

    let next = match fields.remove(NEXT_PAGE_TOKEN_FIELD) {
        None | Some(Value::Null) => None,
        Some(Value::String(token)) if token.is_empty() => None,
        Some(Value::String(token)) => Some(Cursor::from(token)),
        Some(other) => {
            return Err(QueryError::MalformedPage(format!(
                "{NEXT_PAGE_TOKEN_FIELD} is not a string: {other}"
            )));
        }
    };

    let records = fields.remove(records_field).unwrap_or(Value::Null);
    Ok((records, next))
}

fn decode_per_key<R: DeserializeOwned>(records: Value) -> Result<HashMap<String, Vec<R>>, QueryError> {
    if records.is_null() {
        return Ok(HashMap::new());
    }
    let raw: HashMap<String, Option<Vec<R>>> = serde_json::from_value(records)?;
    Ok(raw
        .into_iter()
        .map(|(key, records)| (key, records.unwrap_or_default()))
        .collect())
}

fn decode_flat<R: DeserializeOwned>(records: Value) -> Result<Vec<R>, QueryError> {
    if records.is_null() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_value(records)?)
}
