//! Market Data Client
//!
//! The historical collection endpoints, each driven to completion by the
//! cursor paginator.
//!
//! | Method                   | Path                                  | Records    |
//! |--------------------------|---------------------------------------|------------|
//! | `multi_trades`/`trades`  | `/v2/stocks/trades`                   | `trades`   |
//! | `multi_quotes`/`quotes`  | `/v2/stocks/quotes`                   | `quotes`   |
//! | `multi_bars`/`bars`      | `/v2/stocks/bars`                     | `bars`     |
//! | `multi_auctions`/...     | `/v2/stocks/auctions` (`feed=sip`)    | `auctions` |
//! | `crypto_multi_trades`/...| `/v1beta3/crypto/{feed}/trades`       | `trades`   |
//! | `crypto_multi_bars`/...  | `/v1beta3/crypto/{feed}/bars`         | `bars`     |
//! | `news`                   | `/v1beta1/news`                       | `news`     |
//!
//! Records are opaque: pick any `R: DeserializeOwned`, or
//! `serde_json::Value` to keep them as-is.

use reqwest::Url;
use serde::de::DeserializeOwned;

use crate::application::ports::QueryExecutor;
use crate::application::services::{PageRequest, PaginationError, Paginator};
use crate::domain::pagination::{Accumulated, Cursor, NEWS_MAX_LIMIT};
use crate::infrastructure::metrics;

use super::params::{
    BarsRequest, CryptoBarsRequest, CryptoRequest, NewsRequest, StockRequest,
};

/// Crypto location used when a request does not name one.
pub const DEFAULT_CRYPTO_FEED: &str = "us";

/// Feed the auctions endpoint always queries.
const AUCTIONS_FEED: &str = "sip";

/// Client for the historical market data REST API.
#[derive(Debug, Clone)]
pub struct MarketDataClient<E> {
    executor: E,
    base_url: Url,
    crypto_feed: String,
}

impl<E> MarketDataClient<E>
where
    E: QueryExecutor,
{
    /// Create a client for `base_url` (e.g. `https://data.alpaca.markets`).
    #[must_use]
    pub fn new(executor: E, base_url: Url) -> Self {
        Self {
            executor,
            base_url,
            crypto_feed: DEFAULT_CRYPTO_FEED.to_string(),
        }
    }

    /// Override the default crypto location.
    #[must_use]
    pub fn with_crypto_feed(mut self, feed: impl Into<String>) -> Self {
        self.crypto_feed = feed.into();
        self
    }

    /// The underlying executor.
    #[must_use]
    pub const fn executor(&self) -> &E {
        &self.executor
    }

    fn endpoint(&self, path: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        url.set_query(None);
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(path);
        }
        url
    }

    async fn collect<R>(
        &self,
        request: PageRequest,
        symbols: &[String],
    ) -> Result<Accumulated<R>, PaginationError>
    where
        R: DeserializeOwned + Send,
    {
        let endpoint = request.records_field;
        let result = Paginator::new(&self.executor)
            .paginate_keys(request, symbols)
            .await;

        match &result {
            Ok(accumulated) => metrics::record_records_received(endpoint, accumulated.record_count()),
            Err(e) => metrics::record_pagination_error(endpoint, e.kind()),
        }
        result
    }

    async fn collect_one<R>(
        &self,
        request: PageRequest,
        symbol: &str,
    ) -> Result<(Vec<R>, Cursor), PaginationError>
    where
        R: DeserializeOwned + Send,
    {
        let mut result = self.collect(request, &[symbol.to_string()]).await?;
        Ok((result.take_key(symbol), result.cursor))
    }

    fn stock_request(&self, kind: &'static str, params: &StockRequest) -> PageRequest {
        let mut url = self.endpoint(&["v2", "stocks", kind]);
        params.apply(&mut url);
        PageRequest::new(url, kind)
            .with_limits(params.limits)
            .with_cursor(params.page_token.clone())
    }

    fn bars_request(&self, params: &BarsRequest) -> PageRequest {
        let mut url = self.endpoint(&["v2", "stocks", "bars"]);
        params.apply(&mut url);
        PageRequest::new(url, "bars")
            .with_limits(params.base.limits)
            .with_cursor(params.base.page_token.clone())
    }

    fn auctions_request(&self, params: &StockRequest) -> PageRequest {
        let forced = StockRequest {
            feed: Some(AUCTIONS_FEED.to_string()),
            ..params.clone()
        };
        self.stock_request("auctions", &forced)
    }

    fn crypto_endpoint(&self, feed: Option<&str>, kind: &str) -> Url {
        let feed = feed
            .filter(|f| !f.is_empty())
            .unwrap_or(self.crypto_feed.as_str());
        self.endpoint(&["v1beta3", "crypto", feed, kind])
    }

    fn crypto_trades_request(&self, params: &CryptoRequest) -> PageRequest {
        let mut url = self.crypto_endpoint(params.feed.as_deref(), "trades");
        params.apply(&mut url);
        PageRequest::new(url, "trades")
            .with_limits(params.limits)
            .with_cursor(params.page_token.clone())
    }

    fn crypto_bars_request(&self, params: &CryptoBarsRequest) -> PageRequest {
        let mut url = self.crypto_endpoint(params.base.feed.as_deref(), "bars");
        params.apply(&mut url);
        PageRequest::new(url, "bars")
            .with_limits(params.base.limits)
            .with_cursor(params.base.page_token.clone())
    }

    // ===== Stocks =====

    /// Trades for several symbols.
    ///
    /// # Errors
    ///
    /// Returns [`PaginationError`] on invalid limits or the first failed
    /// page; records already fetched are discarded.
    pub async fn multi_trades<R>(
        &self,
        symbols: &[String],
        params: &StockRequest,
    ) -> Result<Accumulated<R>, PaginationError>
    where
        R: DeserializeOwned + Send,
    {
        self.collect(self.stock_request("trades", params), symbols)
            .await
    }

    /// Trades for one symbol.
    ///
    /// # Errors
    ///
    /// See [`MarketDataClient::multi_trades`].
    pub async fn trades<R>(
        &self,
        symbol: &str,
        params: &StockRequest,
    ) -> Result<(Vec<R>, Cursor), PaginationError>
    where
        R: DeserializeOwned + Send,
    {
        self.collect_one(self.stock_request("trades", params), symbol)
            .await
    }

    /// Quotes for several symbols.
    ///
    /// # Errors
    ///
    /// See [`MarketDataClient::multi_trades`].
    pub async fn multi_quotes<R>(
        &self,
        symbols: &[String],
        params: &StockRequest,
    ) -> Result<Accumulated<R>, PaginationError>
    where
        R: DeserializeOwned + Send,
    {
        self.collect(self.stock_request("quotes", params), symbols)
            .await
    }

    /// Quotes for one symbol.
    ///
    /// # Errors
    ///
    /// See [`MarketDataClient::multi_trades`].
    pub async fn quotes<R>(
        &self,
        symbol: &str,
        params: &StockRequest,
    ) -> Result<(Vec<R>, Cursor), PaginationError>
    where
        R: DeserializeOwned + Send,
    {
        self.collect_one(self.stock_request("quotes", params), symbol)
            .await
    }

    /// Bars for several symbols.
    ///
    /// # Errors
    ///
    /// See [`MarketDataClient::multi_trades`].
    pub async fn multi_bars<R>(
        &self,
        symbols: &[String],
        params: &BarsRequest,
    ) -> Result<Accumulated<R>, PaginationError>
    where
        R: DeserializeOwned + Send,
    {
        self.collect(self.bars_request(params), symbols).await
    }

    /// Bars for one symbol.
    ///
    /// # Errors
    ///
    /// See [`MarketDataClient::multi_trades`].
    pub async fn bars<R>(
        &self,
        symbol: &str,
        params: &BarsRequest,
    ) -> Result<(Vec<R>, Cursor), PaginationError>
    where
        R: DeserializeOwned + Send,
    {
        self.collect_one(self.bars_request(params), symbol).await
    }

    /// Daily auctions for several symbols. Always queries the SIP feed.
    ///
    /// # Errors
    ///
    /// See [`MarketDataClient::multi_trades`].
    pub async fn multi_auctions<R>(
        &self,
        symbols: &[String],
        params: &StockRequest,
    ) -> Result<Accumulated<R>, PaginationError>
    where
        R: DeserializeOwned + Send,
    {
        self.collect(self.auctions_request(params), symbols).await
    }

    /// Daily auctions for one symbol. Always queries the SIP feed.
    ///
    /// # Errors
    ///
    /// See [`MarketDataClient::multi_trades`].
    pub async fn auctions<R>(
        &self,
        symbol: &str,
        params: &StockRequest,
    ) -> Result<(Vec<R>, Cursor), PaginationError>
    where
        R: DeserializeOwned + Send,
    {
        self.collect_one(self.auctions_request(params), symbol)
            .await
    }

    // ===== Crypto =====

    /// Crypto trades for several symbols.
    ///
    /// # Errors
    ///
    /// See [`MarketDataClient::multi_trades`].
    pub async fn crypto_multi_trades<R>(
        &self,
        symbols: &[String],
        params: &CryptoRequest,
    ) -> Result<Accumulated<R>, PaginationError>
    where
        R: DeserializeOwned + Send,
    {
        self.collect(self.crypto_trades_request(params), symbols)
            .await
    }

    /// Crypto trades for one symbol.
    ///
    /// # Errors
    ///
    /// See [`MarketDataClient::multi_trades`].
    pub async fn crypto_trades<R>(
        &self,
        symbol: &str,
        params: &CryptoRequest,
    ) -> Result<(Vec<R>, Cursor), PaginationError>
    where
        R: DeserializeOwned + Send,
    {
        self.collect_one(self.crypto_trades_request(params), symbol)
            .await
    }

    /// Crypto bars for several symbols.
    ///
    /// # Errors
    ///
    /// See [`MarketDataClient::multi_trades`].
    pub async fn crypto_multi_bars<R>(
        &self,
        symbols: &[String],
        params: &CryptoBarsRequest,
    ) -> Result<Accumulated<R>, PaginationError>
    where
        R: DeserializeOwned + Send,
    {
        self.collect(self.crypto_bars_request(params), symbols)
            .await
    }

    /// Crypto bars for one symbol.
    ///
    /// # Errors
    ///
    /// See [`MarketDataClient::multi_trades`].
    pub async fn crypto_bars<R>(
        &self,
        symbol: &str,
        params: &CryptoBarsRequest,
    ) -> Result<(Vec<R>, Cursor), PaginationError>
    where
        R: DeserializeOwned + Send,
    {
        self.collect_one(self.crypto_bars_request(params), symbol)
            .await
    }

    // ===== News =====

    /// News articles, newest or oldest first per `params.sort`.
    ///
    /// Without an explicit total and without `no_total_limit`, at most 50
    /// articles are fetched.
    ///
    /// # Errors
    ///
    /// See [`MarketDataClient::multi_trades`].
    pub async fn news<R>(&self, params: &NewsRequest) -> Result<(Vec<R>, Cursor), PaginationError>
    where
        R: DeserializeOwned + Send,
    {
        let mut url = self.endpoint(&["v1beta1", "news"]);
        params.apply(&mut url);
        let request = PageRequest::new(url, "news")
            .with_hard_max(NEWS_MAX_LIMIT)
            .with_default_total_cap(NEWS_MAX_LIMIT)
            .with_limits(params.limits)
            .with_cursor(params.page_token.clone());

        let result = Paginator::new(&self.executor)
            .paginate_stream(request)
            .await;

        match &result {
            Ok((news, _)) => metrics::record_records_received("news", news.len()),
            Err(e) => metrics::record_pagination_error("news", e.kind()),
        }
        result
    }
}
