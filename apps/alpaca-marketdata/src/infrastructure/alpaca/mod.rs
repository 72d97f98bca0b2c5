//! Alpaca Market Data Adapters
//!
//! REST adapters for Alpaca's historical market data API:
//!
//! - **client**: the paginated collection endpoints (stocks, crypto, news)
//! - **http**: `reqwest` implementation of the query executor port
//! - **params**: per-endpoint query parameters

pub mod client;
pub mod http;
pub mod params;

pub use client::{DEFAULT_CRYPTO_FEED, MarketDataClient};
pub use http::{DEFAULT_HTTP_TIMEOUT, HttpQueryExecutor};
pub use params::{
    Adjustment, BarsRequest, CryptoBarsRequest, CryptoRequest, NewsRequest, ParamError, Sort,
    StockRequest, TimeFrame, TimeFrameUnit,
};
