//! Request Parameters
//!
//! Query parameters for the historical collection endpoints. Every request
//! type knows how to write its own fixed parameters onto an endpoint URL;
//! `limit` and `page_token` are left to the paginator.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::domain::pagination::{Cursor, LimitConfig};

/// Parse error for request parameter values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParamError {
    /// Unrecognized time frame.
    #[error("invalid timeframe: {0:?}")]
    TimeFrame(String),

    /// Unrecognized adjustment.
    #[error("invalid adjustment: {0:?}")]
    Adjustment(String),

    /// Unrecognized sort order.
    #[error("invalid sort: {0:?}")]
    Sort(String),
}

// =============================================================================
// Time Frame
// =============================================================================

/// Unit of a bar time frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeFrameUnit {
    /// Minutes.
    Min,
    /// Hours.
    Hour,
    /// Days.
    Day,
    /// Weeks.
    Week,
    /// Months.
    Month,
}

impl TimeFrameUnit {
    /// Suffix used on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Min => "Min",
            Self::Hour => "Hour",
            Self::Day => "Day",
            Self::Week => "Week",
            Self::Month => "Month",
        }
    }
}

/// Bar aggregation period, e.g. `5Min` or `1Day`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeFrame {
    /// Number of units.
    pub amount: u32,
    /// Unit.
    pub unit: TimeFrameUnit,
}

impl TimeFrame {
    /// One minute.
    pub const ONE_MIN: Self = Self::new(1, TimeFrameUnit::Min);
    /// One hour.
    pub const ONE_HOUR: Self = Self::new(1, TimeFrameUnit::Hour);
    /// One day.
    pub const ONE_DAY: Self = Self::new(1, TimeFrameUnit::Day);
    /// One week.
    pub const ONE_WEEK: Self = Self::new(1, TimeFrameUnit::Week);
    /// One month.
    pub const ONE_MONTH: Self = Self::new(1, TimeFrameUnit::Month);

    /// Create a time frame.
    #[must_use]
    pub const fn new(amount: u32, unit: TimeFrameUnit) -> Self {
        Self { amount, unit }
    }

    /// The frame sent on the wire. A zero amount falls back to one day.
    #[must_use]
    pub const fn or_one_day(self) -> Self {
        if self.amount == 0 { Self::ONE_DAY } else { self }
    }
}

impl Default for TimeFrame {
    fn default() -> Self {
        Self::ONE_DAY
    }
}

impl fmt::Display for TimeFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.unit.as_str())
    }
}

impl FromStr for TimeFrame {
    type Err = ParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let split = s
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| ParamError::TimeFrame(s.to_string()))?;
        let (digits, unit) = s.split_at(split);

        let amount: u32 = digits
            .parse()
            .map_err(|_| ParamError::TimeFrame(s.to_string()))?;
        let unit = match unit {
            "Min" | "T" => TimeFrameUnit::Min,
            "Hour" | "H" => TimeFrameUnit::Hour,
            "Day" | "D" => TimeFrameUnit::Day,
            "Week" | "W" => TimeFrameUnit::Week,
            "Month" | "M" => TimeFrameUnit::Month,
            _ => return Err(ParamError::TimeFrame(s.to_string())),
        };
        if amount == 0 {
            return Err(ParamError::TimeFrame(s.to_string()));
        }

        Ok(Self { amount, unit })
    }
}

// =============================================================================
// Adjustment / Sort
// =============================================================================

/// Corporate action adjustment applied to stock bars.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Adjustment {
    /// No adjustment.
    #[default]
    Raw,
    /// Stock splits.
    Split,
    /// Dividends.
    Dividend,
    /// Splits and dividends.
    All,
}

impl Adjustment {
    /// Wire value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Split => "split",
            Self::Dividend => "dividend",
            Self::All => "all",
        }
    }
}

impl FromStr for Adjustment {
    type Err = ParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "raw" => Ok(Self::Raw),
            "split" => Ok(Self::Split),
            "dividend" => Ok(Self::Dividend),
            "all" => Ok(Self::All),
            _ => Err(ParamError::Adjustment(s.to_string())),
        }
    }
}

/// Result ordering for news.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sort {
    /// Oldest first.
    Asc,
    /// Newest first.
    Desc,
}

impl Sort {
    /// Wire value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

impl FromStr for Sort {
    type Err = ParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            _ => Err(ParamError::Sort(s.to_string())),
        }
    }
}

// =============================================================================
// Request Types
// =============================================================================

fn rfc3339(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn set_time_range(url: &mut Url, start: Option<&DateTime<Utc>>, end: Option<&DateTime<Utc>>) {
    let mut pairs = url.query_pairs_mut();
    if let Some(start) = start {
        pairs.append_pair("start", &rfc3339(start));
    }
    if let Some(end) = end {
        pairs.append_pair("end", &rfc3339(end));
    }
}

fn set_optional(url: &mut Url, name: &str, value: Option<&str>) {
    if let Some(value) = value.filter(|v| !v.is_empty()) {
        url.query_pairs_mut().append_pair(name, value);
    }
}

/// Parameters shared by the stock trades, quotes and auctions endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StockRequest {
    /// Inclusive start of the time range.
    pub start: Option<DateTime<Utc>>,
    /// Inclusive end of the time range.
    pub end: Option<DateTime<Utc>>,
    /// Data feed (`sip`, `iex`, ...).
    pub feed: Option<String>,
    /// Symbol mapping date (`YYYY-MM-DD`).
    pub as_of: Option<String>,
    /// Price currency.
    pub currency: Option<String>,
    /// Record limits.
    pub limits: LimitConfig,
    /// Cursor to resume from.
    pub page_token: Cursor,
}

impl StockRequest {
    /// Write the fixed query parameters.
    pub fn apply(&self, url: &mut Url) {
        set_time_range(url, self.start.as_ref(), self.end.as_ref());
        set_optional(url, "feed", self.feed.as_deref());
        set_optional(url, "asof", self.as_of.as_deref());
        set_optional(url, "currency", self.currency.as_deref());
    }
}

/// Parameters for the stock bars endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BarsRequest {
    /// Shared stock parameters.
    pub base: StockRequest,
    /// Aggregation period (default `1Day`).
    pub timeframe: TimeFrame,
    /// Corporate action adjustment (default `raw`).
    pub adjustment: Adjustment,
}

impl BarsRequest {
    /// Write the fixed query parameters.
    pub fn apply(&self, url: &mut Url) {
        self.base.apply(url);
        url.query_pairs_mut()
            .append_pair("timeframe", &self.timeframe.or_one_day().to_string())
            .append_pair("adjustment", self.adjustment.as_str());
    }
}

/// Parameters for the crypto trades endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CryptoRequest {
    /// Inclusive start of the time range.
    pub start: Option<DateTime<Utc>>,
    /// Inclusive end of the time range.
    pub end: Option<DateTime<Utc>>,
    /// Crypto location feed; the client default applies when `None`.
    pub feed: Option<String>,
    /// Record limits.
    pub limits: LimitConfig,
    /// Cursor to resume from.
    pub page_token: Cursor,
}

impl CryptoRequest {
    /// Write the fixed query parameters.
    pub fn apply(&self, url: &mut Url) {
        set_time_range(url, self.start.as_ref(), self.end.as_ref());
    }
}

/// Parameters for the crypto bars endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CryptoBarsRequest {
    /// Shared crypto parameters.
    pub base: CryptoRequest,
    /// Aggregation period (default `1Day`).
    pub timeframe: TimeFrame,
}

impl CryptoBarsRequest {
    /// Write the fixed query parameters.
    pub fn apply(&self, url: &mut Url) {
        self.base.apply(url);
        url.query_pairs_mut()
            .append_pair("timeframe", &self.timeframe.or_one_day().to_string());
    }
}

/// Parameters for the news endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewsRequest {
    /// Symbols to filter by; empty means all.
    pub symbols: Vec<String>,
    /// Inclusive start of the time range.
    pub start: Option<DateTime<Utc>>,
    /// Inclusive end of the time range.
    pub end: Option<DateTime<Utc>>,
    /// Result ordering.
    pub sort: Option<Sort>,
    /// Include article bodies.
    pub include_content: bool,
    /// Skip articles without a body.
    pub exclude_contentless: bool,
    /// Record limits. The total defaults to 50 unless `no_total_limit` is
    /// set.
    pub limits: LimitConfig,
    /// Cursor to resume from.
    pub page_token: Cursor,
}

impl NewsRequest {
    /// Write the fixed query parameters.
    pub fn apply(&self, url: &mut Url) {
        if !self.symbols.is_empty() {
            url.query_pairs_mut()
                .append_pair("symbols", &self.symbols.join(","));
        }
        set_time_range(url, self.start.as_ref(), self.end.as_ref());
        set_optional(url, "sort", self.sort.map(Sort::as_str));

        let mut pairs = url.query_pairs_mut();
        if self.include_content {
            pairs.append_pair("include_content", "true");
        }
        if self.exclude_contentless {
            pairs.append_pair("exclude_contentless", "true");
        }
    }
}
