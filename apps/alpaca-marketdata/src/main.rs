//! Alpaca Market Data
//!
//! Fetches a paginated historical collection and prints it as JSON, or
//! dials the market data stream and logs what arrives.
//!
//! # Usage
//!
//! ```text
//! alpaca-marketdata <endpoint> <SYM[,SYM...]>
//! alpaca-marketdata news [SYM[,SYM...]]
//! alpaca-marketdata stream
//! ```
//!
//! Endpoints: `trades`, `quotes`, `bars`, `auctions`, `crypto-trades`,
//! `crypto-bars`, `news`.
//!
//! # Environment Variables
//!
//! - `ALPACA_KEY` / `ALPACA_SECRET`: API credentials (optional, paired)
//! - `ALPACA_DATA_URL`: REST base URL
//! - `ALPACA_STREAM_URL`: stream URL
//! - `MARKETDATA_WS_BACKEND`: `tungstenite` (default), `socket`, `fastwebsockets`
//! - `MARKETDATA_TOTAL_LIMIT`, `MARKETDATA_PAGE_LIMIT`, `MARKETDATA_NO_TOTAL_LIMIT`
//! - `MARKETDATA_PAGE_TOKEN`: cursor to resume from
//! - `RUST_LOG`: log filter

use std::sync::Arc;

use anyhow::{Context, bail};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::{Value, json};
use tokio::signal;
use tokio_util::sync::CancellationToken;

use alpaca_marketdata::infrastructure::alpaca::{
    BarsRequest, CryptoBarsRequest, CryptoRequest, HttpQueryExecutor, MarketDataClient,
    NewsRequest, StockRequest,
};
use alpaca_marketdata::infrastructure::config::{ClientConfig, Credentials};
use alpaca_marketdata::infrastructure::metrics::{self, init_metrics};
use alpaca_marketdata::infrastructure::stream::{CallContext, Conn, KeepaliveMonitor};
use alpaca_marketdata::infrastructure::telemetry;
use alpaca_marketdata::{Accumulated, Cursor, PaginationError, TransportError};

const API_KEY_HEADER: &str = "apca-api-key-id";
const API_SECRET_HEADER: &str = "apca-api-secret-key";

/// Command selected on the command line.
enum Command {
    Collect { endpoint: String, symbols: Vec<String> },
    Stream,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("rustls crypto provider already installed");
    }

    load_dotenv();

    if let Err(e) = telemetry::init() {
        eprintln!("Failed to initialize telemetry: {e}");
    }

    if init_metrics().is_none() {
        tracing::warn!("Prometheus recorder unavailable, metrics disabled");
    }

    let command = parse_args(std::env::args().skip(1))?;
    let config = ClientConfig::from_env().context("failed to load configuration")?;

    tracing::info!(
        data_url = %config.data_url,
        stream_url = %config.stream_url,
        backend = config.backend.as_str(),
        "Configuration loaded"
    );

    match command {
        Command::Collect { endpoint, symbols } => collect(&config, &endpoint, &symbols).await,
        Command::Stream => stream(&config).await,
    }
}

fn parse_args(mut args: impl Iterator<Item = String>) -> anyhow::Result<Command> {
    let Some(first) = args.next() else {
        bail!("usage: alpaca-marketdata <endpoint> <symbols> | stream");
    };

    if first == "stream" {
        return Ok(Command::Stream);
    }

    let symbols: Vec<String> = args
        .next()
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_uppercase)
                .collect()
        })
        .unwrap_or_default();

    if symbols.is_empty() && first != "news" {
        bail!("{first} requires at least one symbol");
    }

    Ok(Command::Collect {
        endpoint: first,
        symbols,
    })
}

// =============================================================================
// Collection
// =============================================================================

async fn collect(config: &ClientConfig, endpoint: &str, symbols: &[String]) -> anyhow::Result<()> {
    let headers = auth_headers(config.credentials.as_ref())?;
    let executor = HttpQueryExecutor::new(config.http_timeout, headers)?;
    let client = MarketDataClient::new(executor, config.data_url.clone());

    let limits = config.pagination.limits;
    let page_token = config.pagination.page_token.clone();

    let stock = StockRequest {
        limits,
        page_token: page_token.clone(),
        ..StockRequest::default()
    };
    let crypto = CryptoRequest {
        limits,
        page_token: page_token.clone(),
        ..CryptoRequest::default()
    };

    let output = match endpoint {
        "trades" => keyed(client.multi_trades(symbols, &stock).await),
        "quotes" => keyed(client.multi_quotes(symbols, &stock).await),
        "bars" => {
            let params = BarsRequest {
                base: stock,
                ..BarsRequest::default()
            };
            keyed(client.multi_bars(symbols, &params).await)
        }
        "auctions" => keyed(client.multi_auctions(symbols, &stock).await),
        "crypto-trades" => keyed(client.crypto_multi_trades(symbols, &crypto).await),
        "crypto-bars" => {
            let params = CryptoBarsRequest {
                base: crypto,
                ..CryptoBarsRequest::default()
            };
            keyed(client.crypto_multi_bars(symbols, &params).await)
        }
        "news" => {
            let params = NewsRequest {
                symbols: symbols.to_vec(),
                limits,
                page_token,
                ..NewsRequest::default()
            };
            flat(client.news(&params).await)
        }
        other => bail!("unknown endpoint: {other}"),
    };

    let output = match output {
        Ok(value) => value,
        Err(e) => {
            if let Some(cursor) = e.resume_cursor() {
                tracing::error!(resume_from = %cursor, "Collection failed");
            }
            return Err(e.into());
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn keyed(result: Result<Accumulated<Value>, PaginationError>) -> Result<Value, PaginationError> {
    let collected = result?;
    tracing::info!(
        records = collected.record_count(),
        keys = collected.per_key.len(),
        "Collection complete"
    );
    Ok(json!({
        "records": collected.per_key,
        "next_page_token": cursor_value(&collected.cursor),
    }))
}

fn flat(result: Result<(Vec<Value>, Cursor), PaginationError>) -> Result<Value, PaginationError> {
    let (records, cursor) = result?;
    tracing::info!(records = records.len(), "Collection complete");
    Ok(json!({
        "records": records,
        "next_page_token": cursor_value(&cursor),
    }))
}

fn cursor_value(cursor: &Cursor) -> Value {
    if cursor.is_empty() {
        Value::Null
    } else {
        Value::String(cursor.to_string())
    }
}

fn auth_headers(credentials: Option<&Credentials>) -> anyhow::Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    if let Some(creds) = credentials {
        headers.insert(
            HeaderName::from_static(API_KEY_HEADER),
            HeaderValue::from_str(creds.api_key()).context("API key is not a valid header")?,
        );
        let mut secret = HeaderValue::from_str(creds.api_secret())
            .context("API secret is not a valid header")?;
        secret.set_sensitive(true);
        headers.insert(HeaderName::from_static(API_SECRET_HEADER), secret);
    }
    Ok(headers)
}

// =============================================================================
// Streaming
// =============================================================================

async fn stream(config: &ClientConfig) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();
    tokio::spawn(await_shutdown(shutdown.clone()));

    let backend = config.backend;
    let ctx = CallContext::with_cancel(shutdown.clone());

    let conn = backend
        .dial(&ctx, &config.stream_url)
        .await
        .inspect_err(|e| metrics::record_stream_error(backend.as_str(), e.kind()))
        .with_context(|| format!("failed to dial {}", config.stream_url))?;

    let monitor = KeepaliveMonitor::new(Arc::clone(&conn), shutdown.child_token());
    let monitor_handle = tokio::spawn(monitor.run());

    let result = read_loop(conn.as_ref(), &ctx).await;

    shutdown.cancel();
    if let Err(e) = conn.close().await {
        tracing::debug!(error = %e, "Close failed");
    }

    match monitor_handle.await {
        Ok(Err(e)) => {
            metrics::record_stream_error(backend.as_str(), e.kind());
            tracing::warn!(error = %e, "Keepalive stopped");
        }
        Err(e) => tracing::warn!(error = %e, "Keepalive task panicked"),
        Ok(Ok(())) => {}
    }

    if let Err(e) = &result {
        metrics::record_stream_error(backend.as_str(), e.kind());
    }

    result.map_err(Into::into)
}

async fn read_loop(
    conn: &dyn Conn,
    ctx: &CallContext,
) -> Result<(), TransportError> {
    let mut messages: u64 = 0;
    loop {
        match conn.read_message(ctx).await {
            Ok(payload) => {
                messages += 1;
                tracing::info!(bytes = payload.len(), messages, "Message received");
            }
            Err(e) if ctx.is_cancelled() => {
                tracing::info!(messages, reason = %e, "Stream stopped");
                return Ok(());
            }
            Err(e) => {
                tracing::error!(error = %e, messages, "Stream failed");
                return Err(e);
            }
        }
    }
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        }
    }

    shutdown_token.cancel();
}
