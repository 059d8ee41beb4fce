use super::{ExchangeClient, KlineRequest, TradeType};
use crate::config::ExchangeConfig;
use crate::error::SignalError;
use crate::models::{Kline, Timeframe};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::DateTime;
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde::Deserialize;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

const CANDLES_PATH: &str = "/api/v5/market/candles";
const MAX_LIMIT: usize = 300;
const MAX_RETRIES: u32 = 3;

type OkxRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// OKX REST client for market data
///
/// Cloneable; all clones share the same rate limiter.
#[derive(Clone)]
pub struct OkxClient {
    client: Client,
    base_url: String,
    api_key: String,
    passphrase: String,
    rate_limiter: Arc<OkxRateLimiter>,
}

/// Envelope of every OKX v5 response
#[derive(Debug, Deserialize)]
struct OkxResponse {
    code: String,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    data: Vec<Vec<String>>,
}

impl OkxClient {
    pub fn new(config: &ExchangeConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        let per_second = NonZeroU32::new(config.requests_per_second)
            .context("requests_per_second must be positive")?;
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_second(per_second)));

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            passphrase: config.passphrase.clone(),
            rate_limiter,
        })
    }

    fn bar_code(timeframe: Timeframe) -> &'static str {
        match timeframe {
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1H",
            Timeframe::H4 => "4H",
        }
    }

    fn inst_id(request: &KlineRequest) -> String {
        match request.trade_type {
            TradeType::Swap => request.symbol.clone(),
            TradeType::Spot => request
                .symbol
                .strip_suffix("-SWAP")
                .unwrap_or(&request.symbol)
                .to_string(),
        }
    }

    fn query(request: &KlineRequest) -> Vec<(&'static str, String)> {
        let mut query = vec![
            ("instId", Self::inst_id(request)),
            ("bar", Self::bar_code(request.timeframe).to_string()),
            ("limit", request.limit.clamp(1, MAX_LIMIT).to_string()),
        ];
        // OKX paginates backwards: `after` returns older rows, `before` newer ones
        if request.end > 0 {
            query.push(("after", request.end.to_string()));
        }
        if request.start > 0 {
            query.push(("before", request.start.to_string()));
        }
        query
    }

    /// Rate-limited GET with retry on 429 and 5xx
    async fn fetch(&self, request: &KlineRequest) -> Result<OkxResponse> {
        let url = format!("{}{}", self.base_url, CANDLES_PATH);
        let query = Self::query(request);

        for attempt in 1..=MAX_RETRIES {
            self.rate_limiter.until_ready().await;

            let mut builder = self.client.get(&url).query(&query);
            if !self.api_key.is_empty() {
                builder = builder
                    .header("OK-ACCESS-KEY", &self.api_key)
                    .header("OK-ACCESS-PASSPHRASE", &self.passphrase);
            }

            match builder.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response
                            .json::<OkxResponse>()
                            .await
                            .context("Failed to parse OKX candles response");
                    }

                    if (status.as_u16() == 429 || status.is_server_error()) && attempt < MAX_RETRIES {
                        let backoff = Duration::from_millis(250 * 2u64.pow(attempt));
                        tracing::warn!(
                            "OKX returned {}, retrying in {:?} (attempt {}/{})",
                            status,
                            backoff,
                            attempt,
                            MAX_RETRIES
                        );
                        tokio::time::sleep(backoff).await;
                        continue;
                    }

                    let error_text = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "Unknown error".to_string());
                    anyhow::bail!("OKX API error ({}): {}", status, error_text);
                }
                Err(e) if attempt < MAX_RETRIES && !e.is_timeout() => {
                    let backoff = Duration::from_millis(250 * 2u64.pow(attempt));
                    tracing::warn!("Network error: {}, retrying in {:?}", e, backoff);
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => anyhow::bail!("Network error talking to OKX: {}", e),
            }
        }

        anyhow::bail!("Failed after {} retries", MAX_RETRIES)
    }

    async fn candles(&self, request: &KlineRequest) -> Result<Vec<Kline>> {
        let response = self.fetch(request).await?;
        if response.code != "0" {
            anyhow::bail!("OKX error code {}: {}", response.code, response.msg);
        }

        let mut klines = Vec::with_capacity(response.data.len());
        // Rows arrive newest first
        for row in response.data.iter().rev() {
            let kline = parse_row(row, request.timeframe)?;
            if kline.confirmed || request.include_unclosed {
                klines.push(kline);
            }
        }

        Ok(klines)
    }
}

/// `[ts, o, h, l, c, vol, volCcy, volCcyQuote, confirm]`
fn parse_row(row: &[String], timeframe: Timeframe) -> Result<Kline> {
    if row.len() < 6 {
        anyhow::bail!("Malformed candle row with {} fields", row.len());
    }

    let field = |i: usize, name: &str| -> Result<f64> {
        row[i]
            .parse::<f64>()
            .with_context(|| format!("Invalid {} value {:?}", name, row[i]))
    };

    let open_ms: i64 = row[0]
        .parse()
        .with_context(|| format!("Invalid timestamp {:?}", row[0]))?;
    let open_time = DateTime::from_timestamp_millis(open_ms)
        .with_context(|| format!("Timestamp out of range: {}", open_ms))?;

    Ok(Kline {
        timeframe,
        close_time: open_time + timeframe.duration(),
        open: field(1, "open")?,
        high: field(2, "high")?,
        low: field(3, "low")?,
        close: field(4, "close")?,
        volume: field(5, "volume")?,
        confirmed: row.get(8).map(|c| c == "1").unwrap_or(true),
    })
}

#[async_trait]
impl ExchangeClient for OkxClient {
    async fn get_klines(&self, request: &KlineRequest) -> crate::Result<Vec<Kline>> {
        self.candles(request).await.map_err(|e| {
            SignalError::Fetch {
                symbol: request.symbol.clone(),
                timeframe: request.timeframe,
                message: format!("{:#}", e),
            }
            .into()
        })
    }

    fn name(&self) -> &str {
        "okx"
    }
}
