use super::{ExchangeClient, KlineRequest};
use crate::error::SignalError;
use crate::models::{Kline, Timeframe};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, DurationRound, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

const BASE_VOLUME: f64 = 1_000.0;
const BAR_SPREAD: f64 = 2.0;

/// Deterministic in-process exchange
///
/// Serves a fixed close path per timeframe (the same for every symbol). The
/// last bar of each path closes at the anchor, or at the latest boundary of
/// its timeframe when no anchor is set. With a forming clock the last bar is
/// the unconfirmed one still open at that instant, as OKX serves it.
pub struct SyntheticExchange {
    paths: HashMap<Timeframe, Vec<f64>>,
    anchor: Option<DateTime<Utc>>,
    forming_at: Option<DateTime<Utc>>,
    delay: Option<std::time::Duration>,
    failing: RwLock<HashSet<String>>,
    requests: AtomicUsize,
}

impl SyntheticExchange {
    pub fn with_paths(paths: HashMap<Timeframe, Vec<f64>>, anchor: Option<DateTime<Utc>>) -> Self {
        Self {
            paths,
            anchor,
            forming_at: None,
            delay: None,
            failing: RwLock::new(HashSet::new()),
            requests: AtomicUsize::new(0),
        }
    }

    /// Accelerating uptrend on 30m/1h/4h and an entry series on 15m
    pub fn rising(anchor: Option<DateTime<Utc>>) -> Self {
        let trend = rising_trend_path();
        let mut paths = HashMap::new();
        paths.insert(Timeframe::H4, trend.clone());
        paths.insert(Timeframe::H1, trend.clone());
        paths.insert(Timeframe::M30, trend);
        paths.insert(Timeframe::M15, golden_cross_path());
        Self::with_paths(paths, anchor)
    }

    /// Seeded random walk on every timeframe
    pub fn random_walk(seed: u64, bars: usize, anchor: Option<DateTime<Utc>>) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut paths = HashMap::new();

        for tf in Timeframe::ALL {
            let mut price = 150.0;
            let path: Vec<f64> = (0..bars)
                .map(|_| {
                    // ±1% steps with a slight upward drift
                    price *= 1.0 + rng.gen_range(-0.01..0.0105);
                    price
                })
                .collect();
            paths.insert(tf, path);
        }

        Self::with_paths(paths, anchor)
    }

    /// End every path on the bar still forming at `now`
    pub fn with_forming_bar(mut self, now: DateTime<Utc>) -> Self {
        self.forming_at = Some(now);
        self
    }

    /// Hold every response back by `delay`
    pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Make every request for `symbol` fail until cleared
    pub fn fail_symbol(&self, symbol: &str) {
        if let Ok(mut failing) = self.failing.write() {
            failing.insert(symbol.to_string());
        }
    }

    pub fn clear_failures(&self) {
        if let Ok(mut failing) = self.failing.write() {
            failing.clear();
        }
    }

    /// Number of `get_klines` calls served so far
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    fn last_close_time(&self, timeframe: Timeframe) -> Result<DateTime<Utc>> {
        if let Some(now) = self.forming_at {
            return Ok(now.duration_trunc(timeframe.duration())? + timeframe.duration());
        }
        match self.anchor {
            Some(anchor) => Ok(anchor),
            None => Ok(Utc::now().duration_trunc(timeframe.duration())?),
        }
    }

    fn build_bars(&self, timeframe: Timeframe, path: &[f64], limit: usize) -> Result<Vec<Kline>> {
        let last_close = self.last_close_time(timeframe)?;
        let start = path.len().saturating_sub(limit);
        let mut bars = bars_from_closes(timeframe, &path[start..], last_close);
        if start > 0 && !bars.is_empty() {
            bars[0].open = path[start - 1];
            bars[0].high = bars[0].high.max(bars[0].open + BAR_SPREAD);
            bars[0].low = bars[0].low.min(bars[0].open - BAR_SPREAD);
        }
        if self.forming_at.is_some() {
            if let Some(newest) = bars.last_mut() {
                newest.confirmed = false;
            }
        }
        Ok(bars)
    }
}

/// 300 closes: 100 + i + 0.01 * i^2, rising faster over time
pub fn rising_trend_path() -> Vec<f64> {
    (0..300)
        .map(|i| {
            let x = i as f64;
            100.0 + x + 0.01 * x * x
        })
        .collect()
}

/// 210 rising closes whose pace stalls long enough for MACD to drop under its
/// signal line, then a final jump that crosses it back up on the last bar
pub fn golden_cross_path() -> Vec<f64> {
    let mut path = Vec::with_capacity(210);
    let mut price = 100.0;
    for _ in 0..188 {
        path.push(price);
        price += 1.0;
    }
    for _ in 0..21 {
        path.push(price);
        price += 0.1;
    }
    path.push(price + 50.0);
    path
}

/// Bars for a close path, the last one closing at `last_close`
///
/// Each bar opens at the previous close and spans it by `BAR_SPREAD` on both sides.
pub fn bars_from_closes(timeframe: Timeframe, closes: &[f64], last_close: DateTime<Utc>) -> Vec<Kline> {
    let count = closes.len();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i > 0 { closes[i - 1] } else { close };
            let bars_back = (count - 1 - i) as i32;
            Kline {
                timeframe,
                close_time: last_close - timeframe.duration() * bars_back,
                open,
                high: open.max(close) + BAR_SPREAD,
                low: open.min(close) - BAR_SPREAD,
                close,
                volume: BASE_VOLUME,
                confirmed: true,
            }
        })
        .collect()
}

#[async_trait]
impl ExchangeClient for SyntheticExchange {
    async fn get_klines(&self, request: &KlineRequest) -> Result<Vec<Kline>> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let failing = self
            .failing
            .read()
            .map(|f| f.contains(&request.symbol))
            .unwrap_or(false);
        if failing {
            return Err(SignalError::Fetch {
                symbol: request.symbol.clone(),
                timeframe: request.timeframe,
                message: "synthetic failure".to_string(),
            }
            .into());
        }

        match self.paths.get(&request.timeframe) {
            Some(path) => self.build_bars(request.timeframe, path, request.limit),
            None => Ok(Vec::new()),
        }
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}

impl std::fmt::Debug for SyntheticExchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyntheticExchange")
            .field("timeframes", &self.paths.len())
            .field("anchor", &self.anchor)
            .field("forming_at", &self.forming_at)
            .finish()
    }
}
