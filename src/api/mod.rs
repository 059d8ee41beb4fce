pub mod okx;
pub mod synthetic;

pub use okx::OkxClient;
pub use synthetic::SyntheticExchange;

use crate::models::{Kline, Timeframe};
use crate::Result;
use async_trait::async_trait;

/// Instrument family the bars are requested for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TradeType {
    Spot,
    #[default]
    Swap,
}

/// Parameters of one kline fetch
///
/// `start` / `end` are millisecond timestamps; zero means unbounded.
#[derive(Debug, Clone, PartialEq)]
pub struct KlineRequest {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub limit: usize,
    pub start: i64,
    pub end: i64,
    pub trade_type: TradeType,
    pub include_unclosed: bool,
}

impl KlineRequest {
    /// Most recent `limit` bars, including the one still forming
    pub fn latest(symbol: &str, timeframe: Timeframe, limit: usize) -> Self {
        Self {
            symbol: symbol.to_string(),
            timeframe,
            limit,
            start: 0,
            end: 0,
            trade_type: TradeType::Swap,
            include_unclosed: true,
        }
    }
}

/// Source of OHLCV bars
///
/// Implementations return bars oldest first.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    async fn get_klines(&self, request: &KlineRequest) -> Result<Vec<Kline>>;

    fn name(&self) -> &str;
}
