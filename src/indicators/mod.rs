// Technical indicators module
// Series-in, series-out primitives: EMA, MACD, RSI, ADX, ATR, Bollinger, KDJ, divergence

pub mod adx;
pub mod atr;
pub mod bollinger;
pub mod divergence;
pub mod macd;
pub mod moving_average;
pub mod rsi;
pub mod stochastic;

pub use adx::adx_series;
pub use atr::atr_series;
pub use bollinger::{calculate_bollinger, BollingerSeries};
pub use divergence::{detect_macd_divergence, detect_rsi_divergence, Divergence, DEFAULT_LOOKBACK};
pub use macd::{calculate_macd, MacdSeries};
pub use moving_average::{ema_series, sma_series};
pub use rsi::rsi_series;
pub use stochastic::{calculate_kdj, KdjSeries};

/// Last element of an indicator series, 0.0 for an empty one
pub fn last(series: &[f64]) -> f64 {
    series.last().copied().unwrap_or(0.0)
}
