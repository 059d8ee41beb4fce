//! Price / indicator divergence over a lookback window
//!
//! Bottom divergence: the lowest close of the window printed after the lowest
//! indicator reading, below that earlier close, while the indicator held higher.
//! Top divergence mirrors it with maxima.

pub const DEFAULT_LOOKBACK: usize = 30;

#[derive(Debug, Clone, PartialEq)]
pub struct Divergence {
    /// Positive for bottom (bullish) divergence, negative for top (bearish)
    pub score: f64,
    pub reason: String,
}

/// MACD divergence, weighted +/-1.0
pub fn detect_macd_divergence(closes: &[f64], macd: &[f64], lookback: usize) -> Option<Divergence> {
    detect_divergence(closes, macd, lookback, 1.0, "MACD")
}

/// RSI divergence, weighted +/-0.5
pub fn detect_rsi_divergence(closes: &[f64], rsi: &[f64], lookback: usize) -> Option<Divergence> {
    detect_divergence(closes, rsi, lookback, 0.5, "RSI")
}

fn detect_divergence(
    closes: &[f64],
    indicator: &[f64],
    lookback: usize,
    weight: f64,
    label: &str,
) -> Option<Divergence> {
    let n = closes.len().min(indicator.len());
    if n < 2 || lookback < 2 {
        return None;
    }

    let start = n.saturating_sub(lookback);
    let prices = &closes[closes.len() - (n - start)..];
    let values = &indicator[indicator.len() - (n - start)..];

    let price_low = argmin(prices);
    let ind_low = argmin(values);
    if price_low > ind_low && prices[price_low] < prices[ind_low] && values[price_low] > values[ind_low]
    {
        return Some(Divergence {
            score: weight,
            reason: format!("{} bottom divergence", label),
        });
    }

    let price_high = argmax(prices);
    let ind_high = argmax(values);
    if price_high > ind_high
        && prices[price_high] > prices[ind_high]
        && values[price_high] < values[ind_high]
    {
        return Some(Divergence {
            score: -weight,
            reason: format!("{} top divergence", label),
        });
    }

    None
}

/// Index of the smallest value, earliest on ties
fn argmin(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate() {
        if *v < values[best] {
            best = i;
        }
    }
    best
}

/// Index of the largest value, earliest on ties
fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate() {
        if *v > values[best] {
            best = i;
        }
    }
    best
}
