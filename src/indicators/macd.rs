//! Moving Average Convergence Divergence
//!
//! MACD line = EMA(fast) - EMA(slow), signal = EMA(signal) of the MACD line,
//! histogram = MACD - signal. All three series are aligned with the input.
use super::moving_average::ema_series;

#[derive(Debug, Clone, PartialEq)]
pub struct MacdSeries {
    pub macd: Vec<f64>,
    pub signal: Vec<f64>,
    pub hist: Vec<f64>,
}

impl MacdSeries {
    fn empty() -> Self {
        Self {
            macd: vec![0.0],
            signal: vec![0.0],
            hist: vec![0.0],
        }
    }

    pub fn len(&self) -> usize {
        self.macd.len()
    }

    pub fn is_empty(&self) -> bool {
        self.macd.is_empty()
    }
}

/// Calculate MACD(fast, slow, signal) over closing prices
///
/// Needs `slow + signal - 1` closes; shorter inputs return single zero series.
pub fn calculate_macd(closes: &[f64], fast: usize, slow: usize, signal: usize) -> MacdSeries {
    if fast == 0 || slow <= fast || signal == 0 || closes.len() < slow + signal - 1 {
        return MacdSeries::empty();
    }

    let n = closes.len();
    let ema_fast = ema_series(closes, fast);
    let ema_slow = ema_series(closes, slow);

    let mut macd = vec![0.0; n];
    for i in (slow - 1)..n {
        macd[i] = ema_fast[i] - ema_slow[i];
    }

    // Signal line only runs over the valid part of the MACD line
    let offset = slow - 1;
    let signal_tail = ema_series(&macd[offset..], signal);
    let first_valid = offset + signal - 1;

    let mut signal_line = vec![0.0; n];
    let mut hist = vec![0.0; n];
    for i in first_valid..n {
        signal_line[i] = signal_tail[i - offset];
        hist[i] = macd[i] - signal_line[i];
    }

    MacdSeries {
        macd,
        signal: signal_line,
        hist,
    }
}
