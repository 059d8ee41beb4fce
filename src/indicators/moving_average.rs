//! Moving averages over a price (or volume) series
//!
//! Both functions return a series aligned with the input: index `i` holds the
//! average ending at bar `i`, the warm-up prefix is zero-filled. Inputs shorter
//! than `period` yield `[0.0]`.

/// Simple Moving Average series
pub fn sma_series(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || values.len() < period {
        return vec![0.0];
    }

    let mut out = vec![0.0; values.len()];
    let mut window_sum: f64 = values[..period].iter().sum();
    out[period - 1] = window_sum / period as f64;

    for i in period..values.len() {
        window_sum += values[i] - values[i - period];
        out[i] = window_sum / period as f64;
    }

    out
}

/// Exponential Moving Average series, alpha = 2 / (period + 1)
///
/// Seeded with the SMA of the first `period` values.
pub fn ema_series(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || values.len() < period {
        return vec![0.0];
    }

    let multiplier = 2.0 / (period as f64 + 1.0);
    let mut out = vec![0.0; values.len()];

    let mut ema = values[..period].iter().sum::<f64>() / period as f64;
    out[period - 1] = ema;

    for i in period..values.len() {
        ema = (values[i] - ema) * multiplier + ema;
        out[i] = ema;
    }

    out
}
