/// Average True Range (ATR) indicator
///
/// Measures market volatility by calculating the average of true ranges over a period.
/// True Range is the greatest of:
/// - Current High - Current Low
/// - Abs(Current High - Previous Close)
/// - Abs(Current Low - Previous Close)
///
/// Uses Wilder's smoothing (same as RSI and ADX) for the moving average.
/// The series is aligned with the input, first value at index `period`.
pub fn atr_series(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<f64> {
    let n = close.len().min(high.len()).min(low.len());
    if period == 0 || n < period + 1 {
        return vec![0.0];
    }

    let tr = true_ranges(high, low, close, n);
    let mut out = vec![0.0; n];

    // First ATR is simple average of first 'period' true ranges
    let mut atr = tr[1..=period].iter().sum::<f64>() / period as f64;
    out[period] = atr;

    for i in (period + 1)..n {
        atr = (atr * (period as f64 - 1.0) + tr[i]) / period as f64;
        out[i] = atr;
    }

    out
}

/// True range per bar; index 0 has no previous close and stays zero
pub(crate) fn true_ranges(high: &[f64], low: &[f64], close: &[f64], n: usize) -> Vec<f64> {
    let mut tr = vec![0.0; n];
    for i in 1..n {
        let prev_close = close[i - 1];
        tr[i] = (high[i] - low[i])
            .max((high[i] - prev_close).abs())
            .max((low[i] - prev_close).abs());
    }
    tr
}
