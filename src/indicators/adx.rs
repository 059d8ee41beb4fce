//! Average Directional Index (ADX) - Measures trend strength
//!
//! ADX ranges from 0 to 100:
//! - ADX > 25: Strong trend (bull or bear)
//! - ADX 20-25: Moderate trend
//! - ADX < 20: Weak trend / choppy / ranging market

use super::atr::true_ranges;

/// Calculate Wilder's ADX series
///
/// DX is available from index `period`; the first ADX value at `2 * period - 1`
/// is the mean of the first `period` DX readings, later values are Wilder-smoothed.
/// Inputs shorter than `2 * period` return `[0.0]`.
pub fn adx_series(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<f64> {
    let n = close.len().min(high.len()).min(low.len());
    if period == 0 || n < 2 * period {
        return vec![0.0];
    }

    // Step 1: True Range and Directional Movement
    let tr = true_ranges(high, low, close, n);
    let mut plus_dm = vec![0.0; n];
    let mut minus_dm = vec![0.0; n];
    for i in 1..n {
        let up_move = high[i] - high[i - 1];
        let down_move = low[i - 1] - low[i];

        if up_move > down_move && up_move > 0.0 {
            plus_dm[i] = up_move;
        }
        if down_move > up_move && down_move > 0.0 {
            minus_dm[i] = down_move;
        }
    }

    // Step 2: Wilder-smoothed TR / +DM / -DM and the DX series
    let p = period as f64;
    let mut s_tr = tr[1..=period].iter().sum::<f64>() / p;
    let mut s_plus = plus_dm[1..=period].iter().sum::<f64>() / p;
    let mut s_minus = minus_dm[1..=period].iter().sum::<f64>() / p;

    let mut dx = vec![0.0; n];
    dx[period] = directional_index(s_tr, s_plus, s_minus);
    for i in (period + 1)..n {
        s_tr = (s_tr * (p - 1.0) + tr[i]) / p;
        s_plus = (s_plus * (p - 1.0) + plus_dm[i]) / p;
        s_minus = (s_minus * (p - 1.0) + minus_dm[i]) / p;
        dx[i] = directional_index(s_tr, s_plus, s_minus);
    }

    // Step 3: ADX = smoothed DX
    let first = 2 * period - 1;
    let mut out = vec![0.0; n];
    let mut adx = dx[period..=first].iter().sum::<f64>() / p;
    out[first] = adx;
    for i in (first + 1)..n {
        adx = (adx * (p - 1.0) + dx[i]) / p;
        out[i] = adx;
    }

    out
}

fn directional_index(smoothed_tr: f64, smoothed_plus: f64, smoothed_minus: f64) -> f64 {
    if smoothed_tr <= 0.0 {
        return 0.0;
    }

    let plus_di = smoothed_plus / smoothed_tr * 100.0;
    let minus_di = smoothed_minus / smoothed_tr * 100.0;
    let di_sum = plus_di + minus_di;
    if di_sum > 0.0 {
        (plus_di - minus_di).abs() / di_sum * 100.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(bars: &[(f64, f64, f64)]) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
        (
            bars.iter().map(|b| b.0).collect(),
            bars.iter().map(|b| b.1).collect(),
            bars.iter().map(|b| b.2).collect(),
        )
    }

    #[test]
    fn test_adx_strong_uptrend() {
        let bars: Vec<(f64, f64, f64)> = (0..60)
            .map(|i| {
                let c = 100.0 + i as f64 * 3.0;
                (c + 2.0, c - 2.0, c)
            })
            .collect();
        let (h, l, c) = series(&bars);
        let adx = adx_series(&h, &l, &c, 14);

        assert_eq!(adx.len(), 60);
        assert!(adx[59] > 25.0, "ADX should signal a strong trend, got {:.2}", adx[59]);
        assert!((adx[59] - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_adx_choppy_market() {
        let bars: Vec<(f64, f64, f64)> = (0..60)
            .map(|i| {
                let c = if i % 2 == 0 { 100.0 } else { 101.0 };
                (c + 2.0, c - 2.0, c)
            })
            .collect();
        let (h, l, c) = series(&bars);
        let adx = adx_series(&h, &l, &c, 14);

        assert!(adx[59] < 20.0, "ADX should be low in chop, got {:.2}", adx[59]);
    }

    #[test]
    fn test_adx_warm_up_zero_filled() {
        let bars: Vec<(f64, f64, f64)> = (0..40)
            .map(|i| {
                let c = 50.0 + i as f64;
                (c + 1.0, c - 1.0, c)
            })
            .collect();
        let (h, l, c) = series(&bars);
        let adx = adx_series(&h, &l, &c, 14);
        assert_eq!(adx[26], 0.0);
        assert!(adx[27] > 0.0);
    }

    #[test]
    fn test_adx_insufficient_data() {
        let bars = vec![(102.0, 99.0, 101.0), (105.0, 100.0, 104.0)];
        let (h, l, c) = series(&bars);
        assert_eq!(adx_series(&h, &l, &c, 14), vec![0.0]);
    }
}
