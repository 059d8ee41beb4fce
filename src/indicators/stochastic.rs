//! Stochastic oscillator in its KDJ form
//!
//! Raw %K = (close - lowest low) / (highest high - lowest low) * 100 over `period`
//! bars, K = SMA(raw %K, k_smooth), D = SMA(K, d_smooth), J = 3K - 2D.

use super::moving_average::sma_series;

#[derive(Debug, Clone, PartialEq)]
pub struct KdjSeries {
    pub k: Vec<f64>,
    pub d: Vec<f64>,
    pub j: Vec<f64>,
}

impl KdjSeries {
    fn empty() -> Self {
        Self {
            k: vec![0.0],
            d: vec![0.0],
            j: vec![0.0],
        }
    }

    /// K crossed above D between the last two bars
    pub fn golden_cross(&self) -> bool {
        let n = self.k.len();
        n >= 2 && self.k[n - 2] < self.d[n - 2] && self.k[n - 1] >= self.d[n - 1]
    }

    /// K crossed below D between the last two bars
    pub fn dead_cross(&self) -> bool {
        let n = self.k.len();
        n >= 2 && self.k[n - 2] > self.d[n - 2] && self.k[n - 1] <= self.d[n - 1]
    }
}

/// Calculate KDJ(period, k_smooth, d_smooth)
///
/// Needs `period + k_smooth + d_smooth - 2` bars. A flat window reads raw %K = 50.
pub fn calculate_kdj(
    high: &[f64],
    low: &[f64],
    close: &[f64],
    period: usize,
    k_smooth: usize,
    d_smooth: usize,
) -> KdjSeries {
    let n = close.len().min(high.len()).min(low.len());
    if period == 0 || k_smooth == 0 || d_smooth == 0 || n < period + k_smooth + d_smooth - 2 {
        return KdjSeries::empty();
    }

    let raw_start = period - 1;
    let raw_k: Vec<f64> = (raw_start..n)
        .map(|i| {
            let window = i + 1 - period..=i;
            let highest = high[window.clone()]
                .iter()
                .cloned()
                .fold(f64::NEG_INFINITY, f64::max);
            let lowest = low[window].iter().cloned().fold(f64::INFINITY, f64::min);
            let range = highest - lowest;
            if range > 0.0 {
                (close[i] - lowest) / range * 100.0
            } else {
                50.0
            }
        })
        .collect();

    let k_tail = sma_series(&raw_k, k_smooth);
    let d_tail = sma_series(&k_tail[k_smooth - 1..], d_smooth);

    let k_start = raw_start + k_smooth - 1;
    let d_start = k_start + d_smooth - 1;

    let mut k = vec![0.0; n];
    let mut d = vec![0.0; n];
    let mut j = vec![0.0; n];
    for i in k_start..n {
        k[i] = k_tail[i - raw_start];
    }
    for i in d_start..n {
        d[i] = d_tail[i - k_start];
        j[i] = 3.0 * k[i] - 2.0 * d[i];
    }

    KdjSeries { k, d, j }
}
