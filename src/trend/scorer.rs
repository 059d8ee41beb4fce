//! Per-timeframe trend scoring
//!
//! Reduces the indicator readings of one timeframe to a score in [-3, 3]:
//! - EMA200 sets the baseline direction
//! - EMA20/EMA50 stacking and ADX strength amplify it
//! - squeezes, KDJ extremes, divergences and volume adjust it

use crate::indicators::{
    adx_series, calculate_bollinger, calculate_kdj, calculate_macd, detect_macd_divergence,
    detect_rsi_divergence, ema_series, last, rsi_series, DEFAULT_LOOKBACK,
};
use crate::models::{IndicatorSnapshot, Kline, Timeframe};

/// Bars required before a timeframe can be scored
pub const MIN_BARS: usize = 200;
pub const MAX_SCORE: f64 = 3.0;

const WEAK_ADX: f64 = 20.0;
const SQUEEZE_RATIO: f64 = 0.7;
const BB_WIDTH_LOOKBACK: usize = 50;
const SLOPE_BARS: usize = 3;
const HIGH_VOLUME_RATIO: f64 = 1.2;
const LOW_VOLUME_RATIO: f64 = 0.7;

/// ADX level above which an existing bias is amplified
pub fn adx_threshold(period: Timeframe) -> f64 {
    match period {
        Timeframe::H4 => 22.0,
        Timeframe::M30 => 30.0,
        Timeframe::M15 | Timeframe::H1 => 25.0,
    }
}

/// Score one timeframe's bars
///
/// Returns `(0.0, empty snapshot)` with fewer than `MIN_BARS` bars.
pub fn score_for_period(bars: &[Kline], period: Timeframe) -> (f64, IndicatorSnapshot) {
    if bars.len() < MIN_BARS {
        return (0.0, IndicatorSnapshot::default());
    }

    let n = bars.len();
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let highs: Vec<f64> = bars.iter().map(|b| b.high).collect();
    let lows: Vec<f64> = bars.iter().map(|b| b.low).collect();
    let volumes: Vec<f64> = bars.iter().map(|b| b.volume).collect();

    let ema20 = ema_series(&closes, 20);
    let ema50 = ema_series(&closes, 50);
    let ema200 = ema_series(&closes, 200);
    let adx = adx_series(&highs, &lows, &closes, 14);
    let bb = calculate_bollinger(&closes, 20, 2.0, 2.0);
    let widths = bb.width();
    let kdj = calculate_kdj(&highs, &lows, &closes, 9, 3, 3);
    let macd = calculate_macd(&closes, 12, 26, 9);
    let rsi = rsi_series(&closes, 14);
    let volume_ema = ema_series(&volumes, 20);

    let price = closes[n - 1];
    let width_window = &widths[n - 1 - BB_WIDTH_LOOKBACK..n - 1];
    let bb_width_avg = width_window.iter().sum::<f64>() / BB_WIDTH_LOOKBACK as f64;

    let mut snapshot = IndicatorSnapshot {
        ema20: last(&ema20),
        ema50: last(&ema50),
        ema200: last(&ema200),
        adx: last(&adx),
        bb_upper: last(&bb.upper),
        bb_middle: last(&bb.middle),
        bb_lower: last(&bb.lower),
        bb_width: last(&widths),
        bb_width_avg,
        k: last(&kdj.k),
        d: last(&kdj.d),
        j: last(&kdj.j),
        rsi: last(&rsi),
        macd: last(&macd.macd),
        macd_signal: last(&macd.signal),
        macd_hist: last(&macd.hist),
        last_price: price,
        reasons: Vec::new(),
    };

    let mut score = 0.0;
    let reasons = &mut snapshot.reasons;

    // 1. Baseline: price vs EMA200
    if price > snapshot.ema200 {
        score += if period == Timeframe::H4 { 1.5 } else { 1.0 };
        reasons.push("price above EMA200".to_string());
    } else {
        score -= 1.0;
        reasons.push("price at or below EMA200".to_string());
    }

    // 2. EMA20/EMA50 stacking with matching slopes
    let slope20 = ema20[n - 1] - ema20[n - 1 - SLOPE_BARS];
    let slope50 = ema50[n - 1] - ema50[n - 1 - SLOPE_BARS];
    if snapshot.ema20 > snapshot.ema50 && slope20 > 0.0 && slope50 > 0.0 {
        score += 1.0;
        reasons.push("bullish EMA stacking".to_string());
    } else if snapshot.ema20 < snapshot.ema50 && slope20 < 0.0 && slope50 < 0.0 {
        score -= 1.0;
        reasons.push("bearish EMA stacking".to_string());
    }

    // 3. Trend strength
    let threshold = adx_threshold(period);
    if snapshot.adx > threshold {
        if score > 0.0 {
            score += 1.0;
            reasons.push(format!("ADX {:.1} > {} amplifies bull", snapshot.adx, threshold));
        } else if score < 0.0 {
            score -= 1.0;
            reasons.push(format!("ADX {:.1} > {} amplifies bear", snapshot.adx, threshold));
        } else {
            score -= 0.5;
            reasons.push(format!("ADX {:.1} strong but directionless", snapshot.adx));
        }
    }
    if snapshot.adx < WEAK_ADX {
        score -= 0.5;
        reasons.push(format!("weak trend, ADX {:.1}", snapshot.adx));
    }

    // 4. Bollinger squeeze
    if snapshot.bb_width < SQUEEZE_RATIO * bb_width_avg {
        score -= 0.5;
        reasons.push("Bollinger squeeze".to_string());
    }

    // 5. KDJ crosses and extremes
    if kdj.golden_cross() {
        score += 0.5;
        reasons.push("KDJ golden cross".to_string());
    } else if kdj.dead_cross() {
        score -= 0.5;
        reasons.push("KDJ dead cross".to_string());
    }
    if snapshot.j > 100.0 {
        score -= if period == Timeframe::M30 { 1.0 } else { 0.5 };
        reasons.push(format!("J {:.1} overbought", snapshot.j));
    } else if snapshot.j < 0.0 {
        score += 0.5;
        reasons.push(format!("J {:.1} oversold", snapshot.j));
    }

    // 6. Divergences
    if let Some(div) = detect_macd_divergence(&closes, &macd.macd, DEFAULT_LOOKBACK) {
        score += div.score;
        reasons.push(div.reason);
    }
    if let Some(div) = detect_rsi_divergence(&closes, &rsi, DEFAULT_LOOKBACK) {
        score += div.score;
        reasons.push(div.reason);
    }

    // 7. Volume confirmation
    let last_volume = volumes[n - 1];
    let avg_volume = last(&volume_ema);
    if last_volume > HIGH_VOLUME_RATIO * avg_volume {
        if score > 1.0 {
            score += 0.5;
            reasons.push("volume confirms bull".to_string());
        } else if score < -1.0 {
            score -= 0.5;
            reasons.push("volume confirms bear".to_string());
        }
    } else if last_volume < LOW_VOLUME_RATIO * avg_volume {
        score -= 0.5;
        reasons.push("low volume".to_string());
    }

    (score.clamp(-MAX_SCORE, MAX_SCORE), snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::synthetic::{bars_from_closes, rising_trend_path};
    use chrono::Utc;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn falling_path() -> Vec<f64> {
        (0..300)
            .map(|i| {
                let x = i as f64;
                2000.0 - x - 0.01 * x * x
            })
            .collect()
    }

    fn tail(path: &[f64], n: usize) -> &[f64] {
        &path[path.len() - n..]
    }

    #[test]
    fn test_insufficient_bars() {
        let bars = bars_from_closes(Timeframe::H1, &rising_trend_path()[..199], Utc::now());
        let (score, snapshot) = score_for_period(&bars, Timeframe::H1);
        assert_eq!(score, 0.0);
        assert_eq!(snapshot, IndicatorSnapshot::default());
    }

    #[test]
    fn test_strong_uptrend_scores_max() {
        for period in [Timeframe::M30, Timeframe::H1, Timeframe::H4] {
            let bars = bars_from_closes(period, tail(&rising_trend_path(), 210), Utc::now());
            let (score, snapshot) = score_for_period(&bars, period);

            assert_eq!(score, 3.0, "period {}", period);
            assert!(snapshot.last_price > snapshot.ema200);
            assert!(snapshot.adx > adx_threshold(period));
            assert!(snapshot.reasons.iter().any(|r| r.contains("bullish EMA stacking")));
        }
    }

    #[test]
    fn test_strong_downtrend_scores_min() {
        let bars = bars_from_closes(Timeframe::H4, tail(&falling_path(), 210), Utc::now());
        let (score, snapshot) = score_for_period(&bars, Timeframe::H4);

        assert_eq!(score, -3.0);
        assert!(snapshot.reasons.iter().any(|r| r.contains("bearish EMA stacking")));
        assert!(snapshot.reasons.iter().any(|r| r.contains("amplifies bear")));
    }

    #[test]
    fn test_low_volume_penalty() {
        let mut bars = bars_from_closes(Timeframe::M30, tail(&rising_trend_path(), 210), Utc::now());
        let last = bars.len() - 1;
        bars[last].volume = 100.0;

        let (score, snapshot) = score_for_period(&bars, Timeframe::M30);
        assert_eq!(score, 2.5);
        assert!(snapshot.reasons.iter().any(|r| r == "low volume"));
    }

    #[test]
    fn test_adx_thresholds() {
        assert_eq!(adx_threshold(Timeframe::H4), 22.0);
        assert_eq!(adx_threshold(Timeframe::H1), 25.0);
        assert_eq!(adx_threshold(Timeframe::M15), 25.0);
        assert_eq!(adx_threshold(Timeframe::M30), 30.0);
    }

    #[test]
    fn test_score_always_bounded() {
        for seed in 0..40u64 {
            let mut rng = StdRng::seed_from_u64(seed);
            let volatility = rng.gen_range(0.002..0.05);
            let mut price = 100.0;
            let closes: Vec<f64> = (0..220)
                .map(|_| {
                    price *= 1.0 + rng.gen_range(-volatility..volatility);
                    price
                })
                .collect();
            let mut bars = bars_from_closes(Timeframe::H1, &closes, Utc::now());
            for bar in bars.iter_mut() {
                bar.volume = rng.gen_range(10.0..5000.0);
            }

            for period in Timeframe::ALL {
                let (score, _) = score_for_period(&bars, period);
                assert!(
                    (-MAX_SCORE..=MAX_SCORE).contains(&score),
                    "seed {} period {} score {}",
                    seed,
                    period,
                    score
                );
            }
        }
    }
}
