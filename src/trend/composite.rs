//! Multi-timeframe composite of the per-period scores

use crate::models::TrendScores;

/// Market regime read from the signs of the three period scores
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Regime {
    /// 30m and 4h point opposite ways; 1h arbitrates
    CrossCurrent,
    /// All three agree; ride the trend
    Aligned,
    /// 30m and 1h agree on a direction against 4h; a new trend may be forming
    Forming,
    Default,
}

impl Regime {
    pub fn detect(s4h: f64, s1h: f64, s30m: f64) -> Self {
        let (sign4h, sign1h, sign30) = (sign(s4h), sign(s1h), sign(s30m));

        if sign30 != 0 && sign4h != 0 && sign30 == -sign4h {
            Regime::CrossCurrent
        } else if sign4h != 0 && sign4h == sign1h && sign1h == sign30 {
            Regime::Aligned
        } else if sign1h != 0 && sign30 == sign1h && sign1h != sign4h {
            Regime::Forming
        } else {
            Regime::Default
        }
    }

    /// (w4h, w1h, w30m) before normalization
    pub fn raw_weights(&self) -> (f64, f64, f64) {
        match self {
            Regime::CrossCurrent => (0.3, 0.4, 0.3),
            Regime::Aligned => (0.5, 0.3, 0.2),
            Regime::Forming => (0.2, 0.4, 0.4),
            Regime::Default => (0.4, 0.3, 0.3),
        }
    }

    /// Weights scaled to sum to 1
    pub fn weights(&self) -> (f64, f64, f64) {
        let (w4h, w1h, w30) = self.raw_weights();
        let total = w4h + w1h + w30;
        (w4h / total, w1h / total, w30 / total)
    }
}

fn sign(x: f64) -> i8 {
    if x > 0.0 {
        1
    } else if x < 0.0 {
        -1
    } else {
        0
    }
}

/// Combine the period scores into trend and final scores
pub fn calc_scores(s4h: f64, s1h: f64, s30m: f64) -> TrendScores {
    let trend_score = 0.7 * s4h + 0.3 * s1h;
    let (w4h, w1h, w30) = Regime::detect(s4h, s1h, s30m).weights();
    let final_score = w4h * s4h + w1h * s1h + w30 * s30m;

    TrendScores {
        score_30m: s30m,
        score_1h: s1h,
        score_4h: s4h,
        trend_score,
        final_score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_cross_regime_composite() {
        let scores = calc_scores(2.0, 1.5, -1.5);

        assert_eq!(Regime::detect(2.0, 1.5, -1.5), Regime::CrossCurrent);
        let (w4h, w1h, w30) = Regime::CrossCurrent.weights();
        assert!((w4h - 0.3).abs() < 1e-12);
        assert!((w1h - 0.4).abs() < 1e-12);
        assert!((w30 - 0.3).abs() < 1e-12);

        // 0.3 * 2 + 0.4 * 1.5 - 0.3 * 1.5
        assert!((scores.final_score - 0.75).abs() < 1e-9);
        assert!((scores.trend_score - 1.85).abs() < 1e-9);
        // Inside the default neutral band (+/-1.0) the decision tree rejects
        assert!(scores.final_score.abs() < 1.0);
    }

    #[test]
    fn test_regime_detection() {
        assert_eq!(Regime::detect(2.0, 1.0, 0.5), Regime::Aligned);
        assert_eq!(Regime::detect(-2.0, -1.0, -0.5), Regime::Aligned);
        assert_eq!(Regime::detect(-1.0, 1.0, 1.0), Regime::CrossCurrent);
        assert_eq!(Regime::detect(0.0, 1.0, 1.0), Regime::Forming);
        assert_eq!(Regime::detect(1.0, -1.0, -0.5), Regime::CrossCurrent);
        assert_eq!(Regime::detect(1.0, -1.0, 0.0), Regime::Default);
        assert_eq!(Regime::detect(0.0, 0.0, 0.0), Regime::Default);
    }

    #[test]
    fn test_flat_short_periods_are_not_forming() {
        // Two flat readings do not agree on a direction
        assert_eq!(Regime::detect(1.0, 0.0, 0.0), Regime::Default);
        assert_eq!(Regime::detect(-2.0, 0.0, 0.0), Regime::Default);

        // Default weights (0.4, 0.3, 0.3): only 4h contributes
        let scores = calc_scores(1.0, 0.0, 0.0);
        assert!((scores.final_score - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_aligned_weights() {
        let scores = calc_scores(3.0, 3.0, 3.0);
        assert!((scores.final_score - 3.0).abs() < 1e-9);
        assert!((scores.trend_score - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_weights_sum_to_one_and_final_bounded() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..1_000 {
            let s4h = (rng.gen_range(-6..=6) as f64) * 0.5;
            let s1h = (rng.gen_range(-6..=6) as f64) * 0.5;
            let s30 = (rng.gen_range(-6..=6) as f64) * 0.5;

            let (w4h, w1h, w30) = Regime::detect(s4h, s1h, s30).weights();
            assert!((w4h + w1h + w30 - 1.0).abs() < 1e-9);

            let scores = calc_scores(s4h, s1h, s30);
            let max_abs = s4h.abs().max(s1h.abs()).max(s30.abs());
            assert!(scores.final_score.abs() <= max_abs + 1e-9);
            assert!(scores.final_score.abs() <= 3.0 + 1e-9);
        }
    }
}
