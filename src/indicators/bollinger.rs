//! Bollinger Bands: SMA middle band with upper/lower bands at k standard deviations

#[derive(Debug, Clone, PartialEq)]
pub struct BollingerSeries {
    pub upper: Vec<f64>,
    pub middle: Vec<f64>,
    pub lower: Vec<f64>,
}

impl BollingerSeries {
    /// Relative band width `(upper - lower) / middle` per bar
    pub fn width(&self) -> Vec<f64> {
        self.middle
            .iter()
            .zip(self.upper.iter().zip(self.lower.iter()))
            .map(|(&mid, (&up, &lo))| if mid != 0.0 { (up - lo) / mid } else { 0.0 })
            .collect()
    }
}

/// Calculate Bollinger Bands(period, up_mult, down_mult)
///
/// Uses the population standard deviation of the window. Returns single zero
/// series when fewer than `period` closes are available.
pub fn calculate_bollinger(
    closes: &[f64],
    period: usize,
    up_mult: f64,
    down_mult: f64,
) -> BollingerSeries {
    if period == 0 || closes.len() < period {
        return BollingerSeries {
            upper: vec![0.0],
            middle: vec![0.0],
            lower: vec![0.0],
        };
    }

    let n = closes.len();
    let mut upper = vec![0.0; n];
    let mut middle = vec![0.0; n];
    let mut lower = vec![0.0; n];

    for i in (period - 1)..n {
        let window = &closes[i + 1 - period..=i];
        let mean = window.iter().sum::<f64>() / period as f64;
        let variance = window.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / period as f64;
        let std_dev = variance.sqrt();

        middle[i] = mean;
        upper[i] = mean + up_mult * std_dev;
        lower[i] = mean - down_mult * std_dev;
    }

    BollingerSeries {
        upper,
        middle,
        lower,
    }
}
