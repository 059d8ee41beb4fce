use crate::error::SignalError;
use crate::indicators::{atr_series, calculate_macd, ema_series, last, rsi_series};
use crate::models::{CommandType, Kline, Signal, SignalDetails, SignalStatus, Timeframe};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Configuration for signal generation
#[derive(Debug, Clone)]
pub struct SignalConfig {
    pub min_bars: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub rsi_period: usize,
    pub ema_fast_period: usize,
    pub atr_period: usize,
    pub stop_loss_atr: f64,   // SL distance in ATRs
    pub take_profit_atr: f64, // TP distance in ATRs
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            min_bars: 200,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            rsi_period: 14,
            ema_fast_period: 10,
            atr_period: 14,
            stop_loss_atr: 1.5,
            take_profit_atr: 2.25, // 1.5R
        }
    }
}

/// Detects raw entry signals on the 15-minute timeframe from MACD crossovers
#[derive(Debug, Clone, Default)]
pub struct SignalGenerator {
    config: SignalConfig,
}

impl SignalGenerator {
    pub fn new(config: SignalConfig) -> Self {
        Self { config }
    }

    /// Produce a RAW signal from the symbol's 15-minute bars
    ///
    /// Fails with `NoSignal` when the last two bars hold no MACD crossover.
    pub fn generate(&self, symbol: &str, bars: &[Kline]) -> Result<Signal, SignalError> {
        let cfg = &self.config;
        if bars.len() < cfg.min_bars {
            return Err(SignalError::InsufficientData {
                timeframe: Timeframe::M15,
                have: bars.len(),
                need: cfg.min_bars,
            });
        }

        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let highs: Vec<f64> = bars.iter().map(|b| b.high).collect();
        let lows: Vec<f64> = bars.iter().map(|b| b.low).collect();

        let macd = calculate_macd(&closes, cfg.macd_fast, cfg.macd_slow, cfg.macd_signal);
        let rsi = last(&rsi_series(&closes, cfg.rsi_period));
        let ema_fast = last(&ema_series(&closes, cfg.ema_fast_period));
        let atr = last(&atr_series(&highs, &lows, &closes, cfg.atr_period));

        let n = macd.len();
        if n < 2 {
            return Err(SignalError::NoSignal);
        }
        let (prev_macd, prev_signal) = (macd.macd[n - 2], macd.signal[n - 2]);
        let (cur_macd, cur_signal) = (macd.macd[n - 1], macd.signal[n - 1]);

        let command = if prev_macd < prev_signal && cur_macd >= cur_signal {
            CommandType::Buy
        } else if prev_macd > prev_signal && cur_macd <= cur_signal {
            CommandType::Sell
        } else {
            return Err(SignalError::NoSignal);
        };

        let newest = &bars[bars.len() - 1];
        let price = newest.close;

        let (stop_loss, take_profit, score, reason) = match command {
            CommandType::Buy => {
                let mut score = 1.0;
                if rsi > 50.0 {
                    score += 0.5;
                }
                if price > ema_fast {
                    score += 0.5;
                }
                (
                    price - cfg.stop_loss_atr * atr,
                    price + cfg.take_profit_atr * atr,
                    score,
                    format!("MACD golden cross on 15m, RSI {:.1}", rsi),
                )
            }
            _ => {
                let mut score = -1.0;
                if rsi < 50.0 {
                    score -= 0.5;
                }
                if price < ema_fast {
                    score -= 0.5;
                }
                (
                    price + cfg.stop_loss_atr * atr,
                    price - cfg.take_profit_atr * atr,
                    score,
                    format!("MACD dead cross on 15m, RSI {:.1}", rsi),
                )
            }
        };

        let mut high_freq_indicators = BTreeMap::new();
        high_freq_indicators.insert("macd".to_string(), cur_macd);
        high_freq_indicators.insert("macd_signal".to_string(), cur_signal);
        high_freq_indicators.insert("rsi".to_string(), rsi);
        high_freq_indicators.insert("ema_fast".to_string(), ema_fast);
        high_freq_indicators.insert("atr".to_string(), atr);

        tracing::debug!(
            symbol,
            command = %command,
            price,
            score,
            "Raw signal detected"
        );

        Ok(Signal {
            id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            command,
            entry_price: price,
            mark_price: price,
            period: Timeframe::M15,
            status: SignalStatus::Raw,
            timestamp: newest.settled_time(),
            expiry: newest.settled_time() + Timeframe::M15.duration(),
            score,
            details: SignalDetails {
                recommended_sl: stop_loss,
                recommended_tp: take_profit,
                high_freq_indicators,
                reason,
                chart_snapshot_url: None,
                final_score_used: None,
                explanation: None,
            },
        })
    }
}
