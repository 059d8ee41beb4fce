use crate::models::{CommandType, Signal, SignalStatus, TrendDirection, TrendState};

/// Outcome of running a raw signal through the tree
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub passed: bool,
    pub reason: String,
}

impl Decision {
    fn approve(reason: String) -> Self {
        Self { passed: true, reason }
    }

    fn reject(reason: String) -> Self {
        Self { passed: false, reason }
    }
}

/// Gates raw signals against the symbol's current trend state
#[derive(Debug, Clone, Copy)]
pub struct DecisionTree {
    /// |final_score| a BUY/SELL needs to be approved
    pub open_threshold: f64,
    /// Half-width of the neutral band around zero
    pub close_threshold: f64,
}

impl Default for DecisionTree {
    fn default() -> Self {
        Self {
            open_threshold: 2.0,
            close_threshold: 1.0,
        }
    }
}

impl DecisionTree {
    pub fn new(open_threshold: f64, close_threshold: f64) -> Self {
        Self {
            open_threshold,
            close_threshold,
        }
    }

    /// First matching rule wins. Never touches the signal.
    pub fn evaluate(&self, signal: &Signal, trend: &TrendState) -> Decision {
        let final_score = trend.scores.final_score;
        let direction = trend.direction;

        if direction == TrendDirection::Neutral {
            return Decision::reject(format!("no trend: direction {}", direction));
        }

        match signal.command {
            CommandType::Buy => {
                if final_score < self.open_threshold {
                    return Decision::reject(format!(
                        "weak BUY: final score {:.2} < {:.2}",
                        final_score, self.open_threshold
                    ));
                }
                if direction == TrendDirection::Up {
                    return Decision::approve(format!(
                        "BUY approved: trend UP, final score {:.2}",
                        final_score
                    ));
                }
                if direction == TrendDirection::Down {
                    return Decision::reject("BUY against DOWN trend".to_string());
                }
            }
            CommandType::Sell => {
                if final_score > -self.open_threshold {
                    return Decision::reject(format!(
                        "weak SELL: final score {:.2} > {:.2}",
                        final_score, -self.open_threshold
                    ));
                }
                if direction == TrendDirection::Down {
                    return Decision::approve(format!(
                        "SELL approved: trend DOWN, final score {:.2}",
                        final_score
                    ));
                }
                if direction == TrendDirection::Up {
                    return Decision::reject("SELL against UP trend".to_string());
                }
            }
            _ => {}
        }

        if final_score > -self.close_threshold && final_score < self.close_threshold {
            return Decision::reject(format!(
                "final score {:.2} in neutral zone (+/-{:.2})",
                final_score, self.close_threshold
            ));
        }

        Decision::reject(format!(
            "unmatched: {} with trend {} at final score {:.2}",
            signal.command, direction, final_score
        ))
    }

    /// Stamp an approved signal with the trend context it was approved under
    pub fn enrich(&self, mut signal: Signal, trend: &TrendState, decision: &Decision) -> Signal {
        let scores = &trend.scores;
        signal.details.final_score_used = Some(scores.final_score);
        signal.details.explanation = Some(format!(
            "{} | 4h {:+.2} 1h {:+.2} 30m {:+.2} final {:+.2}",
            decision.reason, scores.score_4h, scores.score_1h, scores.score_30m, scores.final_score
        ));
        signal.status = SignalStatus::Active;
        signal
    }

    /// Evaluate and, on approval, return the enriched ACTIVE signal
    pub fn filter(&self, signal: Signal, trend: &TrendState) -> Result<Signal, Decision> {
        let decision = self.evaluate(&signal, trend);
        if !decision.passed {
            return Err(decision);
        }
        Ok(self.enrich(signal, trend, &decision))
    }
}
