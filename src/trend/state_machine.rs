use crate::models::{TrendDirection, TrendState};
use std::collections::VecDeque;

/// |final_score| needed to enter (or stay in) a trend
pub const STRONG_THRESHOLD: f64 = 1.8;
/// Move against the current trend that flags a reversal
pub const WEAK_THRESHOLD: f64 = 0.5;
pub const HISTORY_LEN: usize = 14;

/// Per-symbol trend automaton with a bounded history of states
#[derive(Debug, Clone)]
pub struct TrendStateMachine {
    symbol: String,
    current: TrendDirection,
    history: VecDeque<TrendState>,
}

impl TrendStateMachine {
    pub fn new(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            current: TrendDirection::Neutral,
            history: VecDeque::with_capacity(HISTORY_LEN),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn current(&self) -> TrendDirection {
        self.current
    }

    /// Direction after applying one composite reading to `current`
    pub fn next_direction(current: TrendDirection, final_score: f64, trend_score: f64) -> TrendDirection {
        if final_score >= STRONG_THRESHOLD && trend_score >= WEAK_THRESHOLD {
            return TrendDirection::Up;
        }
        if final_score <= -STRONG_THRESHOLD && trend_score <= -WEAK_THRESHOLD {
            return TrendDirection::Down;
        }
        if current == TrendDirection::Up && final_score <= -WEAK_THRESHOLD {
            return TrendDirection::Reversal;
        }
        if current == TrendDirection::Down && final_score >= WEAK_THRESHOLD {
            return TrendDirection::Reversal;
        }
        if current != TrendDirection::Neutral && final_score.abs() < STRONG_THRESHOLD {
            return TrendDirection::Neutral;
        }
        current
    }

    /// Advance on a freshly computed state, stamp it with the machine's
    /// direction and append it to the history
    pub fn update(&mut self, mut state: TrendState) -> TrendState {
        self.current = Self::next_direction(
            self.current,
            state.scores.final_score,
            state.scores.trend_score,
        );
        state.direction = self.current;

        if self.history.len() == HISTORY_LEN {
            self.history.pop_front();
        }
        self.history.push_back(state.clone());

        if self.current != TrendDirection::Neutral {
            tracing::debug!(
                symbol = %self.symbol,
                direction = %self.current,
                final_score = state.scores.final_score,
                "Trend state updated"
            );
        }

        state
    }

    pub fn latest(&self) -> Option<&TrendState> {
        self.history.back()
    }

    /// History oldest first
    pub fn history(&self) -> Vec<TrendState> {
        self.history.iter().cloned().collect()
    }
}
