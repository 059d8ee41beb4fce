use crate::models::Timeframe;
use thiserror::Error;

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug, Error)]
pub enum SignalError {
    #[error("insufficient data on {timeframe}: have {have} bars, need {need}")]
    InsufficientData {
        timeframe: Timeframe,
        have: usize,
        need: usize,
    },
    #[error("no crossover on the last two bars")]
    NoSignal,
    #[error("no trend state for {0}")]
    MissingTrendState(String),
    #[error("fetch failed for {symbol} {timeframe}: {message}")]
    Fetch {
        symbol: String,
        timeframe: Timeframe,
        message: String,
    },
    #[error("fetch timed out for {symbol} {timeframe} after {after:?}")]
    Timeout {
        symbol: String,
        timeframe: Timeframe,
        after: std::time::Duration,
    },
    #[error("invalid symbol: {0:?}")]
    InvalidSymbol(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("lock poisoned: {0}")]
    LockPoisoned(&'static str),
    #[error("persistence error: {0}")]
    Persistence(String),
}

impl SignalError {
    /// Conditions the pipeline skips silently for one tick
    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            SignalError::InsufficientData { .. }
                | SignalError::NoSignal
                | SignalError::MissingTrendState(_)
        )
    }
}

impl From<sqlx::Error> for SignalError {
    fn from(e: sqlx::Error) -> Self {
        SignalError::Persistence(e.to_string())
    }
}

impl From<redis::RedisError> for SignalError {
    fn from(e: redis::RedisError) -> Self {
        SignalError::Persistence(e.to_string())
    }
}

impl From<config::ConfigError> for SignalError {
    fn from(e: config::ConfigError) -> Self {
        SignalError::Config(e.to_string())
    }
}
