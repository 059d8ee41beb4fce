use crate::error::SignalError;
use crate::models::{Kline, Timeframe};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

type SymbolBars = HashMap<Timeframe, Arc<Vec<Kline>>>;

/// Thread-safe in-memory bar cache
///
/// One sequence per (symbol, timeframe), oldest first. A refresh swaps the whole
/// sequence, so readers holding an `Arc` from `get` keep a stable snapshot.
#[derive(Clone, Default)]
pub struct KlineCache {
    data: Arc<RwLock<HashMap<String, SymbolBars>>>,
}

impl KlineCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the cached bars for a symbol/timeframe
    pub fn replace(&self, symbol: &str, timeframe: Timeframe, bars: Vec<Kline>) -> Result<(), SignalError> {
        let bars = Arc::new(bars);
        let mut data = self
            .data
            .write()
            .map_err(|_| SignalError::LockPoisoned("kline cache"))?;

        data.entry(symbol.to_string())
            .or_default()
            .insert(timeframe, bars);

        Ok(())
    }

    /// Current bars for a symbol/timeframe, `None` if never fetched
    pub fn get(&self, symbol: &str, timeframe: Timeframe) -> Option<Arc<Vec<Kline>>> {
        let data = self.data.read().ok()?;
        data.get(symbol).and_then(|bars| bars.get(&timeframe)).cloned()
    }

    /// Number of cached bars for a symbol/timeframe
    pub fn bar_count(&self, symbol: &str, timeframe: Timeframe) -> usize {
        self.get(symbol, timeframe).map(|bars| bars.len()).unwrap_or(0)
    }

    /// Get all cached symbols
    pub fn symbols(&self) -> Vec<String> {
        match self.data.read() {
            Ok(data) => data.keys().cloned().collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Drop every timeframe for a symbol
    pub fn remove_symbol(&self, symbol: &str) -> Result<(), SignalError> {
        let mut data = self
            .data
            .write()
            .map_err(|_| SignalError::LockPoisoned("kline cache"))?;
        data.remove(symbol);
        Ok(())
    }
}
