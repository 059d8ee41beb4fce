use super::composite::calc_scores;
use super::scorer::{score_for_period, MIN_BARS};
use super::state_machine::TrendStateMachine;
use crate::error::SignalError;
use crate::indicators::{atr_series, last};
use crate::market::KlineManager;
use crate::models::{Kline, Timeframe, TrendDirection, TrendState};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Outcome of one fan-out over the active symbols
#[derive(Debug, Default)]
pub struct TrendPass {
    /// Committed states, stamped with each symbol's machine direction
    pub states: Vec<TrendState>,
    pub skipped: usize,
    pub failed: usize,
}

/// Computes trend states from cached bars and owns the per-symbol state machines
pub struct TrendEngine {
    klines: Arc<KlineManager>,
    machines: RwLock<HashMap<String, TrendStateMachine>>,
}

impl TrendEngine {
    pub fn new(klines: Arc<KlineManager>) -> Self {
        Self {
            klines,
            machines: RwLock::new(HashMap::new()),
        }
    }

    fn bars(&self, symbol: &str, timeframe: Timeframe) -> Result<Arc<Vec<Kline>>, SignalError> {
        let bars = self.klines.get(symbol, timeframe).unwrap_or_default();
        if bars.len() < MIN_BARS {
            return Err(SignalError::InsufficientData {
                timeframe,
                have: bars.len(),
                need: MIN_BARS,
            });
        }
        Ok(bars)
    }

    /// Compute a fresh (uncommitted) trend state from the current caches
    ///
    /// Direction is left NEUTRAL; `commit` stamps the machine's direction.
    pub fn compute(&self, symbol: &str) -> Result<TrendState, SignalError> {
        let bars_4h = self.bars(symbol, Timeframe::H4)?;
        let bars_1h = self.bars(symbol, Timeframe::H1)?;
        let bars_30m = self.bars(symbol, Timeframe::M30)?;

        let (s4h, snap_4h) = score_for_period(&bars_4h, Timeframe::H4);
        let (s1h, snap_1h) = score_for_period(&bars_1h, Timeframe::H1);
        let (s30m, snap_30m) = score_for_period(&bars_30m, Timeframe::M30);
        let scores = calc_scores(s4h, s1h, s30m);

        let highs: Vec<f64> = bars_30m.iter().map(|b| b.high).collect();
        let lows: Vec<f64> = bars_30m.iter().map(|b| b.low).collect();
        let closes: Vec<f64> = bars_30m.iter().map(|b| b.close).collect();
        let atr = last(&atr_series(&highs, &lows, &closes, 14));

        let newest = &bars_30m[bars_30m.len() - 1];
        let (adx, rsi) = (snap_30m.adx, snap_30m.rsi);

        let mut indicators = BTreeMap::new();
        indicators.insert(Timeframe::H4, snap_4h);
        indicators.insert(Timeframe::H1, snap_1h);
        indicators.insert(Timeframe::M30, snap_30m);

        Ok(TrendState {
            symbol: symbol.to_string(),
            direction: TrendDirection::Neutral,
            timestamp: newest.settled_time(),
            scores,
            atr,
            adx,
            rsi,
            last_price: newest.close,
            indicators,
        })
    }

    /// Feed a computed state through the symbol's state machine
    pub fn commit(&self, state: TrendState) -> Result<TrendState, SignalError> {
        let mut machines = self
            .machines
            .write()
            .map_err(|_| SignalError::LockPoisoned("trend state machines"))?;

        let machine = machines
            .entry(state.symbol.clone())
            .or_insert_with(|| TrendStateMachine::new(&state.symbol));
        Ok(machine.update(state))
    }

    /// Compute and commit in one step
    pub fn update_symbol(&self, symbol: &str) -> Result<TrendState, SignalError> {
        let state = self.compute(symbol)?;
        self.commit(state)
    }

    /// Most recent committed state for a symbol
    pub fn latest(&self, symbol: &str) -> Option<TrendState> {
        let machines = self.machines.read().ok()?;
        machines.get(symbol).and_then(|m| m.latest().cloned())
    }

    /// Bounded state history for a symbol, oldest first
    pub fn history(&self, symbol: &str) -> Vec<TrendState> {
        match self.machines.read() {
            Ok(machines) => machines.get(symbol).map(|m| m.history()).unwrap_or_default(),
            Err(_) => Vec::new(),
        }
    }

    /// Update every symbol with at most `concurrency` workers in flight
    ///
    /// Returns once all workers have committed.
    pub async fn run_pass(self: &Arc<Self>, symbols: &[String], concurrency: usize) -> TrendPass {
        let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
        let mut tasks = JoinSet::new();

        for symbol in symbols {
            let engine = self.clone();
            let semaphore = semaphore.clone();
            let symbol = symbol.clone();
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let result = engine.update_symbol(&symbol);
                (symbol, result)
            });
        }

        let mut pass = TrendPass::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(state))) => pass.states.push(state),
                Ok((symbol, Err(e))) if e.is_skip() => {
                    tracing::debug!(symbol = %symbol, "Skipping trend update: {}", e);
                    pass.skipped += 1;
                }
                Ok((symbol, Err(e))) => {
                    tracing::warn!(symbol = %symbol, "Trend update failed: {}", e);
                    pass.failed += 1;
                }
                Err(e) => {
                    tracing::error!("Trend worker panicked: {}", e);
                    pass.failed += 1;
                }
            }
        }

        pass
    }
}
