//! Stage orchestration
//!
//! Three long-lived tasks connected by capacity-1 tick channels:
//! kline scheduler -> trend loop -> signal loop. Each stage fans out
//! per-symbol work under a semaphore and drops ticks it cannot accept.

use crate::config::AppConfig;
use crate::error::SignalError;
use crate::market::kline_manager::emit;
use crate::market::{KlineManager, UpdateTick};
use crate::models::{Signal, SignalRecord, Timeframe, TrendState};
use crate::persistence::{RedisTrendCache, SignalStore};
use crate::strategy::{Decision, DecisionTree, SignalGenerator};
use crate::trend::{TrendEngine, TrendPass};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::{JoinHandle, JoinSet};

const TICK_CHANNEL_CAPACITY: usize = 1;

/// Raw signal score magnitude a premium signal must exceed
const PREMIUM_SIGNAL_SCORE: f64 = 1.0;
/// 1h and 4h score magnitude a premium signal must exceed
const PREMIUM_PERIOD_SCORE: f64 = 2.0;

/// Premium: strong raw signal backed by strong 1h and 4h trends
pub fn is_premium(signal: &Signal, trend: &TrendState) -> bool {
    signal.score.abs() > PREMIUM_SIGNAL_SCORE
        && trend.scores.score_1h.abs() > PREMIUM_PERIOD_SCORE
        && trend.scores.score_4h.abs() > PREMIUM_PERIOD_SCORE
}

/// What the signal stage concluded for one symbol
#[derive(Debug)]
pub enum Verdict {
    Approved(Box<SignalRecord>),
    Rejected(Decision),
    /// Already approved on this bar in an earlier pass
    Duplicate,
}

/// Outcome of one signal fan-out
#[derive(Debug, Default)]
pub struct SignalPass {
    /// Records persisted during this pass
    pub approved: Vec<SignalRecord>,
    pub rejected: usize,
    pub skipped: usize,
    pub failed: usize,
    pub expired: u64,
}

/// Join handles of the spawned stage loops
pub struct PipelineTasks {
    pub klines: JoinHandle<()>,
    pub trend: JoinHandle<()>,
    pub signals: JoinHandle<()>,
}

/// Owns the stages and the channels between them
pub struct Pipeline {
    klines: Arc<KlineManager>,
    trend: Arc<TrendEngine>,
    generator: SignalGenerator,
    decision: DecisionTree,
    store: Arc<dyn SignalStore>,
    trend_cache: Option<RedisTrendCache>,
    trend_concurrency: usize,
    signal_concurrency: usize,
    /// Close time of the last bar each symbol produced an approved signal on
    last_approved: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl Pipeline {
    pub fn new(klines: Arc<KlineManager>, store: Arc<dyn SignalStore>, config: &AppConfig) -> Self {
        Self {
            trend: Arc::new(TrendEngine::new(klines.clone())),
            klines,
            generator: SignalGenerator::default(),
            decision: DecisionTree::new(
                config.thresholds.open_threshold,
                config.thresholds.close_threshold,
            ),
            store,
            trend_cache: None,
            trend_concurrency: config.concurrency.trend.max(1),
            signal_concurrency: config.concurrency.signal.max(1),
            last_approved: Mutex::new(HashMap::new()),
        }
    }

    /// Mirror every committed trend state to Redis
    pub fn with_trend_cache(mut self, cache: RedisTrendCache) -> Self {
        self.trend_cache = Some(cache);
        self
    }

    pub fn klines(&self) -> &Arc<KlineManager> {
        &self.klines
    }

    pub fn trend(&self) -> &Arc<TrendEngine> {
        &self.trend
    }

    pub fn store(&self) -> &Arc<dyn SignalStore> {
        &self.store
    }

    /// One trend fan-out over the registered symbols
    pub async fn trend_pass(&self) -> TrendPass {
        let symbols = self.klines.registry().snapshot();
        let pass = self.trend.run_pass(&symbols, self.trend_concurrency).await;

        if let Some(cache) = &self.trend_cache {
            cache.publish_all(&pass.states).await;
        }

        tracing::info!(
            updated = pass.states.len(),
            skipped = pass.skipped,
            failed = pass.failed,
            "📈 [TREND] Pass complete"
        );
        pass
    }

    /// Generate, gate and package one symbol's signal (does not persist)
    pub fn evaluate_symbol(&self, symbol: &str) -> Result<Verdict, SignalError> {
        let bars = self.klines.get(symbol, Timeframe::M15).unwrap_or_default();
        let raw = self.generator.generate(symbol, &bars)?;

        let trend = self
            .trend
            .latest(symbol)
            .ok_or_else(|| SignalError::MissingTrendState(symbol.to_string()))?;

        let approved = match self.decision.filter(raw, &trend) {
            Ok(signal) => signal,
            Err(decision) => return Ok(Verdict::Rejected(decision)),
        };

        if trend.timestamp > approved.timestamp {
            return Ok(Verdict::Rejected(Decision {
                passed: false,
                reason: format!(
                    "trend state at {} is newer than signal at {}",
                    trend.timestamp, approved.timestamp
                ),
            }));
        }

        let premium = is_premium(&approved, &trend);
        Ok(Verdict::Approved(Box::new(SignalRecord::from_approved(
            &approved, &trend, premium,
        ))))
    }

    /// Returns false when this symbol already has an approved signal on this bar
    fn claim_bar(&self, symbol: &str, bar_close: DateTime<Utc>) -> Result<bool, SignalError> {
        let mut last = self
            .last_approved
            .lock()
            .map_err(|_| SignalError::LockPoisoned("approved signal index"))?;

        match last.get(symbol) {
            Some(&previous) if previous >= bar_close => Ok(false),
            _ => {
                last.insert(symbol.to_string(), bar_close);
                Ok(true)
            }
        }
    }

    async fn process_symbol(self: Arc<Self>, symbol: String) -> Result<Verdict, SignalError> {
        let verdict = self.evaluate_symbol(&symbol)?;
        let record = match verdict {
            Verdict::Approved(record) => record,
            rejected => return Ok(rejected),
        };

        if !self.claim_bar(&symbol, record.timestamp)? {
            return Ok(Verdict::Duplicate);
        }

        self.store
            .save_signal_with_snapshot(&record)
            .await
            .map_err(|e| SignalError::Persistence(e.to_string()))?;

        tracing::info!(
            symbol = %record.symbol,
            command = %record.command,
            final_score = record.final_score,
            premium = record.is_premium,
            "✅ [SIGNAL] {}",
            record.explanation
        );
        Ok(Verdict::Approved(record))
    }

    /// Expiry sweep, then one signal fan-out over the registered symbols
    pub async fn signal_pass(self: &Arc<Self>, now: DateTime<Utc>) -> SignalPass {
        let mut pass = SignalPass::default();

        match self.store.expire_signals(now).await {
            Ok(expired) => pass.expired = expired,
            Err(e) => tracing::warn!("Signal expiry sweep failed: {}", e),
        }

        let symbols = self.klines.registry().snapshot();
        let semaphore = Arc::new(Semaphore::new(self.signal_concurrency));
        let mut tasks = JoinSet::new();

        for symbol in symbols {
            let pipeline = self.clone();
            let semaphore = semaphore.clone();
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let result = pipeline.process_symbol(symbol.clone()).await;
                (symbol, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(Verdict::Approved(record)))) => pass.approved.push(*record),
                Ok((symbol, Ok(Verdict::Rejected(decision)))) => {
                    tracing::debug!(symbol = %symbol, "Signal rejected: {}", decision.reason);
                    pass.rejected += 1;
                }
                Ok((symbol, Ok(Verdict::Duplicate))) => {
                    tracing::debug!(symbol = %symbol, "Signal already emitted for this bar");
                    pass.skipped += 1;
                }
                Ok((symbol, Err(e))) if e.is_skip() => {
                    tracing::debug!(symbol = %symbol, "Skipping signal: {}", e);
                    pass.skipped += 1;
                }
                Ok((symbol, Err(e @ SignalError::Persistence(_)))) => {
                    tracing::error!(symbol = %symbol, "❌ Failed to persist approved signal: {}", e);
                    pass.failed += 1;
                }
                Ok((symbol, Err(e))) => {
                    tracing::warn!(symbol = %symbol, "Signal evaluation failed: {}", e);
                    pass.failed += 1;
                }
                Err(e) => {
                    tracing::error!("Signal worker panicked: {}", e);
                    pass.failed += 1;
                }
            }
        }

        tracing::info!(
            approved = pass.approved.len(),
            rejected = pass.rejected,
            skipped = pass.skipped,
            failed = pass.failed,
            expired = pass.expired,
            "🎯 [SIGNAL] Pass complete"
        );
        pass
    }

    /// Bootstrap the caches, then run one trend pass and one signal pass
    pub async fn run_once(self: &Arc<Self>) -> (TrendPass, SignalPass) {
        self.klines.bootstrap().await.log("bootstrap");
        let trend = self.trend_pass().await;
        let signals = self.signal_pass(Utc::now()).await;
        (trend, signals)
    }

    async fn trend_loop(
        self: Arc<Self>,
        mut updates: mpsc::Receiver<UpdateTick>,
        downstream: mpsc::Sender<UpdateTick>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        tracing::info!("📈 Trend loop starting...");
        loop {
            let tick = tokio::select! {
                tick = updates.recv() => match tick {
                    Some(tick) => tick,
                    None => break,
                },
                _ = shutdown.changed() => break,
            };

            tracing::debug!(at = %tick.at, "Trend loop received tick");
            self.trend_pass().await;

            if !emit(&downstream, tick) {
                break;
            }
        }
        tracing::info!("Trend loop stopped");
    }

    async fn signal_loop(self: Arc<Self>, mut updates: mpsc::Receiver<UpdateTick>, mut shutdown: watch::Receiver<bool>) {
        tracing::info!("🎯 Signal loop starting...");
        loop {
            let tick = tokio::select! {
                tick = updates.recv() => match tick {
                    Some(tick) => tick,
                    None => break,
                },
                _ = shutdown.changed() => break,
            };

            tracing::debug!(at = %tick.at, "Signal loop received tick");
            self.signal_pass(Utc::now()).await;
        }
        tracing::info!("Signal loop stopped");
    }

    /// Spawn the kline scheduler, trend loop and signal loop
    ///
    /// All three stop when `shutdown` flips or its sender is dropped.
    pub fn spawn(self: Arc<Self>, shutdown: watch::Receiver<bool>) -> PipelineTasks {
        let (kline_tx, kline_rx) = mpsc::channel(TICK_CHANNEL_CAPACITY);
        let (trend_tx, trend_rx) = mpsc::channel(TICK_CHANNEL_CAPACITY);

        let klines = tokio::spawn(self.klines.clone().run(kline_tx, shutdown.clone()));
        let trend = tokio::spawn(self.clone().trend_loop(kline_rx, trend_tx, shutdown.clone()));
        let signals = tokio::spawn(self.signal_loop(trend_rx, shutdown));

        PipelineTasks { klines, trend, signals }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::SyntheticExchange;
    use crate::models::{CommandType, SignalStatus, TrendDirection};
    use crate::persistence::MemorySignalStore;
    use crate::registry::SymbolRegistry;
    use chrono::TimeZone;

    fn anchor() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap()
    }

    fn pipeline(exchange: SyntheticExchange, symbols: &[&str]) -> (Arc<Pipeline>, Arc<MemorySignalStore>) {
        let config = AppConfig::default();
        let registry = SymbolRegistry::new(symbols.iter().copied()).unwrap();
        let klines = Arc::new(KlineManager::new(Arc::new(exchange), registry, &config.schedule));
        let store = Arc::new(MemorySignalStore::new());
        let pipeline = Arc::new(Pipeline::new(klines, store.clone(), &config));
        (pipeline, store)
    }

    #[tokio::test]
    async fn test_missing_trend_state_is_skipped() {
        let (pipeline, store) = pipeline(SyntheticExchange::rising(Some(anchor())), &["btc"]);
        pipeline.klines().bootstrap().await;

        let err = pipeline.evaluate_symbol("BTC-USDT-SWAP").unwrap_err();
        assert!(matches!(err, SignalError::MissingTrendState(_)));

        let pass = pipeline.signal_pass(anchor()).await;
        assert_eq!(pass.skipped, 1);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_run_once_approves_buy() {
        let (pipeline, store) = pipeline(SyntheticExchange::rising(Some(anchor())), &["btc", "eth"]);

        let (trend, signals) = pipeline.run_once().await;
        assert_eq!(trend.states.len(), 2);
        assert!(trend.states.iter().all(|s| s.direction == TrendDirection::Up));
        assert_eq!(signals.approved.len(), 2);

        let record = &signals.approved[0];
        assert_eq!(record.command, CommandType::Buy);
        assert_eq!(record.status, SignalStatus::Active);
        assert!(record.is_premium);
        assert!(record.recommended_sl < record.entry_price);
        assert!(record.recommended_tp > record.entry_price);
        assert!(record.trend_snapshot.timestamp <= record.timestamp);
        assert_eq!(record.trend_snapshot.indicators.len(), 3);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_same_bar_not_persisted_twice() {
        let (pipeline, store) = pipeline(SyntheticExchange::rising(Some(anchor())), &["btc"]);
        pipeline.run_once().await;

        let pass = pipeline.signal_pass(anchor()).await;
        assert!(pass.approved.is_empty());
        assert_eq!(pass.skipped, 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_expiry_sweep_runs_first() {
        let (pipeline, store) = pipeline(SyntheticExchange::rising(Some(anchor())), &["btc"]);
        pipeline.run_once().await;
        assert_eq!(store.list_active_signals().await.unwrap().len(), 1);

        // Past the 15m expiry of the stored signal
        let pass = pipeline.signal_pass(anchor() + chrono::Duration::minutes(20)).await;
        assert_eq!(pass.expired, 1);
        assert!(store.list_active_signals().await.unwrap().is_empty());
    }

    async fn evaluate_with_forming_bars(now: DateTime<Utc>) -> (TrendState, SignalPass) {
        let exchange = SyntheticExchange::rising(None).with_forming_bar(now);
        let (pipeline, _store) = pipeline(exchange, &["btc"]);
        pipeline.klines().bootstrap().await;
        let trend = pipeline.trend_pass().await;
        let pass = pipeline.signal_pass(now).await;
        (trend.states[0].clone(), pass)
    }

    #[tokio::test]
    async fn test_half_hour_tick_with_forming_bars_approves() {
        // 30m bar forming until 11:00, 15m bar until 10:45
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 10, 30, 30).unwrap();
        let (trend, pass) = evaluate_with_forming_bars(now).await;

        let boundary = Utc.with_ymd_and_hms(2024, 3, 1, 10, 30, 0).unwrap();
        assert_eq!(trend.direction, TrendDirection::Up);
        assert_eq!(trend.timestamp, boundary);
        assert_eq!(pass.rejected, 0);
        assert_eq!(pass.approved.len(), 1);

        let record = &pass.approved[0];
        assert_eq!(record.command, CommandType::Buy);
        assert_eq!(record.timestamp, boundary);
        assert_eq!(record.expiry_timestamp, boundary + chrono::Duration::minutes(15));
        assert!(record.trend_snapshot.timestamp <= record.timestamp);
    }

    #[tokio::test]
    async fn test_quarter_tick_with_forming_bars_approves() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 10, 15, 30).unwrap();
        let (trend, pass) = evaluate_with_forming_bars(now).await;

        assert_eq!(trend.timestamp, Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap());
        assert_eq!(pass.approved.len(), 1);
        assert_eq!(
            pass.approved[0].timestamp,
            Utc.with_ymd_and_hms(2024, 3, 1, 10, 15, 0).unwrap()
        );
    }

    #[test]
    fn test_premium_flag() {
        let mut trend = TrendState {
            symbol: "BTC-USDT-SWAP".to_string(),
            direction: TrendDirection::Up,
            timestamp: anchor(),
            scores: crate::models::TrendScores {
                score_4h: 2.5,
                score_1h: 2.1,
                score_30m: 1.0,
                trend_score: 2.38,
                final_score: 2.2,
            },
            atr: 1.0,
            adx: 30.0,
            rsi: 60.0,
            last_price: 100.0,
            indicators: Default::default(),
        };
        let bars = crate::api::synthetic::bars_from_closes(
            Timeframe::M15,
            &crate::api::synthetic::golden_cross_path(),
            anchor(),
        );
        let signal = SignalGenerator::default().generate("BTC-USDT-SWAP", &bars).unwrap();

        assert!(is_premium(&signal, &trend));
        trend.scores.score_1h = 2.0;
        assert!(!is_premium(&signal, &trend));
    }
}
