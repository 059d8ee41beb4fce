use super::kline_cache::KlineCache;
use super::schedule;
use crate::api::{ExchangeClient, KlineRequest};
use crate::config::ScheduleConfig;
use crate::error::SignalError;
use crate::models::{Kline, Timeframe};
use crate::registry::SymbolRegistry;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinSet;

const DEFAULT_FETCH_CONCURRENCY: usize = 10;
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;

/// "Bars updated" notification passed between pipeline stages
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateTick {
    pub at: DateTime<Utc>,
    pub timeframes: Vec<Timeframe>,
}

/// Outcome of one refresh round
#[derive(Debug, Default)]
pub struct RefreshReport {
    pub requested: usize,
    pub refreshed: usize,
    pub failures: Vec<SignalError>,
}

impl RefreshReport {
    pub fn log(&self, stage: &str) {
        if self.failures.is_empty() {
            tracing::info!(
                stage,
                refreshed = self.refreshed,
                requested = self.requested,
                "Kline refresh complete"
            );
            return;
        }

        tracing::warn!(
            stage,
            refreshed = self.refreshed,
            requested = self.requested,
            failed = self.failures.len(),
            "Kline refresh finished with failures"
        );
        for failure in &self.failures {
            tracing::warn!("  ✗ {}", failure);
        }
    }
}

/// Keeps the per-symbol, per-timeframe bar cache fresh on a wall-clock schedule
pub struct KlineManager {
    exchange: Arc<dyn ExchangeClient>,
    registry: SymbolRegistry,
    cache: KlineCache,
    interval: Duration,
    slack: Duration,
    kline_limit: usize,
    fetch_concurrency: usize,
    fetch_timeout: std::time::Duration,
}

impl KlineManager {
    pub fn new(exchange: Arc<dyn ExchangeClient>, registry: SymbolRegistry, schedule: &ScheduleConfig) -> Self {
        Self {
            exchange,
            registry,
            cache: KlineCache::new(),
            interval: Duration::minutes(schedule.interval_minutes as i64),
            slack: Duration::seconds(schedule.slack_secs as i64),
            kline_limit: schedule.kline_limit,
            fetch_concurrency: DEFAULT_FETCH_CONCURRENCY,
            fetch_timeout: std::time::Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
        }
    }

    /// Override the fan-out ceiling and per-call deadline for exchange fetches
    pub fn with_fetch_limits(mut self, concurrency: usize, timeout: std::time::Duration) -> Self {
        self.fetch_concurrency = concurrency.max(1);
        self.fetch_timeout = timeout;
        self
    }

    pub fn cache(&self) -> &KlineCache {
        &self.cache
    }

    pub fn registry(&self) -> &SymbolRegistry {
        &self.registry
    }

    /// Current cached bars for a symbol/timeframe
    pub fn get(&self, symbol: &str, timeframe: Timeframe) -> Option<Arc<Vec<Kline>>> {
        self.cache.get(symbol, timeframe)
    }

    /// Fetch and cache one symbol/timeframe, returning the number of bars stored
    pub async fn refresh(&self, symbol: &str, timeframe: Timeframe) -> Result<usize, SignalError> {
        fetch_into_cache(
            self.exchange.clone(),
            self.cache.clone(),
            symbol.to_string(),
            timeframe,
            self.kline_limit,
            self.fetch_timeout,
        )
        .await
    }

    /// Refresh the given timeframes for every registered symbol
    ///
    /// Failures are collected per (symbol, timeframe) and never abort siblings.
    pub async fn refresh_timeframes(&self, timeframes: &[Timeframe]) -> RefreshReport {
        let symbols = self.registry.snapshot();
        let semaphore = Arc::new(Semaphore::new(self.fetch_concurrency));
        let mut tasks = JoinSet::new();
        let mut report = RefreshReport::default();

        for symbol in &symbols {
            for &timeframe in timeframes {
                report.requested += 1;
                let semaphore = semaphore.clone();
                let exchange = self.exchange.clone();
                let cache = self.cache.clone();
                let symbol = symbol.clone();
                let limit = self.kline_limit;
                let timeout = self.fetch_timeout;

                tasks.spawn(async move {
                    let _permit = semaphore.acquire_owned().await;
                    fetch_into_cache(exchange, cache, symbol, timeframe, limit, timeout).await
                });
            }
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(_)) => report.refreshed += 1,
                Ok(Err(e)) => report.failures.push(e),
                Err(e) => tracing::error!("Kline refresh task panicked: {}", e),
            }
        }

        report
    }

    /// Fetch every timeframe for every symbol once
    pub async fn bootstrap(&self) -> RefreshReport {
        self.refresh_timeframes(&Timeframe::ALL).await
    }

    /// Scheduled loop: bootstrap, then refresh on each aligned boundary
    ///
    /// Ticks are sent with `try_send`; a full channel drops the tick.
    pub async fn run(self: Arc<Self>, updates: mpsc::Sender<UpdateTick>, mut shutdown: watch::Receiver<bool>) {
        tracing::info!("🔄 Kline manager starting...");

        let report = self.bootstrap().await;
        report.log("bootstrap");
        if !emit(
            &updates,
            UpdateTick {
                at: Utc::now(),
                timeframes: Timeframe::ALL.to_vec(),
            },
        ) {
            return;
        }

        loop {
            let wake = schedule::next_boundary(Utc::now(), self.interval, self.slack);
            tracing::debug!("Next kline refresh at {}", wake.format("%H:%M:%S"));

            tokio::select! {
                _ = schedule::sleep_until(wake) => {}
                _ = shutdown.changed() => {
                    tracing::info!("Kline manager shutting down");
                    return;
                }
            }

            let due = schedule::timeframes_due(wake);
            tracing::info!(
                "🔄 [KLINES] Tick at {} refreshing {:?}",
                wake.format("%H:%M:%S"),
                due.iter().map(|tf| tf.as_str()).collect::<Vec<_>>()
            );

            let report = self.refresh_timeframes(&due).await;
            report.log("scheduled");

            if !emit(&updates, UpdateTick { at: wake, timeframes: due }) {
                return;
            }
        }
    }
}

/// Non-blocking send; returns false once the receiver is gone
pub(crate) fn emit(updates: &mpsc::Sender<UpdateTick>, tick: UpdateTick) -> bool {
    match updates.try_send(tick) {
        Ok(()) => true,
        Err(TrySendError::Full(tick)) => {
            tracing::warn!(at = %tick.at, "Downstream busy, dropping update tick");
            true
        }
        Err(TrySendError::Closed(_)) => {
            tracing::info!("Update channel closed, stopping");
            false
        }
    }
}

async fn fetch_into_cache(
    exchange: Arc<dyn ExchangeClient>,
    cache: KlineCache,
    symbol: String,
    timeframe: Timeframe,
    limit: usize,
    timeout: std::time::Duration,
) -> Result<usize, SignalError> {
    let request = KlineRequest::latest(&symbol, timeframe, limit);

    let bars = match tokio::time::timeout(timeout, exchange.get_klines(&request)).await {
        Ok(Ok(bars)) => bars,
        Ok(Err(e)) => {
            return Err(match e.downcast::<SignalError>() {
                Ok(signal_err) => *signal_err,
                Err(other) => SignalError::Fetch {
                    symbol,
                    timeframe,
                    message: other.to_string(),
                },
            })
        }
        Err(_) => {
            return Err(SignalError::Timeout {
                symbol,
                timeframe,
                after: timeout,
            })
        }
    };

    if bars.is_empty() {
        return Err(SignalError::Fetch {
            symbol,
            timeframe,
            message: "empty response".to_string(),
        });
    }

    let count = bars.len();
    cache.replace(&symbol, timeframe, bars)?;
    tracing::debug!(symbol = %symbol, timeframe = %timeframe, bars = count, "Cached klines");
    Ok(count)
}
