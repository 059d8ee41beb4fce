use clap::Parser;
use signalbot::api::{ExchangeClient, OkxClient, SyntheticExchange};
use signalbot::config::AppConfig;
use signalbot::db::PostgresPersistence;
use signalbot::market::KlineManager;
use signalbot::persistence::{MemorySignalStore, RedisTrendCache, SignalStore};
use signalbot::registry::SymbolRegistry;
use signalbot::{Pipeline, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serve bars from the deterministic synthetic exchange instead of OKX
    #[arg(long)]
    synthetic: bool,

    /// Bootstrap, run one trend pass and one signal pass, then exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let args = Args::parse();

    tracing::info!("🚀 signalbot starting");

    let config = AppConfig::load(args.config.as_deref())?;
    config.validate(!args.synthetic)?;

    let registry = SymbolRegistry::new(config.symbols.iter().map(String::as_str))?;
    let exchange = create_exchange(&config, args.synthetic)?;

    let klines = Arc::new(
        KlineManager::new(exchange, registry.clone(), &config.schedule).with_fetch_limits(
            config.concurrency.fetch,
            std::time::Duration::from_secs(config.exchange.timeout_secs),
        ),
    );

    let store = connect_signal_store(&config).await;
    let mut pipeline = Pipeline::new(klines, store, &config);
    if let Some(cache) = connect_trend_cache(&config).await {
        pipeline = pipeline.with_trend_cache(cache);
    }
    let pipeline = Arc::new(pipeline);

    tracing::info!("\n📊 Configuration:");
    tracing::info!("  Exchange: {}", if args.synthetic { "synthetic" } else { "okx" });
    tracing::info!(
        "  Thresholds: open {} / close {}",
        config.thresholds.open_threshold,
        config.thresholds.close_threshold
    );
    tracing::info!(
        "  Schedule: every {} min (+{}s slack), {} bars per fetch",
        config.schedule.interval_minutes,
        config.schedule.slack_secs,
        config.schedule.kline_limit
    );
    tracing::info!("  Symbols: {}", registry.len());
    for symbol in registry.snapshot() {
        tracing::info!("    - {}", symbol);
    }

    if args.once {
        let (trend, signals) = pipeline.run_once().await;
        tracing::info!(
            "✅ Single pass done: {} trend states, {} approved signals",
            trend.states.len(),
            signals.approved.len()
        );
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let tasks = pipeline.clone().spawn(shutdown_rx);

    tracing::info!("✅ All loops spawned successfully");
    tracing::info!("\nPress Ctrl+C to stop...\n");

    let mut klines_task = tasks.klines;
    let mut trend_task = tasks.trend;
    let mut signal_task = tasks.signals;

    // Wait for Ctrl+C or task failure
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("\n⚠️  Received Ctrl+C, shutting down...");
        }
        result = &mut klines_task => {
            tracing::error!("Kline loop exited: {:?}", result);
        }
        result = &mut trend_task => {
            tracing::error!("Trend loop exited: {:?}", result);
        }
        result = &mut signal_task => {
            tracing::error!("Signal loop exited: {:?}", result);
        }
    }

    shutdown_tx.send(true).ok();
    for task in [klines_task, trend_task, signal_task] {
        if !task.is_finished() {
            task.await.ok();
        }
    }

    tracing::info!("👋 signalbot stopped");
    Ok(())
}

fn setup_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("signalbot=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn create_exchange(config: &AppConfig, synthetic: bool) -> Result<Arc<dyn ExchangeClient>> {
    if synthetic {
        tracing::info!("Using synthetic exchange");
        return Ok(Arc::new(SyntheticExchange::rising(None)));
    }
    Ok(Arc::new(OkxClient::new(&config.exchange)?))
}

async fn connect_signal_store(config: &AppConfig) -> Arc<dyn SignalStore> {
    let Some(database_url) = config.database_url.as_deref() else {
        tracing::info!("No database_url configured, keeping signals in memory");
        return Arc::new(MemorySignalStore::new());
    };

    match PostgresPersistence::new(database_url).await {
        Ok(p) => {
            tracing::info!("Postgres persistence enabled for signals");
            Arc::new(p)
        }
        Err(e) => {
            tracing::warn!(
                "Failed to connect to Postgres ({}), keeping signals in memory",
                e
            );
            Arc::new(MemorySignalStore::new())
        }
    }
}

async fn connect_trend_cache(config: &AppConfig) -> Option<RedisTrendCache> {
    let redis_url = config.redis_url.as_deref()?;

    match RedisTrendCache::new(redis_url, config.trend_cache_ttl_secs).await {
        Ok(cache) => Some(cache),
        Err(e) => {
            tracing::warn!("Failed to connect to Redis ({}), trend states stay in memory", e);
            None
        }
    }
}
