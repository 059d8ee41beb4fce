use crate::error::SignalError;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;

pub const DEFAULT_CONFIG_PATH: &str = "config/signalbot.toml";
const ENV_PREFIX: &str = "SIGNALBOT";

/// OKX REST access
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    pub base_url: String,
    pub api_key: String,
    pub secret_key: String,
    pub passphrase: String,
    /// Per-request deadline
    pub timeout_secs: u64,
    pub requests_per_second: u32,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.okx.com".to_string(),
            api_key: String::new(),
            secret_key: String::new(),
            passphrase: String::new(),
            timeout_secs: 10,
            requests_per_second: 10,
        }
    }
}

impl ExchangeConfig {
    pub fn has_credentials(&self) -> bool {
        !self.api_key.is_empty() && !self.secret_key.is_empty() && !self.passphrase.is_empty()
    }
}

/// Decision tree thresholds
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    pub open_threshold: f64,
    pub close_threshold: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            open_threshold: 2.0,
            close_threshold: 1.0,
        }
    }
}

/// Wall-clock refresh schedule
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Boundary spacing; must divide 60
    pub interval_minutes: u32,
    /// Delay after each boundary so the exchange has closed the bar
    pub slack_secs: u64,
    /// Bars requested per symbol/timeframe refresh
    pub kline_limit: usize,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_minutes: 15,
            slack_secs: 30,
            kline_limit: 210,
        }
    }
}

/// Fan-out ceilings per stage
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConcurrencyConfig {
    pub trend: usize,
    pub signal: usize,
    pub fetch: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            trend: 5,
            signal: 10,
            fetch: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub exchange: ExchangeConfig,
    pub symbols: Vec<String>,
    pub thresholds: ThresholdConfig,
    pub schedule: ScheduleConfig,
    pub concurrency: ConcurrencyConfig,
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    /// TTL of the latest trend state mirrored to Redis
    pub trend_cache_ttl_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            exchange: ExchangeConfig::default(),
            symbols: vec![
                "BTC-USDT-SWAP".to_string(),
                "ETH-USDT-SWAP".to_string(),
                "SOL-USDT-SWAP".to_string(),
            ],
            thresholds: ThresholdConfig::default(),
            schedule: ScheduleConfig::default(),
            concurrency: ConcurrencyConfig::default(),
            database_url: None,
            redis_url: None,
            trend_cache_ttl_secs: 3600,
        }
    }
}

impl AppConfig {
    /// Load from an optional TOML file, then `SIGNALBOT__*` environment overrides
    ///
    /// `SIGNALBOT__SYMBOLS` is a comma-separated list and nested keys use `__`,
    /// e.g. `SIGNALBOT__EXCHANGE__API_KEY`.
    pub fn load(path: Option<&Path>) -> Result<Self, SignalError> {
        Self::load_with_prefix(path, ENV_PREFIX)
    }

    fn load_with_prefix(path: Option<&Path>, prefix: &str) -> Result<Self, SignalError> {
        let path = path.unwrap_or(Path::new(DEFAULT_CONFIG_PATH));
        if path.exists() {
            tracing::info!("Loading config from {:?}", path);
        } else {
            tracing::info!("Config file {:?} not found, using defaults and environment", path);
        }

        let config = Config::builder()
            .add_source(File::from(path).required(false))
            .add_source(
                Environment::with_prefix(prefix)
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("symbols")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Refuse to start on a configuration the pipeline cannot run with
    pub fn validate(&self, require_credentials: bool) -> Result<(), SignalError> {
        if require_credentials && !self.exchange.has_credentials() {
            return Err(SignalError::Config(
                "exchange api_key, secret_key and passphrase are required".to_string(),
            ));
        }
        if self.exchange.base_url.is_empty() {
            return Err(SignalError::Config("exchange base_url is empty".to_string()));
        }
        if self.exchange.requests_per_second == 0 || self.exchange.timeout_secs == 0 {
            return Err(SignalError::Config(
                "exchange requests_per_second and timeout_secs must be positive".to_string(),
            ));
        }
        if self.symbols.is_empty() {
            return Err(SignalError::Config("symbol list is empty".to_string()));
        }

        let t = &self.thresholds;
        if t.open_threshold <= 0.0 || t.close_threshold <= 0.0 {
            return Err(SignalError::Config("thresholds must be positive".to_string()));
        }
        if t.close_threshold >= t.open_threshold {
            return Err(SignalError::Config(format!(
                "close_threshold {} must be below open_threshold {}",
                t.close_threshold, t.open_threshold
            )));
        }

        let s = &self.schedule;
        if s.interval_minutes == 0 || 60 % s.interval_minutes != 0 {
            return Err(SignalError::Config(format!(
                "interval_minutes {} does not divide an hour",
                s.interval_minutes
            )));
        }
        if s.kline_limit < crate::trend::scorer::MIN_BARS {
            return Err(SignalError::Config(format!(
                "kline_limit {} is below the {} bars scoring needs",
                s.kline_limit,
                crate::trend::scorer::MIN_BARS
            )));
        }

        let c = &self.concurrency;
        if c.trend == 0 || c.signal == 0 || c.fetch == 0 {
            return Err(SignalError::Config("concurrency ceilings must be positive".to_string()));
        }

        Ok(())
    }
}
