use crate::models::{TrendSnapshotRecord, TrendState};
use crate::Result;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tokio::time::{timeout, Duration};

/// Redis mirror of each symbol's latest trend state
///
/// Stores JSON under `trend:{symbol}` with a TTL so stale states age out
/// when a symbol stops updating.
#[derive(Clone)]
pub struct RedisTrendCache {
    conn: ConnectionManager,
    ttl_secs: u64,
}

pub fn trend_key(symbol: &str) -> String {
    format!("trend:{}", symbol)
}

impl RedisTrendCache {
    /// Connect to Redis
    ///
    /// # Arguments
    /// * `redis_url` - Redis connection URL (e.g., "redis://127.0.0.1:6379")
    /// * `ttl_secs` - expiry applied to every published state
    pub async fn new(redis_url: &str, ttl_secs: u64) -> Result<Self> {
        let client = Client::open(redis_url)?;

        let conn = timeout(Duration::from_secs(5), ConnectionManager::new(client))
            .await
            .map_err(|_| "Redis connection timeout after 5 seconds")??;

        tracing::info!("Connected to Redis at {}", redis_url);

        Ok(Self {
            conn,
            ttl_secs: ttl_secs.max(1),
        })
    }

    /// Overwrite the symbol's latest state
    pub async fn publish(&self, state: &TrendState) -> Result<()> {
        let record = TrendSnapshotRecord::from(state);
        let value = serde_json::to_string(&record)?;

        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(trend_key(&state.symbol), value, self.ttl_secs)
            .await?;

        tracing::debug!(symbol = %state.symbol, direction = %state.direction, "Published trend state to Redis");
        Ok(())
    }

    /// Publish a batch, logging (not returning) individual failures
    pub async fn publish_all(&self, states: &[TrendState]) -> usize {
        let mut published = 0;
        for state in states {
            match self.publish(state).await {
                Ok(()) => published += 1,
                Err(e) => tracing::warn!(symbol = %state.symbol, "Failed to publish trend state: {}", e),
            }
        }
        published
    }

    pub async fn latest(&self, symbol: &str) -> Result<Option<TrendSnapshotRecord>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(trend_key(symbol)).await?;
        match value {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }
}
