pub mod memory;
pub mod trend_cache;

pub use memory::MemorySignalStore;
pub use trend_cache::RedisTrendCache;

use crate::models::SignalRecord;
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Sink for approved signals and their read queries
#[async_trait]
pub trait SignalStore: Send + Sync {
    /// Store one approved signal together with its embedded trend snapshot
    async fn save_signal_with_snapshot(&self, record: &SignalRecord) -> Result<Uuid>;

    /// ACTIVE signals, newest first
    async fn list_active_signals(&self) -> Result<Vec<SignalRecord>>;

    async fn get_signal_detail(&self, id: Uuid) -> Result<Option<SignalRecord>>;

    /// Flip ACTIVE signals whose expiry is at or before `now` to EXPIRED
    ///
    /// Returns the number of signals expired.
    async fn expire_signals(&self, now: DateTime<Utc>) -> Result<u64>;
}
