use super::SignalStore;
use crate::error::SignalError;
use crate::models::{SignalRecord, SignalStatus};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::RwLock;
use uuid::Uuid;

/// In-process signal store, used when no database is configured
#[derive(Debug, Default)]
pub struct MemorySignalStore {
    records: RwLock<Vec<SignalRecord>>,
}

impl MemorySignalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored record in insertion order
    pub fn all(&self) -> Result<Vec<SignalRecord>> {
        let records = self
            .records
            .read()
            .map_err(|_| SignalError::LockPoisoned("signal store"))?;
        Ok(records.clone())
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SignalStore for MemorySignalStore {
    async fn save_signal_with_snapshot(&self, record: &SignalRecord) -> Result<Uuid> {
        let mut records = self
            .records
            .write()
            .map_err(|_| SignalError::LockPoisoned("signal store"))?;

        if records.iter().any(|r| r.id == record.id) {
            return Err(SignalError::Persistence(format!("duplicate signal id {}", record.id)).into());
        }
        records.push(record.clone());

        tracing::debug!(
            symbol = %record.symbol,
            command = %record.command,
            "Saved signal {} in memory",
            record.id
        );
        Ok(record.id)
    }

    async fn list_active_signals(&self) -> Result<Vec<SignalRecord>> {
        let records = self
            .records
            .read()
            .map_err(|_| SignalError::LockPoisoned("signal store"))?;

        let mut active: Vec<SignalRecord> = records
            .iter()
            .filter(|r| r.status == SignalStatus::Active)
            .cloned()
            .collect();
        active.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(active)
    }

    async fn get_signal_detail(&self, id: Uuid) -> Result<Option<SignalRecord>> {
        let records = self
            .records
            .read()
            .map_err(|_| SignalError::LockPoisoned("signal store"))?;
        Ok(records.iter().find(|r| r.id == id).cloned())
    }

    async fn expire_signals(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut records = self
            .records
            .write()
            .map_err(|_| SignalError::LockPoisoned("signal store"))?;

        let mut expired = 0;
        for record in records.iter_mut() {
            if record.status == SignalStatus::Active && record.expiry_timestamp <= now {
                record.status = SignalStatus::Expired;
                expired += 1;
            }
        }
        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CommandType, Timeframe, TrendDirection, TrendSnapshotRecord};
    use chrono::{Duration, TimeZone};
    use std::collections::BTreeMap;

    fn record(minutes: i64) -> SignalRecord {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap() + Duration::minutes(minutes);
        SignalRecord {
            id: Uuid::new_v4(),
            symbol: "BTC-USDT-SWAP".to_string(),
            command: CommandType::Buy,
            timestamp: ts,
            expiry_timestamp: ts + Duration::minutes(15),
            status: SignalStatus::Active,
            final_score: 2.4,
            explanation: "BUY approved".to_string(),
            period: Timeframe::M15,
            recommended_sl: 97.0,
            recommended_tp: 104.5,
            chart_snapshot_url: None,
            high_freq_indicators: BTreeMap::from([("rsi".to_string(), 61.0)]),
            entry_price: 100.0,
            mark_price: 100.0,
            is_premium: false,
            created_at: ts,
            trend_snapshot: TrendSnapshotRecord {
                timestamp: ts,
                direction: TrendDirection::Up,
                symbol: "BTC-USDT-SWAP".to_string(),
                last_price: 100.0,
                score_4h: 2.1,
                score_1h: 1.9,
                score_30m: 1.0,
                final_score: 2.4,
                trend_score: 2.04,
                atr: 2.0,
                adx: 28.0,
                rsi: 61.0,
                indicators: BTreeMap::new(),
            },
        }
    }

    #[tokio::test]
    async fn test_save_and_detail() {
        let store = MemorySignalStore::new();
        let rec = record(0);

        let id = tokio_test::assert_ok!(store.save_signal_with_snapshot(&rec).await);
        assert_eq!(id, rec.id);
        assert_eq!(store.get_signal_detail(id).await.unwrap(), Some(rec.clone()));
        assert!(store.get_signal_detail(Uuid::new_v4()).await.unwrap().is_none());

        // Same id twice is refused
        tokio_test::assert_err!(store.save_signal_with_snapshot(&rec).await);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_save_outside_runtime() {
        let store = MemorySignalStore::new();
        let rec = record(0);
        tokio_test::block_on(store.save_signal_with_snapshot(&rec)).unwrap();
        let all = store.all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, rec.id);
    }

    #[tokio::test]
    async fn test_active_newest_first() {
        let store = MemorySignalStore::new();
        for minutes in [0, 30, 15] {
            store.save_signal_with_snapshot(&record(minutes)).await.unwrap();
        }

        let active = store.list_active_signals().await.unwrap();
        assert_eq!(active.len(), 3);
        assert!(active.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));
    }

    #[tokio::test]
    async fn test_expire_sweep() {
        let store = MemorySignalStore::new();
        let old = record(0);
        let fresh = record(60);
        store.save_signal_with_snapshot(&old).await.unwrap();
        store.save_signal_with_snapshot(&fresh).await.unwrap();

        // Exactly at the old signal's expiry
        let expired = store.expire_signals(old.expiry_timestamp).await.unwrap();
        assert_eq!(expired, 1);

        let active = store.list_active_signals().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, fresh.id);

        let detail = store.get_signal_detail(old.id).await.unwrap().unwrap();
        assert_eq!(detail.status, SignalStatus::Expired);

        // Second sweep is a no-op
        assert_eq!(store.expire_signals(old.expiry_timestamp).await.unwrap(), 0);
    }
}
