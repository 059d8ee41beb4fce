use crate::models::{SignalRecord, SignalStatus, TrendSnapshotRecord};
use crate::persistence::SignalStore;
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use std::collections::BTreeMap;
use uuid::Uuid;

const SELECT_SIGNAL: &str = r#"
    SELECT s.id, s.symbol, s.command, s.timestamp, s.expiry_timestamp, s.status,
           s.final_score, s.explanation, s.period, s.recommended_sl, s.recommended_tp,
           s.chart_snapshot_url, s.high_freq_indicators, s.entry_price, s.mark_price,
           s.is_premium, s.created_at,
           t.timestamp AS trend_timestamp, t.direction, t.symbol AS trend_symbol,
           t.last_price, t.score_4h, t.score_1h, t.score_30m,
           t.final_score AS trend_final_score, t.trend_score, t.atr, t.adx, t.rsi,
           t.indicators
    FROM signals s
    JOIN trend_snapshots t ON t.signal_id = s.id
"#;

/// Postgres persistence for approved signals
pub struct PostgresPersistence {
    pool: PgPool,
}

impl PostgresPersistence {
    /// Connect to Postgres and run pending migrations
    ///
    /// # Arguments
    /// * `database_url` - Postgres connection URL
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        tracing::info!("Connected to Postgres");

        Ok(Self { pool })
    }

    #[cfg(test)]
    pub async fn clear_all_signals(&self) -> Result<()> {
        sqlx::query("DELETE FROM signals").execute(&self.pool).await?;
        Ok(())
    }
}

/// Parse a SCREAMING_SNAKE / label column through the type's serde names
fn parse_label<T: DeserializeOwned>(column: &str, raw: String) -> Result<T> {
    serde_json::from_value(serde_json::Value::String(raw.clone()))
        .map_err(|_| format!("invalid {} value {:?}", column, raw).into())
}

fn record_from_row(row: &PgRow) -> Result<SignalRecord> {
    let high_freq: Json<BTreeMap<String, f64>> = row.try_get("high_freq_indicators")?;
    let indicators: Json<BTreeMap<String, crate::models::IndicatorSnapshot>> = row.try_get("indicators")?;

    Ok(SignalRecord {
        id: row.try_get("id")?,
        symbol: row.try_get("symbol")?,
        command: parse_label("command", row.try_get("command")?)?,
        timestamp: row.try_get("timestamp")?,
        expiry_timestamp: row.try_get("expiry_timestamp")?,
        status: parse_label("status", row.try_get("status")?)?,
        final_score: row.try_get("final_score")?,
        explanation: row.try_get("explanation")?,
        period: parse_label("period", row.try_get("period")?)?,
        recommended_sl: row.try_get("recommended_sl")?,
        recommended_tp: row.try_get("recommended_tp")?,
        chart_snapshot_url: row.try_get("chart_snapshot_url")?,
        high_freq_indicators: high_freq.0,
        entry_price: row.try_get("entry_price")?,
        mark_price: row.try_get("mark_price")?,
        is_premium: row.try_get("is_premium")?,
        created_at: row.try_get("created_at")?,
        trend_snapshot: TrendSnapshotRecord {
            timestamp: row.try_get("trend_timestamp")?,
            direction: parse_label("direction", row.try_get("direction")?)?,
            symbol: row.try_get("trend_symbol")?,
            last_price: row.try_get("last_price")?,
            score_4h: row.try_get("score_4h")?,
            score_1h: row.try_get("score_1h")?,
            score_30m: row.try_get("score_30m")?,
            final_score: row.try_get("trend_final_score")?,
            trend_score: row.try_get("trend_score")?,
            atr: row.try_get("atr")?,
            adx: row.try_get("adx")?,
            rsi: row.try_get("rsi")?,
            indicators: indicators.0,
        },
    })
}

#[async_trait]
impl SignalStore for PostgresPersistence {
    async fn save_signal_with_snapshot(&self, record: &SignalRecord) -> Result<Uuid> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO signals (
                id, symbol, command, timestamp, expiry_timestamp, status,
                final_score, explanation, period, recommended_sl, recommended_tp,
                chart_snapshot_url, high_freq_indicators, entry_price, mark_price,
                is_premium, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(record.id)
        .bind(&record.symbol)
        .bind(record.command.to_string())
        .bind(record.timestamp)
        .bind(record.expiry_timestamp)
        .bind(record.status.to_string())
        .bind(record.final_score)
        .bind(&record.explanation)
        .bind(record.period.as_str())
        .bind(record.recommended_sl)
        .bind(record.recommended_tp)
        .bind(&record.chart_snapshot_url)
        .bind(Json(&record.high_freq_indicators))
        .bind(record.entry_price)
        .bind(record.mark_price)
        .bind(record.is_premium)
        .bind(record.created_at)
        .execute(&mut *tx)
        .await?;

        let snapshot = &record.trend_snapshot;
        sqlx::query(
            r#"
            INSERT INTO trend_snapshots (
                signal_id, timestamp, direction, symbol, last_price,
                score_4h, score_1h, score_30m, final_score, trend_score,
                atr, adx, rsi, indicators
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(record.id)
        .bind(snapshot.timestamp)
        .bind(snapshot.direction.to_string())
        .bind(&snapshot.symbol)
        .bind(snapshot.last_price)
        .bind(snapshot.score_4h)
        .bind(snapshot.score_1h)
        .bind(snapshot.score_30m)
        .bind(snapshot.final_score)
        .bind(snapshot.trend_score)
        .bind(snapshot.atr)
        .bind(snapshot.adx)
        .bind(snapshot.rsi)
        .bind(Json(&snapshot.indicators))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::debug!(
            symbol = %record.symbol,
            command = %record.command,
            "Saved signal {} to Postgres",
            record.id
        );

        Ok(record.id)
    }

    async fn list_active_signals(&self) -> Result<Vec<SignalRecord>> {
        let query = format!("{} WHERE s.status = $1 ORDER BY s.timestamp DESC", SELECT_SIGNAL);
        let rows = sqlx::query(&query)
            .bind(SignalStatus::Active.to_string())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(record_from_row).collect()
    }

    async fn get_signal_detail(&self, id: Uuid) -> Result<Option<SignalRecord>> {
        let query = format!("{} WHERE s.id = $1", SELECT_SIGNAL);
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn expire_signals(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE signals
            SET status = $1
            WHERE status = $2 AND expiry_timestamp <= $3
            "#,
        )
        .bind(SignalStatus::Expired.to_string())
        .bind(SignalStatus::Active.to_string())
        .bind(now)
        .execute(&self.pool)
        .await?;

        let count = result.rows_affected();
        if count > 0 {
            tracing::info!("Expired {} signals", count);
        }

        Ok(count)
    }
}
