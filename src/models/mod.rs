use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Bar resolution used by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "30m")]
    M30,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
}

impl Timeframe {
    pub const ALL: [Timeframe; 4] = [Timeframe::M15, Timeframe::M30, Timeframe::H1, Timeframe::H4];

    pub fn minutes(&self) -> i64 {
        match self {
            Timeframe::M15 => 15,
            Timeframe::M30 => 30,
            Timeframe::H1 => 60,
            Timeframe::H4 => 240,
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::minutes(self.minutes())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One OHLCV bar. `close_time` is the end of the bar's period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kline {
    pub timeframe: Timeframe,
    pub close_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    /// false while the exchange still reports the bar as forming
    pub confirmed: bool,
}

impl Kline {
    pub fn open_time(&self) -> DateTime<Utc> {
        self.close_time - self.timeframe.duration()
    }

    /// Latest period boundary this bar's data is settled up to
    ///
    /// A forming bar only vouches for its open time, which keeps stamps taken
    /// from different timeframes comparable mid-period.
    pub fn settled_time(&self) -> DateTime<Utc> {
        if self.confirmed {
            self.close_time
        } else {
            self.open_time()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrendDirection {
    Up,
    Down,
    Neutral,
    Reversal,
}

impl fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TrendDirection::Up => "UP",
            TrendDirection::Down => "DOWN",
            TrendDirection::Neutral => "NEUTRAL",
            TrendDirection::Reversal => "REVERSAL",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandType {
    Buy,
    Sell,
    ReversalBuy,
    ReversalSell,
    TrendExit,
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CommandType::Buy => "BUY",
            CommandType::Sell => "SELL",
            CommandType::ReversalBuy => "REVERSAL_BUY",
            CommandType::ReversalSell => "REVERSAL_SELL",
            CommandType::TrendExit => "TREND_EXIT",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalStatus {
    Raw,
    Active,
    Expired,
    Executed,
}

impl fmt::Display for SignalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SignalStatus::Raw => "RAW",
            SignalStatus::Active => "ACTIVE",
            SignalStatus::Expired => "EXPIRED",
            SignalStatus::Executed => "EXECUTED",
        };
        f.write_str(s)
    }
}

/// Latest-bar indicator readings for one symbol on one timeframe
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub ema20: f64,
    pub ema50: f64,
    pub ema200: f64,
    pub adx: f64,
    pub bb_upper: f64,
    pub bb_middle: f64,
    pub bb_lower: f64,
    pub bb_width: f64,
    pub bb_width_avg: f64,
    pub k: f64,
    pub d: f64,
    pub j: f64,
    pub rsi: f64,
    pub macd: f64,
    pub macd_signal: f64,
    pub macd_hist: f64,
    pub last_price: f64,
    #[serde(default)]
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TrendScores {
    pub score_30m: f64,
    pub score_1h: f64,
    pub score_4h: f64,
    /// Long-horizon component: 0.7 * 4h + 0.3 * 1h
    pub trend_score: f64,
    /// Regime-weighted composite of the three periods
    pub final_score: f64,
}

/// Result of one trend computation for a symbol
#[derive(Debug, Clone, PartialEq)]
pub struct TrendState {
    pub symbol: String,
    pub direction: TrendDirection,
    /// Settled time of the newest 30-minute bar the state was computed from
    pub timestamp: DateTime<Utc>,
    pub scores: TrendScores,
    pub atr: f64,
    pub adx: f64,
    pub rsi: f64,
    pub last_price: f64,
    pub indicators: BTreeMap<Timeframe, IndicatorSnapshot>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalDetails {
    pub recommended_sl: f64,
    pub recommended_tp: f64,
    pub high_freq_indicators: BTreeMap<String, f64>,
    pub reason: String,
    pub chart_snapshot_url: Option<String>,
    pub final_score_used: Option<f64>,
    pub explanation: Option<String>,
}

/// Entry signal detected on the 15-minute timeframe
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub id: Uuid,
    pub symbol: String,
    pub command: CommandType,
    pub entry_price: f64,
    pub mark_price: f64,
    pub period: Timeframe,
    pub status: SignalStatus,
    pub timestamp: DateTime<Utc>,
    pub expiry: DateTime<Utc>,
    pub score: f64,
    pub details: SignalDetails,
}

/// Trend state as embedded in a persisted signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendSnapshotRecord {
    pub timestamp: DateTime<Utc>,
    pub direction: TrendDirection,
    pub symbol: String,
    pub last_price: f64,
    pub score_4h: f64,
    pub score_1h: f64,
    pub score_30m: f64,
    pub final_score: f64,
    pub trend_score: f64,
    pub atr: f64,
    pub adx: f64,
    pub rsi: f64,
    pub indicators: BTreeMap<String, IndicatorSnapshot>,
}

impl From<&TrendState> for TrendSnapshotRecord {
    fn from(state: &TrendState) -> Self {
        Self {
            timestamp: state.timestamp,
            direction: state.direction,
            symbol: state.symbol.clone(),
            last_price: state.last_price,
            score_4h: state.scores.score_4h,
            score_1h: state.scores.score_1h,
            score_30m: state.scores.score_30m,
            final_score: state.scores.final_score,
            trend_score: state.scores.trend_score,
            atr: state.atr,
            adx: state.adx,
            rsi: state.rsi,
            indicators: state
                .indicators
                .iter()
                .map(|(tf, snapshot)| (tf.to_string(), snapshot.clone()))
                .collect(),
        }
    }
}

/// Approved signal in its persisted / exposed shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRecord {
    pub id: Uuid,
    pub symbol: String,
    pub command: CommandType,
    pub timestamp: DateTime<Utc>,
    pub expiry_timestamp: DateTime<Utc>,
    pub status: SignalStatus,
    pub final_score: f64,
    pub explanation: String,
    pub period: Timeframe,
    pub recommended_sl: f64,
    pub recommended_tp: f64,
    pub chart_snapshot_url: Option<String>,
    pub high_freq_indicators: BTreeMap<String, f64>,
    pub entry_price: f64,
    pub mark_price: f64,
    pub is_premium: bool,
    pub created_at: DateTime<Utc>,
    pub trend_snapshot: TrendSnapshotRecord,
}

impl SignalRecord {
    /// Build the persisted record for an approved signal
    pub fn from_approved(signal: &Signal, trend: &TrendState, is_premium: bool) -> Self {
        Self {
            id: signal.id,
            symbol: signal.symbol.clone(),
            command: signal.command,
            timestamp: signal.timestamp,
            expiry_timestamp: signal.expiry,
            status: signal.status,
            final_score: signal
                .details
                .final_score_used
                .unwrap_or(trend.scores.final_score),
            explanation: signal
                .details
                .explanation
                .clone()
                .unwrap_or_else(|| signal.details.reason.clone()),
            period: signal.period,
            recommended_sl: signal.details.recommended_sl,
            recommended_tp: signal.details.recommended_tp,
            chart_snapshot_url: signal.details.chart_snapshot_url.clone(),
            high_freq_indicators: signal.details.high_freq_indicators.clone(),
            entry_price: signal.entry_price,
            mark_price: signal.mark_price,
            is_premium,
            created_at: Utc::now(),
            trend_snapshot: TrendSnapshotRecord::from(trend),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_snapshot(seed: f64) -> IndicatorSnapshot {
        IndicatorSnapshot {
            ema20: 101.123456789 * seed,
            ema50: 99.987654321 * seed,
            ema200: 95.1 / 3.0 * seed,
            adx: 27.333333333333332,
            bb_upper: 110.0 + 1.0 / 7.0,
            bb_middle: 100.0,
            bb_lower: 90.0 - 1.0 / 7.0,
            bb_width: 0.2028571428571428,
            bb_width_avg: 0.19999999999999998,
            k: 83.33333333333333,
            d: 80.1,
            j: 89.79999999999998,
            rsi: 61.538461538461526,
            macd: 0.000123456789,
            macd_signal: -0.000987654321,
            macd_hist: 0.00111111111,
            last_price: 104.5 * seed,
            reasons: vec!["price above EMA200".to_string()],
        }
    }

    #[test]
    fn test_timeframe_labels() {
        assert_eq!(Timeframe::M15.to_string(), "15m");
        assert_eq!(Timeframe::H4.as_str(), "4h");
        assert_eq!(Timeframe::H1.duration(), Duration::minutes(60));
        assert_eq!(
            serde_json::to_string(&Timeframe::M30).unwrap(),
            "\"30m\""
        );
    }

    #[test]
    fn test_enum_wire_names() {
        assert_eq!(
            serde_json::to_string(&CommandType::ReversalBuy).unwrap(),
            "\"REVERSAL_BUY\""
        );
        assert_eq!(
            serde_json::to_string(&TrendDirection::Neutral).unwrap(),
            "\"NEUTRAL\""
        );
        assert_eq!(SignalStatus::Active.to_string(), "ACTIVE");
    }

    #[test]
    fn test_indicator_map_round_trip_preserves_floats() {
        let mut indicators = BTreeMap::new();
        indicators.insert("30m".to_string(), sample_snapshot(1.0));
        indicators.insert("1h".to_string(), sample_snapshot(1.0 / 3.0));
        indicators.insert("4h".to_string(), sample_snapshot(std::f64::consts::PI));

        let json = serde_json::to_string(&indicators).unwrap();
        let decoded: BTreeMap<String, IndicatorSnapshot> = serde_json::from_str(&json).unwrap();

        assert_eq!(decoded.len(), 3);
        for (key, original) in &indicators {
            let restored = &decoded[key];
            assert_eq!(restored.ema20, original.ema20);
            assert_eq!(restored.ema200, original.ema200);
            assert_eq!(restored.bb_width_avg, original.bb_width_avg);
            assert_eq!(restored.macd, original.macd);
            assert_eq!(restored.macd_signal, original.macd_signal);
            assert_eq!(restored.rsi, original.rsi);
            assert_eq!(restored.j, original.j);
            assert_eq!(restored.last_price, original.last_price);
        }
    }

    #[test]
    fn test_snapshot_record_keys_by_timeframe_label() {
        let mut indicators = BTreeMap::new();
        indicators.insert(Timeframe::H4, sample_snapshot(1.0));
        indicators.insert(Timeframe::M30, sample_snapshot(2.0));

        let state = TrendState {
            symbol: "BTC-USDT-SWAP".to_string(),
            direction: TrendDirection::Up,
            timestamp: Utc::now(),
            scores: TrendScores {
                score_30m: 1.0,
                score_1h: 2.0,
                score_4h: 2.5,
                trend_score: 2.35,
                final_score: 2.1,
            },
            atr: 12.0,
            adx: 30.0,
            rsi: 60.0,
            last_price: 100.0,
            indicators,
        };

        let record = TrendSnapshotRecord::from(&state);
        assert!(record.indicators.contains_key("4h"));
        assert!(record.indicators.contains_key("30m"));
        assert_eq!(record.score_4h, 2.5);
        assert_eq!(record.direction, TrendDirection::Up);
    }

    #[test]
    fn test_settled_time_of_forming_bar_is_its_open() {
        use chrono::TimeZone;
        let close_time = Utc.with_ymd_and_hms(2024, 3, 1, 11, 0, 0).unwrap();
        let mut bar = Kline {
            timeframe: Timeframe::M30,
            close_time,
            open: 100.0,
            high: 101.0,
            low: 99.0,
            close: 100.5,
            volume: 10.0,
            confirmed: true,
        };
        assert_eq!(bar.settled_time(), close_time);

        bar.confirmed = false;
        assert_eq!(bar.open_time(), close_time - Duration::minutes(30));
        assert_eq!(bar.settled_time(), bar.open_time());
    }
}
