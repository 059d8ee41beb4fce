use chrono::{Duration, TimeZone, Utc};
use signalbot::api::synthetic::{golden_cross_path, rising_trend_path};
use signalbot::market::KlineManager;
use signalbot::persistence::MemorySignalStore;
use signalbot::pipeline::Verdict;
use signalbot::registry::SymbolRegistry;
use signalbot::strategy::DecisionTree;
use signalbot::trend::{calc_scores, Regime, TrendStateMachine};
use signalbot::*;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

fn trend(direction: TrendDirection, scores: TrendScores) -> TrendState {
    TrendState {
        symbol: "BTC-USDT-SWAP".to_string(),
        direction,
        timestamp: anchor(),
        scores,
        atr: 2.0,
        adx: 28.0,
        rsi: 58.0,
        last_price: 100.0,
        indicators: BTreeMap::new(),
    }
}

fn raw(command: CommandType) -> Signal {
    let ts = anchor();
    Signal {
        id: uuid::Uuid::new_v4(),
        symbol: "BTC-USDT-SWAP".to_string(),
        command,
        entry_price: 100.0,
        mark_price: 100.0,
        period: Timeframe::M15,
        status: SignalStatus::Raw,
        timestamp: ts,
        expiry: ts + Duration::minutes(15),
        score: 1.5,
        details: SignalDetails::default(),
    }
}

fn with_final(final_score: f64, trend_score: f64) -> TrendScores {
    TrendScores {
        final_score,
        trend_score,
        ..Default::default()
    }
}

fn anchor() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap()
}

/// Pipeline over a bootstrapped BTC cache whose 15m bars end on a golden
/// cross, or on a dead cross when `falling`
async fn bootstrapped(falling: bool) -> Arc<Pipeline> {
    let exchange = if falling {
        let mut paths = HashMap::new();
        for tf in [Timeframe::H4, Timeframe::H1, Timeframe::M30] {
            paths.insert(tf, rising_trend_path());
        }
        let dead_cross = golden_cross_path().iter().map(|p| 1000.0 - p).collect();
        paths.insert(Timeframe::M15, dead_cross);
        SyntheticExchange::with_paths(paths, Some(anchor()))
    } else {
        SyntheticExchange::rising(Some(anchor()))
    };

    let config = AppConfig::default();
    let registry = SymbolRegistry::new(["btc"]).unwrap();
    let klines = Arc::new(KlineManager::new(Arc::new(exchange), registry, &config.schedule));
    klines.bootstrap().await;
    Arc::new(Pipeline::new(klines, Arc::new(MemorySignalStore::new()), &config))
}

/// Commit `steps` through the symbol's state machine, then evaluate its 15m signal
fn evaluate_after(pipeline: &Pipeline, steps: &[TrendScores]) -> Verdict {
    for &scores in steps {
        pipeline
            .trend()
            .commit(trend(TrendDirection::Neutral, scores))
            .unwrap();
    }
    pipeline.evaluate_symbol("BTC-USDT-SWAP").unwrap()
}

#[tokio::test]
async fn test_neutral_trend_rejects_buy() {
    let pipeline = bootstrapped(false).await;
    match evaluate_after(&pipeline, &[with_final(0.1, 0.0)]) {
        Verdict::Rejected(d) => assert!(d.reason.contains("NEUTRAL"), "{}", d.reason),
        other => panic!("expected rejection, got {:?}", other),
    }
}

#[tokio::test]
async fn test_weak_up_trend_rejects_buy() {
    let pipeline = bootstrapped(false).await;
    // Still UP at 1.9, below the 2.0 open threshold
    let verdict = evaluate_after(&pipeline, &[with_final(2.0, 0.6), with_final(1.9, 0.6)]);
    assert_eq!(pipeline.trend().latest("BTC-USDT-SWAP").unwrap().direction, TrendDirection::Up);
    match verdict {
        Verdict::Rejected(d) => assert!(d.reason.contains("weak"), "{}", d.reason),
        other => panic!("expected rejection, got {:?}", other),
    }
}

#[tokio::test]
async fn test_approved_buy_record_explains_all_periods() {
    let pipeline = bootstrapped(false).await;
    let scores = TrendScores {
        score_4h: 2.1,
        score_1h: 1.9,
        score_30m: 1.0,
        trend_score: 0.7 * 2.1 + 0.3 * 1.9,
        final_score: 2.4,
    };

    let record = match evaluate_after(&pipeline, &[scores]) {
        Verdict::Approved(record) => record,
        other => panic!("expected approval, got {:?}", other),
    };
    assert_eq!(record.command, CommandType::Buy);
    assert_eq!(record.status, SignalStatus::Active);
    assert_eq!(record.final_score, 2.4);
    assert_eq!(record.trend_snapshot.direction, TrendDirection::Up);
    // 1h trend at 1.9 is not strong enough for premium
    assert!(!record.is_premium);
    for part in ["4h +2.10", "1h +1.90", "30m +1.00"] {
        assert!(record.explanation.contains(part), "missing {} in {}", part, record.explanation);
    }
}

#[tokio::test]
async fn test_approved_sell_on_down_trend() {
    let pipeline = bootstrapped(true).await;
    let record = match evaluate_after(&pipeline, &[with_final(-2.3, -0.8)]) {
        Verdict::Approved(record) => record,
        other => panic!("expected approval, got {:?}", other),
    };
    assert_eq!(record.command, CommandType::Sell);
    assert_eq!(record.trend_snapshot.direction, TrendDirection::Down);
    assert!(record.recommended_sl > record.entry_price);
    assert!(record.recommended_tp < record.entry_price);
}

#[test]
fn test_cross_regime_lands_in_neutral_zone() {
    assert_eq!(Regime::detect(2.0, 1.5, -1.5), Regime::CrossCurrent);
    let scores = calc_scores(2.0, 1.5, -1.5);
    assert!((scores.final_score - 0.75).abs() < 1e-9);

    // Inside +/- close_threshold no BUY or SELL gets through
    let tree = DecisionTree::default();
    for command in [CommandType::Buy, CommandType::Sell, CommandType::TrendExit] {
        let d = tree.evaluate(&raw(command), &trend(TrendDirection::Up, scores));
        assert!(!d.passed);
    }
}

#[test]
fn test_state_machine_transitions() {
    let mut machine = TrendStateMachine::new("BTC-USDT-SWAP");
    let steps = [
        (2.0, 0.6, TrendDirection::Up),
        (-0.6, -0.2, TrendDirection::Reversal),
        (0.1, 0.0, TrendDirection::Neutral),
    ];

    for (final_score, trend_score, expected) in steps {
        let state = machine.update(trend(
            TrendDirection::Neutral,
            TrendScores {
                final_score,
                trend_score,
                ..Default::default()
            },
        ));
        assert_eq!(state.direction, expected);
        assert_eq!(machine.current(), expected);
    }
    assert_eq!(machine.history().len(), 3);
}
