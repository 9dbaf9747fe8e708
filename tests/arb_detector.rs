//! Integration Tests - Arb Detector Loop
//!
//! Runs the detector against the in-memory bus and cache: price
//! events in, recorded opportunities and executor signals out. Gating
//! is asserted by absence: nothing on the `arb` topic, nothing in the
//! signal channel.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use polymarket_arb_bot::adapters::memory::{MemoryBookCache, MemoryBus};
use polymarket_arb_bot::adapters::metrics::BotMetrics;
use polymarket_arb_bot::domain::arb::{ArbDirection, ArbOpportunity};
use polymarket_arb_bot::domain::orderbook::{
    to_ticks, OrderbookSnapshot, PriceLevel, PriceTopicEvent,
};
use polymarket_arb_bot::domain::signal::TradeSignal;
use polymarket_arb_bot::ports::bus::{SignalBus, STREAM_ARB, TOPIC_ARB, TOPIC_PRICES};
use polymarket_arb_bot::ports::cache::BookCache;
use polymarket_arb_bot::usecases::arb::{
    ArbDetector, ArbGates, ArbStrategy, ArbStrategyConfig, DefaultArbService, SpreadStrategy,
};

fn snapshot(asset: &str, bid: f64, ask: f64, size: f64) -> OrderbookSnapshot {
    OrderbookSnapshot::from_levels(
        asset,
        vec![PriceLevel {
            price_ticks: to_ticks(bid),
            size_units: to_ticks(size),
        }],
        vec![PriceLevel {
            price_ticks: to_ticks(ask),
            size_units: to_ticks(size),
        }],
        Utc::now(),
    )
}

fn price_event(asset: &str, bid: f64, ask: f64) -> String {
    serde_json::to_string(&PriceTopicEvent {
        event: PriceTopicEvent::PRICE_CHANGE.to_string(),
        asset_id: asset.to_string(),
        best_bid: Some(bid),
        best_ask: Some(ask),
        mid_price: Some((bid + ask) / 2.0),
        timestamp: Utc::now(),
    })
    .unwrap()
}

struct DetectorHarness {
    bus: Arc<MemoryBus>,
    cache: Arc<MemoryBookCache>,
    signal_rx: mpsc::Receiver<TradeSignal>,
    shutdown_tx: broadcast::Sender<()>,
    handle: tokio::task::JoinHandle<anyhow::Result<()>>,
}

fn spawn_detector(strategies: Vec<Arc<dyn ArbStrategy>>, gates: ArbGates) -> DetectorHarness {
    let bus = Arc::new(MemoryBus::new());
    let cache = Arc::new(MemoryBookCache::new());
    let metrics = Arc::new(BotMetrics::new().unwrap());
    let service = Arc::new(DefaultArbService::new(
        Arc::clone(&bus) as Arc<dyn SignalBus>,
        Arc::clone(&metrics),
        gates,
    ));
    let (signal_tx, signal_rx) = mpsc::channel(16);
    let detector = ArbDetector::new(
        Arc::clone(&bus) as Arc<dyn SignalBus>,
        Arc::clone(&cache) as Arc<dyn BookCache>,
        strategies,
        service,
        Some(signal_tx),
        metrics,
    );
    let (shutdown_tx, _) = broadcast::channel(1);
    let shutdown_rx = shutdown_tx.subscribe();
    let handle = tokio::spawn(async move { detector.run(shutdown_rx).await });
    DetectorHarness {
        bus,
        cache,
        signal_rx,
        shutdown_tx,
        handle,
    }
}

async fn stop(harness: DetectorHarness) {
    let _ = harness.shutdown_tx.send(());
    let _ = tokio::time::timeout(Duration::from_secs(2), harness.handle).await;
}

fn spread_config(min_top_size_units: i64) -> ArbStrategyConfig {
    ArbStrategyConfig {
        fee_bps: 10.0,
        slippage_bps: 10.0,
        latency_bps: 5.0,
        min_spread_bps: 30.0,
        min_top_size_units,
        imbalance_ratio: 3.0,
        max_trade_amount: 100.0,
    }
}

#[tokio::test]
async fn test_wide_spread_is_recorded_and_signalled() {
    let strategies: Vec<Arc<dyn ArbStrategy>> =
        vec![Arc::new(SpreadStrategy::new(spread_config(to_ticks(1.0))))];
    let mut harness = spawn_detector(strategies, ArbGates::default());
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Deep book with a ~1276 bps spread in cache.
    harness
        .cache
        .set_snapshot(&snapshot("tok", 0.44, 0.50, 50.0))
        .await
        .unwrap();
    let mut arb_sub = harness.bus.subscribe(TOPIC_ARB).await.unwrap();
    harness
        .bus
        .publish(TOPIC_PRICES, &price_event("tok", 0.44, 0.50))
        .await
        .unwrap();

    let recorded = tokio::time::timeout(Duration::from_secs(1), arb_sub.recv())
        .await
        .expect("opportunity recorded")
        .unwrap();
    let opp: ArbOpportunity = serde_json::from_str(&recorded).unwrap();
    assert!(opp.net_edge_bps > 0.0);

    let entries = harness.bus.stream_read(STREAM_ARB, "", 10).await.unwrap();
    assert_eq!(entries.len(), 1);

    let signal = tokio::time::timeout(Duration::from_secs(1), harness.signal_rx.recv())
        .await
        .expect("signal emitted")
        .unwrap();
    assert_eq!(signal.token_id, "tok");
    stop(harness).await;
}

#[tokio::test]
async fn test_narrow_spread_records_nothing() {
    let strategies: Vec<Arc<dyn ArbStrategy>> =
        vec![Arc::new(SpreadStrategy::new(spread_config(to_ticks(1.0))))];
    let mut harness = spawn_detector(strategies, ArbGates::default());
    tokio::time::sleep(Duration::from_millis(50)).await;

    // 10 bps of spread against a 30 bps threshold.
    harness
        .cache
        .set_snapshot(&snapshot("tok", 0.4998, 0.5003, 50.0))
        .await
        .unwrap();
    let mut arb_sub = harness.bus.subscribe(TOPIC_ARB).await.unwrap();
    harness
        .bus
        .publish(TOPIC_PRICES, &price_event("tok", 0.4998, 0.5003))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert!(
        tokio::time::timeout(Duration::from_millis(100), arb_sub.recv())
            .await
            .is_err()
    );
    assert!(harness.signal_rx.try_recv().is_err());
    assert!(harness.bus.stream_read(STREAM_ARB, "", 10).await.unwrap().is_empty());
    stop(harness).await;
}

#[tokio::test]
async fn test_cache_miss_synthesizes_snapshot_from_event() {
    // Zero minimum size so the one-level synthesized book qualifies.
    let strategies: Vec<Arc<dyn ArbStrategy>> =
        vec![Arc::new(SpreadStrategy::new(spread_config(0)))];
    let mut harness = spawn_detector(strategies, ArbGates::default());
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Nothing in the cache for this asset.
    harness
        .bus
        .publish(TOPIC_PRICES, &price_event("ghost", 0.44, 0.50))
        .await
        .unwrap();

    let signal = tokio::time::timeout(Duration::from_secs(1), harness.signal_rx.recv())
        .await
        .expect("signal from synthesized snapshot")
        .unwrap();
    assert_eq!(signal.token_id, "ghost");
    stop(harness).await;
}

/// A strategy whose opportunities never survive their own costs.
struct NegativeEdge;

impl ArbStrategy for NegativeEdge {
    fn name(&self) -> &str {
        "negative_edge"
    }

    fn detect(&self, snapshot: &OrderbookSnapshot) -> Vec<ArbOpportunity> {
        vec![ArbOpportunity {
            id: Uuid::new_v4().to_string(),
            poly_market_id: "m1".to_string(),
            poly_token_id: snapshot.asset_id.clone(),
            poly_price: 0.50,
            kalshi_market_id: String::new(),
            kalshi_price: 0.0,
            gross_edge_bps: 10.0,
            est_fee_bps: 0.0,
            est_slippage_bps: 0.0,
            est_latency_bps: 0.0,
            net_edge_bps: 10.0,
            direction: ArbDirection::BuyPolySellKalshi,
            max_amount: 100.0,
            expected_pnl_usd: 0.0,
            detected_at: Utc::now(),
            duration_ms: 0,
            executed: false,
        }
        .with_costs(20.0, 5.0, 5.0)]
    }
}

#[tokio::test]
async fn test_non_viable_opportunity_is_never_recorded() {
    let strategies: Vec<Arc<dyn ArbStrategy>> = vec![Arc::new(NegativeEdge)];
    let mut harness = spawn_detector(strategies, ArbGates::default());
    tokio::time::sleep(Duration::from_millis(50)).await;

    harness
        .cache
        .set_snapshot(&snapshot("tok", 0.44, 0.50, 50.0))
        .await
        .unwrap();
    harness
        .bus
        .publish(TOPIC_PRICES, &price_event("tok", 0.44, 0.50))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert!(harness.bus.stream_read(STREAM_ARB, "", 10).await.unwrap().is_empty());
    assert!(harness.signal_rx.try_recv().is_err());
    stop(harness).await;
}
