//! Arb Detector - Price Topic Consumer Loop
//!
//! Subscribes to the `prices` topic and, per book/price event: fetch
//! the full snapshot from the cache (synthesizing a minimal one from
//! the event on a miss), run every registered strategy, push each
//! opportunity through the arb service, and convert accepted ones into
//! executor signals: a two-leg bundle for cross-venue opportunities,
//! a single signal otherwise.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::adapters::metrics::BotMetrics;
use crate::domain::arb::{ArbDirection, ArbOpportunity};
use crate::domain::orderbook::{to_ticks, OrderbookSnapshot, PriceTopicEvent, Side};
use crate::domain::signal::{
  LegPolicy, TradeSignal, Urgency, META_ARB_TYPE, META_OPP_ID,
};
use crate::ports::arb::ArbService;
use crate::ports::bus::{SignalBus, TOPIC_PRICES};
use crate::ports::cache::BookCache;

use super::ArbStrategy;

/// Time-to-live for signals minted from opportunities.
const OPPORTUNITY_SIGNAL_TTL_SECS: i64 = 10;

/// The price-topic consumer loop.
pub struct ArbDetector {
  bus: Arc<dyn SignalBus>,
  cache: Arc<dyn BookCache>,
  strategies: Vec<Arc<dyn ArbStrategy>>,
  service: Arc<dyn ArbService>,
  /// When attached, accepted opportunities become executor signals.
  signal_tx: Option<mpsc::Sender<TradeSignal>>,
  metrics: Arc<BotMetrics>,
}

impl ArbDetector {
  pub fn new(
    bus: Arc<dyn SignalBus>,
    cache: Arc<dyn BookCache>,
    strategies: Vec<Arc<dyn ArbStrategy>>,
    service: Arc<dyn ArbService>,
    signal_tx: Option<mpsc::Sender<TradeSignal>>,
    metrics: Arc<BotMetrics>,
  ) -> Self {
    Self {
      bus,
      cache,
      strategies,
      service,
      signal_tx,
      metrics,
    }
  }

  /// Consume the `prices` topic until shutdown or bus close.
  #[instrument(skip_all, name = "arb_detector")]
  pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> anyhow::Result<()> {
    let mut subscription = self.bus.subscribe(TOPIC_PRICES).await?;
    info!(strategies = self.strategies.len(), "arb detector started");

    loop {
      tokio::select! {
        biased;
        _ = shutdown_rx.recv() => {
          info!("arb detector stopping");
          return Ok(());
        }
        maybe = subscription.recv() => match maybe {
          Some(payload) => {
            if let Err(e) = self.handle_event(&payload).await {
              debug!(error = %e, "unusable price event");
            }
          }
          None => {
            info!("price subscription closed, arb detector stopping");
            return Ok(());
          }
        }
      }
    }
  }

  async fn handle_event(&self, payload: &str) -> anyhow::Result<()> {
    let event: PriceTopicEvent = serde_json::from_str(payload)?;
    if event.event != PriceTopicEvent::BOOK_UPDATE
      && event.event != PriceTopicEvent::PRICE_CHANGE
    {
      return Ok(());
    }

    // Prefer full cached depth; fall back to a one-level synthesis so
    // a cache miss never stalls detection.
    let snapshot = match self.cache.get_snapshot(&event.asset_id).await {
      Ok(snapshot) => snapshot,
      Err(e) => {
        debug!(asset = %event.asset_id, error = %e, "cache miss, synthesizing snapshot");
        event.to_minimal_snapshot()
      }
    };

    for strategy in &self.strategies {
      for opp in strategy.detect(&snapshot) {
        self
          .metrics
          .arb_opportunities
          .with_label_values(&[strategy.name()])
          .inc();
        match self.service.evaluate(&opp).await {
          Ok(true) => {
            if let Err(e) = self.service.record(&opp).await {
              warn!(id = %opp.id, error = %e, "failed to record opportunity");
              continue;
            }
            self.emit_signals(&opp, &snapshot).await;
          }
          Ok(false) => {}
          Err(e) => warn!(id = %opp.id, error = %e, "opportunity evaluation failed"),
        }
      }
    }
    Ok(())
  }

  /// Convert an accepted opportunity into executor signals.
  async fn emit_signals(&self, opp: &ArbOpportunity, snapshot: &OrderbookSnapshot) {
    let Some(signal_tx) = &self.signal_tx else {
      return;
    };
    for signal in opportunity_signals(opp, snapshot) {
      if signal_tx.send(signal).await.is_err() {
        warn!("executor channel closed, dropping opportunity signals");
        return;
      }
    }
  }
}

/// Build the signal bundle for one opportunity.
///
/// Cross-venue opportunities become a two-leg `all_or_none` group;
/// single-venue ones a lone signal in the flagged direction.
fn opportunity_signals(opp: &ArbOpportunity, snapshot: &OrderbookSnapshot) -> Vec<TradeSignal> {
  let ttl = chrono::Duration::seconds(OPPORTUNITY_SIGNAL_TTL_SECS);
  let (poly_side, kalshi_side) = match opp.direction {
    ArbDirection::BuyPolySellKalshi => (Side::Buy, Side::Sell),
    ArbDirection::SellPolyBuyKalshi => (Side::Sell, Side::Buy),
  };

  let poly_price_ticks = match poly_side {
    Side::Buy => snapshot.best_ask_ticks,
    Side::Sell => snapshot.best_bid_ticks,
  }
  .unwrap_or_else(|| to_ticks(opp.poly_price));
  if poly_price_ticks <= 0 {
    return Vec::new();
  }

  // Contracts bought with max_amount at the reference price.
  let price = crate::domain::orderbook::ticks_to_f64(poly_price_ticks);
  let contracts = if price > 0.0 { opp.max_amount / price } else { 0.0 };
  if contracts <= 0.0 {
    return Vec::new();
  }
  let size_units = to_ticks(contracts);
  let reason = format!("net edge {:.1} bps", opp.net_edge_bps);

  let poly_leg = TradeSignal::new(
    "arb_detector",
    opp.poly_market_id.clone(),
    opp.poly_token_id.clone(),
    poly_side,
    poly_price_ticks,
    size_units,
    Urgency::Immediate,
    reason.clone(),
    ttl,
  )
  .with_meta(META_OPP_ID, &opp.id);

  if opp.kalshi_market_id.is_empty() {
    return vec![poly_leg];
  }

  let group_id = Uuid::new_v4().to_string();
  let kalshi_leg = TradeSignal::new(
    "arb_detector",
    opp.kalshi_market_id.clone(),
    opp.kalshi_market_id.clone(),
    kalshi_side,
    to_ticks(opp.kalshi_price),
    size_units,
    Urgency::Immediate,
    reason,
    ttl,
  )
  .with_meta(META_OPP_ID, &opp.id);

  vec![
    poly_leg
      .with_leg_group(&group_id, 2, LegPolicy::AllOrNone)
      .with_meta(META_ARB_TYPE, "cross_platform"),
    kalshi_leg
      .with_leg_group(&group_id, 2, LegPolicy::AllOrNone)
      .with_meta(META_ARB_TYPE, "cross_platform"),
  ]
}
