//! Arb Service - Opportunity Gates, Recording, Realized P&L
//!
//! `evaluate` is the single accept/reject decision for every detected
//! opportunity: positive gross and net edge, the configured minimum
//! net edge, notional cap, persistence, plus suppression of repeats on
//! the same market and direction inside a short window. `record`
//! publishes accepted opportunities on the `arb` topic and appends
//! them to the durable `arb` stream.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::adapters::metrics::BotMetrics;
use crate::domain::arb::{ArbExecution, ArbLeg, ArbOpportunity, LegStatus};
use crate::domain::orderbook::{ticks_to_f64, Side};
use crate::ports::arb::ArbService;
use crate::ports::bus::{SignalBus, STREAM_ARB, TOPIC_ARB};

/// Gate thresholds for [`DefaultArbService`].
#[derive(Debug, Clone)]
pub struct ArbGates {
  /// Minimum net edge to act on, bps.
  pub min_net_edge_bps: f64,
  /// Largest notional per opportunity, USD.
  pub max_trade_amount: f64,
  /// Minimum time the pricing must have persisted.
  pub min_duration: Duration,
  /// Window for duplicate suppression per (market, direction).
  pub dedup_window: Duration,
}

impl Default for ArbGates {
  fn default() -> Self {
    Self {
      min_net_edge_bps: 20.0,
      max_trade_amount: 1_000.0,
      min_duration: Duration::from_millis(0),
      dedup_window: Duration::from_secs(30),
    }
  }
}

/// Default gate-and-record implementation.
pub struct DefaultArbService {
  bus: Arc<dyn SignalBus>,
  metrics: Arc<BotMetrics>,
  gates: ArbGates,
  seen: Mutex<HashMap<String, Instant>>,
}

impl DefaultArbService {
  pub fn new(bus: Arc<dyn SignalBus>, metrics: Arc<BotMetrics>, gates: ArbGates) -> Self {
    Self {
      bus,
      metrics,
      gates,
      seen: Mutex::new(HashMap::new()),
    }
  }

  fn dedup_key(opp: &ArbOpportunity) -> String {
    format!("{}:{:?}", opp.poly_market_id, opp.direction)
  }
}

#[async_trait]
impl ArbService for DefaultArbService {
  async fn evaluate(&self, opp: &ArbOpportunity) -> anyhow::Result<bool> {
    if opp.gross_edge_bps <= 0.0 || !opp.is_viable() {
      return Ok(false);
    }
    if opp.net_edge_bps < self.gates.min_net_edge_bps {
      debug!(
        id = %opp.id,
        net_edge_bps = opp.net_edge_bps,
        min = self.gates.min_net_edge_bps,
        "net edge below threshold"
      );
      return Ok(false);
    }
    if opp.max_amount > self.gates.max_trade_amount {
      return Ok(false);
    }
    if Duration::from_millis(opp.duration_ms) < self.gates.min_duration {
      return Ok(false);
    }

    let key = Self::dedup_key(opp);
    let now = Instant::now();
    let mut seen = self.seen.lock();
    seen.retain(|_, &mut at| now.duration_since(at) < self.gates.dedup_window);
    if seen.contains_key(&key) {
      debug!(id = %opp.id, key = %key, "suppressing duplicate opportunity");
      return Ok(false);
    }
    seen.insert(key, now);
    Ok(true)
  }

  async fn record(&self, opp: &ArbOpportunity) -> anyhow::Result<()> {
    let payload = serde_json::to_string(opp)?;
    self.bus.publish(TOPIC_ARB, &payload).await?;
    self.bus.stream_append(STREAM_ARB, &payload).await?;
    self.metrics.arb_recorded.inc();
    info!(
      id = %opp.id,
      market = %opp.poly_market_id,
      net_edge_bps = opp.net_edge_bps,
      expected_pnl_usd = opp.expected_pnl_usd,
      "arb opportunity recorded"
    );
    Ok(())
  }

  /// Realized P&L of an execution from its filled legs.
  ///
  /// Complete one-sided bundles are valued to resolution: a bought
  /// basket redeems at 1.00 per contract, a sold basket owes 1.00.
  /// Mixed or partial bundles are valued at their net cash flow.
  fn compute_realized_pnl(&self, exec: &ArbExecution) -> f64 {
    let filled: Vec<&ArbLeg> = exec
      .legs
      .iter()
      .filter(|l| l.status == LegStatus::Filled)
      .collect();
    if filled.is_empty() {
      return 0.0;
    }

    let cash: f64 = filled.iter().map(|l| l.cash_flow_usd()).sum();
    let complete = filled.len() == exec.legs.len();
    let all_buys = filled.iter().all(|l| l.side == Side::Buy);
    let all_sells = filled.iter().all(|l| l.side == Side::Sell);
    if !complete || (!all_buys && !all_sells) {
      return cash;
    }

    // Exactly one leg of a complete basket pays out, so the
    // redemption is the smallest leg size.
    let min_size = filled
      .iter()
      .map(|l| l.size_units)
      .min()
      .unwrap_or_default();
    let redemption = ticks_to_f64(min_size);
    if all_buys {
      cash + redemption
    } else {
      cash - redemption
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::Utc;
  use uuid::Uuid;

  use crate::adapters::memory::MemoryBus;
  use crate::domain::arb::{ArbDirection, ArbType};
  use crate::domain::orderbook::to_ticks;

  fn service(gates: ArbGates) -> DefaultArbService {
    DefaultArbService::new(
      Arc::new(MemoryBus::new()),
      Arc::new(BotMetrics::new().unwrap()),
      gates,
    )
  }

  fn opportunity(gross: f64, costs: f64) -> ArbOpportunity {
    ArbOpportunity {
      id: Uuid::new_v4().to_string(),
      poly_market_id: "m1".to_string(),
      poly_token_id: "t1".to_string(),
      poly_price: 0.40,
      kalshi_market_id: String::new(),
      kalshi_price: 0.0,
      gross_edge_bps: gross,
      est_fee_bps: 0.0,
      est_slippage_bps: 0.0,
      est_latency_bps: 0.0,
      net_edge_bps: gross,
      direction: ArbDirection::BuyPolySellKalshi,
      max_amount: 100.0,
      expected_pnl_usd: 0.0,
      detected_at: Utc::now(),
      duration_ms: 50,
      executed: false,
    }
    .with_costs(costs, 0.0, 0.0)
  }

  fn leg(side: Side, price: f64, size: f64, status: LegStatus) -> ArbLeg {
    ArbLeg {
      order_id: "o".to_string(),
      market_id: "m1".to_string(),
      token_id: "t".to_string(),
      side,
      expected_price_ticks: to_ticks(price),
      filled_price_ticks: to_ticks(price),
      size_units: to_ticks(size),
      fee_usd: 0.0,
      slippage_bps: 0.0,
      status,
    }
  }

  #[tokio::test]
  async fn test_negative_net_edge_rejected() {
    let svc = service(ArbGates::default());
    assert!(!svc.evaluate(&opportunity(30.0, 50.0)).await.unwrap());
  }

  #[tokio::test]
  async fn test_below_min_net_edge_rejected() {
    let svc = service(ArbGates {
      min_net_edge_bps: 40.0,
      ..ArbGates::default()
    });
    assert!(!svc.evaluate(&opportunity(50.0, 20.0)).await.unwrap());
  }

  #[tokio::test]
  async fn test_good_edge_accepted_then_duplicate_suppressed() {
    let svc = service(ArbGates::default());
    let opp = opportunity(100.0, 10.0);
    assert!(svc.evaluate(&opp).await.unwrap());
    // Same market+direction inside the window.
    assert!(!svc.evaluate(&opportunity(100.0, 10.0)).await.unwrap());
  }

  #[tokio::test]
  async fn test_record_publishes_and_appends() {
    let bus = Arc::new(MemoryBus::new());
    let svc = DefaultArbService::new(
      Arc::clone(&bus) as Arc<dyn SignalBus>,
      Arc::new(BotMetrics::new().unwrap()),
      ArbGates::default(),
    );
    let mut sub = bus.subscribe(TOPIC_ARB).await.unwrap();

    svc.record(&opportunity(100.0, 10.0)).await.unwrap();

    assert!(sub.recv().await.is_some());
    assert_eq!(bus.stream_read(STREAM_ARB, "", 10).await.unwrap().len(), 1);
  }

  #[test]
  fn test_pnl_of_complete_buy_pair() {
    let svc = service(ArbGates::default());
    let mut exec = ArbExecution::begin(ArbType::Rebalancing, "opp", "grp");
    exec.legs.push(leg(Side::Buy, 0.40, 10.0, LegStatus::Filled));
    exec.legs.push(leg(Side::Buy, 0.55, 10.0, LegStatus::Filled));
    // Paid 9.50, redeems 10.00.
    let pnl = svc.compute_realized_pnl(&exec);
    assert!((pnl - 0.50).abs() < 1e-9, "got {pnl}");
  }

  #[test]
  fn test_pnl_of_complete_sell_pair() {
    let svc = service(ArbGates::default());
    let mut exec = ArbExecution::begin(ArbType::Rebalancing, "opp", "grp");
    exec.legs.push(leg(Side::Sell, 0.55, 10.0, LegStatus::Filled));
    exec.legs.push(leg(Side::Sell, 0.52, 10.0, LegStatus::Filled));
    // Collected 10.70, owes 10.00.
    let pnl = svc.compute_realized_pnl(&exec);
    assert!((pnl - 0.70).abs() < 1e-9, "got {pnl}");
  }

  #[test]
  fn test_pnl_of_partial_group_is_cash_flow() {
    let svc = service(ArbGates::default());
    let mut exec = ArbExecution::begin(ArbType::Rebalancing, "opp", "grp");
    exec.legs.push(leg(Side::Buy, 0.40, 10.0, LegStatus::Filled));
    exec.legs.push(leg(Side::Buy, 0.55, 10.0, LegStatus::Failed));
    let pnl = svc.compute_realized_pnl(&exec);
    assert!((pnl + 4.0).abs() < 1e-9, "got {pnl}");
  }

  #[test]
  fn test_pnl_of_empty_fills_is_zero() {
    let svc = service(ArbGates::default());
    let mut exec = ArbExecution::begin(ArbType::Rebalancing, "opp", "grp");
    exec.legs.push(leg(Side::Buy, 0.40, 10.0, LegStatus::Failed));
    assert_eq!(svc.compute_realized_pnl(&exec), 0.0);
  }
}
