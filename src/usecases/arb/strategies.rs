//! Arb Detection Strategies - Spread, Imbalance, Yes/No Placeholder
//!
//! Each strategy scores gross edge from one snapshot, applies the
//! configured fee/slippage/latency model, and emits only viable
//! (positive net edge) opportunities.

use chrono::Utc;
use uuid::Uuid;

use crate::domain::arb::{ArbDirection, ArbOpportunity};
use crate::domain::orderbook::{ticks_to_f64, OrderbookSnapshot, Side};

use super::{ArbStrategy, ArbStrategyConfig};

fn base_opportunity(
  snapshot: &OrderbookSnapshot,
  gross_edge_bps: f64,
  direction: ArbDirection,
  config: &ArbStrategyConfig,
) -> ArbOpportunity {
  ArbOpportunity {
    id: Uuid::new_v4().to_string(),
    poly_market_id: String::new(),
    poly_token_id: snapshot.asset_id.clone(),
    poly_price: snapshot.mid_price_ticks.map(ticks_to_f64).unwrap_or(0.0),
    kalshi_market_id: String::new(),
    kalshi_price: 0.0,
    gross_edge_bps,
    est_fee_bps: 0.0,
    est_slippage_bps: 0.0,
    est_latency_bps: 0.0,
    net_edge_bps: gross_edge_bps,
    direction,
    max_amount: config.max_trade_amount,
    expected_pnl_usd: 0.0,
    detected_at: Utc::now(),
    duration_ms: 0,
    executed: false,
  }
  .with_costs(config.fee_bps, config.slippage_bps, config.latency_bps)
}

/// Flags books whose BBO spread is wide enough to capture.
pub struct SpreadStrategy {
  config: ArbStrategyConfig,
}

impl SpreadStrategy {
  pub fn new(config: ArbStrategyConfig) -> Self {
    Self { config }
  }
}

impl ArbStrategy for SpreadStrategy {
  fn name(&self) -> &str {
    "spread"
  }

  fn detect(&self, snapshot: &OrderbookSnapshot) -> Vec<ArbOpportunity> {
    let Some(spread_bps) = snapshot.spread_bps() else {
      return Vec::new();
    };
    if spread_bps < self.config.min_spread_bps {
      return Vec::new();
    }
    // Both top levels must be deep enough to actually trade against.
    let top_bid = snapshot.bids.first().map_or(0, |l| l.size_units);
    let top_ask = snapshot.asks.first().map_or(0, |l| l.size_units);
    if top_bid < self.config.min_top_size_units || top_ask < self.config.min_top_size_units {
      return Vec::new();
    }

    let opp = base_opportunity(
      snapshot,
      spread_bps,
      ArbDirection::BuyPolySellKalshi,
      &self.config,
    );
    if opp.is_viable() {
      vec![opp]
    } else {
      Vec::new()
    }
  }
}

/// Flags books with one-sided resting volume.
pub struct ImbalanceStrategy {
  config: ArbStrategyConfig,
  /// Synthetic gross edge granted per unit of ratio beyond 1.
  edge_per_ratio_bps: f64,
}

impl ImbalanceStrategy {
  pub fn new(config: ArbStrategyConfig) -> Self {
    Self {
      config,
      edge_per_ratio_bps: 10.0,
    }
  }
}

impl ArbStrategy for ImbalanceStrategy {
  fn name(&self) -> &str {
    "imbalance"
  }

  fn detect(&self, snapshot: &OrderbookSnapshot) -> Vec<ArbOpportunity> {
    let bid_vol = snapshot.depth_units(Side::Buy) as f64;
    let ask_vol = snapshot.depth_units(Side::Sell) as f64;
    if bid_vol <= 0.0 || ask_vol <= 0.0 {
      return Vec::new();
    }
    let ratio = bid_vol / ask_vol;

    let (direction, strength) = if ratio >= self.config.imbalance_ratio {
      // Bid pressure: expect the price to climb.
      (ArbDirection::BuyPolySellKalshi, ratio)
    } else if ratio <= 1.0 / self.config.imbalance_ratio {
      (ArbDirection::SellPolyBuyKalshi, 1.0 / ratio)
    } else {
      return Vec::new();
    };

    let gross = (strength - 1.0) * self.edge_per_ratio_bps;
    let opp = base_opportunity(snapshot, gross, direction, &self.config);
    if opp.is_viable() {
      vec![opp]
    } else {
      Vec::new()
    }
  }
}

/// Registered for completeness of the strategy set; pair detection
/// needs both outcome books while `detect` sees exactly one snapshot,
/// so this never emits. The engine-level `yes_no_spread` strategy does
/// the real pair detection.
pub struct YesNoSpreadStrategy;

impl ArbStrategy for YesNoSpreadStrategy {
  fn name(&self) -> &str {
    "yes_no_spread"
  }

  fn detect(&self, _snapshot: &OrderbookSnapshot) -> Vec<ArbOpportunity> {
    Vec::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::orderbook::{to_ticks, PriceLevel};

  fn snapshot(bid: f64, ask: f64, bid_size: f64, ask_size: f64) -> OrderbookSnapshot {
    OrderbookSnapshot::from_levels(
      "tok",
      vec![PriceLevel {
        price_ticks: to_ticks(bid),
        size_units: to_ticks(bid_size),
      }],
      vec![PriceLevel {
        price_ticks: to_ticks(ask),
        size_units: to_ticks(ask_size),
      }],
      Utc::now(),
    )
  }

  #[test]
  fn test_wide_spread_with_depth_is_flagged() {
    let strategy = SpreadStrategy::new(ArbStrategyConfig::default());
    // 0.44/0.50: ~1276 bps of spread on a 0.47 mid.
    let opps = strategy.detect(&snapshot(0.44, 0.50, 50.0, 50.0));
    assert_eq!(opps.len(), 1);
    let opp = &opps[0];
    assert!(opp.gross_edge_bps > 1000.0);
    assert!(opp.is_viable());
    assert_eq!(
      opp.net_edge_bps,
      opp.gross_edge_bps - opp.est_fee_bps - opp.est_slippage_bps - opp.est_latency_bps
    );
  }

  #[test]
  fn test_narrow_spread_is_ignored() {
    let strategy = SpreadStrategy::new(ArbStrategyConfig::default());
    // ~20 bps spread, below the 30 bps threshold.
    let opps = strategy.detect(&snapshot(0.499, 0.500, 50.0, 50.0));
    assert!(opps.is_empty());
  }

  #[test]
  fn test_thin_top_of_book_is_ignored() {
    let strategy = SpreadStrategy::new(ArbStrategyConfig::default());
    let opps = strategy.detect(&snapshot(0.44, 0.50, 0.5, 50.0));
    assert!(opps.is_empty());
  }

  #[test]
  fn test_bid_heavy_book_flags_buy_direction() {
    let strategy = ImbalanceStrategy::new(ArbStrategyConfig::default());
    let opps = strategy.detect(&snapshot(0.48, 0.50, 500.0, 50.0));
    assert_eq!(opps.len(), 1);
    assert_eq!(opps[0].direction, ArbDirection::BuyPolySellKalshi);
  }

  #[test]
  fn test_ask_heavy_book_flags_sell_direction() {
    let strategy = ImbalanceStrategy::new(ArbStrategyConfig::default());
    let opps = strategy.detect(&snapshot(0.48, 0.50, 50.0, 500.0));
    assert_eq!(opps.len(), 1);
    assert_eq!(opps[0].direction, ArbDirection::SellPolyBuyKalshi);
  }

  #[test]
  fn test_balanced_book_is_ignored() {
    let strategy = ImbalanceStrategy::new(ArbStrategyConfig::default());
    let opps = strategy.detect(&snapshot(0.48, 0.50, 60.0, 50.0));
    assert!(opps.is_empty());
  }

  #[test]
  fn test_yes_no_placeholder_never_emits() {
    let strategy = YesNoSpreadStrategy;
    let opps = strategy.detect(&snapshot(0.10, 0.90, 500.0, 500.0));
    assert!(opps.is_empty());
  }
}
