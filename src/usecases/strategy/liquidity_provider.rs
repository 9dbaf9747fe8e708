//! Liquidity Provider Strategy - Symmetric Quotes Around Mid
//!
//! Maintains a bid/ask pair at `mid ± half_spread` per token and only
//! requotes when the mid has moved beyond `requote_threshold` since
//! the last quote. Signals carry the `liquidity_provider` source so
//! the executor uses replace-order semantics for the resting side.
//!
//! Options: `half_spread` (0.01), `requote_threshold` (0.005).

use std::collections::HashMap;

use async_trait::async_trait;
use tracing::debug;

use crate::domain::orderbook::{ticks_to_f64, OrderbookSnapshot, Side};
use crate::domain::signal::{TradeSignal, Urgency};

use super::{Strategy, StrategyParams};

pub const NAME: &str = "liquidity_provider";

/// Two-sided quoting with movement-gated requotes.
pub struct LiquidityProvider {
  params: StrategyParams,
  half_spread: f64,
  requote_threshold: f64,
  /// Mid at the time of the last quote, per token.
  last_quote_mid: HashMap<String, f64>,
}

impl LiquidityProvider {
  pub fn new(params: StrategyParams) -> Self {
    let half_spread = params.option("half_spread", 0.01);
    let requote_threshold = params.option("requote_threshold", 0.005);
    Self {
      params,
      half_spread,
      requote_threshold,
      last_quote_mid: HashMap::new(),
    }
  }

  fn quote(&self, asset_id: &str, side: Side, price: f64) -> TradeSignal {
    // Prediction market prices live strictly inside (0, 1).
    let clamped = price.clamp(0.001, 0.999);
    TradeSignal::new(
      NAME,
      String::new(),
      asset_id.to_string(),
      side,
      self.params.price_to_ticks(clamped),
      self.params.size_units,
      Urgency::Low,
      format!("quote around mid {:.3}", price),
      self.params.signal_ttl(),
    )
  }
}

#[async_trait]
impl Strategy for LiquidityProvider {
  fn name(&self) -> &str {
    NAME
  }

  async fn on_book_update(
    &mut self,
    snapshot: &OrderbookSnapshot,
  ) -> anyhow::Result<Vec<TradeSignal>> {
    let Some(mid_ticks) = snapshot.mid_price_ticks else {
      return Ok(Vec::new());
    };
    let mid = ticks_to_f64(mid_ticks);

    if let Some(&last) = self.last_quote_mid.get(&snapshot.asset_id) {
      if (mid - last).abs() <= self.requote_threshold {
        debug!(asset = %snapshot.asset_id, mid, last, "mid within requote threshold");
        return Ok(Vec::new());
      }
    }

    self.last_quote_mid.insert(snapshot.asset_id.clone(), mid);
    Ok(vec![
      self.quote(&snapshot.asset_id, Side::Buy, mid - self.half_spread),
      self.quote(&snapshot.asset_id, Side::Sell, mid + self.half_spread),
    ])
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::orderbook::{to_ticks, PriceLevel};
  use chrono::Utc;

  fn snapshot(mid: f64) -> OrderbookSnapshot {
    OrderbookSnapshot::from_levels(
      "tok",
      vec![PriceLevel {
        price_ticks: to_ticks(mid - 0.02),
        size_units: to_ticks(10.0),
      }],
      vec![PriceLevel {
        price_ticks: to_ticks(mid + 0.02),
        size_units: to_ticks(10.0),
      }],
      Utc::now(),
    )
  }

  #[tokio::test]
  async fn test_first_book_quotes_both_sides() {
    let mut lp = LiquidityProvider::new(StrategyParams::default());
    let signals = lp.on_book_update(&snapshot(0.50)).await.unwrap();
    assert_eq!(signals.len(), 2);
    assert_eq!(signals[0].side, Side::Buy);
    assert_eq!(signals[0].price_ticks, to_ticks(0.49));
    assert_eq!(signals[1].side, Side::Sell);
    assert_eq!(signals[1].price_ticks, to_ticks(0.51));
    assert!(signals.iter().all(|s| s.source == NAME));
  }

  #[tokio::test]
  async fn test_small_mid_move_does_not_requote() {
    let mut lp = LiquidityProvider::new(StrategyParams::default());
    lp.on_book_update(&snapshot(0.50)).await.unwrap();
    let signals = lp.on_book_update(&snapshot(0.503)).await.unwrap();
    assert!(signals.is_empty());
  }

  #[tokio::test]
  async fn test_large_mid_move_requotes() {
    let mut lp = LiquidityProvider::new(StrategyParams::default());
    lp.on_book_update(&snapshot(0.50)).await.unwrap();
    let signals = lp.on_book_update(&snapshot(0.52)).await.unwrap();
    assert_eq!(signals.len(), 2);
    assert_eq!(signals[0].price_ticks, to_ticks(0.51));
  }

  #[tokio::test]
  async fn test_quotes_clamped_inside_unit_interval() {
    let mut lp = LiquidityProvider::new(StrategyParams::default());
    let signals = lp.on_book_update(&snapshot(0.005)).await.unwrap();
    assert_eq!(signals.len(), 2);
    assert!(signals[0].price_ticks >= to_ticks(0.001));
  }
}
