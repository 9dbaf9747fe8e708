//! Arbitrage Layer - Detection Strategies, Gates, Consumer Loop
//!
//! An `ArbStrategy` scores one orderbook snapshot into zero or more
//! costed opportunities; the detector loop feeds snapshots from the
//! `prices` topic, runs every registered strategy, and pushes accepted
//! opportunities through the arb service (gates + recording) before
//! converting them into executor signals.

pub mod detector;
pub mod service;
pub mod strategies;

pub use detector::ArbDetector;
pub use service::{ArbGates, DefaultArbService};
pub use strategies::{ImbalanceStrategy, SpreadStrategy, YesNoSpreadStrategy};

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::domain::arb::ArbOpportunity;
use crate::domain::error::BotError;
use crate::domain::orderbook::OrderbookSnapshot;

/// Cost model and thresholds shared by the detection strategies.
#[derive(Debug, Clone)]
pub struct ArbStrategyConfig {
  /// Per-venue taker fee estimate, bps.
  pub fee_bps: f64,
  /// Expected slippage, bps.
  pub slippage_bps: f64,
  /// Latency cost estimate, bps.
  pub latency_bps: f64,
  /// Minimum BBO spread worth flagging, bps.
  pub min_spread_bps: f64,
  /// Minimum top-of-book size, units.
  pub min_top_size_units: i64,
  /// Bid/ask volume ratio that counts as imbalance.
  pub imbalance_ratio: f64,
  /// Notional deployed per opportunity, USD.
  pub max_trade_amount: f64,
}

impl Default for ArbStrategyConfig {
  fn default() -> Self {
    Self {
      fee_bps: 10.0,
      slippage_bps: 10.0,
      latency_bps: 5.0,
      min_spread_bps: 30.0,
      min_top_size_units: 1_000_000,
      imbalance_ratio: 3.0,
      max_trade_amount: 100.0,
    }
  }
}

/// Trait for pluggable arbitrage detectors.
///
/// `detect` is pure with respect to the snapshot: strategies score
/// what they see and leave acceptance to the arb service.
pub trait ArbStrategy: Send + Sync + 'static {
  /// Stable name for registry lookup and metrics labels.
  fn name(&self) -> &str;

  /// Score one snapshot into costed opportunities (often empty).
  fn detect(&self, snapshot: &OrderbookSnapshot) -> Vec<ArbOpportunity>;
}

/// Concurrent name -> arb strategy map.
#[derive(Default)]
pub struct ArbStrategyRegistry {
  inner: RwLock<HashMap<String, Arc<dyn ArbStrategy>>>,
}

impl ArbStrategyRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register under the strategy's own name, replacing duplicates.
  pub fn register(&self, strategy: Arc<dyn ArbStrategy>) {
    self
      .inner
      .write()
      .insert(strategy.name().to_string(), strategy);
  }

  /// Look up a strategy, failing with `NotFound` for unknown names.
  pub fn get(&self, name: &str) -> anyhow::Result<Arc<dyn ArbStrategy>> {
    self
      .inner
      .read()
      .get(name)
      .cloned()
      .ok_or_else(|| BotError::NotFound(format!("arb strategy:{name}")).into())
  }

  /// All registered strategies, sorted by name.
  pub fn all(&self) -> Vec<Arc<dyn ArbStrategy>> {
    let inner = self.inner.read();
    let mut names: Vec<&String> = inner.keys().collect();
    names.sort();
    names.iter().map(|n| Arc::clone(&inner[*n])).collect()
  }

  /// Registered names, lexicographically sorted.
  pub fn list(&self) -> Vec<String> {
    let mut names: Vec<String> = self.inner.read().keys().cloned().collect();
    names.sort_unstable();
    names
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  struct Noop(&'static str);

  impl ArbStrategy for Noop {
    fn name(&self) -> &str {
      self.0
    }

    fn detect(&self, _snapshot: &OrderbookSnapshot) -> Vec<ArbOpportunity> {
      Vec::new()
    }
  }

  #[test]
  fn test_registry_round_trip() {
    let registry = ArbStrategyRegistry::new();
    registry.register(Arc::new(Noop("spread")));
    registry.register(Arc::new(Noop("imbalance")));

    assert!(registry.get("spread").is_ok());
    assert!(registry.get("ghost").is_err());
    assert_eq!(registry.list(), vec!["imbalance", "spread"]);
    assert_eq!(registry.all().len(), 2);
  }
}
