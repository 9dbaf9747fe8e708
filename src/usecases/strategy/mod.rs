//! Strategy Layer - Plug-in Contract and Implementations
//!
//! A strategy is a stateful, single-owner consumer of market events
//! that emits `TradeSignal`s. The engine owns invocation: in
//! single-active mode events are dispatched inline, in multi-active
//! mode each strategy runs on its own task. Either way a strategy is
//! never called concurrently, so implementations keep plain state and
//! no locks.

pub mod bond;
pub mod combinatorial;
pub mod cross_platform;
pub mod engine;
pub mod flash_crash;
pub mod liquidity_provider;
pub mod mean_reversion;
pub mod rebalancing;
pub mod registry;
pub mod temporal_overlap;
pub mod yes_no_spread;

pub use engine::StrategyEngine;
pub use registry::{SharedStrategy, StrategyRegistry};

use std::collections::HashMap;

use async_trait::async_trait;

use crate::domain::orderbook::{OrderbookSnapshot, PriceChange, TradeEvent};
use crate::domain::signal::TradeSignal;

/// Common knobs plus free-form per-strategy options.
///
/// Options are a flat name -> number map so strategies can be tuned
/// from config without code changes; [`StrategyParams::option`] reads
/// one with a default.
#[derive(Debug, Clone)]
pub struct StrategyParams {
  /// Coin / market family this instance trades (diagnostic).
  pub coin: String,
  /// Default order size in units (1e6 scale).
  pub size_units: i64,
  /// Ticks per 1.00 of price in venue payloads.
  pub price_scale: i64,
  /// Units per contract in venue payloads.
  pub size_scale: i64,
  /// Maximum simultaneously open positions.
  pub max_positions: usize,
  /// Take-profit fraction.
  pub take_profit: f64,
  /// Stop-loss fraction.
  pub stop_loss: f64,
  /// Named per-strategy options.
  pub options: HashMap<String, f64>,
}

impl Default for StrategyParams {
  fn default() -> Self {
    Self {
      coin: String::new(),
      size_units: 10_000_000,
      price_scale: 1_000_000,
      size_scale: 1_000_000,
      max_positions: 10,
      take_profit: 0.0,
      stop_loss: 0.0,
      options: HashMap::new(),
    }
  }
}

impl StrategyParams {
  /// Read a named option, falling back to `default`.
  pub fn option(&self, key: &str, default: f64) -> f64 {
    self.options.get(key).copied().unwrap_or(default)
  }

  /// Convert a float price to ticks at the configured scale.
  pub fn price_to_ticks(&self, price: f64) -> i64 {
    (price * self.price_scale as f64).round() as i64
  }

  /// Convert a float size to units at the configured scale.
  pub fn size_to_units(&self, size: f64) -> i64 {
    (size * self.size_scale as f64).round() as i64
  }

  /// Signal time-to-live (`signal_ttl_secs`, default 30s).
  pub fn signal_ttl(&self) -> chrono::Duration {
    chrono::Duration::seconds(self.option("signal_ttl_secs", 30.0) as i64)
  }
}

/// Trait for pluggable trading strategies.
///
/// Handlers default to emitting nothing, so implementations only
/// override the events they care about. Handler errors are logged per
/// event by the engine and never stop the pipeline.
#[async_trait]
pub trait Strategy: Send + 'static {
  /// Stable name used for registry lookup and signal `source`.
  fn name(&self) -> &str;

  /// One-time initialization with resolved parameters.
  fn init(&mut self, _params: &StrategyParams) -> anyhow::Result<()> {
    Ok(())
  }

  /// Full book replacement for one token.
  async fn on_book_update(
    &mut self,
    _snapshot: &OrderbookSnapshot,
  ) -> anyhow::Result<Vec<TradeSignal>> {
    Ok(Vec::new())
  }

  /// Incremental level change.
  async fn on_price_change(
    &mut self,
    _change: &PriceChange,
  ) -> anyhow::Result<Vec<TradeSignal>> {
    Ok(Vec::new())
  }

  /// Last trade print.
  async fn on_trade(&mut self, _trade: &TradeEvent) -> anyhow::Result<Vec<TradeSignal>> {
    Ok(Vec::new())
  }

  /// A signal emitted elsewhere in the pipeline (peer strategies).
  async fn on_signal(&mut self, _signal: &TradeSignal) -> anyhow::Result<Vec<TradeSignal>> {
    Ok(Vec::new())
  }

  /// Release resources; called when the strategy is deactivated.
  fn close(&mut self) -> anyhow::Result<()> {
    Ok(())
  }
}

impl std::fmt::Debug for dyn Strategy {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Strategy").field("name", &self.name()).finish()
  }
}
