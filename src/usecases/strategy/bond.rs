//! Bond Strategy - Harvest Near-Certain YES Tokens
//!
//! Buys deep-in-the-money YES tokens whose remaining upside, annualized
//! over the time to expiry, clears a minimum APR. The name comes from
//! treating a 0.95 YES as a short-dated bond paying 1.00 at
//! resolution. Capped by open positions and gated on market volume so
//! the position can actually be exited.
//!
//! Options: `min_probability` (0.90), `min_apr` (0.10), `min_volume`
//! (1000), `max_days_to_expiry` (30).

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::info;

use crate::domain::market::{MarketCatalog, MarketStatus};
use crate::domain::orderbook::{ticks_to_f64, OrderbookSnapshot, Side};
use crate::domain::signal::{TradeSignal, Urgency};

use super::{Strategy, StrategyParams};

pub const NAME: &str = "bond";

/// Buys high-probability YES tokens with bond-like carry.
pub struct Bond {
  params: StrategyParams,
  catalog: Arc<MarketCatalog>,
  min_probability: f64,
  min_apr: f64,
  min_volume: f64,
  max_days_to_expiry: f64,
  /// Tokens already bought this session.
  positions: HashSet<String>,
}

impl Bond {
  pub fn new(params: StrategyParams, catalog: Arc<MarketCatalog>) -> Self {
    let min_probability = params.option("min_probability", 0.90);
    let min_apr = params.option("min_apr", 0.10);
    let min_volume = params.option("min_volume", 1000.0);
    let max_days_to_expiry = params.option("max_days_to_expiry", 30.0);
    Self {
      params,
      catalog,
      min_probability,
      min_apr,
      min_volume,
      max_days_to_expiry,
      positions: HashSet::new(),
    }
  }

  /// Annualized return of buying at `ask` and redeeming at 1.00.
  fn apr(ask: f64, days_to_expiry: f64) -> f64 {
    if ask <= 0.0 || days_to_expiry <= 0.0 {
      return 0.0;
    }
    (1.0 - ask) / ask * (365.0 / days_to_expiry)
  }
}

#[async_trait]
impl Strategy for Bond {
  fn name(&self) -> &str {
    NAME
  }

  async fn on_book_update(
    &mut self,
    snapshot: &OrderbookSnapshot,
  ) -> anyhow::Result<Vec<TradeSignal>> {
    let Some(market) = self.catalog.market_for_token(&snapshot.asset_id) else {
      return Ok(Vec::new());
    };
    if snapshot.asset_id != market.yes_token() || market.status != MarketStatus::Active {
      return Ok(Vec::new());
    }
    if self.positions.contains(&snapshot.asset_id)
      || self.positions.len() >= self.params.max_positions
    {
      return Ok(Vec::new());
    }
    let Some(ask_ticks) = snapshot.best_ask_ticks else {
      return Ok(Vec::new());
    };
    let ask = ticks_to_f64(ask_ticks);
    if ask < self.min_probability || ask >= 1.0 {
      return Ok(Vec::new());
    }
    if market.volume < self.min_volume {
      return Ok(Vec::new());
    }
    let Some(end_date) = market.end_date else {
      return Ok(Vec::new());
    };
    let days = (end_date - Utc::now()).num_seconds() as f64 / 86_400.0;
    if days <= 0.0 || days > self.max_days_to_expiry {
      return Ok(Vec::new());
    }
    let apr = Self::apr(ask, days);
    if apr < self.min_apr {
      return Ok(Vec::new());
    }

    self.positions.insert(snapshot.asset_id.clone());
    info!(
      market = %market.id,
      ask,
      apr_pct = apr * 100.0,
      days_to_expiry = days,
      "bond entry"
    );
    Ok(vec![TradeSignal::new(
      NAME,
      market.id.clone(),
      snapshot.asset_id.clone(),
      Side::Buy,
      ask_ticks,
      self.params.size_units,
      Urgency::Low,
      format!("{:.1}% APR to expiry", apr * 100.0),
      self.params.signal_ttl(),
    )])
  }
}
