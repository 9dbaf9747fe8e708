//! Combinatorial Arb Strategy - Implied vs Actual Within a Group
//!
//! A relation service derives the implied YES price of one group
//! member from the others: members of a condition group are mutually
//! exclusive and exhaustive, so `implied_i = 1 - sum(p_j, j != i)`.
//! When the quoted price deviates from implied by more than
//! `deviation_threshold` (relative), the strategy emits corrective
//! legs: trade the mispriced market toward implied and take the
//! opposite side on every sibling.
//!
//! Options: `deviation_threshold` (0.05), `max_stale_ms` (5000),
//! `cooldown_secs` (60).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::info;
use uuid::Uuid;

use crate::domain::market::MarketCatalog;
use crate::domain::orderbook::{ticks_to_f64, OrderbookSnapshot, Side};
use crate::domain::signal::{LegPolicy, TradeSignal, Urgency, META_ARB_TYPE, META_OPP_ID};

use super::{Strategy, StrategyParams};

pub const NAME: &str = "combinatorial";

/// Computes implied group-member prices from sibling prices.
pub struct RelationService;

impl RelationService {
  /// Implied YES price of the member at `index` given all members'
  /// quoted YES prices. `None` when any sibling is missing.
  pub fn implied_price(prices: &[Option<f64>], index: usize) -> Option<f64> {
    let mut sibling_sum = 0.0;
    for (i, price) in prices.iter().enumerate() {
      if i == index {
        continue;
      }
      sibling_sum += (*price)?;
    }
    Some((1.0 - sibling_sum).clamp(0.0, 1.0))
  }
}

#[derive(Clone, Copy)]
struct YesQuote {
  bid: f64,
  ask: f64,
  mid: f64,
  at: DateTime<Utc>,
}

/// Trades group members priced away from their implied value.
pub struct CombinatorialArb {
  params: StrategyParams,
  catalog: Arc<MarketCatalog>,
  deviation_threshold: f64,
  max_stale: Duration,
  cooldown: Duration,
  group_of: HashMap<String, String>,
  quotes: HashMap<String, YesQuote>,
  last_emit: HashMap<String, DateTime<Utc>>,
}

impl CombinatorialArb {
  pub fn new(params: StrategyParams, catalog: Arc<MarketCatalog>) -> Self {
    let deviation_threshold = params.option("deviation_threshold", 0.05);
    let max_stale = Duration::milliseconds(params.option("max_stale_ms", 5000.0) as i64);
    let cooldown = Duration::seconds(params.option("cooldown_secs", 60.0) as i64);

    let mut group_of = HashMap::new();
    for name in catalog.group_names() {
      for market in catalog.group(name) {
        group_of.insert(market.id.clone(), name.to_string());
      }
    }

    Self {
      params,
      catalog,
      deviation_threshold,
      max_stale,
      cooldown,
      group_of,
      quotes: HashMap::new(),
      last_emit: HashMap::new(),
    }
  }
}

#[async_trait]
impl Strategy for CombinatorialArb {
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
    if snapshot.asset_id != market.yes_token() {
      return Ok(Vec::new());
    }
    let (Some(bid), Some(ask), Some(mid)) = (
      snapshot.best_bid_ticks,
      snapshot.best_ask_ticks,
      snapshot.mid_price_ticks,
    ) else {
      return Ok(Vec::new());
    };
    let market_id = market.id.clone();
    let now = snapshot.timestamp;
    self.quotes.insert(
      market_id.clone(),
      YesQuote {
        bid: ticks_to_f64(bid),
        ask: ticks_to_f64(ask),
        mid: ticks_to_f64(mid),
        at: now,
      },
    );

    let Some(group_name) = self.group_of.get(&market_id).cloned() else {
      return Ok(Vec::new());
    };
    let members = self.catalog.group(&group_name);
    if members.len() < 2 {
      return Ok(Vec::new());
    }
    if self
      .last_emit
      .get(&group_name)
      .is_some_and(|&t| now - t < self.cooldown)
    {
      return Ok(Vec::new());
    }

    let member_ids: Vec<String> = members.iter().map(|m| m.id.clone()).collect();
    let prices: Vec<Option<f64>> = member_ids
      .iter()
      .map(|id| {
        self
          .quotes
          .get(id)
          .filter(|q| now - q.at <= self.max_stale)
          .map(|q| q.mid)
      })
      .collect();

    let Some(index) = member_ids.iter().position(|id| *id == market_id) else {
      return Ok(Vec::new());
    };
    let Some(implied) = RelationService::implied_price(&prices, index) else {
      return Ok(Vec::new());
    };
    if implied <= 0.0 {
      return Ok(Vec::new());
    }

    let actual = ticks_to_f64(mid);
    let deviation = (actual - implied) / implied;
    if deviation.abs() <= self.deviation_threshold {
      return Ok(Vec::new());
    }

    // Underpriced target: buy it, sell the siblings. Overpriced: the
    // reverse.
    let target_side = if deviation < 0.0 { Side::Buy } else { Side::Sell };
    let group_id = Uuid::new_v4().to_string();
    let opp_id = Uuid::new_v4().to_string();
    let leg_count = members.len();
    let reason = format!(
      "{market_id} at {actual:.3} vs implied {implied:.3} ({:+.1}%)",
      deviation * 100.0
    );
    info!(group = %group_name, target = %market_id, actual, implied, "combinatorial mispricing");

    let mut signals = Vec::with_capacity(leg_count);
    for member in &members {
      let Some(quote) = self.quotes.get(&member.id) else {
        return Ok(Vec::new());
      };
      let side = if member.id == market_id {
        target_side
      } else {
        match target_side {
          Side::Buy => Side::Sell,
          Side::Sell => Side::Buy,
        }
      };
      let price = match side {
        Side::Buy => quote.ask,
        Side::Sell => quote.bid,
      };
      signals.push(
        TradeSignal::new(
          NAME,
          member.id.clone(),
          member.yes_token().to_string(),
          side,
          self.params.price_to_ticks(price),
          self.params.size_units,
          Urgency::High,
          reason.clone(),
          self.params.signal_ttl(),
        )
        .with_leg_group(&group_id, leg_count, LegPolicy::AllOrNone)
        .with_meta(META_ARB_TYPE, "combinatorial")
        .with_meta(META_OPP_ID, &opp_id),
      );
    }

    self.last_emit.insert(group_name, now);
    Ok(signals)
  }
}
