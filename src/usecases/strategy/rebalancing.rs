//! Rebalancing Arb Strategy - Condition Groups Summing Away From 1
//!
//! Inside a condition group the YES prices of the member markets
//! should sum to 1. When the sum of YES mids drifts beyond `min_edge`,
//! every member is traded in the same direction as one `all_or_none`
//! group: buy all YES legs when the basket is cheap, sell them all
//! when it is rich.
//!
//! Options: `min_edge` (0.02), `max_group_size` (10), `max_stale_ms`
//! (5000), `cooldown_secs` (60).

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

pub const NAME: &str = "rebalancing";

#[derive(Clone, Copy)]
struct YesQuote {
  bid: f64,
  ask: f64,
  mid: f64,
  at: DateTime<Utc>,
}

/// Trades whole condition groups back toward a unit sum.
pub struct RebalancingArb {
  params: StrategyParams,
  catalog: Arc<MarketCatalog>,
  min_edge: f64,
  max_group_size: usize,
  max_stale: Duration,
  cooldown: Duration,
  /// Market id -> owning group name.
  group_of: HashMap<String, String>,
  /// Latest YES quote per market.
  quotes: HashMap<String, YesQuote>,
  last_emit: HashMap<String, DateTime<Utc>>,
}

impl RebalancingArb {
  pub fn new(params: StrategyParams, catalog: Arc<MarketCatalog>) -> Self {
    let min_edge = params.option("min_edge", 0.02);
    let max_group_size = params.option("max_group_size", 10.0) as usize;
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
      min_edge,
      max_group_size,
      max_stale,
      cooldown,
      group_of,
      quotes: HashMap::new(),
      last_emit: HashMap::new(),
    }
  }
}

#[async_trait]
impl Strategy for RebalancingArb {
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
    // Only the YES token prices the basket.
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
    self.quotes.insert(
      market_id.clone(),
      YesQuote {
        bid: ticks_to_f64(bid),
        ask: ticks_to_f64(ask),
        mid: ticks_to_f64(mid),
        at: snapshot.timestamp,
      },
    );

    let Some(group_name) = self.group_of.get(&market_id).cloned() else {
      return Ok(Vec::new());
    };
    let members = self.catalog.group(&group_name);
    if members.len() < 2 || members.len() > self.max_group_size {
      return Ok(Vec::new());
    }

    let now = snapshot.timestamp;
    let mut quotes = Vec::with_capacity(members.len());
    for member in &members {
      match self.quotes.get(&member.id) {
        Some(q) if now - q.at <= self.max_stale => {
          quotes.push((member.id.clone(), member.yes_token().to_string(), *q));
        }
        _ => return Ok(Vec::new()),
      }
    }
    if self
      .last_emit
      .get(&group_name)
      .is_some_and(|&t| now - t < self.cooldown)
    {
      return Ok(Vec::new());
    }

    let sum: f64 = quotes.iter().map(|(_, _, q)| q.mid).sum();
    let deviation = sum - 1.0;
    if deviation.abs() <= self.min_edge {
      return Ok(Vec::new());
    }

    let side = if deviation < 0.0 { Side::Buy } else { Side::Sell };
    let group_id = Uuid::new_v4().to_string();
    let opp_id = Uuid::new_v4().to_string();
    let reason = format!("group {group_name} yes sum {sum:.3}");
    info!(
      group = %group_name,
      sum,
      side = %side,
      legs = quotes.len(),
      "condition group rebalance"
    );

    let leg_count = quotes.len();
    let signals = quotes
      .into_iter()
      .map(|(member_id, yes_token, quote)| {
        let price = match side {
          Side::Buy => quote.ask,
          Side::Sell => quote.bid,
        };
        TradeSignal::new(
          NAME,
          member_id,
          yes_token,
          side,
          self.params.price_to_ticks(price),
          self.params.size_units,
          Urgency::High,
          reason.clone(),
          self.params.signal_ttl(),
        )
        .with_leg_group(&group_id, leg_count, LegPolicy::AllOrNone)
        .with_meta(META_ARB_TYPE, "rebalancing")
        .with_meta(META_OPP_ID, &opp_id)
      })
      .collect();

    self.last_emit.insert(group_name, now);
    Ok(signals)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::market::{Market, MarketStatus};
  use crate::domain::orderbook::{to_ticks, PriceLevel};

  fn market(id: &str, yes: &str, no: &str) -> Market {
    Market {
      id: id.to_string(),
      question: format!("{id}?"),
      slug: id.to_string(),
      outcomes: ["Yes".to_string(), "No".to_string()],
      token_ids: [yes.to_string(), no.to_string()],
      condition_id: format!("c-{id}"),
      neg_risk: true,
      volume: 0.0,
      status: MarketStatus::Active,
      created_at: Utc::now(),
      updated_at: Utc::now(),
      end_date: None,
    }
  }

  fn catalog() -> Arc<MarketCatalog> {
    let mut groups = HashMap::new();
    groups.insert(
      "election".to_string(),
      vec!["m1".to_string(), "m2".to_string(), "m3".to_string()],
    );
    Arc::new(MarketCatalog::new(
      vec![
        market("m1", "y1", "n1"),
        market("m2", "y2", "n2"),
        market("m3", "y3", "n3"),
      ],
      groups,
      HashMap::new(),
    ))
  }

  fn snapshot(token: &str, mid: f64, at: DateTime<Utc>) -> OrderbookSnapshot {
    OrderbookSnapshot::from_levels(
      token,
      vec![PriceLevel {
        price_ticks: to_ticks(mid - 0.01),
        size_units: to_ticks(100.0),
      }],
      vec![PriceLevel {
        price_ticks: to_ticks(mid + 0.01),
        size_units: to_ticks(100.0),
      }],
      at,
    )
  }

  #[tokio::test]
  async fn test_cheap_group_buys_every_yes_leg() {
    let mut strat = RebalancingArb::new(StrategyParams::default(), catalog());
    let t0 = Utc::now();

    // Mids: 0.30 + 0.30 + 0.30 = 0.90 < 1 - 0.02.
    assert!(strat.on_book_update(&snapshot("y1", 0.30, t0)).await.unwrap().is_empty());
    assert!(strat.on_book_update(&snapshot("y2", 0.30, t0)).await.unwrap().is_empty());
    let signals = strat.on_book_update(&snapshot("y3", 0.30, t0)).await.unwrap();

    assert_eq!(signals.len(), 3);
    assert!(signals.iter().all(|s| s.side == Side::Buy));
    assert_eq!(signals[0].leg_count(), Some(3));
    let group = signals[0].leg_group_id().unwrap();
    assert!(signals.iter().all(|s| s.leg_group_id() == Some(group)));
    // Buys go out at each market's ask.
    assert_eq!(signals[0].price_ticks, to_ticks(0.31));
  }

  #[tokio::test]
  async fn test_rich_group_sells_every_yes_leg() {
    let mut strat = RebalancingArb::new(StrategyParams::default(), catalog());
    let t0 = Utc::now();
    strat.on_book_update(&snapshot("y1", 0.40, t0)).await.unwrap();
    strat.on_book_update(&snapshot("y2", 0.40, t0)).await.unwrap();
    let signals = strat.on_book_update(&snapshot("y3", 0.40, t0)).await.unwrap();
    assert_eq!(signals.len(), 3);
    assert!(signals.iter().all(|s| s.side == Side::Sell));
    assert_eq!(signals[0].price_ticks, to_ticks(0.39));
  }

  #[tokio::test]
  async fn test_balanced_group_stays_quiet() {
    let mut strat = RebalancingArb::new(StrategyParams::default(), catalog());
    let t0 = Utc::now();
    strat.on_book_update(&snapshot("y1", 0.33, t0)).await.unwrap();
    strat.on_book_update(&snapshot("y2", 0.33, t0)).await.unwrap();
    let signals = strat.on_book_update(&snapshot("y3", 0.34, t0)).await.unwrap();
    assert!(signals.is_empty());
  }

  #[tokio::test]
  async fn test_no_token_updates_are_ignored() {
    let mut strat = RebalancingArb::new(StrategyParams::default(), catalog());
    let signals = strat
      .on_book_update(&snapshot("n1", 0.70, Utc::now()))
      .await
      .unwrap();
    assert!(signals.is_empty());
  }

  #[tokio::test]
  async fn test_missing_member_quote_blocks_emission() {
    let mut strat = RebalancingArb::new(StrategyParams::default(), catalog());
    let t0 = Utc::now();
    strat.on_book_update(&snapshot("y1", 0.30, t0)).await.unwrap();
    // m3 never quoted.
    let signals = strat.on_book_update(&snapshot("y2", 0.30, t0)).await.unwrap();
    assert!(signals.is_empty());
  }
}
