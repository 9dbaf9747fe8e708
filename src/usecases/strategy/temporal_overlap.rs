//! Temporal Overlap Strategy - Horizon-Related Market Pairs
//!
//! For paired markets where the shorter-horizon event implies the
//! longer one (BTC above X by Friday implies BTC above X by Sunday),
//! the longer market's YES can never be worth less than the shorter
//! one's. When the longer leg's ask drops below the shorter leg's bid
//! by more than `min_edge`, buy the longer YES and sell the shorter
//! YES as one bundle.
//!
//! Options: `min_edge` (0.02), `max_stale_ms` (5000),
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

pub const NAME: &str = "temporal_overlap";

#[derive(Clone, Copy)]
struct YesQuote {
  bid: f64,
  ask: f64,
  at: DateTime<Utc>,
}

/// Trades ordering violations between horizon-paired markets.
pub struct TemporalOverlap {
  params: StrategyParams,
  catalog: Arc<MarketCatalog>,
  min_edge: f64,
  max_stale: Duration,
  cooldown: Duration,
  quotes: HashMap<String, YesQuote>,
  last_emit: HashMap<String, DateTime<Utc>>,
}

impl TemporalOverlap {
  pub fn new(params: StrategyParams, catalog: Arc<MarketCatalog>) -> Self {
    let min_edge = params.option("min_edge", 0.02);
    let max_stale = Duration::milliseconds(params.option("max_stale_ms", 5000.0) as i64);
    let cooldown = Duration::seconds(params.option("cooldown_secs", 60.0) as i64);
    Self {
      params,
      catalog,
      min_edge,
      max_stale,
      cooldown,
      quotes: HashMap::new(),
      last_emit: HashMap::new(),
    }
  }
}

#[async_trait]
impl Strategy for TemporalOverlap {
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
    let (Some(bid_ticks), Some(ask_ticks)) =
      (snapshot.best_bid_ticks, snapshot.best_ask_ticks)
    else {
      return Ok(Vec::new());
    };
    let now = snapshot.timestamp;
    let market_id = market.id.clone();
    self.quotes.insert(
      market_id.clone(),
      YesQuote {
        bid: ticks_to_f64(bid_ticks),
        ask: ticks_to_f64(ask_ticks),
        at: now,
      },
    );

    // Pairs are stored shorter -> longer; resolve from either end.
    let (shorter, longer) = if let Some(longer) = self.catalog.paired_market(&market_id) {
      (market_id.clone(), longer.id.clone())
    } else {
      match self
        .catalog
        .markets()
        .iter()
        .find(|m| self.catalog.paired_market(&m.id).map(|p| p.id.clone()) == Some(market_id.clone()))
      {
        Some(shorter) => (shorter.id.clone(), market_id.clone()),
        None => return Ok(Vec::new()),
      }
    };

    let (Some(short_quote), Some(long_quote)) =
      (self.quotes.get(&shorter).copied(), self.quotes.get(&longer).copied())
    else {
      return Ok(Vec::new());
    };
    if now - short_quote.at > self.max_stale || now - long_quote.at > self.max_stale {
      return Ok(Vec::new());
    }
    if self
      .last_emit
      .get(&shorter)
      .is_some_and(|&t| now - t < self.cooldown)
    {
      return Ok(Vec::new());
    }

    // Ordering violation: the implied (longer) event trades under the
    // implying (shorter) one.
    if short_quote.bid - long_quote.ask <= self.min_edge {
      return Ok(Vec::new());
    }

    let (Some(shorter_market), Some(longer_market)) =
      (self.catalog.market(&shorter), self.catalog.market(&longer))
    else {
      return Ok(Vec::new());
    };
    let group_id = Uuid::new_v4().to_string();
    let opp_id = Uuid::new_v4().to_string();
    let reason = format!(
      "{shorter} bid {:.3} above {longer} ask {:.3}",
      short_quote.bid, long_quote.ask
    );
    info!(
      shorter = %shorter,
      longer = %longer,
      short_bid = short_quote.bid,
      long_ask = long_quote.ask,
      "temporal ordering violation"
    );

    let make_leg = |market_id: &str, token: &str, side: Side, price: f64| {
      TradeSignal::new(
        NAME,
        market_id.to_string(),
        token.to_string(),
        side,
        self.params.price_to_ticks(price),
        self.params.size_units,
        Urgency::High,
        reason.clone(),
        self.params.signal_ttl(),
      )
      .with_leg_group(&group_id, 2, LegPolicy::AllOrNone)
      .with_meta(META_ARB_TYPE, "combinatorial")
      .with_meta(META_OPP_ID, &opp_id)
    };

    self.last_emit.insert(shorter.clone(), now);
    Ok(vec![
      make_leg(
        &longer,
        longer_market.yes_token(),
        Side::Buy,
        long_quote.ask,
      ),
      make_leg(
        &shorter,
        shorter_market.yes_token(),
        Side::Sell,
        short_quote.bid,
      ),
    ])
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::market::{Market, MarketStatus};
  use crate::domain::orderbook::{to_ticks, PriceLevel};

  fn market(id: &str, yes: &str) -> Market {
    Market {
      id: id.to_string(),
      question: format!("{id}?"),
      slug: id.to_string(),
      outcomes: ["Yes".to_string(), "No".to_string()],
      token_ids: [yes.to_string(), format!("no-{id}")],
      condition_id: format!("c-{id}"),
      neg_risk: false,
      volume: 0.0,
      status: MarketStatus::Active,
      created_at: Utc::now(),
      updated_at: Utc::now(),
      end_date: None,
    }
  }

  fn catalog() -> Arc<MarketCatalog> {
    let mut pairs = HashMap::new();
    pairs.insert("friday".to_string(), "sunday".to_string());
    Arc::new(MarketCatalog::new(
      vec![market("friday", "yf"), market("sunday", "ys")],
      HashMap::new(),
      pairs,
    ))
  }

  fn snapshot(token: &str, bid: f64, ask: f64, at: DateTime<Utc>) -> OrderbookSnapshot {
    OrderbookSnapshot::from_levels(
      token,
      vec![PriceLevel {
        price_ticks: to_ticks(bid),
        size_units: to_ticks(100.0),
      }],
      vec![PriceLevel {
        price_ticks: to_ticks(ask),
        size_units: to_ticks(100.0),
      }],
      at,
    )
  }

  #[tokio::test]
  async fn test_ordering_violation_buys_longer_sells_shorter() {
    let mut strat = TemporalOverlap::new(StrategyParams::default(), catalog());
    let t0 = Utc::now();

    strat
      .on_book_update(&snapshot("yf", 0.60, 0.62, t0))
      .await
      .unwrap();
    // Sunday YES asked at 0.50 while Friday YES bids 0.60.
    let signals = strat
      .on_book_update(&snapshot("ys", 0.48, 0.50, t0))
      .await
      .unwrap();

    assert_eq!(signals.len(), 2);
    let long_leg = signals.iter().find(|s| s.market_id == "sunday").unwrap();
    let short_leg = signals.iter().find(|s| s.market_id == "friday").unwrap();
    assert_eq!(long_leg.side, Side::Buy);
    assert_eq!(long_leg.price_ticks, to_ticks(0.50));
    assert_eq!(short_leg.side, Side::Sell);
    assert_eq!(short_leg.price_ticks, to_ticks(0.60));
    assert_eq!(long_leg.leg_group_id(), short_leg.leg_group_id());
  }

  #[tokio::test]
  async fn test_consistent_ordering_stays_quiet() {
    let mut strat = TemporalOverlap::new(StrategyParams::default(), catalog());
    let t0 = Utc::now();
    strat
      .on_book_update(&snapshot("yf", 0.55, 0.57, t0))
      .await
      .unwrap();
    let signals = strat
      .on_book_update(&snapshot("ys", 0.60, 0.62, t0))
      .await
      .unwrap();
    assert!(signals.is_empty());
  }

  #[tokio::test]
  async fn test_unpaired_market_is_ignored() {
    let catalog = Arc::new(MarketCatalog::new(
      vec![market("solo", "y-solo")],
      HashMap::new(),
      HashMap::new(),
    ));
    let mut strat = TemporalOverlap::new(StrategyParams::default(), catalog);
    let signals = strat
      .on_book_update(&snapshot("y-solo", 0.40, 0.42, Utc::now()))
      .await
      .unwrap();
    assert!(signals.is_empty());
  }
}
