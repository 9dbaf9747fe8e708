//! Cross-Platform Arb Strategy - Polymarket vs Kalshi
//!
//! Compares the Polymarket YES book against the latest Kalshi quote
//! for the same event (from the cross-venue quote cache). A gap wider
//! than `min_edge` emits a two-leg bundle: buy the cheap venue, sell
//! the rich one. The Kalshi leg carries `venue=kalshi` metadata so the
//! order router can dispatch it.
//!
//! Options: `min_edge` (0.03), `cooldown_secs` (60).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::info;
use uuid::Uuid;

use crate::adapters::feeds::VenueQuoteCache;
use crate::domain::market::MarketCatalog;
use crate::domain::orderbook::{ticks_to_f64, OrderbookSnapshot, Side};
use crate::domain::signal::{LegPolicy, TradeSignal, Urgency, META_ARB_TYPE, META_OPP_ID};

use super::{Strategy, StrategyParams};

pub const NAME: &str = "cross_platform";

/// Metadata key naming the venue a leg belongs to.
pub const META_VENUE: &str = "venue";

/// Trades the same event across venues when quotes diverge.
pub struct CrossPlatformArb {
  params: StrategyParams,
  catalog: Arc<MarketCatalog>,
  quotes: Arc<VenueQuoteCache>,
  /// Polymarket market id -> Kalshi market id.
  venue_map: HashMap<String, String>,
  min_edge: f64,
  cooldown: Duration,
  last_emit: HashMap<String, DateTime<Utc>>,
}

impl CrossPlatformArb {
  pub fn new(
    params: StrategyParams,
    catalog: Arc<MarketCatalog>,
    quotes: Arc<VenueQuoteCache>,
    venue_map: HashMap<String, String>,
  ) -> Self {
    let min_edge = params.option("min_edge", 0.03);
    let cooldown = Duration::seconds(params.option("cooldown_secs", 60.0) as i64);
    Self {
      params,
      catalog,
      quotes,
      venue_map,
      min_edge,
      cooldown,
      last_emit: HashMap::new(),
    }
  }

  fn leg(
    &self,
    market_id: &str,
    token_id: &str,
    side: Side,
    price: f64,
    venue: &str,
    group_id: &str,
    opp_id: &str,
    reason: &str,
  ) -> TradeSignal {
    TradeSignal::new(
      NAME,
      market_id.to_string(),
      token_id.to_string(),
      side,
      self.params.price_to_ticks(price),
      self.params.size_units,
      Urgency::High,
      reason.to_string(),
      self.params.signal_ttl(),
    )
    .with_leg_group(group_id, 2, LegPolicy::AllOrNone)
    .with_meta(META_ARB_TYPE, "cross_platform")
    .with_meta(META_OPP_ID, opp_id)
    .with_meta(META_VENUE, venue)
  }
}

#[async_trait]
impl Strategy for CrossPlatformArb {
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
    let Some(kalshi_id) = self.venue_map.get(&market.id).cloned() else {
      return Ok(Vec::new());
    };
    let Some(kalshi) = self.quotes.get(&kalshi_id) else {
      return Ok(Vec::new());
    };
    let (Some(bid_ticks), Some(ask_ticks)) =
      (snapshot.best_bid_ticks, snapshot.best_ask_ticks)
    else {
      return Ok(Vec::new());
    };
    let now = snapshot.timestamp;
    if self
      .last_emit
      .get(&market.id)
      .is_some_and(|&t| now - t < self.cooldown)
    {
      return Ok(Vec::new());
    }

    let poly_bid = ticks_to_f64(bid_ticks);
    let poly_ask = ticks_to_f64(ask_ticks);
    let market_id = market.id.clone();
    let yes_token = market.yes_token().to_string();

    // Buy where it's cheap, sell where it's rich.
    let signals = if kalshi.yes_bid - poly_ask > self.min_edge {
      let group_id = Uuid::new_v4().to_string();
      let opp_id = Uuid::new_v4().to_string();
      let reason = format!("poly ask {poly_ask:.3} vs kalshi bid {:.3}", kalshi.yes_bid);
      info!(market = %market_id, poly_ask, kalshi_bid = kalshi.yes_bid, "cross-venue edge");
      vec![
        self.leg(&market_id, &yes_token, Side::Buy, poly_ask, "polymarket", &group_id, &opp_id, &reason),
        self.leg(&kalshi_id, &kalshi_id, Side::Sell, kalshi.yes_bid, "kalshi", &group_id, &opp_id, &reason),
      ]
    } else if poly_bid - kalshi.yes_ask > self.min_edge {
      let group_id = Uuid::new_v4().to_string();
      let opp_id = Uuid::new_v4().to_string();
      let reason = format!("poly bid {poly_bid:.3} vs kalshi ask {:.3}", kalshi.yes_ask);
      info!(market = %market_id, poly_bid, kalshi_ask = kalshi.yes_ask, "cross-venue edge");
      vec![
        self.leg(&market_id, &yes_token, Side::Sell, poly_bid, "polymarket", &group_id, &opp_id, &reason),
        self.leg(&kalshi_id, &kalshi_id, Side::Buy, kalshi.yes_ask, "kalshi", &group_id, &opp_id, &reason),
      ]
    } else {
      Vec::new()
    };

    if !signals.is_empty() {
      self.last_emit.insert(market_id, now);
    }
    Ok(signals)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::adapters::feeds::VenueQuote;
  use crate::domain::market::{Market, MarketStatus};
  use crate::domain::orderbook::{to_ticks, PriceLevel};

  fn setup(kalshi_bid: f64, kalshi_ask: f64) -> CrossPlatformArb {
    let market = Market {
      id: "m1".to_string(),
      question: "event?".to_string(),
      slug: "m1".to_string(),
      outcomes: ["Yes".to_string(), "No".to_string()],
      token_ids: ["ty".to_string(), "tn".to_string()],
      condition_id: "c1".to_string(),
      neg_risk: false,
      volume: 0.0,
      status: MarketStatus::Active,
      created_at: Utc::now(),
      updated_at: Utc::now(),
      end_date: None,
    };
    let catalog = Arc::new(MarketCatalog::new(
      vec![market],
      HashMap::new(),
      HashMap::new(),
    ));
    let quotes = Arc::new(VenueQuoteCache::new(std::time::Duration::from_secs(60)));
    quotes.set(VenueQuote {
      market_id: "kx-1".to_string(),
      yes_bid: kalshi_bid,
      yes_ask: kalshi_ask,
    });
    let mut venue_map = HashMap::new();
    venue_map.insert("m1".to_string(), "kx-1".to_string());
    CrossPlatformArb::new(StrategyParams::default(), catalog, quotes, venue_map)
  }

  fn snapshot(bid: f64, ask: f64) -> OrderbookSnapshot {
    OrderbookSnapshot::from_levels(
      "ty",
      vec![PriceLevel {
        price_ticks: to_ticks(bid),
        size_units: to_ticks(100.0),
      }],
      vec![PriceLevel {
        price_ticks: to_ticks(ask),
        size_units: to_ticks(100.0),
      }],
      Utc::now(),
    )
  }

  #[tokio::test]
  async fn test_cheap_poly_buys_poly_sells_kalshi() {
    let mut strat = setup(0.50, 0.52);
    let signals = strat.on_book_update(&snapshot(0.40, 0.42)).await.unwrap();

    assert_eq!(signals.len(), 2);
    let poly = &signals[0];
    let kalshi = &signals[1];
    assert_eq!(poly.side, Side::Buy);
    assert_eq!(poly.metadata.get(META_VENUE).map(String::as_str), Some("polymarket"));
    assert_eq!(kalshi.side, Side::Sell);
    assert_eq!(kalshi.market_id, "kx-1");
    assert_eq!(poly.leg_group_id(), kalshi.leg_group_id());
  }

  #[tokio::test]
  async fn test_rich_poly_sells_poly_buys_kalshi() {
    let mut strat = setup(0.38, 0.40);
    let signals = strat.on_book_update(&snapshot(0.50, 0.52)).await.unwrap();
    assert_eq!(signals.len(), 2);
    assert_eq!(signals[0].side, Side::Sell);
    assert_eq!(signals[1].side, Side::Buy);
  }

  #[tokio::test]
  async fn test_aligned_venues_stay_quiet() {
    let mut strat = setup(0.44, 0.46);
    let signals = strat.on_book_update(&snapshot(0.44, 0.46)).await.unwrap();
    assert!(signals.is_empty());
  }

  #[tokio::test]
  async fn test_missing_kalshi_quote_stays_quiet() {
    let mut strat = setup(0.50, 0.52);
    strat.venue_map.clear();
    let signals = strat.on_book_update(&snapshot(0.40, 0.42)).await.unwrap();
    assert!(signals.is_empty());
  }
}
