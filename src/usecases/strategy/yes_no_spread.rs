//! Yes/No Spread Strategy - Dutch Books on a Single Market
//!
//! Watches both outcome tokens of each configured market. When the
//! two asks sum below `1 - min_edge` the pair is bought; when the two
//! bids sum above `1 + min_edge` the pair is sold. Either way both
//! legs go out as one `all_or_none` leg group, because one leg alone
//! is directional risk rather than arbitrage.
//!
//! Emits only when both books are fresher than `max_stale_ms`;
//! a per-market cooldown prevents re-emission while the books settle.
//!
//! Options: `min_edge_bps` (40), `max_stale_ms` (5000),
//! `cooldown_secs` (30).

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

pub const NAME: &str = "yes_no_spread";

#[derive(Clone, Copy)]
struct TokenQuote {
  bid: f64,
  ask: f64,
  at: DateTime<Utc>,
}

#[derive(Default)]
struct PairState {
  yes: Option<TokenQuote>,
  no: Option<TokenQuote>,
  last_emit: Option<DateTime<Utc>>,
}

/// Buys or sells complete YES+NO pairs priced away from 1.
pub struct YesNoSpread {
  params: StrategyParams,
  catalog: Arc<MarketCatalog>,
  min_edge: f64,
  max_stale: Duration,
  cooldown: Duration,
  markets: HashMap<String, PairState>,
}

impl YesNoSpread {
  pub fn new(params: StrategyParams, catalog: Arc<MarketCatalog>) -> Self {
    let min_edge = params.option("min_edge_bps", 40.0) / 10_000.0;
    let max_stale = Duration::milliseconds(params.option("max_stale_ms", 5000.0) as i64);
    let cooldown = Duration::seconds(params.option("cooldown_secs", 30.0) as i64);
    Self {
      params,
      catalog,
      min_edge,
      max_stale,
      cooldown,
      markets: HashMap::new(),
    }
  }

  fn leg(
    &self,
    market_id: &str,
    token_id: &str,
    side: Side,
    price: f64,
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
    .with_meta(META_ARB_TYPE, "rebalancing")
    .with_meta(META_OPP_ID, opp_id)
  }
}

#[async_trait]
impl Strategy for YesNoSpread {
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
    let (Some(bid_ticks), Some(ask_ticks)) =
      (snapshot.best_bid_ticks, snapshot.best_ask_ticks)
    else {
      return Ok(Vec::new());
    };
    let quote = TokenQuote {
      bid: ticks_to_f64(bid_ticks),
      ask: ticks_to_f64(ask_ticks),
      at: snapshot.timestamp,
    };

    let market_id = market.id.clone();
    let yes_token = market.yes_token().to_string();
    let no_token = market.no_token().to_string();
    let is_yes = snapshot.asset_id == yes_token;

    let now = snapshot.timestamp;
    let (yes, no, last_emit) = {
      let state = self.markets.entry(market_id.clone()).or_default();
      if is_yes {
        state.yes = Some(quote);
      } else {
        state.no = Some(quote);
      }
      (state.yes, state.no, state.last_emit)
    };

    let (Some(yes), Some(no)) = (yes, no) else {
      return Ok(Vec::new());
    };
    if now - yes.at > self.max_stale || now - no.at > self.max_stale {
      return Ok(Vec::new());
    }
    if last_emit.is_some_and(|t| now - t < self.cooldown) {
      return Ok(Vec::new());
    }

    let buy_sum = yes.ask + no.ask;
    let sell_sum = yes.bid + no.bid;

    let signals = if buy_sum < 1.0 - self.min_edge {
      let group_id = Uuid::new_v4().to_string();
      let opp_id = Uuid::new_v4().to_string();
      let reason = format!("yes+no asks {buy_sum:.3} < 1");
      info!(market = %market_id, buy_sum, "dutch book: buying the pair");
      vec![
        self.leg(&market_id, &yes_token, Side::Buy, yes.ask, &group_id, &opp_id, &reason),
        self.leg(&market_id, &no_token, Side::Buy, no.ask, &group_id, &opp_id, &reason),
      ]
    } else if sell_sum > 1.0 + self.min_edge {
      let group_id = Uuid::new_v4().to_string();
      let opp_id = Uuid::new_v4().to_string();
      let reason = format!("yes+no bids {sell_sum:.3} > 1");
      info!(market = %market_id, sell_sum, "dutch book: selling the pair");
      vec![
        self.leg(&market_id, &yes_token, Side::Sell, yes.bid, &group_id, &opp_id, &reason),
        self.leg(&market_id, &no_token, Side::Sell, no.bid, &group_id, &opp_id, &reason),
      ]
    } else {
      Vec::new()
    };

    if !signals.is_empty() {
      if let Some(state) = self.markets.get_mut(&market_id) {
        state.last_emit = Some(now);
      }
    }
    Ok(signals)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::market::{Market, MarketStatus};
  use crate::domain::orderbook::{to_ticks, PriceLevel};
  use crate::domain::signal::META_LEG_GROUP_ID;

  fn catalog() -> Arc<MarketCatalog> {
    let market = Market {
      id: "m1".to_string(),
      question: "up?".to_string(),
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
    Arc::new(MarketCatalog::new(
      vec![market],
      HashMap::new(),
      HashMap::new(),
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
  async fn test_cheap_pair_emits_paired_buy_legs() {
    let mut strat = YesNoSpread::new(StrategyParams::default(), catalog());
    let t0 = Utc::now();

    assert!(strat
      .on_book_update(&snapshot("ty", 0.38, 0.40, t0))
      .await
      .unwrap()
      .is_empty());
    let signals = strat
      .on_book_update(&snapshot("tn", 0.53, 0.55, t0))
      .await
      .unwrap();

    assert_eq!(signals.len(), 2);
    assert!(signals.iter().all(|s| s.side == Side::Buy));
    assert_eq!(signals[0].price_ticks, to_ticks(0.40));
    assert_eq!(signals[1].price_ticks, to_ticks(0.55));
    assert_eq!(
      signals[0].metadata.get(META_LEG_GROUP_ID),
      signals[1].metadata.get(META_LEG_GROUP_ID)
    );
    assert_eq!(signals[0].leg_count(), Some(2));
    assert_eq!(signals[0].leg_policy(), LegPolicy::AllOrNone);
    assert_eq!(
      signals[0].metadata.get(META_ARB_TYPE).map(String::as_str),
      Some("rebalancing")
    );
  }

  #[tokio::test]
  async fn test_rich_pair_emits_paired_sell_legs() {
    let mut strat = YesNoSpread::new(StrategyParams::default(), catalog());
    let t0 = Utc::now();
    strat
      .on_book_update(&snapshot("ty", 0.52, 0.54, t0))
      .await
      .unwrap();
    let signals = strat
      .on_book_update(&snapshot("tn", 0.53, 0.55, t0))
      .await
      .unwrap();
    assert_eq!(signals.len(), 2);
    assert!(signals.iter().all(|s| s.side == Side::Sell));
  }

  #[tokio::test]
  async fn test_fair_pair_stays_quiet() {
    let mut strat = YesNoSpread::new(StrategyParams::default(), catalog());
    let t0 = Utc::now();
    strat
      .on_book_update(&snapshot("ty", 0.44, 0.46, t0))
      .await
      .unwrap();
    let signals = strat
      .on_book_update(&snapshot("tn", 0.52, 0.54, t0))
      .await
      .unwrap();
    assert!(signals.is_empty());
  }

  #[tokio::test]
  async fn test_stale_sibling_book_blocks_emission() {
    let mut strat = YesNoSpread::new(StrategyParams::default(), catalog());
    let t0 = Utc::now();
    strat
      .on_book_update(&snapshot("ty", 0.38, 0.40, t0))
      .await
      .unwrap();
    // NO book arrives 10s later; the YES quote is now stale.
    let signals = strat
      .on_book_update(&snapshot("tn", 0.53, 0.55, t0 + Duration::seconds(10)))
      .await
      .unwrap();
    assert!(signals.is_empty());
  }

  #[tokio::test]
  async fn test_cooldown_blocks_back_to_back_groups() {
    let mut strat = YesNoSpread::new(StrategyParams::default(), catalog());
    let t0 = Utc::now();
    strat
      .on_book_update(&snapshot("ty", 0.38, 0.40, t0))
      .await
      .unwrap();
    let first = strat
      .on_book_update(&snapshot("tn", 0.53, 0.55, t0))
      .await
      .unwrap();
    assert_eq!(first.len(), 2);

    let second = strat
      .on_book_update(&snapshot("tn", 0.52, 0.54, t0 + Duration::seconds(1)))
      .await
      .unwrap();
    assert!(second.is_empty());
  }
}
