//! Flash Crash Strategy - Buy Sharp Dislocations
//!
//! Tracks a sliding window of best-bid observations per token. When
//! the newest bid sits a configured fraction below the windowed mean
//! (mean excludes the newest point), the move is treated as a crash
//! and a BUY is placed partway back toward the mean:
//! `bid + (avg - bid) * recovery_target`.
//!
//! Options: `window_secs` (300), `drop_threshold` (0.10),
//! `recovery_target` (0.05), `min_points` (3), `cooldown_secs` (300).

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::info;

use crate::domain::orderbook::{ticks_to_f64, OrderbookSnapshot, Side};
use crate::domain::signal::{TradeSignal, Urgency};

use super::{Strategy, StrategyParams};

pub const NAME: &str = "flash_crash";

/// Per-token bid history inside the sliding window.
#[derive(Default)]
struct BidWindow {
  observations: VecDeque<(DateTime<Utc>, f64)>,
  last_emit: Option<DateTime<Utc>>,
}

/// Buys sharp drops below the recent windowed mean.
pub struct FlashCrash {
  params: StrategyParams,
  window: Duration,
  drop_threshold: f64,
  recovery_target: f64,
  min_points: usize,
  cooldown: Duration,
  tokens: HashMap<String, BidWindow>,
}

impl FlashCrash {
  pub fn new(params: StrategyParams) -> Self {
    let window = Duration::seconds(params.option("window_secs", 300.0) as i64);
    let drop_threshold = params.option("drop_threshold", 0.10);
    let recovery_target = params.option("recovery_target", 0.05);
    let min_points = params.option("min_points", 3.0) as usize;
    let cooldown = Duration::seconds(params.option("cooldown_secs", 300.0) as i64);
    Self {
      params,
      window,
      drop_threshold,
      recovery_target,
      min_points,
      cooldown,
      tokens: HashMap::new(),
    }
  }
}

#[async_trait]
impl Strategy for FlashCrash {
  fn name(&self) -> &str {
    NAME
  }

  async fn on_book_update(
    &mut self,
    snapshot: &OrderbookSnapshot,
  ) -> anyhow::Result<Vec<TradeSignal>> {
    let Some(bid_ticks) = snapshot.best_bid_ticks else {
      return Ok(Vec::new());
    };
    let bid = ticks_to_f64(bid_ticks);
    let now = snapshot.timestamp;

    let state = self.tokens.entry(snapshot.asset_id.clone()).or_default();
    while state
      .observations
      .front()
      .is_some_and(|&(ts, _)| now - ts > self.window)
    {
      state.observations.pop_front();
    }

    // Mean of the window before this observation arrived.
    let prior = &state.observations;
    let signals = if prior.len() >= self.min_points {
      let avg = prior.iter().map(|&(_, b)| b).sum::<f64>() / prior.len() as f64;
      let drop = if avg > 0.0 { (avg - bid) / avg } else { 0.0 };
      let cooled = state
        .last_emit
        .map_or(true, |t| now - t >= self.cooldown);

      if drop >= self.drop_threshold && cooled {
        let entry = bid + (avg - bid) * self.recovery_target;
        state.last_emit = Some(now);
        info!(
          asset = %snapshot.asset_id,
          bid,
          window_avg = avg,
          drop_pct = drop * 100.0,
          entry,
          "flash crash detected"
        );
        vec![TradeSignal::new(
          NAME,
          String::new(),
          snapshot.asset_id.clone(),
          Side::Buy,
          self.params.price_to_ticks(entry),
          self.params.size_units,
          Urgency::High,
          format!("bid {:.1}% below {avg:.3} window mean", drop * 100.0),
          self.params.signal_ttl(),
        )]
      } else {
        Vec::new()
      }
    } else {
      Vec::new()
    };

    state.observations.push_back((now, bid));
    Ok(signals)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::orderbook::{to_ticks, PriceLevel};

  fn snapshot(asset: &str, bid: f64, at: DateTime<Utc>) -> OrderbookSnapshot {
    OrderbookSnapshot::from_levels(
      asset,
      vec![PriceLevel {
        price_ticks: to_ticks(bid),
        size_units: to_ticks(100.0),
      }],
      vec![PriceLevel {
        price_ticks: to_ticks(bid + 0.02),
        size_units: to_ticks(100.0),
      }],
      at,
    )
  }

  fn strategy() -> FlashCrash {
    let mut params = StrategyParams::default();
    params.options.insert("window_secs".to_string(), 300.0);
    params.options.insert("drop_threshold".to_string(), 0.10);
    params.options.insert("recovery_target".to_string(), 0.05);
    FlashCrash::new(params)
  }

  #[tokio::test]
  async fn test_crash_triggers_buy_at_recovery_price() {
    let mut fc = strategy();
    let t0 = Utc::now();

    // Four minutes of stable 0.50 bids, then a drop to 0.40.
    for minute in 0..4 {
      let signals = fc
        .on_book_update(&snapshot("tok", 0.50, t0 + Duration::minutes(minute)))
        .await
        .unwrap();
      assert!(signals.is_empty());
    }
    let signals = fc
      .on_book_update(&snapshot("tok", 0.40, t0 + Duration::minutes(4)))
      .await
      .unwrap();

    assert_eq!(signals.len(), 1);
    let signal = &signals[0];
    assert_eq!(signal.side, Side::Buy);
    // 0.40 + (0.50 - 0.40) * 0.05 = 0.405
    assert_eq!(signal.price_ticks, to_ticks(0.405));
    assert_eq!(signal.source, NAME);
  }

  #[tokio::test]
  async fn test_small_dip_does_not_trigger() {
    let mut fc = strategy();
    let t0 = Utc::now();
    for minute in 0..4 {
      fc.on_book_update(&snapshot("tok", 0.50, t0 + Duration::minutes(minute)))
        .await
        .unwrap();
    }
    // 4% below the mean, under the 10% threshold.
    let signals = fc
      .on_book_update(&snapshot("tok", 0.48, t0 + Duration::minutes(4)))
      .await
      .unwrap();
    assert!(signals.is_empty());
  }

  #[tokio::test]
  async fn test_cooldown_suppresses_repeat_emission() {
    let mut fc = strategy();
    let t0 = Utc::now();
    for minute in 0..4 {
      fc.on_book_update(&snapshot("tok", 0.50, t0 + Duration::minutes(minute)))
        .await
        .unwrap();
    }
    let first = fc
      .on_book_update(&snapshot("tok", 0.40, t0 + Duration::minutes(4)))
      .await
      .unwrap();
    assert_eq!(first.len(), 1);

    let second = fc
      .on_book_update(&snapshot("tok", 0.38, t0 + Duration::seconds(250)))
      .await
      .unwrap();
    assert!(second.is_empty());
  }

  #[tokio::test]
  async fn test_stale_observations_roll_out_of_window() {
    let mut fc = strategy();
    let t0 = Utc::now();
    fc.on_book_update(&snapshot("tok", 0.90, t0)).await.unwrap();
    // Eleven minutes later the 0.90 point is outside the 5m window,
    // so the window has too few points to fire.
    for minute in 11..13 {
      let signals = fc
        .on_book_update(&snapshot("tok", 0.50, t0 + Duration::minutes(minute)))
        .await
        .unwrap();
      assert!(signals.is_empty());
    }
  }
}
