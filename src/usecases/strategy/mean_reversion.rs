//! Mean Reversion Strategy - Trade Z-Score Extremes
//!
//! Keeps a count-bounded window of mid prices per token and computes
//! the z-score of the newest mid against the window that preceded it.
//! `z <= -threshold` buys at the ask, `z >= threshold` sells at the
//! bid.
//!
//! Options: `window` (20 points), `threshold` (2.0 sigmas),
//! `min_points` (5), `cooldown_secs` (60).

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::info;

use crate::domain::orderbook::{ticks_to_f64, OrderbookSnapshot, Side};
use crate::domain::signal::{TradeSignal, Urgency};

use super::{Strategy, StrategyParams};

pub const NAME: &str = "mean_reversion";

#[derive(Default)]
struct MidWindow {
  mids: VecDeque<f64>,
  last_emit: Option<DateTime<Utc>>,
}

/// Fades large deviations from the rolling mean.
pub struct MeanReversion {
  params: StrategyParams,
  window: usize,
  threshold: f64,
  min_points: usize,
  cooldown: Duration,
  tokens: HashMap<String, MidWindow>,
}

impl MeanReversion {
  pub fn new(params: StrategyParams) -> Self {
    let window = params.option("window", 20.0) as usize;
    let threshold = params.option("threshold", 2.0);
    let min_points = params.option("min_points", 5.0) as usize;
    let cooldown = Duration::seconds(params.option("cooldown_secs", 60.0) as i64);
    Self {
      params,
      window,
      threshold,
      min_points,
      cooldown,
      tokens: HashMap::new(),
    }
  }
}

fn mean_and_sigma(values: &VecDeque<f64>) -> (f64, f64) {
  let n = values.len() as f64;
  let mean = values.iter().sum::<f64>() / n;
  let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
  (mean, variance.sqrt())
}

#[async_trait]
impl Strategy for MeanReversion {
  fn name(&self) -> &str {
    NAME
  }

  async fn on_book_update(
    &mut self,
    snapshot: &OrderbookSnapshot,
  ) -> anyhow::Result<Vec<TradeSignal>> {
    let (Some(mid_ticks), Some(bid_ticks), Some(ask_ticks)) = (
      snapshot.mid_price_ticks,
      snapshot.best_bid_ticks,
      snapshot.best_ask_ticks,
    ) else {
      return Ok(Vec::new());
    };
    let mid = ticks_to_f64(mid_ticks);
    let now = snapshot.timestamp;

    let state = self.tokens.entry(snapshot.asset_id.clone()).or_default();

    let mut signals = Vec::new();
    if state.mids.len() >= self.min_points {
      let (mean, sigma) = mean_and_sigma(&state.mids);
      if sigma > 1e-9 {
        let z = (mid - mean) / sigma;
        let cooled = state.last_emit.map_or(true, |t| now - t >= self.cooldown);
        if cooled && z.abs() >= self.threshold {
          let (side, price_ticks) = if z <= -self.threshold {
            (Side::Buy, ask_ticks)
          } else {
            (Side::Sell, bid_ticks)
          };
          state.last_emit = Some(now);
          info!(
            asset = %snapshot.asset_id,
            mid,
            mean,
            sigma,
            z,
            side = %side,
            "mean reversion entry"
          );
          signals.push(TradeSignal::new(
            NAME,
            String::new(),
            snapshot.asset_id.clone(),
            side,
            price_ticks,
            self.params.size_units,
            Urgency::Medium,
            format!("z-score {z:.2} vs mean {mean:.3}"),
            self.params.signal_ttl(),
          ));
        }
      }
    }

    state.mids.push_back(mid);
    while state.mids.len() > self.window {
      state.mids.pop_front();
    }
    Ok(signals)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::orderbook::{to_ticks, PriceLevel};

  fn snapshot(mid: f64, at: DateTime<Utc>) -> OrderbookSnapshot {
    OrderbookSnapshot::from_levels(
      "tok",
      vec![PriceLevel {
        price_ticks: to_ticks(mid - 0.01),
        size_units: to_ticks(50.0),
      }],
      vec![PriceLevel {
        price_ticks: to_ticks(mid + 0.01),
        size_units: to_ticks(50.0),
      }],
      at,
    )
  }

  async fn warmed_up() -> (MeanReversion, DateTime<Utc>) {
    let mut mr = MeanReversion::new(StrategyParams::default());
    let t0 = Utc::now();
    // Mids oscillating tightly around 0.50.
    let series = [0.50, 0.51, 0.49, 0.50, 0.51, 0.49, 0.50, 0.50];
    for (i, mid) in series.iter().enumerate() {
      mr.on_book_update(&snapshot(*mid, t0 + Duration::seconds(i as i64)))
        .await
        .unwrap();
    }
    (mr, t0 + Duration::seconds(100))
  }

  #[tokio::test]
  async fn test_deep_drop_buys_at_ask() {
    let (mut mr, later) = warmed_up().await;
    let signals = mr.on_book_update(&snapshot(0.40, later)).await.unwrap();
    assert_eq!(signals.len(), 1);
    assert_eq!(signals[0].side, Side::Buy);
    assert_eq!(signals[0].price_ticks, to_ticks(0.41));
  }

  #[tokio::test]
  async fn test_spike_sells_at_bid() {
    let (mut mr, later) = warmed_up().await;
    let signals = mr.on_book_update(&snapshot(0.60, later)).await.unwrap();
    assert_eq!(signals.len(), 1);
    assert_eq!(signals[0].side, Side::Sell);
    assert_eq!(signals[0].price_ticks, to_ticks(0.59));
  }

  #[tokio::test]
  async fn test_small_move_stays_quiet() {
    let (mut mr, later) = warmed_up().await;
    let signals = mr.on_book_update(&snapshot(0.505, later)).await.unwrap();
    assert!(signals.is_empty());
  }

  #[tokio::test]
  async fn test_flat_series_never_divides_by_zero() {
    let mut mr = MeanReversion::new(StrategyParams::default());
    let t0 = Utc::now();
    for i in 0..10 {
      let signals = mr
        .on_book_update(&snapshot(0.50, t0 + Duration::seconds(i)))
        .await
        .unwrap();
      assert!(signals.is_empty());
    }
  }
}
