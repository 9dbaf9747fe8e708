//! Pre-Trade Risk - Gates and Kill Switch
//!
//! Validates every signal before it can become an order: price inside
//! the unit interval, size bounds, expiry sanity, open-position cap,
//! and a kill switch once cumulative realized losses cross the
//! configured limit. The cumulative P&L lives in a small shared
//! handle the executor writes and the checker reads.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tracing::warn;

use crate::domain::error::BotError;
use crate::domain::orderbook::{Side, PRICE_SCALE};
use crate::domain::signal::TradeSignal;
use crate::ports::execution::RiskChecker;

/// Cumulative realized P&L shared between executor and risk checker.
#[derive(Clone, Default)]
pub struct SharedPnl(Arc<Mutex<f64>>);

impl SharedPnl {
  pub fn new() -> Self {
    Self::default()
  }

  /// Add a realized P&L delta (negative for losses).
  pub fn add(&self, delta: f64) {
    *self.0.lock() += delta;
  }

  /// Current cumulative realized P&L, USD.
  pub fn get(&self) -> f64 {
    *self.0.lock()
  }
}

/// Default pre-trade gate set.
pub struct DefaultRiskChecker {
  /// Largest single order, units.
  max_order_units: i64,
  /// Cap on distinct tokens with open exposure.
  max_positions: usize,
  /// Stop trading once losses reach this (USD); 0 disables.
  kill_switch_loss_usd: f64,
  pnl: SharedPnl,
  /// Tokens an approved buy has touched.
  open_tokens: Mutex<HashSet<String>>,
}

impl DefaultRiskChecker {
  pub fn new(
    max_order_units: i64,
    max_positions: usize,
    kill_switch_loss_usd: f64,
    pnl: SharedPnl,
  ) -> Self {
    Self {
      max_order_units,
      max_positions,
      kill_switch_loss_usd,
      pnl,
      open_tokens: Mutex::new(HashSet::new()),
    }
  }
}

#[async_trait]
impl RiskChecker for DefaultRiskChecker {
  async fn pre_trade_check(&self, signal: &TradeSignal, wallet: &str) -> anyhow::Result<()> {
    if wallet.is_empty() {
      return Err(BotError::Unauthorized("no wallet configured".to_string()).into());
    }
    if signal.price_ticks <= 0 || signal.price_ticks >= PRICE_SCALE {
      return Err(
        BotError::InvalidOrder(format!(
          "price {} outside (0, 1)",
          signal.price_ticks
        ))
        .into(),
      );
    }
    if signal.size_units <= 0 {
      return Err(BotError::InvalidOrder("non-positive size".to_string()).into());
    }
    if signal.size_units > self.max_order_units {
      return Err(
        BotError::InvalidOrder(format!(
          "size {} exceeds cap {}",
          signal.size_units, self.max_order_units
        ))
        .into(),
      );
    }
    if signal.is_expired(Utc::now()) {
      return Err(BotError::InvalidOrder("signal already expired".to_string()).into());
    }
    if self.kill_switch_loss_usd > 0.0 && self.pnl.get() <= -self.kill_switch_loss_usd {
      warn!(
        realized = self.pnl.get(),
        limit = self.kill_switch_loss_usd,
        "kill switch engaged"
      );
      return Err(BotError::Unauthorized("loss kill switch engaged".to_string()).into());
    }

    if signal.side == Side::Buy {
      let mut open = self.open_tokens.lock();
      if !open.contains(&signal.token_id) && open.len() >= self.max_positions {
        return Err(
          BotError::Unauthorized(format!(
            "open position cap {} reached",
            self.max_positions
          ))
          .into(),
        );
      }
      open.insert(signal.token_id.clone());
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::orderbook::to_ticks;
  use crate::domain::signal::Urgency;

  fn signal(price: f64, size: f64) -> TradeSignal {
    TradeSignal::new(
      "test",
      "m1",
      "t1",
      Side::Buy,
      to_ticks(price),
      to_ticks(size),
      Urgency::Low,
      "risk test",
      chrono::Duration::seconds(30),
    )
  }

  fn checker() -> DefaultRiskChecker {
    DefaultRiskChecker::new(to_ticks(1000.0), 2, 100.0, SharedPnl::new())
  }

  #[tokio::test]
  async fn test_sane_signal_passes() {
    let rc = checker();
    rc.pre_trade_check(&signal(0.40, 10.0), "0xwallet")
      .await
      .unwrap();
  }

  #[tokio::test]
  async fn test_price_outside_unit_interval_rejected() {
    let rc = checker();
    let err = rc
      .pre_trade_check(&signal(1.20, 10.0), "0xwallet")
      .await
      .unwrap_err();
    assert!(matches!(
      err.downcast_ref::<BotError>(),
      Some(BotError::InvalidOrder(_))
    ));
  }

  #[tokio::test]
  async fn test_oversized_order_rejected() {
    let rc = checker();
    let err = rc
      .pre_trade_check(&signal(0.40, 5000.0), "0xwallet")
      .await
      .unwrap_err();
    assert!(matches!(
      err.downcast_ref::<BotError>(),
      Some(BotError::InvalidOrder(_))
    ));
  }

  #[tokio::test]
  async fn test_kill_switch_blocks_after_losses() {
    let pnl = SharedPnl::new();
    let rc = DefaultRiskChecker::new(to_ticks(1000.0), 10, 50.0, pnl.clone());
    pnl.add(-60.0);
    let err = rc
      .pre_trade_check(&signal(0.40, 10.0), "0xwallet")
      .await
      .unwrap_err();
    assert!(matches!(
      err.downcast_ref::<BotError>(),
      Some(BotError::Unauthorized(_))
    ));
  }

  #[tokio::test]
  async fn test_position_cap_blocks_new_tokens_only() {
    let rc = checker();
    let mut first = signal(0.40, 10.0);
    first.token_id = "t1".to_string();
    let mut second = signal(0.40, 10.0);
    second.token_id = "t2".to_string();
    let mut third = signal(0.40, 10.0);
    third.token_id = "t3".to_string();

    rc.pre_trade_check(&first, "0xwallet").await.unwrap();
    rc.pre_trade_check(&second, "0xwallet").await.unwrap();
    assert!(rc.pre_trade_check(&third, "0xwallet").await.is_err());
    // Re-trading an already-open token is fine.
    rc.pre_trade_check(&first, "0xwallet").await.unwrap();
  }

  #[tokio::test]
  async fn test_missing_wallet_rejected() {
    let rc = checker();
    assert!(rc.pre_trade_check(&signal(0.40, 10.0), "").await.is_err());
  }
}
