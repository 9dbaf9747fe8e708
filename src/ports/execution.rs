//! Execution Ports - Order Placement and Pre-Trade Risk
//!
//! Narrow contracts the executor consumes. Venue specifics (signing,
//! REST endpoints, tick rounding) live entirely behind these traits.

use async_trait::async_trait;

use crate::domain::signal::TradeSignal;

/// Outcome of an order placement or replacement attempt.
#[derive(Debug, Clone, Default)]
pub struct OrderResult {
  /// Whether the venue accepted the order.
  pub success: bool,
  /// Venue-assigned order id, empty on rejection.
  pub order_id: String,
  /// Venue status string (e.g. "live", "matched").
  pub status: String,
  /// Rejection or diagnostic message.
  pub message: String,
  /// Whether a single retry is worth attempting.
  pub should_retry: bool,
  /// Fill price in ticks when matched immediately, else zero.
  pub filled_price_ticks: i64,
  /// Fees charged, USD.
  pub fee_usd: f64,
}

/// Trait for placing orders derived from trade signals.
#[async_trait]
pub trait OrderPlacer: Send + Sync + 'static {
  /// Submit `signal` as a venue order.
  async fn place_order(&self, signal: &TradeSignal) -> anyhow::Result<OrderResult>;
}

/// Trait for cancel-and-replace in one logical step.
///
/// Separate from [`OrderPlacer`] because not every venue client
/// supports it; the executor falls back to plain placement.
#[async_trait]
pub trait ReplaceOrderer: Send + Sync + 'static {
  /// Cancel `cancel_id` and place `signal` as its replacement.
  async fn replace_order(
    &self,
    cancel_id: &str,
    signal: &TradeSignal,
  ) -> anyhow::Result<OrderResult>;
}

/// Trait for pre-trade risk gates.
#[async_trait]
pub trait RiskChecker: Send + Sync + 'static {
  /// Approve or reject `signal` for `wallet`; any error rejects.
  async fn pre_trade_check(&self, signal: &TradeSignal, wallet: &str) -> anyhow::Result<()>;
}
