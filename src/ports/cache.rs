//! Book Cache Port - Shared Orderbook and Price State
//!
//! The cache is the only multi-writer view of market state: the book
//! service writes, strategies and the arb detector read. Snapshot
//! replacement and level updates are atomic on the backend so readers
//! never observe half of one snapshot mixed with half of another.

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::orderbook::{OrderbookSnapshot, Side};

/// Trait for the distributed orderbook / price cache.
///
/// `get_snapshot` fails with [`crate::domain::BotError::NotFound`] when
/// the asset has never been written.
#[async_trait]
pub trait BookCache: Send + Sync + 'static {
  /// Atomically replace all per-asset book state with `snap`.
  async fn set_snapshot(&self, snap: &OrderbookSnapshot) -> anyhow::Result<()>;

  /// Atomically apply one level delta and recompute the BBO.
  ///
  /// `size_units == 0` removes the level.
  async fn update_level(
    &self,
    asset_id: &str,
    side: Side,
    price_ticks: i64,
    size_units: i64,
  ) -> anyhow::Result<()>;

  /// Fetch the canonical snapshot: bids descending, asks ascending.
  async fn get_snapshot(&self, asset_id: &str) -> anyhow::Result<OrderbookSnapshot>;

  /// Store a last-trade price; with `Some(ttl)` the entry expires.
  async fn set_price(
    &self,
    asset_id: &str,
    price_ticks: i64,
    ttl: Option<Duration>,
  ) -> anyhow::Result<()>;

  /// Read a last-trade price, `None` when missing or expired.
  async fn get_price(&self, asset_id: &str) -> anyhow::Result<Option<i64>>;
}
