//! Market Feed Port - Venue Event Handler Interface
//!
//! The WebSocket feed adapter demultiplexes venue messages into three
//! domain events and hands them to registered handlers. Handlers run
//! synchronously on the reader task, so they must return promptly;
//! anything slow belongs behind a channel.

use async_trait::async_trait;

use crate::domain::orderbook::{OrderbookSnapshot, PriceChange, TradeEvent};

/// Trait for consumers of venue market data.
///
/// Handler errors are logged by the feed and never tear down the
/// connection.
#[async_trait]
pub trait FeedHandler: Send + Sync + 'static {
  /// Full book replacement for one token.
  async fn on_book(&self, snapshot: OrderbookSnapshot) -> anyhow::Result<()>;

  /// Incremental level change.
  async fn on_price_change(&self, change: PriceChange) -> anyhow::Result<()>;

  /// Last trade print.
  async fn on_trade(&self, trade: TradeEvent) -> anyhow::Result<()>;
}
