//! Book Service - Feed Events into Cache, Bus and Engine
//!
//! The single consumer of raw feed events. Per event it updates the
//! shared cache, publishes a summary on the `prices` topic (which the
//! arb detector consumes), and forwards the domain event to the
//! strategy engine. Cache/bus failures are surfaced to the feed,
//! which logs and keeps streaming.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::adapters::metrics::BotMetrics;
use crate::domain::orderbook::{OrderbookSnapshot, PriceChange, PriceTopicEvent, TradeEvent};
use crate::ports::bus::{SignalBus, STREAM_TRADES, TOPIC_PRICES};
use crate::ports::cache::BookCache;
use crate::ports::market_feed::FeedHandler;
use crate::usecases::strategy::StrategyEngine;

/// Routes venue events to the cache, the bus and the engine.
pub struct BookService {
  cache: Arc<dyn BookCache>,
  bus: Arc<dyn SignalBus>,
  engine: Option<Arc<StrategyEngine>>,
  /// TTL for last-trade price entries.
  price_ttl: Duration,
  metrics: Arc<BotMetrics>,
}

impl BookService {
  pub fn new(
    cache: Arc<dyn BookCache>,
    bus: Arc<dyn SignalBus>,
    engine: Option<Arc<StrategyEngine>>,
    price_ttl: Duration,
    metrics: Arc<BotMetrics>,
  ) -> Self {
    Self {
      cache,
      bus,
      engine,
      price_ttl,
      metrics,
    }
  }

  async fn publish_price_event(&self, event: &PriceTopicEvent) -> anyhow::Result<()> {
    let payload = serde_json::to_string(event)?;
    self.bus.publish(TOPIC_PRICES, &payload).await
  }
}

#[async_trait]
impl FeedHandler for BookService {
  async fn on_book(&self, snapshot: OrderbookSnapshot) -> anyhow::Result<()> {
    self.metrics.feed_events.with_label_values(&["book"]).inc();
    self.cache.set_snapshot(&snapshot).await?;

    let event = PriceTopicEvent::from_snapshot(PriceTopicEvent::BOOK_UPDATE, &snapshot);
    self.publish_price_event(&event).await?;

    if let Some(engine) = &self.engine {
      engine.on_book_update(&snapshot).await;
    }
    Ok(())
  }

  async fn on_price_change(&self, change: PriceChange) -> anyhow::Result<()> {
    self
      .metrics
      .feed_events
      .with_label_values(&["price_change"])
      .inc();
    self
      .cache
      .update_level(&change.asset_id, change.side, change.price_ticks, change.size_units)
      .await?;

    // Summarize with the refreshed BBO when the book is in cache; a
    // miss still produces an event the detector can synthesize from.
    let event = match self.cache.get_snapshot(&change.asset_id).await {
      Ok(snapshot) => {
        PriceTopicEvent::from_snapshot(PriceTopicEvent::PRICE_CHANGE, &snapshot)
      }
      Err(e) => {
        debug!(asset = %change.asset_id, error = %e, "no cached book for change event");
        PriceTopicEvent {
          event: PriceTopicEvent::PRICE_CHANGE.to_string(),
          asset_id: change.asset_id.clone(),
          best_bid: None,
          best_ask: None,
          mid_price: None,
          timestamp: change.timestamp,
        }
      }
    };
    self.publish_price_event(&event).await?;

    if let Some(engine) = &self.engine {
      engine.on_price_change(&change).await;
    }
    Ok(())
  }

  async fn on_trade(&self, trade: TradeEvent) -> anyhow::Result<()> {
    self.metrics.feed_events.with_label_values(&["trade"]).inc();
    self
      .cache
      .set_price(&trade.asset_id, trade.price_ticks, Some(self.price_ttl))
      .await?;
    self
      .bus
      .stream_append(STREAM_TRADES, &serde_json::to_string(&trade)?)
      .await?;

    if let Some(engine) = &self.engine {
      engine.on_trade(&trade).await;
    }
    Ok(())
  }
}
