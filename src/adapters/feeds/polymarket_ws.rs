//! Polymarket CLOB WebSocket Feed — Primary Market Data Source
//!
//! Long-lived connection to the CLOB market channel. Demultiplexes
//! `book`, `price_change` and `last_trade_price` events to registered
//! [`FeedHandler`]s on the reader task.
//!
//! Resilience:
//! - Keep-alive ping every 9/10 of the read timeout; any inbound
//!   frame (pongs included) refreshes the read deadline.
//! - Auto-reconnect with exponential backoff: 2s base, doubled per
//!   consecutive failure, capped at 60s, reset after a successful
//!   handshake.
//! - The tracked subscription set is replayed verbatim on reconnect.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, instrument, warn};

use crate::adapters::metrics::BotMetrics;
use crate::config::FeedConfig;
use crate::domain::error::BotError;
use crate::domain::orderbook::{
    to_ticks, OrderbookSnapshot, PriceChange, PriceLevel, Side, TradeEvent,
};
use crate::ports::market_feed::FeedHandler;

/// Raw price level from the CLOB feed: stringly-typed price and size.
#[derive(Debug, Deserialize)]
struct WsLevel {
    price: String,
    size: String,
}

/// Full book event for one token.
#[derive(Debug, Deserialize)]
struct WsBookEvent {
    #[serde(default)]
    asset_id: String,
    #[serde(default)]
    bids: Vec<WsLevel>,
    #[serde(default)]
    asks: Vec<WsLevel>,
    #[serde(default)]
    timestamp: String,
}

/// One level delta; newer payloads batch several under `price_changes`.
#[derive(Debug, Deserialize)]
struct WsPriceChange {
    #[serde(default)]
    asset_id: String,
    #[serde(default)]
    price: String,
    #[serde(default)]
    size: String,
    #[serde(default)]
    side: String,
    #[serde(default)]
    timestamp: String,
}

/// Last trade print.
#[derive(Debug, Deserialize)]
struct WsLastTrade {
    #[serde(default)]
    asset_id: String,
    #[serde(default)]
    price: String,
    #[serde(default)]
    size: String,
    #[serde(default)]
    side: String,
    #[serde(default)]
    timestamp: String,
}

/// Polymarket CLOB WebSocket feed adapter.
pub struct PolymarketFeed {
    ws_url: String,
    read_timeout: Duration,
    backoff_base: Duration,
    backoff_cap: Duration,
    /// Asset IDs to replay on every (re)connect.
    subscriptions: Mutex<HashSet<String>>,
    /// Registered event consumers.
    handlers: Mutex<Vec<Arc<dyn FeedHandler>>>,
    /// Writer-half command channel of the live session, if connected.
    outbound: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    /// Set by `close`; all further operations fail immediately.
    closed: AtomicBool,
    /// Connection status for readiness probes.
    connected: Arc<AtomicBool>,
    /// Reconnect/connectivity counters, when wired.
    metrics: Option<Arc<BotMetrics>>,
}

impl PolymarketFeed {
    /// Create a feed client from config.
    pub fn new(config: &FeedConfig) -> Self {
        Self {
            ws_url: config.ws_url.clone(),
            read_timeout: Duration::from_secs(config.read_timeout_secs),
            backoff_base: Duration::from_secs(config.reconnect_base_secs),
            backoff_cap: Duration::from_secs(config.reconnect_cap_secs),
            subscriptions: Mutex::new(HashSet::new()),
            handlers: Mutex::new(Vec::new()),
            outbound: Mutex::new(None),
            closed: AtomicBool::new(false),
            connected: Arc::new(AtomicBool::new(false)),
            metrics: None,
        }
    }

    /// Report reconnects and connectivity on the given registry.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<BotMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Flag that flips with the connection state; share with `/ready`.
    pub fn connected_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.connected)
    }

    /// Register a handler; call before `run`.
    pub fn register_handler(&self, handler: Arc<dyn FeedHandler>) {
        self.handlers.lock().push(handler);
    }

    /// Track `asset_ids` and, when connected, send the subscribe command.
    pub fn subscribe(&self, asset_ids: &[String]) -> Result<()> {
        self.ensure_open()?;
        {
            let mut subs = self.subscriptions.lock();
            for id in asset_ids {
                subs.insert(id.clone());
            }
        }
        self.send_command(subscribe_command(asset_ids))
    }

    /// Drop `asset_ids` from the tracked set and notify the venue.
    pub fn unsubscribe(&self, asset_ids: &[String]) -> Result<()> {
        self.ensure_open()?;
        {
            let mut subs = self.subscriptions.lock();
            for id in asset_ids {
                subs.remove(id);
            }
        }
        self.send_command(unsubscribe_command(asset_ids))
    }

    /// Send a close frame and mark the client unusable.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Some(tx) = self.outbound.lock().as_ref() {
            let _ = tx.send(Message::Close(None));
        }
    }

    /// Currently tracked subscription set (sorted, for diagnostics).
    pub fn subscription_set(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.subscriptions.lock().iter().cloned().collect();
        ids.sort_unstable();
        ids
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BotError::FeedDisconnected("client closed".to_string()).into());
        }
        Ok(())
    }

    fn send_command(&self, command: String) -> Result<()> {
        if let Some(tx) = self.outbound.lock().as_ref() {
            tx.send(Message::Text(command))
                .map_err(|_| BotError::FeedDisconnected("writer gone".to_string()))?;
        }
        Ok(())
    }

    fn handlers_snapshot(&self) -> Vec<Arc<dyn FeedHandler>> {
        self.handlers.lock().clone()
    }

    /// Run the connection loop until shutdown or `close`.
    #[instrument(skip(self, shutdown_rx), fields(url = %self.ws_url))]
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let mut backoff = self.backoff_base;
        loop {
            if self.closed.load(Ordering::SeqCst) {
                return Ok(());
            }
            let mut handshake_done = false;
            let session = self.connect_and_stream(&mut shutdown_rx, &mut handshake_done).await;
            self.connected.store(false, Ordering::SeqCst);
            *self.outbound.lock() = None;
            if let Some(metrics) = &self.metrics {
                metrics.feed_connected.with_label_values(&["polymarket"]).set(0.0);
            }

            match session {
                Ok(()) => {
                    info!("feed shut down gracefully");
                    return Ok(());
                }
                Err(e) => {
                    if handshake_done {
                        backoff = self.backoff_base;
                    }
                    if let Some(metrics) = &self.metrics {
                        metrics.ws_reconnects.inc();
                    }
                    warn!(error = %e, delay_s = backoff.as_secs(), "feed disconnected, reconnecting");
                    tokio::select! {
                        _ = shutdown_rx.recv() => return Ok(()),
                        () = tokio::time::sleep(backoff) => {}
                    }
                    backoff = (backoff * 2).min(self.backoff_cap);
                }
            }
        }
    }

    /// One WebSocket session: handshake, replay, stream until error,
    /// shutdown, or an explicit close.
    async fn connect_and_stream(
        &self,
        shutdown_rx: &mut broadcast::Receiver<()>,
        handshake_done: &mut bool,
    ) -> Result<()> {
        let (ws_stream, _) = connect_async(&self.ws_url)
            .await
            .context("websocket handshake failed")?;
        *handshake_done = true;
        self.connected.store(true, Ordering::SeqCst);
        if let Some(metrics) = &self.metrics {
            metrics.feed_connected.with_label_values(&["polymarket"]).set(1.0);
        }
        info!("websocket connected");

        let (mut write, mut read) = ws_stream.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel();
        *self.outbound.lock() = Some(out_tx);

        // Replay the full subscription set present at disconnect.
        let assets = self.subscription_set();
        if !assets.is_empty() {
            write
                .send(Message::Text(subscribe_command(&assets)))
                .await
                .context("subscription replay failed")?;
            info!(assets = assets.len(), "replayed subscriptions");
        }

        let mut ping = tokio::time::interval(self.read_timeout * 9 / 10);
        ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ping.tick().await; // first tick fires immediately
        let mut last_activity = Instant::now();

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }
                Some(msg) = out_rx.recv() => {
                    let closing = matches!(msg, Message::Close(_));
                    write.send(msg).await.context("websocket write failed")?;
                    if closing {
                        return Ok(());
                    }
                }
                _ = ping.tick() => {
                    if last_activity.elapsed() > self.read_timeout {
                        return Err(BotError::FeedDisconnected("read timeout".to_string()).into());
                    }
                    write
                        .send(Message::Ping(Vec::new()))
                        .await
                        .context("keep-alive ping failed")?;
                }
                msg = read.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        last_activity = Instant::now();
                        if let Err(e) = self.dispatch(&text).await {
                            debug!(error = %e, "unparseable feed message");
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        last_activity = Instant::now();
                        write.send(Message::Pong(data)).await.ok();
                    }
                    Some(Ok(Message::Pong(_))) => {
                        last_activity = Instant::now();
                    }
                    Some(Ok(Message::Close(frame))) => {
                        return Err(BotError::FeedDisconnected(format!(
                            "server closed: {frame:?}"
                        ))
                        .into());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        return Err(BotError::FeedDisconnected(e.to_string()).into());
                    }
                    None => {
                        return Err(BotError::FeedDisconnected("stream ended".to_string()).into());
                    }
                }
            }
        }
    }

    /// Parse one frame (single event or batch) and invoke handlers.
    async fn dispatch(&self, text: &str) -> Result<()> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        match value {
            serde_json::Value::Array(events) => {
                for event in events {
                    self.dispatch_event(event).await;
                }
            }
            event => self.dispatch_event(event).await,
        }
        Ok(())
    }

    async fn dispatch_event(&self, value: serde_json::Value) {
        let event_type = value
            .get("event_type")
            .and_then(|e| e.as_str())
            .unwrap_or_default()
            .to_string();

        match event_type.as_str() {
            "book" => {
                let Ok(event) = serde_json::from_value::<WsBookEvent>(value) else {
                    return;
                };
                let snapshot = book_event_to_snapshot(&event);
                for handler in self.handlers_snapshot() {
                    if let Err(e) = handler.on_book(snapshot.clone()).await {
                        warn!(error = %e, asset = %snapshot.asset_id, "book handler failed");
                    }
                }
            }
            "price_change" => {
                for change in parse_price_changes(value) {
                    for handler in self.handlers_snapshot() {
                        if let Err(e) = handler.on_price_change(change.clone()).await {
                            warn!(error = %e, asset = %change.asset_id, "price handler failed");
                        }
                    }
                }
            }
            "last_trade_price" => {
                let Ok(event) = serde_json::from_value::<WsLastTrade>(value) else {
                    return;
                };
                let Some(trade) = last_trade_to_event(&event) else {
                    return;
                };
                for handler in self.handlers_snapshot() {
                    if let Err(e) = handler.on_trade(trade.clone()).await {
                        warn!(error = %e, asset = %trade.asset_id, "trade handler failed");
                    }
                }
            }
            // tick_size_change and friends are irrelevant here.
            _ => {}
        }
    }
}

fn subscribe_command(asset_ids: &[String]) -> String {
    json!({ "assets_ids": asset_ids, "type": "market" }).to_string()
}

fn unsubscribe_command(asset_ids: &[String]) -> String {
    json!({ "assets_ids": asset_ids, "type": "market", "operation": "unsubscribe" }).to_string()
}

fn parse_side(side: &str) -> Option<Side> {
    match side.to_ascii_uppercase().as_str() {
        "BUY" => Some(Side::Buy),
        "SELL" => Some(Side::Sell),
        _ => None,
    }
}

fn parse_ms_timestamp(ts: &str) -> DateTime<Utc> {
    ts.parse::<i64>()
        .ok()
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .unwrap_or_else(Utc::now)
}

fn parse_level(level: &WsLevel) -> Option<PriceLevel> {
    Some(PriceLevel {
        price_ticks: to_ticks(level.price.parse::<f64>().ok()?),
        size_units: to_ticks(level.size.parse::<f64>().ok()?),
    })
}

fn book_event_to_snapshot(event: &WsBookEvent) -> OrderbookSnapshot {
    let bids = event.bids.iter().filter_map(parse_level).collect();
    let asks = event.asks.iter().filter_map(parse_level).collect();
    OrderbookSnapshot::from_levels(
        event.asset_id.clone(),
        bids,
        asks,
        parse_ms_timestamp(&event.timestamp),
    )
}

/// Accept both the batched (`price_changes: [...]`) and the flat
/// single-change payload shapes.
fn parse_price_changes(value: serde_json::Value) -> Vec<PriceChange> {
    let raw: Vec<WsPriceChange> = match value.get("price_changes") {
        Some(batch) => serde_json::from_value(batch.clone()).unwrap_or_default(),
        None => serde_json::from_value::<WsPriceChange>(value)
            .map(|c| vec![c])
            .unwrap_or_default(),
    };
    raw.iter().filter_map(price_change_to_event).collect()
}

fn price_change_to_event(change: &WsPriceChange) -> Option<PriceChange> {
    Some(PriceChange {
        asset_id: change.asset_id.clone(),
        side: parse_side(&change.side)?,
        price_ticks: to_ticks(change.price.parse::<f64>().ok()?),
        // Zero size means the level was removed.
        size_units: to_ticks(change.size.parse::<f64>().unwrap_or(0.0)),
        timestamp: parse_ms_timestamp(&change.timestamp),
    })
}

fn last_trade_to_event(trade: &WsLastTrade) -> Option<TradeEvent> {
    Some(TradeEvent {
        asset_id: trade.asset_id.clone(),
        side: parse_side(&trade.side)?,
        price_ticks: to_ticks(trade.price.parse::<f64>().ok()?),
        size_units: to_ticks(trade.size.parse::<f64>().unwrap_or(0.0)),
        timestamp: parse_ms_timestamp(&trade.timestamp),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed() -> PolymarketFeed {
        PolymarketFeed::new(&FeedConfig {
            ws_url: "wss://example.invalid/ws".to_string(),
            read_timeout_secs: 30,
            reconnect_base_secs: 2,
            reconnect_cap_secs: 60,
        })
    }

    #[test]
    fn test_subscription_set_tracks_subscribe_and_unsubscribe() {
        let feed = feed();
        feed.subscribe(&["a".to_string(), "b".to_string()]).unwrap();
        feed.subscribe(&["b".to_string(), "c".to_string()]).unwrap();
        assert_eq!(feed.subscription_set(), vec!["a", "b", "c"]);

        feed.unsubscribe(&["b".to_string()]).unwrap();
        assert_eq!(feed.subscription_set(), vec!["a", "c"]);
    }

    #[test]
    fn test_closed_client_rejects_operations() {
        let feed = feed();
        feed.close();
        let err = feed.subscribe(&["a".to_string()]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BotError>(),
            Some(BotError::FeedDisconnected(_))
        ));
    }

    #[test]
    fn test_subscribe_command_shape() {
        let cmd = subscribe_command(&["t1".to_string()]);
        let v: serde_json::Value = serde_json::from_str(&cmd).unwrap();
        assert_eq!(v["type"], "market");
        assert_eq!(v["assets_ids"][0], "t1");
    }

    #[test]
    fn test_book_event_parses_to_canonical_snapshot() {
        let text = r#"{
            "event_type": "book",
            "asset_id": "tok1",
            "bids": [{"price": "0.40", "size": "100"}, {"price": "0.42", "size": "50"}],
            "asks": [{"price": "0.48", "size": "30"}],
            "timestamp": "1700000000000"
        }"#;
        let event: WsBookEvent =
            serde_json::from_value(serde_json::from_str(text).unwrap()).unwrap();
        let snap = book_event_to_snapshot(&event);
        assert_eq!(snap.asset_id, "tok1");
        assert_eq!(snap.best_bid_ticks, Some(to_ticks(0.42)));
        assert_eq!(snap.best_ask_ticks, Some(to_ticks(0.48)));
        assert_eq!(snap.mid_price_ticks, Some(to_ticks(0.45)));
    }

    #[test]
    fn test_price_change_batch_and_flat_shapes() {
        let batch: serde_json::Value = serde_json::from_str(
            r#"{
                "event_type": "price_change",
                "price_changes": [
                    {"asset_id": "t1", "price": "0.40", "size": "10", "side": "BUY", "timestamp": "1700000000000"},
                    {"asset_id": "t1", "price": "0.41", "size": "0", "side": "SELL", "timestamp": "1700000000000"}
                ]
            }"#,
        )
        .unwrap();
        let changes = parse_price_changes(batch);
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].side, Side::Buy);
        assert_eq!(changes[1].size_units, 0);

        let flat: serde_json::Value = serde_json::from_str(
            r#"{"event_type": "price_change", "asset_id": "t2", "price": "0.55", "size": "5", "side": "sell", "timestamp": "1700000000000"}"#,
        )
        .unwrap();
        let changes = parse_price_changes(flat);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].side, Side::Sell);
    }

    #[test]
    fn test_unknown_side_is_dropped() {
        let flat: serde_json::Value = serde_json::from_str(
            r#"{"event_type": "price_change", "asset_id": "t2", "price": "0.55", "size": "5", "side": "HOLD", "timestamp": "0"}"#,
        )
        .unwrap();
        assert!(parse_price_changes(flat).is_empty());
    }
}
