//! Orderbook Domain Types - Snapshots, Deltas, Trades
//!
//! Prices and sizes are fixed-point `i64` at 1e6 scale so payloads that
//! get signed or persisted never suffer float drift. `f64` appears only
//! at the edges: parsing venue feeds and strategy math.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fixed-point scale for prices (ticks per 1.00).
pub const PRICE_SCALE: i64 = 1_000_000;

/// Fixed-point scale for sizes (units per 1 contract).
pub const SIZE_SCALE: i64 = 1_000_000;

/// Convert a float price/size to fixed-point ticks, rounding half away from zero.
pub fn to_ticks(value: f64) -> i64 {
    (value * PRICE_SCALE as f64).round() as i64
}

/// Convert fixed-point ticks back to a float for display or strategy math.
pub fn ticks_to_f64(ticks: i64) -> f64 {
    ticks as f64 / PRICE_SCALE as f64
}

/// Book side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// One price level: (price, aggregate size).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevel {
    /// Price in ticks.
    pub price_ticks: i64,
    /// Resting size in units.
    pub size_units: i64,
}

/// Full depth snapshot for one outcome token.
///
/// Canonical form: bids sorted descending by price, asks ascending,
/// `best_bid`/`best_ask` mirroring the top levels, and
/// `mid_price = (best_bid + best_ask) / 2` whenever both exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderbookSnapshot {
    /// Outcome token (asset) identifier.
    pub asset_id: String,
    /// Bid levels, price descending.
    pub bids: Vec<PriceLevel>,
    /// Ask levels, price ascending.
    pub asks: Vec<PriceLevel>,
    /// Best bid in ticks, if any bid exists.
    pub best_bid_ticks: Option<i64>,
    /// Best ask in ticks, if any ask exists.
    pub best_ask_ticks: Option<i64>,
    /// Mid price in ticks; present only when both sides are quoted.
    pub mid_price_ticks: Option<i64>,
    /// Snapshot timestamp.
    pub timestamp: DateTime<Utc>,
}

impl OrderbookSnapshot {
    /// Build a canonical snapshot from unordered levels.
    pub fn from_levels(
        asset_id: impl Into<String>,
        bids: Vec<PriceLevel>,
        asks: Vec<PriceLevel>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let mut snap = Self {
            asset_id: asset_id.into(),
            bids,
            asks,
            best_bid_ticks: None,
            best_ask_ticks: None,
            mid_price_ticks: None,
            timestamp,
        };
        snap.canonicalize();
        snap
    }

    /// Sort both sides and recompute best bid/ask and mid.
    pub fn canonicalize(&mut self) {
        self.bids.sort_unstable_by(|a, b| b.price_ticks.cmp(&a.price_ticks));
        self.asks.sort_unstable_by(|a, b| a.price_ticks.cmp(&b.price_ticks));
        self.best_bid_ticks = self.bids.first().map(|l| l.price_ticks);
        self.best_ask_ticks = self.asks.first().map(|l| l.price_ticks);
        self.mid_price_ticks = match (self.best_bid_ticks, self.best_ask_ticks) {
            (Some(bid), Some(ask)) if bid > 0 && ask > 0 => Some((bid + ask) / 2),
            _ => None,
        };
    }

    /// Best-bid/best-ask spread in basis points of the mid, if both quoted.
    pub fn spread_bps(&self) -> Option<f64> {
        let (bid, ask) = (self.best_bid_ticks?, self.best_ask_ticks?);
        let mid = self.mid_price_ticks?;
        if mid == 0 {
            return None;
        }
        Some((ask - bid) as f64 / mid as f64 * 10_000.0)
    }

    /// Total resting size on one side, in units.
    pub fn depth_units(&self, side: Side) -> i64 {
        let levels = match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        };
        levels.iter().map(|l| l.size_units).sum()
    }
}

/// Incremental level delta from the venue feed. `size_units == 0`
/// removes the level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceChange {
    /// Outcome token identifier.
    pub asset_id: String,
    /// Which side of the book changed.
    pub side: Side,
    /// Level price in ticks.
    pub price_ticks: i64,
    /// New aggregate size; zero removes the level.
    pub size_units: i64,
    /// Venue timestamp of the change.
    pub timestamp: DateTime<Utc>,
}

/// Last traded price event from the venue feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeEvent {
    /// Outcome token identifier.
    pub asset_id: String,
    /// Aggressor side.
    pub side: Side,
    /// Trade price in ticks.
    pub price_ticks: i64,
    /// Trade size in units.
    pub size_units: i64,
    /// Venue timestamp.
    pub timestamp: DateTime<Utc>,
}

/// Payload published on the `prices` topic after every cache update.
///
/// Prices are floats here: this is a display/notification surface, not
/// a signing path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceTopicEvent {
    /// Either `book_update` or `price_change`.
    pub event: String,
    /// Outcome token identifier.
    pub asset_id: String,
    /// Best bid, if quoted.
    pub best_bid: Option<f64>,
    /// Best ask, if quoted.
    pub best_ask: Option<f64>,
    /// Mid price, if both sides quoted.
    pub mid_price: Option<f64>,
    /// RFC3339 event time.
    pub timestamp: DateTime<Utc>,
}

impl PriceTopicEvent {
    /// Event name for a full book replacement.
    pub const BOOK_UPDATE: &'static str = "book_update";
    /// Event name for an incremental level change.
    pub const PRICE_CHANGE: &'static str = "price_change";

    /// Summarize a snapshot for the `prices` topic.
    pub fn from_snapshot(event: &str, snap: &OrderbookSnapshot) -> Self {
        Self {
            event: event.to_string(),
            asset_id: snap.asset_id.clone(),
            best_bid: snap.best_bid_ticks.map(ticks_to_f64),
            best_ask: snap.best_ask_ticks.map(ticks_to_f64),
            mid_price: snap.mid_price_ticks.map(ticks_to_f64),
            timestamp: snap.timestamp,
        }
    }

    /// Rebuild a minimal one-level snapshot when the cache has no entry.
    pub fn to_minimal_snapshot(&self) -> OrderbookSnapshot {
        let mut bids = Vec::new();
        let mut asks = Vec::new();
        if let Some(bid) = self.best_bid {
            bids.push(PriceLevel {
                price_ticks: to_ticks(bid),
                size_units: 0,
            });
        }
        if let Some(ask) = self.best_ask {
            asks.push(PriceLevel {
                price_ticks: to_ticks(ask),
                size_units: 0,
            });
        }
        OrderbookSnapshot::from_levels(self.asset_id.clone(), bids, asks, self.timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(price: f64, size: f64) -> PriceLevel {
        PriceLevel {
            price_ticks: to_ticks(price),
            size_units: to_ticks(size),
        }
    }

    #[test]
    fn test_canonicalize_orders_and_mid() {
        let snap = OrderbookSnapshot::from_levels(
            "asset",
            vec![level(0.40, 10.0), level(0.42, 5.0), level(0.38, 7.0)],
            vec![level(0.50, 3.0), level(0.45, 8.0)],
            Utc::now(),
        );
        assert_eq!(snap.bids[0].price_ticks, to_ticks(0.42));
        assert_eq!(snap.bids[2].price_ticks, to_ticks(0.38));
        assert_eq!(snap.asks[0].price_ticks, to_ticks(0.45));
        assert_eq!(snap.best_bid_ticks, Some(to_ticks(0.42)));
        assert_eq!(snap.best_ask_ticks, Some(to_ticks(0.45)));
        assert_eq!(snap.mid_price_ticks, Some(to_ticks(0.435)));
    }

    #[test]
    fn test_mid_absent_with_one_sided_book() {
        let snap = OrderbookSnapshot::from_levels(
            "asset",
            vec![level(0.40, 10.0)],
            vec![],
            Utc::now(),
        );
        assert_eq!(snap.best_bid_ticks, Some(to_ticks(0.40)));
        assert_eq!(snap.best_ask_ticks, None);
        assert_eq!(snap.mid_price_ticks, None);
    }

    #[test]
    fn test_spread_bps() {
        let snap = OrderbookSnapshot::from_levels(
            "asset",
            vec![level(0.49, 1.0)],
            vec![level(0.51, 1.0)],
            Utc::now(),
        );
        let bps = snap.spread_bps().unwrap();
        assert!((bps - 400.0).abs() < 1.0, "got {bps}");
    }

    #[test]
    fn test_minimal_snapshot_from_price_event() {
        let ev = PriceTopicEvent {
            event: PriceTopicEvent::PRICE_CHANGE.to_string(),
            asset_id: "asset".to_string(),
            best_bid: Some(0.40),
            best_ask: Some(0.44),
            mid_price: Some(0.42),
            timestamp: Utc::now(),
        };
        let snap = ev.to_minimal_snapshot();
        assert_eq!(snap.mid_price_ticks, Some(to_ticks(0.42)));
        assert_eq!(snap.bids.len(), 1);
        assert_eq!(snap.asks.len(), 1);
    }

    #[test]
    fn test_fixed_point_rounding() {
        assert_eq!(to_ticks(0.405), 405_000);
        assert_eq!(ticks_to_f64(405_000), 0.405);
    }
}
