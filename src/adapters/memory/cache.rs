//! In-Memory Book Cache - Snapshots, Level Deltas, TTL'd Prices
//!
//! Books are `BTreeMap`s keyed by price ticks, so both sides stay
//! sorted and level updates are O(log n). The whole per-asset entry is
//! replaced or mutated under one write lock, which gives the same
//! reader guarantee as the Redis scripts: a snapshot is observed in
//! full or not at all.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};

use crate::domain::error::BotError;
use crate::domain::orderbook::{OrderbookSnapshot, PriceLevel, Side};
use crate::ports::cache::BookCache;

struct BookEntry {
    /// Price ticks -> size units.
    bids: BTreeMap<i64, i64>,
    asks: BTreeMap<i64, i64>,
    timestamp: DateTime<Utc>,
}

impl BookEntry {
    fn snapshot(&self, asset_id: &str) -> OrderbookSnapshot {
        let bids = self
            .bids
            .iter()
            .rev()
            .map(|(&price_ticks, &size_units)| PriceLevel {
                price_ticks,
                size_units,
            })
            .collect();
        let asks = self
            .asks
            .iter()
            .map(|(&price_ticks, &size_units)| PriceLevel {
                price_ticks,
                size_units,
            })
            .collect();
        OrderbookSnapshot::from_levels(asset_id, bids, asks, self.timestamp)
    }
}

/// Process-local orderbook and last-price cache.
#[derive(Default)]
pub struct MemoryBookCache {
    books: RwLock<HashMap<String, BookEntry>>,
    prices: Mutex<HashMap<String, (i64, Option<Instant>)>>,
}

impl MemoryBookCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BookCache for MemoryBookCache {
    async fn set_snapshot(&self, snap: &OrderbookSnapshot) -> anyhow::Result<()> {
        let mut entry = BookEntry {
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            timestamp: snap.timestamp,
        };
        for level in &snap.bids {
            entry.bids.insert(level.price_ticks, level.size_units);
        }
        for level in &snap.asks {
            entry.asks.insert(level.price_ticks, level.size_units);
        }
        self.books.write().insert(snap.asset_id.clone(), entry);
        Ok(())
    }

    async fn update_level(
        &self,
        asset_id: &str,
        side: Side,
        price_ticks: i64,
        size_units: i64,
    ) -> anyhow::Result<()> {
        let mut books = self.books.write();
        let entry = books.entry(asset_id.to_string()).or_insert(BookEntry {
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            timestamp: Utc::now(),
        });
        let levels = match side {
            Side::Buy => &mut entry.bids,
            Side::Sell => &mut entry.asks,
        };
        if size_units > 0 {
            levels.insert(price_ticks, size_units);
        } else {
            levels.remove(&price_ticks);
        }
        entry.timestamp = Utc::now();
        Ok(())
    }

    async fn get_snapshot(&self, asset_id: &str) -> anyhow::Result<OrderbookSnapshot> {
        let books = self.books.read();
        books
            .get(asset_id)
            .map(|entry| entry.snapshot(asset_id))
            .ok_or_else(|| BotError::NotFound(format!("book:{asset_id}")).into())
    }

    async fn set_price(
        &self,
        asset_id: &str,
        price_ticks: i64,
        ttl: Option<Duration>,
    ) -> anyhow::Result<()> {
        let expires = ttl.map(|d| Instant::now() + d);
        self.prices
            .lock()
            .insert(asset_id.to_string(), (price_ticks, expires));
        Ok(())
    }

    async fn get_price(&self, asset_id: &str) -> anyhow::Result<Option<i64>> {
        let mut prices = self.prices.lock();
        match prices.get(asset_id) {
            Some(&(_, Some(expires))) if expires <= Instant::now() => {
                prices.remove(asset_id);
                Ok(None)
            }
            Some(&(ticks, _)) => Ok(Some(ticks)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::orderbook::to_ticks;

    fn snapshot(asset: &str, bids: &[(f64, f64)], asks: &[(f64, f64)]) -> OrderbookSnapshot {
        let to_levels = |levels: &[(f64, f64)]| {
            levels
                .iter()
                .map(|&(p, s)| PriceLevel {
                    price_ticks: to_ticks(p),
                    size_units: to_ticks(s),
                })
                .collect()
        };
        OrderbookSnapshot::from_levels(asset, to_levels(bids), to_levels(asks), Utc::now())
    }

    #[tokio::test]
    async fn test_set_then_get_round_trips_canonical_order() {
        let cache = MemoryBookCache::new();
        let snap = snapshot("a1", &[(0.40, 10.0), (0.42, 5.0)], &[(0.50, 3.0), (0.45, 8.0)]);
        cache.set_snapshot(&snap).await.unwrap();

        let got = cache.get_snapshot("a1").await.unwrap();
        assert_eq!(got, snap);
        assert_eq!(got.best_bid_ticks, Some(to_ticks(0.42)));
        assert_eq!(got.best_ask_ticks, Some(to_ticks(0.45)));
    }

    #[tokio::test]
    async fn test_snapshot_replace_clears_previous_levels() {
        let cache = MemoryBookCache::new();
        cache
            .set_snapshot(&snapshot("a1", &[(0.40, 10.0), (0.42, 5.0)], &[(0.45, 8.0)]))
            .await
            .unwrap();
        cache
            .set_snapshot(&snapshot("a1", &[(0.30, 1.0)], &[(0.60, 1.0)]))
            .await
            .unwrap();

        let got = cache.get_snapshot("a1").await.unwrap();
        assert_eq!(got.bids.len(), 1);
        assert_eq!(got.best_bid_ticks, Some(to_ticks(0.30)));
    }

    #[tokio::test]
    async fn test_update_level_set_and_remove_recomputes_bbo() {
        let cache = MemoryBookCache::new();
        cache
            .set_snapshot(&snapshot("a1", &[(0.40, 10.0)], &[(0.45, 8.0)]))
            .await
            .unwrap();

        cache
            .update_level("a1", Side::Buy, to_ticks(0.43), to_ticks(2.0))
            .await
            .unwrap();
        let got = cache.get_snapshot("a1").await.unwrap();
        assert_eq!(got.best_bid_ticks, Some(to_ticks(0.43)));
        assert_eq!(got.mid_price_ticks, Some(to_ticks(0.44)));

        cache
            .update_level("a1", Side::Buy, to_ticks(0.43), 0)
            .await
            .unwrap();
        let got = cache.get_snapshot("a1").await.unwrap();
        assert_eq!(got.best_bid_ticks, Some(to_ticks(0.40)));
    }

    #[tokio::test]
    async fn test_get_snapshot_missing_is_not_found() {
        let cache = MemoryBookCache::new();
        let err = cache.get_snapshot("ghost").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BotError>(),
            Some(BotError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_price_ttl_expires() {
        let cache = MemoryBookCache::new();
        cache
            .set_price("a1", to_ticks(0.55), Some(Duration::from_millis(20)))
            .await
            .unwrap();
        assert_eq!(cache.get_price("a1").await.unwrap(), Some(to_ticks(0.55)));

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(cache.get_price("a1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_price_without_ttl_persists() {
        let cache = MemoryBookCache::new();
        cache.set_price("a1", to_ticks(0.55), None).await.unwrap();
        assert_eq!(cache.get_price("a1").await.unwrap(), Some(to_ticks(0.55)));
    }
}
