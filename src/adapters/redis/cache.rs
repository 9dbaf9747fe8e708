//! Redis Book Cache - Scripted Atomic Snapshots and Level Deltas
//!
//! Key layout per asset (all mutated together inside one script, so
//! readers never see a torn snapshot):
//!
//! ```text
//! book:{asset}:bids       zset  price -> price (score = ticks)
//! book:{asset}:asks       zset  price -> price
//! book:{asset}:bid:size   hash  price -> size
//! book:{asset}:ask:size   hash  price -> size
//! book:{asset}:bbo        hash  bid / ask / mid (ticks, 0 = absent)
//! book:{asset}:meta       hash  ts (unix ms)
//! price:{asset}           string, optional TTL
//! ```

use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use redis::aio::ConnectionManager;
use redis::Script;

use crate::domain::error::BotError;
use crate::domain::orderbook::{OrderbookSnapshot, PriceLevel, Side};
use crate::ports::cache::BookCache;

/// Replace all six per-asset keys from one argument list.
///
/// ARGV: nbids, nasks, best_bid, best_ask, mid, ts, then
/// price/size pairs for bids followed by asks.
const SET_SNAPSHOT: &str = r"
redis.call('DEL', KEYS[1], KEYS[2], KEYS[3], KEYS[4], KEYS[5], KEYS[6])
local nbids = tonumber(ARGV[1])
local nasks = tonumber(ARGV[2])
local idx = 7
for i = 1, nbids do
  local price = ARGV[idx]
  redis.call('ZADD', KEYS[1], tonumber(price), price)
  redis.call('HSET', KEYS[3], price, ARGV[idx + 1])
  idx = idx + 2
end
for i = 1, nasks do
  local price = ARGV[idx]
  redis.call('ZADD', KEYS[2], tonumber(price), price)
  redis.call('HSET', KEYS[4], price, ARGV[idx + 1])
  idx = idx + 2
end
redis.call('HSET', KEYS[5], 'bid', ARGV[3], 'ask', ARGV[4], 'mid', ARGV[5])
redis.call('HSET', KEYS[6], 'ts', ARGV[6])
return 1
";

/// Apply one level delta and recompute the BBO from both zsets.
///
/// ARGV: side ('bid'|'ask'), price, size, ts.
const UPDATE_LEVEL: &str = r"
local zkey = KEYS[1]
local hkey = KEYS[3]
if ARGV[1] == 'ask' then
  zkey = KEYS[2]
  hkey = KEYS[4]
end
if tonumber(ARGV[3]) > 0 then
  redis.call('ZADD', zkey, tonumber(ARGV[2]), ARGV[2])
  redis.call('HSET', hkey, ARGV[2], ARGV[3])
else
  redis.call('ZREM', zkey, ARGV[2])
  redis.call('HDEL', hkey, ARGV[2])
end
local top_bid = redis.call('ZREVRANGE', KEYS[1], 0, 0)
local top_ask = redis.call('ZRANGE', KEYS[2], 0, 0)
local bid = top_bid[1] or '0'
local ask = top_ask[1] or '0'
local mid = '0'
if tonumber(bid) > 0 and tonumber(ask) > 0 then
  mid = tostring(math.floor((tonumber(bid) + tonumber(ask)) / 2))
end
redis.call('HSET', KEYS[5], 'bid', bid, 'ask', ask, 'mid', mid)
redis.call('HSET', KEYS[6], 'ts', ARGV[4])
return 1
";

/// Read every per-asset key in one atomic step, sizes aligned with
/// their zset members.
const GET_SNAPSHOT: &str = r"
local bids = redis.call('ZREVRANGE', KEYS[1], 0, -1)
local bid_sizes = {}
for i, p in ipairs(bids) do
  bid_sizes[i] = redis.call('HGET', KEYS[3], p) or '0'
end
local asks = redis.call('ZRANGE', KEYS[2], 0, -1)
local ask_sizes = {}
for i, p in ipairs(asks) do
  ask_sizes[i] = redis.call('HGET', KEYS[4], p) or '0'
end
local ts = redis.call('HGET', KEYS[6], 'ts')
if not ts then
  ts = ''
end
return {bids, bid_sizes, asks, ask_sizes, ts}
";

type RawSnapshot = (Vec<String>, Vec<String>, Vec<String>, Vec<String>, String);

/// Redis-backed orderbook and last-price cache.
pub struct RedisBookCache {
    conn: ConnectionManager,
    set_snapshot: Script,
    update_level: Script,
    get_snapshot: Script,
}

impl RedisBookCache {
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            set_snapshot: Script::new(SET_SNAPSHOT),
            update_level: Script::new(UPDATE_LEVEL),
            get_snapshot: Script::new(GET_SNAPSHOT),
        }
    }

    fn keys(asset_id: &str) -> [String; 6] {
        [
            format!("book:{asset_id}:bids"),
            format!("book:{asset_id}:asks"),
            format!("book:{asset_id}:bid:size"),
            format!("book:{asset_id}:ask:size"),
            format!("book:{asset_id}:bbo"),
            format!("book:{asset_id}:meta"),
        ]
    }
}

fn parse_levels(prices: &[String], sizes: &[String]) -> Vec<PriceLevel> {
    prices
        .iter()
        .zip(sizes.iter())
        .filter_map(|(p, s)| {
            Some(PriceLevel {
                price_ticks: p.parse().ok()?,
                size_units: s.parse().ok()?,
            })
        })
        .collect()
}

#[async_trait]
impl BookCache for RedisBookCache {
    async fn set_snapshot(&self, snap: &OrderbookSnapshot) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        let mut invocation = self.set_snapshot.prepare_invoke();
        for key in Self::keys(&snap.asset_id) {
            invocation.key(key);
        }
        invocation
            .arg(snap.bids.len())
            .arg(snap.asks.len())
            .arg(snap.best_bid_ticks.unwrap_or(0))
            .arg(snap.best_ask_ticks.unwrap_or(0))
            .arg(snap.mid_price_ticks.unwrap_or(0))
            .arg(snap.timestamp.timestamp_millis());
        for level in snap.bids.iter().chain(snap.asks.iter()) {
            invocation.arg(level.price_ticks).arg(level.size_units);
        }
        let _: i64 = invocation.invoke_async(&mut conn).await?;
        Ok(())
    }

    async fn update_level(
        &self,
        asset_id: &str,
        side: Side,
        price_ticks: i64,
        size_units: i64,
    ) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        let mut invocation = self.update_level.prepare_invoke();
        for key in Self::keys(asset_id) {
            invocation.key(key);
        }
        let side_arg = match side {
            Side::Buy => "bid",
            Side::Sell => "ask",
        };
        let _: i64 = invocation
            .arg(side_arg)
            .arg(price_ticks)
            .arg(size_units.max(0))
            .arg(Utc::now().timestamp_millis())
            .invoke_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn get_snapshot(&self, asset_id: &str) -> anyhow::Result<OrderbookSnapshot> {
        let mut conn = self.conn.clone();
        let mut invocation = self.get_snapshot.prepare_invoke();
        for key in Self::keys(asset_id) {
            invocation.key(key);
        }
        let (bids, bid_sizes, asks, ask_sizes, ts): RawSnapshot =
            invocation.invoke_async(&mut conn).await?;

        let ts_ms: Option<i64> = ts.parse().ok();
        if bids.is_empty() && asks.is_empty() && ts_ms.is_none() {
            return Err(BotError::NotFound(format!("book:{asset_id}")).into());
        }
        let timestamp = ts_ms
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .unwrap_or_else(Utc::now);

        Ok(OrderbookSnapshot::from_levels(
            asset_id,
            parse_levels(&bids, &bid_sizes),
            parse_levels(&asks, &ask_sizes),
            timestamp,
        ))
    }

    async fn set_price(
        &self,
        asset_id: &str,
        price_ticks: i64,
        ttl: Option<Duration>,
    ) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        let key = format!("price:{asset_id}");
        let mut cmd = redis::cmd("SET");
        cmd.arg(&key).arg(price_ticks);
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(ttl.as_millis() as u64);
        }
        let _: () = cmd.query_async(&mut conn).await?;
        Ok(())
    }

    async fn get_price(&self, asset_id: &str) -> anyhow::Result<Option<i64>> {
        let mut conn = self.conn.clone();
        let key = format!("price:{asset_id}");
        let value: Option<i64> = redis::cmd("GET").arg(&key).query_async(&mut conn).await?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        let keys = RedisBookCache::keys("tok");
        assert_eq!(keys[0], "book:tok:bids");
        assert_eq!(keys[2], "book:tok:bid:size");
        assert_eq!(keys[4], "book:tok:bbo");
    }

    #[test]
    fn test_parse_levels_skips_garbage() {
        let prices = vec!["400000".to_string(), "oops".to_string()];
        let sizes = vec!["10".to_string(), "20".to_string()];
        let levels = parse_levels(&prices, &sizes);
        assert_eq!(levels.len(), 1);
        assert_eq!(levels[0].price_ticks, 400_000);
    }
}
