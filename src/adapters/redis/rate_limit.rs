//! Redis Sliding-Window Rate Limiter
//!
//! One sorted set per key under `ratelimit:{key}`, scored by event
//! time in microseconds. Expire-count-record happens in a single Lua
//! script so concurrent processes cannot overshoot the limit.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Script;
use uuid::Uuid;

use crate::ports::throttle::RateLimiter;

/// ARGV: now_us, window_us, limit, member, window_ms.
const ALLOW: &str = r"
local now = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
redis.call('ZREMRANGEBYSCORE', KEYS[1], 0, now - window)
if redis.call('ZCARD', KEYS[1]) < tonumber(ARGV[3]) then
  redis.call('ZADD', KEYS[1], now, ARGV[4])
  redis.call('PEXPIRE', KEYS[1], tonumber(ARGV[5]))
  return 1
end
return 0
";

/// Redis-backed sliding-window limiter.
pub struct RedisRateLimiter {
    conn: ConnectionManager,
    allow: Script,
}

impl RedisRateLimiter {
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            allow: Script::new(ALLOW),
        }
    }
}

#[async_trait]
impl RateLimiter for RedisRateLimiter {
    async fn allow(&self, key: &str, limit: u64, window: Duration) -> anyhow::Result<bool> {
        let mut conn = self.conn.clone();
        let now_us = chrono::Utc::now().timestamp_micros();
        let member = format!("{now_us}-{}", Uuid::new_v4());
        let admitted: i64 = self
            .allow
            .key(format!("ratelimit:{key}"))
            .arg(now_us)
            .arg(window.as_micros() as i64)
            .arg(limit)
            .arg(member)
            .arg(window.as_millis() as u64)
            .invoke_async(&mut conn)
            .await?;
        Ok(admitted == 1)
    }
}
