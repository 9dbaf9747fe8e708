//! Redis Backend - Shared Bus, Cache and Throttles
//!
//! Every multi-writer mutation goes through a server-side atomic
//! operation: Lua scripts for book updates and the sliding window,
//! `SET NX PX` plus a compare-and-delete script for locks, and
//! `XADD MAXLEN ~` for bounded streams. The `ConnectionManager`
//! multiplexes commands and reconnects on its own; pub/sub uses
//! dedicated connections because subscriptions pin a connection into
//! subscriber mode.

pub mod bus;
pub mod cache;
pub mod lock;
pub mod rate_limit;

pub use bus::RedisBus;
pub use cache::RedisBookCache;
pub use lock::RedisLockManager;
pub use rate_limit::RedisRateLimiter;

use anyhow::Context;
use redis::aio::ConnectionManager;

/// Open a managed multiplexed connection to the shared store.
pub async fn connect(url: &str) -> anyhow::Result<(redis::Client, ConnectionManager)> {
    let client = redis::Client::open(url).context("invalid redis url")?;
    let manager = ConnectionManager::new(client.clone())
        .await
        .context("redis connection failed")?;
    Ok((client, manager))
}
