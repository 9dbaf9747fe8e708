//! Redis Lock Manager - SET NX PX Leases with Conditional Release
//!
//! Acquisition is one `SET key token NX PX ttl`; release runs a
//! compare-and-delete script so only the token owner can free the
//! lease. Release uses its own short deadline, independent of the
//! caller's context, so unlock still happens during shutdown.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use redis::aio::ConnectionManager;
use redis::Script;

use crate::domain::error::BotError;
use crate::ports::throttle::{LockGuard, LockManager};

const RELEASE: &str = r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
  return redis.call('DEL', KEYS[1])
end
return 0
";

const RELEASE_DEADLINE: Duration = Duration::from_secs(5);

/// Redis-backed lease manager.
pub struct RedisLockManager {
    conn: ConnectionManager,
}

impl RedisLockManager {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl LockManager for RedisLockManager {
    async fn acquire(&self, key: &str, ttl: Duration) -> anyhow::Result<LockGuard> {
        let mut conn = self.conn.clone();
        let full_key = format!("lock:{key}");
        let token = uuid::Uuid::new_v4().to_string();

        let acquired: Option<String> = redis::cmd("SET")
            .arg(&full_key)
            .arg(&token)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await?;
        if acquired.is_none() {
            return Err(BotError::LockHeld(key.to_string()).into());
        }

        let release_conn = self.conn.clone();
        let release_key = full_key.clone();
        let release = Box::new(move || {
            let fut = async move {
                let mut conn = release_conn;
                let script = Script::new(RELEASE);
                let mut invocation = script.prepare_invoke();
                invocation.key(&release_key).arg(&token);
                tokio::time::timeout(
                    RELEASE_DEADLINE,
                    invocation.invoke_async::<_, i64>(&mut conn),
                )
                .await
                .map_err(|_| anyhow::anyhow!("lock release timed out: {release_key}"))??;
                anyhow::Ok(())
            };
            let boxed: BoxFuture<'static, anyhow::Result<()>> = Box::pin(fut);
            boxed
        });
        Ok(LockGuard::new(full_key, release))
    }
}
