//! In-Memory Lock Manager - Token-Guarded Leases
//!
//! Single-process equivalent of the Redis `SET NX PX` lease: each
//! acquisition stores a random token and release only deletes the
//! entry when the token still matches, so a lease that expired and was
//! re-acquired elsewhere is never clobbered.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::domain::error::BotError;
use crate::ports::throttle::{LockGuard, LockManager};

type LockTable = Arc<Mutex<HashMap<String, (String, Instant)>>>;

/// Process-local lease manager.
#[derive(Default)]
pub struct MemoryLockManager {
    locks: LockTable,
}

impl MemoryLockManager {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LockManager for MemoryLockManager {
    async fn acquire(&self, key: &str, ttl: Duration) -> anyhow::Result<LockGuard> {
        let token = Uuid::new_v4().to_string();
        let now = Instant::now();
        {
            let mut locks = self.locks.lock();
            match locks.get(key) {
                Some(&(_, expires)) if expires > now => {
                    return Err(BotError::LockHeld(key.to_string()).into());
                }
                _ => {
                    locks.insert(key.to_string(), (token.clone(), now + ttl));
                }
            }
        }

        let locks = Arc::clone(&self.locks);
        let lock_key = key.to_string();
        let guard_key = lock_key.clone();
        let release = Box::new(move || {
            let fut = async move {
                let mut locks = locks.lock();
                if locks.get(&lock_key).is_some_and(|(t, _)| *t == token) {
                    locks.remove(&lock_key);
                }
                anyhow::Ok(())
            };
            let boxed: futures_util::future::BoxFuture<'static, anyhow::Result<()>> =
                Box::pin(fut);
            boxed
        });
        Ok(LockGuard::new(guard_key, release))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_second_acquire_fails_while_held() {
        let mgr = MemoryLockManager::new();
        let guard = mgr.acquire("job", Duration::from_secs(5)).await.unwrap();
        let err = mgr.acquire("job", Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BotError>(),
            Some(BotError::LockHeld(_))
        ));
        guard.release().await.unwrap();
        mgr.acquire("job", Duration::from_secs(5)).await.unwrap();
    }

    #[tokio::test]
    async fn test_double_release_is_noop() {
        let mgr = MemoryLockManager::new();
        let guard = mgr.acquire("job", Duration::from_secs(5)).await.unwrap();
        guard.release().await.unwrap();
        guard.release().await.unwrap();
    }

    #[tokio::test]
    async fn test_expired_lease_can_be_taken_and_survives_stale_release() {
        let mgr = MemoryLockManager::new();
        let stale = mgr.acquire("job", Duration::from_millis(10)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        // Lease expired: a new owner takes it.
        let fresh = mgr.acquire("job", Duration::from_secs(5)).await.unwrap();

        // The stale guard's token no longer matches; release must not
        // evict the new owner.
        stale.release().await.unwrap();
        let err = mgr.acquire("job", Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BotError>(),
            Some(BotError::LockHeld(_))
        ));
        fresh.release().await.unwrap();
    }
}
