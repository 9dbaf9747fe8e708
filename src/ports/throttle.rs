//! Throttle Ports - Sliding-Window Limits and Named Leases
//!
//! Both primitives live on the shared backend so every process in the
//! deployment observes the same counters and lock owners. All checks
//! are single server-side atomic operations.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use parking_lot::Mutex;

/// Trait for the distributed sliding-window rate limiter.
#[async_trait]
pub trait RateLimiter: Send + Sync + 'static {
  /// Record one event under `key` if fewer than `limit` happened in
  /// the trailing `window`; returns whether the event was admitted.
  async fn allow(&self, key: &str, limit: u64, window: Duration) -> anyhow::Result<bool>;

  /// Block until one event per second is admitted for `key`.
  ///
  /// Polls [`RateLimiter::allow`] every 50ms. Callers wrap this in
  /// `tokio::select!` against their shutdown signal to cancel.
  async fn wait(&self, key: &str) -> anyhow::Result<()> {
    loop {
      if self.allow(key, 1, Duration::from_secs(1)).await? {
        return Ok(());
      }
      tokio::time::sleep(Duration::from_millis(50)).await;
    }
  }
}

/// One-shot closure deleting the lease key if the token still matches.
pub type ReleaseFn = Box<dyn FnOnce() -> BoxFuture<'static, anyhow::Result<()>> + Send>;

/// Held distributed lock.
///
/// Releasing compares the stored token server-side so an expired lease
/// re-acquired by another owner is never deleted out from under them.
/// A second `release` call is a no-op; dropping without releasing lets
/// the TTL reclaim the key.
pub struct LockGuard {
  key: String,
  release: Mutex<Option<ReleaseFn>>,
}

impl LockGuard {
  /// Build a guard around a one-shot release closure.
  pub fn new(key: impl Into<String>, release: ReleaseFn) -> Self {
    Self {
      key: key.into(),
      release: Mutex::new(Some(release)),
    }
  }

  /// The lock key this guard holds.
  pub fn key(&self) -> &str {
    &self.key
  }

  /// Release the lock; idempotent.
  pub async fn release(&self) -> anyhow::Result<()> {
    let release = self.release.lock().take();
    match release {
      Some(f) => f().await,
      None => Ok(()),
    }
  }
}

impl std::fmt::Debug for LockGuard {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("LockGuard").field("key", &self.key).finish()
  }
}

/// Trait for named mutual-exclusion leases.
#[async_trait]
pub trait LockManager: Send + Sync + 'static {
  /// Acquire `key` for `ttl`, failing with
  /// [`crate::domain::BotError::LockHeld`] when already taken.
  async fn acquire(&self, key: &str, ttl: Duration) -> anyhow::Result<LockGuard>;
}
