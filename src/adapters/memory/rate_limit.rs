//! In-Memory Sliding-Window Rate Limiter
//!
//! Per-key deque of event instants; entries older than the window are
//! dropped before counting. Matches the Redis sorted-set limiter
//! semantics for a single process.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::ports::throttle::RateLimiter;

/// Process-local sliding-window limiter.
#[derive(Default)]
pub struct MemoryRateLimiter {
    windows: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl MemoryRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RateLimiter for MemoryRateLimiter {
    async fn allow(&self, key: &str, limit: u64, window: Duration) -> anyhow::Result<bool> {
        let now = Instant::now();
        let mut windows = self.windows.lock();
        let events = windows.entry(key.to_string()).or_default();
        while events
            .front()
            .is_some_and(|&t| now.duration_since(t) >= window)
        {
            events.pop_front();
        }
        if (events.len() as u64) < limit {
            events.push_back(now);
            Ok(true)
        } else {
            Ok(false)
        }
    }
}
