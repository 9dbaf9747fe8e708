//! Rate-Limited Order Placer - Venue Quota Enforcement
//!
//! Decorates an `OrderPlacer` with the distributed sliding-window
//! limiter so every process in the deployment shares one order quota.
//! A denied placement comes back as a retryable rejection, which the
//! executor's single-retry path absorbs.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::signal::TradeSignal;
use crate::ports::execution::{OrderPlacer, OrderResult};
use crate::ports::throttle::RateLimiter;

/// Shared limiter key for order placement.
const ORDERS_KEY: &str = "orders";

/// Order placer decorator enforcing a per-window order cap.
pub struct RateLimitedPlacer {
    inner: Arc<dyn OrderPlacer>,
    limiter: Arc<dyn RateLimiter>,
    limit: u64,
    window: Duration,
}

impl RateLimitedPlacer {
    pub fn new(
        inner: Arc<dyn OrderPlacer>,
        limiter: Arc<dyn RateLimiter>,
        limit: u64,
        window: Duration,
    ) -> Self {
        Self {
            inner,
            limiter,
            limit,
            window,
        }
    }
}

#[async_trait]
impl OrderPlacer for RateLimitedPlacer {
    async fn place_order(&self, signal: &TradeSignal) -> anyhow::Result<OrderResult> {
        if !self
            .limiter
            .allow(ORDERS_KEY, self.limit, self.window)
            .await?
        {
            return Ok(OrderResult {
                success: false,
                order_id: String::new(),
                status: "rate_limited".to_string(),
                message: format!("order quota {}/{}s exhausted", self.limit, self.window.as_secs()),
                should_retry: true,
                filled_price_ticks: 0,
                fee_usd: 0.0,
            });
        }
        self.inner.place_order(signal).await
    }
}
