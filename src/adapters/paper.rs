//! Paper Trader - Simulated Order Placement
//!
//! Dry-run implementation of the execution ports: every order fills
//! immediately at its limit price with zero fees. Lets the whole
//! pipeline (strategies, leg groups, executor, persistence) run
//! without venue credentials.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use crate::domain::signal::TradeSignal;
use crate::ports::execution::{OrderPlacer, OrderResult, ReplaceOrderer};

/// Simulated venue that accepts and instantly fills everything.
#[derive(Default)]
pub struct PaperTrader {
    placed: AtomicU64,
    replaced: AtomicU64,
}

impl PaperTrader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Orders placed so far (diagnostics).
    pub fn placed_count(&self) -> u64 {
        self.placed.load(Ordering::Relaxed)
    }

    fn fill(&self, signal: &TradeSignal) -> OrderResult {
        OrderResult {
            success: true,
            order_id: format!("paper-{}", Uuid::new_v4()),
            status: "matched".to_string(),
            message: String::new(),
            should_retry: false,
            filled_price_ticks: signal.price_ticks,
            fee_usd: 0.0,
        }
    }
}

#[async_trait]
impl OrderPlacer for PaperTrader {
    async fn place_order(&self, signal: &TradeSignal) -> anyhow::Result<OrderResult> {
        self.placed.fetch_add(1, Ordering::Relaxed);
        let result = self.fill(signal);
        info!(
            order_id = %result.order_id,
            token = %signal.token_id,
            side = %signal.side,
            price_ticks = signal.price_ticks,
            size_units = signal.size_units,
            source = %signal.source,
            "paper order filled"
        );
        Ok(result)
    }
}

#[async_trait]
impl ReplaceOrderer for PaperTrader {
    async fn replace_order(
        &self,
        cancel_id: &str,
        signal: &TradeSignal,
    ) -> anyhow::Result<OrderResult> {
        self.replaced.fetch_add(1, Ordering::Relaxed);
        let result = self.fill(signal);
        info!(
            cancelled = %cancel_id,
            order_id = %result.order_id,
            token = %signal.token_id,
            "paper order replaced"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::orderbook::{to_ticks, Side};
    use crate::domain::signal::Urgency;

    #[tokio::test]
    async fn test_paper_fill_echoes_signal_price() {
        let trader = PaperTrader::new();
        let signal = TradeSignal::new(
            "test",
            "m1",
            "t1",
            Side::Buy,
            to_ticks(0.40),
            to_ticks(10.0),
            Urgency::Low,
            "paper",
            chrono::Duration::seconds(30),
        );
        let result = trader.place_order(&signal).await.unwrap();
        assert!(result.success);
        assert_eq!(result.filled_price_ticks, to_ticks(0.40));
        assert_eq!(trader.placed_count(), 1);
    }
}
