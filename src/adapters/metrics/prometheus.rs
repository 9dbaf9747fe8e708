//! Prometheus Metrics Registry - Trading Observability
//!
//! Registers and exposes Prometheus metrics for Grafana dashboards.
//! Covers the signal pipeline (emitted, dropped, placed), leg groups,
//! arbitrage detection, and feed health.

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use prometheus::{Encoder, GaugeVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use tokio::sync::broadcast;
use tracing::{info, instrument};

/// Centralized Prometheus metrics for the trading bot.
///
/// All metrics follow the naming convention `polymarket_bot_*`.
pub struct BotMetrics {
    /// Prometheus registry.
    registry: Registry,
    /// Venue events consumed, by kind (book / price_change / trade).
    pub feed_events: IntCounterVec,
    /// Signals emitted by strategies, by source.
    pub signals_emitted: IntCounterVec,
    /// Signals dropped before placement, by reason.
    pub signals_dropped: IntCounterVec,
    /// Fan-out events dropped because a strategy channel was full.
    pub fanout_dropped: IntCounterVec,
    /// Orders placed, by result (accepted / rejected).
    pub orders_placed: IntCounterVec,
    /// Order placement retries.
    pub order_retries: IntCounter,
    /// Leg groups fully assembled and executed.
    pub leg_groups_completed: IntCounter,
    /// Leg groups discarded on the max-gap timer.
    pub leg_groups_timed_out: IntCounter,
    /// Arbitrage opportunities detected, by strategy.
    pub arb_opportunities: IntCounterVec,
    /// Arbitrage opportunities accepted and recorded.
    pub arb_recorded: IntCounter,
    /// WebSocket reconnect attempts.
    pub ws_reconnects: IntCounter,
    /// Feed connection status (1 = connected, 0 = disconnected).
    pub feed_connected: GaugeVec,
    /// Cumulative realized P&L, USD.
    pub realized_pnl: prometheus::Gauge,
}

impl BotMetrics {
    /// Create and register all Prometheus metrics.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let feed_events = IntCounterVec::new(
            Opts::new("polymarket_bot_feed_events_total", "Venue events consumed"),
            &["kind"],
        )?;
        let signals_emitted = IntCounterVec::new(
            Opts::new(
                "polymarket_bot_signals_emitted_total",
                "Trade signals emitted by strategies",
            ),
            &["source"],
        )?;
        let signals_dropped = IntCounterVec::new(
            Opts::new(
                "polymarket_bot_signals_dropped_total",
                "Signals dropped before placement",
            ),
            &["reason"],
        )?;
        let fanout_dropped = IntCounterVec::new(
            Opts::new(
                "polymarket_bot_fanout_dropped_total",
                "Events dropped on full strategy channels",
            ),
            &["strategy"],
        )?;
        let orders_placed = IntCounterVec::new(
            Opts::new("polymarket_bot_orders_placed_total", "Orders placed"),
            &["result"],
        )?;
        let order_retries = IntCounter::new(
            "polymarket_bot_order_retries_total",
            "Order placement retries",
        )?;
        let leg_groups_completed = IntCounter::new(
            "polymarket_bot_leg_groups_completed_total",
            "Leg groups fully assembled",
        )?;
        let leg_groups_timed_out = IntCounter::new(
            "polymarket_bot_leg_groups_timed_out_total",
            "Leg groups discarded on timeout",
        )?;
        let arb_opportunities = IntCounterVec::new(
            Opts::new(
                "polymarket_bot_arb_opportunities_total",
                "Arbitrage opportunities detected",
            ),
            &["strategy"],
        )?;
        let arb_recorded = IntCounter::new(
            "polymarket_bot_arb_recorded_total",
            "Arbitrage opportunities recorded",
        )?;
        let ws_reconnects = IntCounter::new(
            "polymarket_bot_ws_reconnects_total",
            "WebSocket reconnect attempts",
        )?;
        let feed_connected = GaugeVec::new(
            Opts::new(
                "polymarket_bot_feed_connected",
                "Feed connection status (1=connected, 0=disconnected)",
            ),
            &["source"],
        )?;
        let realized_pnl = prometheus::Gauge::new(
            "polymarket_bot_realized_pnl_usd",
            "Cumulative realized PnL in USD",
        )?;

        registry.register(Box::new(feed_events.clone()))?;
        registry.register(Box::new(signals_emitted.clone()))?;
        registry.register(Box::new(signals_dropped.clone()))?;
        registry.register(Box::new(fanout_dropped.clone()))?;
        registry.register(Box::new(orders_placed.clone()))?;
        registry.register(Box::new(order_retries.clone()))?;
        registry.register(Box::new(leg_groups_completed.clone()))?;
        registry.register(Box::new(leg_groups_timed_out.clone()))?;
        registry.register(Box::new(arb_opportunities.clone()))?;
        registry.register(Box::new(arb_recorded.clone()))?;
        registry.register(Box::new(ws_reconnects.clone()))?;
        registry.register(Box::new(feed_connected.clone()))?;
        registry.register(Box::new(realized_pnl.clone()))?;

        Ok(Self {
            registry,
            feed_events,
            signals_emitted,
            signals_dropped,
            fanout_dropped,
            orders_placed,
            order_retries,
            leg_groups_completed,
            leg_groups_timed_out,
            arb_opportunities,
            arb_recorded,
            ws_reconnects,
            feed_connected,
            realized_pnl,
        })
    }

    /// Serve Prometheus metrics on the configured bind address.
    #[instrument(skip(self, shutdown_rx))]
    pub async fn serve(
        self: Arc<Self>,
        bind_address: String,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> anyhow::Result<()> {
        let metrics_self = Arc::clone(&self);

        let app = Router::new().route(
            "/metrics",
            get(move || {
                let registry = metrics_self.registry.clone();
                async move {
                    let encoder = TextEncoder::new();
                    let metric_families = registry.gather();
                    let mut buffer = Vec::new();
                    if encoder.encode(&metric_families, &mut buffer).is_err() {
                        return String::new();
                    }
                    String::from_utf8(buffer).unwrap_or_default()
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind(&bind_address).await?;
        info!(address = %bind_address, "Prometheus metrics server started");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_register_without_collision() {
        let metrics = BotMetrics::new().unwrap();
        metrics.signals_emitted.with_label_values(&["test"]).inc();
        metrics.signals_dropped.with_label_values(&["expired"]).inc();
        assert_eq!(
            metrics.signals_emitted.with_label_values(&["test"]).get(),
            1
        );
    }
}
