//! Polymarket Arb Bot - Entry Point
//!
//! Event-driven trading bot for Polymarket prediction markets.
//! Wires the WebSocket feed, shared cache/bus, strategy engine,
//! arb detector and executor according to the configured mode,
//! then supervises them until shutdown.

// Platform-specific allocator: jemalloc on Linux, system default on Windows
#[cfg(all(target_os = "linux", target_env = "gnu"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

mod adapters;
mod config;
mod domain;
mod ports;
mod usecases;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::adapters::feeds::{PolymarketFeed, VenueQuoteCache};
use crate::adapters::memory::{
    MemoryBookCache, MemoryBus, MemoryLockManager, MemoryRateLimiter,
};
use crate::adapters::metrics::{BotMetrics, HealthServer, HealthState};
use crate::adapters::paper::PaperTrader;
use crate::adapters::persistence::JsonlArbExecutionStore;
use crate::adapters::redis::{RedisBookCache, RedisBus, RedisLockManager, RedisRateLimiter};
use crate::adapters::throttled::RateLimitedPlacer;
use crate::config::{AppConfig, BotMode};
use crate::ports::bus::SignalBus;
use crate::ports::cache::BookCache;
use crate::ports::execution::{OrderPlacer, ReplaceOrderer};
use crate::ports::market_feed::FeedHandler;
use crate::ports::throttle::{LockManager, RateLimiter};
use crate::usecases::arb::{
    ArbDetector, ArbGates, ArbStrategy, ArbStrategyConfig, ArbStrategyRegistry,
    DefaultArbService, ImbalanceStrategy, SpreadStrategy, YesNoSpreadStrategy,
};
use crate::usecases::book_service::BookService;
use crate::usecases::executor::{Executor, ExecutorConfig, ExecutorDeps};
use crate::usecases::risk::{DefaultRiskChecker, SharedPnl};
use crate::usecases::strategy::{
    bond::Bond, combinatorial::CombinatorialArb, cross_platform::CrossPlatformArb,
    flash_crash::FlashCrash, liquidity_provider::LiquidityProvider,
    mean_reversion::MeanReversion, rebalancing::RebalancingArb,
    temporal_overlap::TemporalOverlap, yes_no_spread::YesNoSpread, StrategyEngine,
    StrategyRegistry,
};

/// Application version from Cargo.toml.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine egress channel depth.
const EGRESS_BUFFER: usize = 256;

/// How long the supervisor waits for tasks after shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Lease guarding against two trading instances of the same bot.
const TRADER_LEASE_TTL: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize structured logging
    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(&log_filter)
        .with_target(true)
        .init();

    info!(
        version = VERSION,
        pid = std::process::id(),
        "Starting Polymarket Arb Bot"
    );

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());
    let config =
        config::loader::load_config(&config_path).context("Failed to load configuration")?;

    run(config).await
}

struct Backend {
    bus: Arc<dyn SignalBus>,
    cache: Arc<dyn BookCache>,
    limiter: Arc<dyn RateLimiter>,
    locks: Arc<dyn LockManager>,
}

async fn build_backend(config: &AppConfig) -> Result<Backend> {
    if config.redis.enabled {
        let (client, conn) = adapters::redis::connect(&config.redis.url).await?;
        info!(url = %config.redis.url, "Connected to shared store");
        Ok(Backend {
            bus: Arc::new(RedisBus::new(client, conn.clone())),
            cache: Arc::new(RedisBookCache::new(conn.clone())),
            limiter: Arc::new(RedisRateLimiter::new(conn.clone())),
            locks: Arc::new(RedisLockManager::new(conn)),
        })
    } else {
        info!("Shared store disabled, using in-memory backend");
        Ok(Backend {
            bus: Arc::new(MemoryBus::new()),
            cache: Arc::new(MemoryBookCache::new()),
            limiter: Arc::new(MemoryRateLimiter::new()),
            locks: Arc::new(MemoryLockManager::new()),
        })
    }
}

/// Register every known strategy so `SetActive*` can validate names.
fn register_strategies(config: &AppConfig, quotes: &Arc<VenueQuoteCache>) -> Arc<StrategyRegistry> {
    let registry = Arc::new(StrategyRegistry::new());
    let catalog = Arc::new(config.market_catalog());
    let strategy = &config.strategy;

    registry.register(Box::new(FlashCrash::new(
        strategy.params_for("flash_crash"),
    )));
    registry.register(Box::new(MeanReversion::new(
        strategy.params_for("mean_reversion"),
    )));
    registry.register(Box::new(LiquidityProvider::new(
        strategy.params_for("liquidity_provider"),
    )));
    registry.register(Box::new(YesNoSpread::new(
        strategy.params_for("yes_no_spread"),
        Arc::clone(&catalog),
    )));
    registry.register(Box::new(RebalancingArb::new(
        strategy.params_for("rebalancing"),
        Arc::clone(&catalog),
    )));
    registry.register(Box::new(CombinatorialArb::new(
        strategy.params_for("combinatorial"),
        Arc::clone(&catalog),
    )));
    registry.register(Box::new(Bond::new(
        strategy.params_for("bond"),
        Arc::clone(&catalog),
    )));
    registry.register(Box::new(CrossPlatformArb::new(
        strategy.params_for("cross_platform"),
        Arc::clone(&catalog),
        Arc::clone(quotes),
        config.kalshi_market_map(),
    )));
    registry.register(Box::new(TemporalOverlap::new(
        strategy.params_for("temporal_overlap"),
        catalog,
    )));
    registry
}

fn arb_strategies(config: &AppConfig) -> Vec<Arc<dyn ArbStrategy>> {
    let arb = &config.arbitrage;
    let strategy_config = ArbStrategyConfig {
        fee_bps: arb.per_venue_fee_bps,
        slippage_bps: arb.max_slippage_bps,
        latency_bps: arb.latency_bps,
        min_spread_bps: arb.min_spread_bps,
        min_top_size_units: (arb.min_top_size * config.strategy.size_scale as f64) as i64,
        imbalance_ratio: arb.imbalance_ratio,
        max_trade_amount: arb.max_trade_amount,
    };
    let registry = ArbStrategyRegistry::new();
    registry.register(Arc::new(SpreadStrategy::new(strategy_config.clone())));
    registry.register(Arc::new(ImbalanceStrategy::new(strategy_config)));
    registry.register(Arc::new(YesNoSpreadStrategy));
    registry.all()
}

#[allow(clippy::too_many_lines)]
async fn run(config: AppConfig) -> Result<()> {
    let mode = config.bot.mode;
    let runs_feed = !matches!(mode, BotMode::Server);
    let runs_engine = matches!(mode, BotMode::Trade | BotMode::Full);
    let runs_detector = matches!(mode, BotMode::Arbitrage | BotMode::Full);
    let runs_executor = config.strategy.auto_execute
        && matches!(mode, BotMode::Trade | BotMode::Arbitrage | BotMode::Full);

    if runs_executor && !config.bot.dry_run {
        anyhow::bail!(
            "live order routing is not configured in this build; set bot.dry_run = true"
        );
    }

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let metrics = Arc::new(BotMetrics::new()?);
    let backend = build_backend(&config).await?;
    let quotes = Arc::new(VenueQuoteCache::new(Duration::from_secs(30)));
    let mut tasks: Vec<(&'static str, JoinHandle<Result<()>>)> = Vec::new();

    // A mode that places orders holds a lease so a second instance
    // cannot double-trade the same markets.
    let trader_lease = if runs_executor {
        let lease = backend
            .locks
            .acquire(&format!("trader:{}", config.bot.name), TRADER_LEASE_TTL)
            .await
            .context("another instance holds the trader lease")?;
        info!(key = lease.key(), "trader lease acquired");
        Some(lease)
    } else {
        None
    };

    // Strategy engine + egress channel.
    let registry = register_strategies(&config, &quotes);
    let (engine, egress_rx) = StrategyEngine::new(registry, Arc::clone(&metrics), EGRESS_BUFFER);
    if runs_engine {
        if let Some(name) = &config.strategy.name {
            engine.set_active(name).await?;
        } else {
            engine.set_active_names(&config.strategy.active).await?;
        }
        info!(active = ?engine.active_names().await, "strategy engine configured");
    }

    // Executor.
    let pnl = SharedPnl::new();
    if runs_executor {
        let placer: Arc<dyn OrderPlacer> = {
            let paper = Arc::new(PaperTrader::new());
            Arc::new(RateLimitedPlacer::new(
                paper,
                Arc::clone(&backend.limiter),
                u64::from(config.rate_limits.max_orders_per_minute),
                Duration::from_secs(60),
            ))
        };
        let replacer: Option<Arc<dyn ReplaceOrderer>> = Some(Arc::new(PaperTrader::new()));
        let risk = Arc::new(DefaultRiskChecker::new(
            (config.strategy.size * config.strategy.size_scale as f64 * 100.0) as i64,
            config.strategy.max_positions,
            config.arbitrage.kill_switch_loss_usd,
            pnl.clone(),
        ));
        let arb_service = Arc::new(DefaultArbService::new(
            Arc::clone(&backend.bus),
            Arc::clone(&metrics),
            ArbGates {
                min_net_edge_bps: config.arbitrage.min_net_edge_bps,
                max_trade_amount: config.arbitrage.max_trade_amount,
                min_duration: Duration::from_millis(config.arbitrage.min_duration_ms),
                dedup_window: Duration::from_secs(30),
            },
        ));
        let store = Arc::new(
            JsonlArbExecutionStore::new(&config.persistence.data_dir)
                .await
                .context("failed to open execution store")?,
        );

        let executor = Executor::new(
            ExecutorDeps {
                orders: placer,
                replacer,
                risk,
                arb: arb_service,
                store,
                metrics: Arc::clone(&metrics),
                pnl: pnl.clone(),
                shutdown_tx: shutdown_tx.clone(),
            },
            ExecutorConfig {
                wallet: if config.bot.wallet_address.is_empty() {
                    // Paper runs still need an identity for risk checks.
                    "paper".to_string()
                } else {
                    config.bot.wallet_address.clone()
                },
                max_leg_gap: Duration::from_millis(config.arbitrage.max_leg_gap_ms),
                ..ExecutorConfig::default()
            },
        );
        tasks.push((
            "executor",
            tokio::spawn(async move { executor.run(egress_rx).await }),
        ));
    } else {
        // Without an executor the egress receiver is dropped and
        // emitted signals only land in the recent-signals ring.
        drop(egress_rx);
    }

    // Arb detector.
    if runs_detector {
        let arb_service = Arc::new(DefaultArbService::new(
            Arc::clone(&backend.bus),
            Arc::clone(&metrics),
            ArbGates {
                min_net_edge_bps: config.arbitrage.min_net_edge_bps,
                max_trade_amount: config.arbitrage.max_trade_amount,
                min_duration: Duration::from_millis(config.arbitrage.min_duration_ms),
                dedup_window: Duration::from_secs(30),
            },
        ));
        let detector = ArbDetector::new(
            Arc::clone(&backend.bus),
            Arc::clone(&backend.cache),
            arb_strategies(&config),
            arb_service,
            runs_executor.then(|| engine.signal_sender()),
            Arc::clone(&metrics),
        );
        let detector_shutdown = shutdown_tx.subscribe();
        tasks.push((
            "arb_detector",
            tokio::spawn(async move { detector.run(detector_shutdown).await }),
        ));
    }

    // Feed + book service.
    let health = Arc::new(HealthState::new());
    if runs_feed {
        let feed =
            Arc::new(PolymarketFeed::new(&config.feed).with_metrics(Arc::clone(&metrics)));
        let book_service = Arc::new(BookService::new(
            Arc::clone(&backend.cache),
            Arc::clone(&backend.bus),
            runs_engine.then(|| Arc::clone(&engine)),
            Duration::from_secs(60),
            Arc::clone(&metrics),
        ));
        feed.register_handler(book_service as Arc<dyn FeedHandler>);

        let token_ids = config.active_token_ids();
        if token_ids.is_empty() {
            warn!("no active markets configured, feed will idle");
        } else {
            feed.subscribe(&token_ids)?;
        }

        health.feed_healthy.store(false, std::sync::atomic::Ordering::Relaxed);
        let connected = feed.connected_flag();
        let feed_health = Arc::clone(&health);
        let mut health_shutdown = shutdown_tx.subscribe();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_secs(1));
            loop {
                tokio::select! {
                    _ = health_shutdown.recv() => break,
                    _ = tick.tick() => {
                        let up = connected.load(std::sync::atomic::Ordering::Relaxed);
                        feed_health
                            .feed_healthy
                            .store(up, std::sync::atomic::Ordering::Relaxed);
                    }
                }
            }
        });

        let feed_shutdown = shutdown_tx.subscribe();
        tasks.push((
            "feed",
            tokio::spawn(async move { feed.run(feed_shutdown).await }),
        ));
    }

    // Metrics + health servers.
    if config.metrics.enabled {
        let metrics_server = Arc::clone(&metrics);
        let bind_address = config.metrics.bind_address.clone();
        let metrics_shutdown = shutdown_tx.subscribe();
        tasks.push((
            "metrics",
            tokio::spawn(async move { metrics_server.serve(bind_address, metrics_shutdown).await }),
        ));

        let health_server = HealthServer::new(Arc::clone(&health), config.metrics.health_port);
        let health_shutdown = shutdown_tx.subscribe();
        tasks.push((
            "health",
            tokio::spawn(async move { health_server.run(health_shutdown).await }),
        ));
    }

    info!(mode = ?mode, tasks = tasks.len(), "Bot is ready");

    // Wait for shutdown signal (Ctrl+C or SIGTERM)
    match signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received, initiating graceful shutdown..."),
        Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
    }

    let _ = shutdown_tx.send(());
    engine.shutdown().await;

    for (name, task) in tasks {
        match tokio::time::timeout(SHUTDOWN_GRACE, task).await {
            Ok(Ok(Ok(()))) => info!(task = name, "task finished"),
            Ok(Ok(Err(e))) => {
                if e.downcast_ref::<domain::error::BotError>()
                    == Some(&domain::error::BotError::Cancelled)
                {
                    info!(task = name, "task cancelled");
                } else {
                    warn!(task = name, error = %e, "task exited with error");
                }
            }
            Ok(Err(e)) => error!(task = name, error = %e, "task panicked"),
            Err(_) => warn!(task = name, "task did not stop within grace period"),
        }
    }

    if let Some(lease) = trader_lease {
        if let Err(e) = lease.release().await {
            warn!(error = %e, "trader lease release failed");
        }
    }

    info!(
        version = VERSION,
        realized_pnl_usd = pnl.get(),
        "Bot shutdown complete. Goodbye!"
    );
    Ok(())
}
