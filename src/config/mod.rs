//! Configuration Module - TOML-based Bot Configuration
//!
//! Loads and validates configuration from `config.toml` with
//! environment variable overrides via `.env` files.
//! All market identifiers and thresholds are externalized
//! here - nothing is hardcoded in the domain layer.

pub mod loader;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::domain::market::{Market, MarketCatalog, MarketStatus};
use crate::usecases::strategy::StrategyParams;

/// Top-level bot configuration.
///
/// Loaded from `config.toml` at startup. All fields are validated
/// before the bot begins operation.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
  /// Bot identity and operating mode.
  pub bot: BotConfig,
  /// Strategy selection and common knobs.
  #[serde(default)]
  pub strategy: StrategyConfig,
  /// Arbitrage gates and cost model.
  #[serde(default)]
  pub arbitrage: ArbitrageConfig,
  /// Shared store connection.
  #[serde(default)]
  pub redis: RedisConfig,
  /// Market data feed connection.
  #[serde(default)]
  pub feed: FeedConfig,
  /// Order placement quotas.
  #[serde(default)]
  pub rate_limits: RateLimitConfig,
  /// Market definitions and token mappings.
  #[serde(default)]
  pub markets: Vec<MarketConfig>,
  /// Metrics and monitoring.
  #[serde(default)]
  pub metrics: MetricsConfig,
  /// Persistence configuration.
  #[serde(default)]
  pub persistence: PersistenceConfig,
}

/// Which long-lived tasks the process starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BotMode {
  /// Feed + engine + executor.
  Trade,
  /// Feed + arb detector + executor.
  Arbitrage,
  /// Feed + cache/bus publishing only.
  Monitor,
  /// Feed + cache only, no bus consumers.
  Scrape,
  /// Rejected at validation; kept so configs fail loudly.
  Backtest,
  /// Metrics/health servers only.
  Server,
  /// Everything.
  Full,
}

/// Bot identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
  /// Human-readable bot name.
  #[serde(default = "default_bot_name")]
  pub name: String,
  /// Operating mode.
  #[serde(default = "default_mode")]
  pub mode: BotMode,
  /// Log level (trace, debug, info, warn, error).
  #[serde(default = "default_log_level")]
  pub log_level: String,
  /// Simulate fills instead of placing real orders.
  #[serde(default = "default_true")]
  pub dry_run: bool,
  /// Wallet address risk checks run against.
  #[serde(default)]
  pub wallet_address: String,
}

/// Strategy selection and shared knobs.
#[derive(Debug, Clone, Deserialize)]
pub struct StrategyConfig {
  /// Single-active strategy name.
  pub name: Option<String>,
  /// Multi-active strategy names.
  #[serde(default)]
  pub active: Vec<String>,
  /// Attach the executor to the egress channel.
  #[serde(default = "default_true")]
  pub auto_execute: bool,
  /// Coin / market family label.
  #[serde(default)]
  pub coin: String,
  /// Default order size in contracts.
  #[serde(default = "default_size")]
  pub size: f64,
  /// Ticks per 1.00 of price.
  #[serde(default = "default_scale")]
  pub price_scale: i64,
  /// Units per contract.
  #[serde(default = "default_scale")]
  pub size_scale: i64,
  /// Maximum simultaneously open positions.
  #[serde(default = "default_max_positions")]
  pub max_positions: usize,
  /// Take-profit fraction.
  #[serde(default)]
  pub take_profit: f64,
  /// Stop-loss fraction.
  #[serde(default)]
  pub stop_loss: f64,
  /// Per-strategy option maps, keyed by strategy name.
  #[serde(default)]
  pub params: HashMap<String, HashMap<String, f64>>,
}

impl Default for StrategyConfig {
  fn default() -> Self {
    Self {
      name: None,
      active: Vec::new(),
      auto_execute: true,
      coin: String::new(),
      size: default_size(),
      price_scale: default_scale(),
      size_scale: default_scale(),
      max_positions: default_max_positions(),
      take_profit: 0.0,
      stop_loss: 0.0,
      params: HashMap::new(),
    }
  }
}

impl StrategyConfig {
  /// Resolve the parameter set a named strategy is constructed with.
  pub fn params_for(&self, strategy_name: &str) -> StrategyParams {
    StrategyParams {
      coin: self.coin.clone(),
      size_units: (self.size * self.size_scale as f64).round() as i64,
      price_scale: self.price_scale,
      size_scale: self.size_scale,
      max_positions: self.max_positions,
      take_profit: self.take_profit,
      stop_loss: self.stop_loss,
      options: self.params.get(strategy_name).cloned().unwrap_or_default(),
    }
  }
}

/// Arbitrage gates and executor leg-gap configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ArbitrageConfig {
  /// Minimum net edge to act on, bps.
  #[serde(default = "default_min_net_edge")]
  pub min_net_edge_bps: f64,
  /// Largest notional per opportunity, USD.
  #[serde(default = "default_max_trade_amount")]
  pub max_trade_amount: f64,
  /// Opportunity persistence requirement, ms.
  #[serde(default)]
  pub min_duration_ms: u64,
  /// Max gap between legs of one group, ms.
  #[serde(default = "default_leg_gap")]
  pub max_leg_gap_ms: u64,
  /// Stop trading once losses reach this, USD.
  #[serde(default = "default_kill_switch")]
  pub kill_switch_loss_usd: f64,
  /// Per-venue fee estimate, bps.
  #[serde(default = "default_fee_bps")]
  pub per_venue_fee_bps: f64,
  /// Slippage estimate, bps.
  #[serde(default = "default_fee_bps")]
  pub max_slippage_bps: f64,
  /// Latency cost estimate, bps.
  #[serde(default = "default_latency_bps")]
  pub latency_bps: f64,
  /// Minimum BBO spread for the spread detector, bps.
  #[serde(default = "default_min_spread")]
  pub min_spread_bps: f64,
  /// Minimum top-of-book size for the spread detector, contracts.
  #[serde(default = "default_min_top_size")]
  pub min_top_size: f64,
  /// Volume ratio the imbalance detector treats as one-sided.
  #[serde(default = "default_imbalance_ratio")]
  pub imbalance_ratio: f64,
}

impl Default for ArbitrageConfig {
  fn default() -> Self {
    Self {
      min_net_edge_bps: default_min_net_edge(),
      max_trade_amount: default_max_trade_amount(),
      min_duration_ms: 0,
      max_leg_gap_ms: default_leg_gap(),
      kill_switch_loss_usd: default_kill_switch(),
      per_venue_fee_bps: default_fee_bps(),
      max_slippage_bps: default_fee_bps(),
      latency_bps: default_latency_bps(),
      min_spread_bps: default_min_spread(),
      min_top_size: default_min_top_size(),
      imbalance_ratio: default_imbalance_ratio(),
    }
  }
}

/// Shared store connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
  /// Connection URL.
  #[serde(default = "default_redis_url")]
  pub url: String,
  /// When false, the in-memory backend replaces Redis (paper runs,
  /// tests, single-process deployments).
  #[serde(default = "default_true")]
  pub enabled: bool,
}

impl Default for RedisConfig {
  fn default() -> Self {
    Self {
      url: default_redis_url(),
      enabled: true,
    }
  }
}

/// Market data feed configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
  /// CLOB market WebSocket URL.
  #[serde(default = "default_ws_url")]
  pub ws_url: String,
  /// Read deadline; pings go out at 9/10 of this.
  #[serde(default = "default_read_timeout")]
  pub read_timeout_secs: u64,
  /// Reconnect backoff base.
  #[serde(default = "default_backoff_base")]
  pub reconnect_base_secs: u64,
  /// Reconnect backoff cap.
  #[serde(default = "default_backoff_cap")]
  pub reconnect_cap_secs: u64,
}

impl Default for FeedConfig {
  fn default() -> Self {
    Self {
      ws_url: default_ws_url(),
      read_timeout_secs: default_read_timeout(),
      reconnect_base_secs: default_backoff_base(),
      reconnect_cap_secs: default_backoff_cap(),
    }
  }
}

/// Individual market configuration.
///
/// Each market maps its Gamma id and condition to the YES/NO token
/// IDs. Identifiers are ALWAYS in config - never hardcoded.
#[derive(Debug, Clone, Deserialize)]
pub struct MarketConfig {
  /// Market identifier.
  pub id: String,
  /// Market question.
  #[serde(default)]
  pub question: String,
  /// URL slug.
  #[serde(default)]
  pub slug: String,
  /// CTF condition ID.
  #[serde(default)]
  pub condition_id: String,
  /// YES outcome token ID.
  pub yes_token_id: String,
  /// NO outcome token ID.
  pub no_token_id: String,
  /// Whether this market is actively traded.
  #[serde(default = "default_true")]
  pub active: bool,
  /// Negative-risk event membership.
  #[serde(default)]
  pub neg_risk: bool,
  /// Lifetime traded volume, USDC.
  #[serde(default)]
  pub volume: f64,
  /// Scheduled resolution time.
  pub end_date: Option<DateTime<Utc>>,
  /// Condition group for rebalancing/combinatorial detection.
  pub group: Option<String>,
  /// Longer-horizon market this one implies (temporal overlap).
  pub pair_with: Option<String>,
  /// Matching Kalshi market for cross-platform detection.
  pub kalshi_market_id: Option<String>,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
  /// Maximum orders per minute (Polymarket limit: 50).
  #[serde(default = "default_max_orders")]
  pub max_orders_per_minute: u32,
}

impl Default for RateLimitConfig {
  fn default() -> Self {
    Self {
      max_orders_per_minute: default_max_orders(),
    }
  }
}

/// Metrics and monitoring configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
  /// Enable Prometheus metrics export.
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Metrics server bind address.
  #[serde(default = "default_metrics_addr")]
  pub bind_address: String,
  /// Health check endpoint port.
  #[serde(default = "default_health_port")]
  pub health_port: u16,
}

impl Default for MetricsConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      bind_address: default_metrics_addr(),
      health_port: default_health_port(),
    }
  }
}

/// Persistence configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
  /// Directory for JSONL execution records.
  #[serde(default = "default_data_dir")]
  pub data_dir: String,
}

impl Default for PersistenceConfig {
  fn default() -> Self {
    Self {
      data_dir: default_data_dir(),
    }
  }
}

impl AppConfig {
  /// Build the immutable market catalog from the configured markets.
  pub fn market_catalog(&self) -> MarketCatalog {
    let now = Utc::now();
    let markets: Vec<Market> = self
      .markets
      .iter()
      .map(|m| Market {
        id: m.id.clone(),
        question: m.question.clone(),
        slug: m.slug.clone(),
        outcomes: ["Yes".to_string(), "No".to_string()],
        token_ids: [m.yes_token_id.clone(), m.no_token_id.clone()],
        condition_id: m.condition_id.clone(),
        neg_risk: m.neg_risk,
        volume: m.volume,
        status: if m.active {
          MarketStatus::Active
        } else {
          MarketStatus::Closed
        },
        created_at: now,
        updated_at: now,
        end_date: m.end_date,
      })
      .collect();

    let mut groups: HashMap<String, Vec<String>> = HashMap::new();
    let mut pairs = HashMap::new();
    for m in &self.markets {
      if let Some(group) = &m.group {
        groups.entry(group.clone()).or_default().push(m.id.clone());
      }
      if let Some(pair) = &m.pair_with {
        pairs.insert(m.id.clone(), pair.clone());
      }
    }
    MarketCatalog::new(markets, groups, pairs)
  }

  /// Polymarket market id -> Kalshi market id, from config.
  pub fn kalshi_market_map(&self) -> HashMap<String, String> {
    self
      .markets
      .iter()
      .filter_map(|m| {
        m.kalshi_market_id
          .as_ref()
          .map(|k| (m.id.clone(), k.clone()))
      })
      .collect()
  }

  /// All outcome token IDs of active markets (feed subscription set).
  pub fn active_token_ids(&self) -> Vec<String> {
    self
      .markets
      .iter()
      .filter(|m| m.active)
      .flat_map(|m| [m.yes_token_id.clone(), m.no_token_id.clone()])
      .collect()
  }
}

// Default value functions for serde

fn default_bot_name() -> String {
  "polymarket-arb-bot".to_string()
}

fn default_mode() -> BotMode {
  BotMode::Monitor
}

fn default_log_level() -> String {
  "info".to_string()
}

fn default_true() -> bool {
  true
}

fn default_size() -> f64 {
  10.0
}

fn default_scale() -> i64 {
  1_000_000
}

fn default_max_positions() -> usize {
  10
}

fn default_min_net_edge() -> f64 {
  20.0
}

fn default_max_trade_amount() -> f64 {
  100.0
}

fn default_leg_gap() -> u64 {
  2_000
}

fn default_kill_switch() -> f64 {
  500.0
}

fn default_fee_bps() -> f64 {
  10.0
}

fn default_latency_bps() -> f64 {
  5.0
}

fn default_min_spread() -> f64 {
  30.0
}

fn default_min_top_size() -> f64 {
  1.0
}

fn default_imbalance_ratio() -> f64 {
  3.0
}

fn default_redis_url() -> String {
  "redis://127.0.0.1:6379".to_string()
}

fn default_ws_url() -> String {
  "wss://ws-subscriptions-clob.polymarket.com/ws/market".to_string()
}

fn default_read_timeout() -> u64 {
  30
}

fn default_backoff_base() -> u64 {
  2
}

fn default_backoff_cap() -> u64 {
  60
}

fn default_max_orders() -> u32 {
  50
}

fn default_metrics_addr() -> String {
  "0.0.0.0:9090".to_string()
}

fn default_health_port() -> u16 {
  8080
}

fn default_data_dir() -> String {
  "data".to_string()
}
