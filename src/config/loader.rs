//! Configuration Loader - File Loading and Validation
//!
//! Handles loading `config.toml`, applying environment overrides,
//! validating all parameters, and providing clear error messages for
//! misconfiguration. Validation failures are fatal at startup.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use super::{AppConfig, BotMode};

/// Load and validate configuration from a TOML file.
///
/// Environment overrides applied after parsing:
/// `REDIS_URL`, `WS_URL`, `WALLET_ADDRESS`.
///
/// # Errors
/// Returns detailed error if:
/// - File doesn't exist or can't be read
/// - TOML parsing fails
/// - Validation rules are violated
pub fn load_config(path: &str) -> Result<AppConfig> {
  let path = Path::new(path);

  let content = std::fs::read_to_string(path)
    .with_context(|| format!("Failed to read config file: {}", path.display()))?;

  let mut config: AppConfig =
    toml::from_str(&content).with_context(|| "Failed to parse config.toml")?;

  apply_env_overrides(&mut config);
  validate_config(&config)?;

  info!(
    mode = ?config.bot.mode,
    markets = config.markets.len(),
    dry_run = config.bot.dry_run,
    "Configuration loaded successfully"
  );

  Ok(config)
}

fn apply_env_overrides(config: &mut AppConfig) {
  if let Ok(url) = std::env::var("REDIS_URL") {
    config.redis.url = url;
  }
  if let Ok(url) = std::env::var("WS_URL") {
    config.feed.ws_url = url;
  }
  if let Ok(wallet) = std::env::var("WALLET_ADDRESS") {
    config.bot.wallet_address = wallet;
  }
}

/// Validate all configuration parameters.
///
/// Checks for:
/// - Supported operating mode
/// - Complete market token mappings
/// - Positive sizes, scales and windows
/// - Strategy selection consistent with the mode
fn validate_config(config: &AppConfig) -> Result<()> {
  anyhow::ensure!(
    config.bot.mode != BotMode::Backtest,
    "backtest mode is not supported by this build"
  );

  for (i, market) in config.markets.iter().enumerate() {
    anyhow::ensure!(
      !market.id.is_empty(),
      "Market {} has an empty id",
      i
    );
    anyhow::ensure!(
      !market.yes_token_id.is_empty(),
      "Market {} ({}) has empty yes_token_id",
      i,
      market.id
    );
    anyhow::ensure!(
      !market.no_token_id.is_empty(),
      "Market {} ({}) has empty no_token_id",
      i,
      market.id
    );
    anyhow::ensure!(
      market.yes_token_id != market.no_token_id,
      "Market {} ({}) maps both outcomes to one token",
      i,
      market.id
    );
  }

  anyhow::ensure!(
    config.strategy.size > 0.0,
    "strategy.size must be positive, got {}",
    config.strategy.size
  );
  anyhow::ensure!(
    config.strategy.price_scale > 0 && config.strategy.size_scale > 0,
    "price/size scales must be positive"
  );
  anyhow::ensure!(
    config.strategy.max_positions > 0,
    "strategy.max_positions must be positive"
  );
  anyhow::ensure!(
    !(config.strategy.name.is_some() && !config.strategy.active.is_empty()),
    "strategy.name and strategy.active are mutually exclusive"
  );
  if matches!(config.bot.mode, BotMode::Trade | BotMode::Full) {
    anyhow::ensure!(
      config.strategy.name.is_some() || !config.strategy.active.is_empty(),
      "mode {:?} requires strategy.name or strategy.active",
      config.bot.mode
    );
  }

  anyhow::ensure!(
    config.arbitrage.max_leg_gap_ms > 0,
    "arbitrage.max_leg_gap_ms must be positive"
  );
  anyhow::ensure!(
    config.arbitrage.min_net_edge_bps >= 0.0
      && config.arbitrage.per_venue_fee_bps >= 0.0
      && config.arbitrage.max_slippage_bps >= 0.0,
    "arbitrage bps thresholds must be non-negative"
  );
  anyhow::ensure!(
    config.arbitrage.max_trade_amount > 0.0,
    "arbitrage.max_trade_amount must be positive"
  );

  anyhow::ensure!(
    config.rate_limits.max_orders_per_minute > 0
      && config.rate_limits.max_orders_per_minute <= 50,
    "rate_limits.max_orders_per_minute must be in (0, 50], got {}",
    config.rate_limits.max_orders_per_minute
  );

  anyhow::ensure!(!config.feed.ws_url.is_empty(), "feed.ws_url must not be empty");
  anyhow::ensure!(
    config.feed.read_timeout_secs > 0,
    "feed.read_timeout_secs must be positive"
  );
  anyhow::ensure!(
    config.feed.reconnect_base_secs > 0
      && config.feed.reconnect_cap_secs >= config.feed.reconnect_base_secs,
    "feed reconnect backoff must satisfy 0 < base <= cap"
  );
  anyhow::ensure!(!config.redis.url.is_empty(), "redis.url must not be empty");

  if !config.bot.dry_run && matches!(config.bot.mode, BotMode::Trade | BotMode::Full) {
    anyhow::ensure!(
      !config.bot.wallet_address.is_empty(),
      "live trading requires bot.wallet_address"
    );
  }

  Ok(())
}
