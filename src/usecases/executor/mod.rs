//! Executor - Risk-Checked Signal-to-Order Pipeline
//!
//! Reads the engine's egress channel and, per signal, in order:
//! leg-group diversion, dedup, expiry, pre-trade risk, placement.
//! `liquidity_provider` signals with a previous resting order go
//! through cancel-and-replace; a `should_retry` placement gets exactly
//! one retry after a short pause. Completed leg groups are placed leg
//! by leg (stopping at the first failure for `all_or_none`), rolled up
//! into an `ArbExecution` with realized P&L, and persisted once.
//!
//! On shutdown, signals already in the channel are drained with a
//! bounded per-signal budget before the loop returns `Cancelled`.

pub mod dedup;
pub mod leg_group;

pub use dedup::DedupFilter;
pub use leg_group::{CompletedLegGroup, LegGroupAccumulator};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, instrument, warn};

use crate::adapters::metrics::BotMetrics;
use crate::domain::arb::{ArbExecution, ArbLeg, ArbType, LegStatus};
use crate::domain::error::BotError;
use crate::domain::orderbook::Side;
use crate::domain::signal::{LegPolicy, TradeSignal, META_ARB_TYPE, META_OPP_ID};
use crate::ports::arb::{ArbExecutionStore, ArbService};
use crate::ports::execution::{OrderPlacer, OrderResult, ReplaceOrderer, RiskChecker};
use crate::usecases::risk::SharedPnl;
use crate::usecases::strategy::liquidity_provider;

/// Executor timing and identity knobs.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
  /// Wallet the risk checker validates against.
  pub wallet: String,
  /// Dedup window for signal ids.
  pub dedup_ttl: Duration,
  /// How often expired dedup entries are collected.
  pub dedup_gc_interval: Duration,
  /// Pause before the single placement retry.
  pub retry_delay: Duration,
  /// Max gap between legs of one group.
  pub max_leg_gap: Duration,
  /// Per-signal budget while draining at shutdown.
  pub drain_timeout: Duration,
}

impl Default for ExecutorConfig {
  fn default() -> Self {
    Self {
      wallet: String::new(),
      dedup_ttl: Duration::from_secs(120),
      dedup_gc_interval: Duration::from_secs(60),
      retry_delay: Duration::from_millis(500),
      max_leg_gap: Duration::from_secs(2),
      drain_timeout: Duration::from_secs(5),
    }
  }
}

/// Collaborators the executor calls into.
pub struct ExecutorDeps {
  pub orders: Arc<dyn OrderPlacer>,
  pub replacer: Option<Arc<dyn ReplaceOrderer>>,
  pub risk: Arc<dyn RiskChecker>,
  pub arb: Arc<dyn ArbService>,
  pub store: Arc<dyn ArbExecutionStore>,
  pub metrics: Arc<BotMetrics>,
  pub pnl: SharedPnl,
  pub shutdown_tx: broadcast::Sender<()>,
}

/// The signal-to-order pipeline.
pub struct Executor {
  deps: ExecutorDeps,
  config: ExecutorConfig,
  dedup: DedupFilter,
  accumulator: LegGroupAccumulator,
  completed_rx: Mutex<Option<mpsc::UnboundedReceiver<CompletedLegGroup>>>,
  /// (token, side) -> last resting LP order id.
  lp_orders: Mutex<HashMap<(String, Side), String>>,
}

impl Executor {
  pub fn new(deps: ExecutorDeps, config: ExecutorConfig) -> Self {
    let dedup = DedupFilter::new(config.dedup_ttl);
    let (accumulator, completed_rx) = LegGroupAccumulator::new(config.max_leg_gap);
    let accumulator = accumulator.with_metrics(Arc::clone(&deps.metrics));
    Self {
      deps,
      config,
      dedup,
      accumulator,
      completed_rx: Mutex::new(Some(completed_rx)),
      lp_orders: Mutex::new(HashMap::new()),
    }
  }

  /// Run the read loop until the channel closes or shutdown fires.
  ///
  /// Returns `Cancelled` after a shutdown-triggered drain so the
  /// caller can distinguish cancellation from a closed channel.
  #[instrument(skip_all, name = "executor")]
  pub async fn run(&self, mut signal_rx: mpsc::Receiver<TradeSignal>) -> anyhow::Result<()> {
    let mut completed_rx = self
      .completed_rx
      .lock()
      .take()
      .expect("executor run called twice");
    let mut shutdown_rx = self.deps.shutdown_tx.subscribe();
    let mut gc = tokio::time::interval(self.config.dedup_gc_interval);
    gc.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    info!("executor started");
    loop {
      tokio::select! {
        biased;
        _ = shutdown_rx.recv() => {
          self.drain(&mut signal_rx, &mut completed_rx).await;
          return Err(BotError::Cancelled.into());
        }
        Some(group) = completed_rx.recv() => {
          self.execute_leg_group(group).await;
        }
        _ = gc.tick() => {
          self.dedup.cleanup();
        }
        maybe = signal_rx.recv() => match maybe {
          Some(signal) => self.process_signal(signal).await,
          None => {
            info!("signal channel closed, executor stopping");
            return Ok(());
          }
        }
      }
    }
  }

  /// The per-signal pipeline; grouped signals divert to the
  /// accumulator before any other step.
  async fn process_signal(&self, signal: TradeSignal) {
    if signal.leg_group_id().is_some() && self.accumulator.add(signal.clone()) {
      return;
    }
    self.place_single(signal).await;
  }

  async fn place_single(&self, signal: TradeSignal) {
    if self.dedup.is_duplicate(&signal.id) {
      self.drop_signal(&signal, "duplicate");
      return;
    }
    if signal.is_expired(Utc::now()) {
      warn!(id = %signal.id, source = %signal.source, "dropping expired signal");
      self.drop_signal(&signal, "expired");
      return;
    }
    if let Err(e) = self
      .deps
      .risk
      .pre_trade_check(&signal, &self.config.wallet)
      .await
    {
      warn!(id = %signal.id, error = %e, "risk check rejected signal");
      self.drop_signal(&signal, "risk");
      return;
    }

    match self.place_or_replace(&signal).await {
      Ok(result) if result.success => self.note_placed(&signal, &result),
      Ok(result) if result.should_retry => {
        self.deps.metrics.order_retries.inc();
        debug!(id = %signal.id, "placement asked for retry");
        if !self.retry_pause().await {
          return;
        }
        if signal.is_expired(Utc::now()) {
          warn!(id = %signal.id, "signal expired during retry pause");
          self.drop_signal(&signal, "expired");
          return;
        }
        match self.place_or_replace(&signal).await {
          Ok(result) if result.success => self.note_placed(&signal, &result),
          Ok(result) => self.note_rejected(&signal, &result),
          Err(e) => self.note_error(&signal, &e),
        }
      }
      Ok(result) => self.note_rejected(&signal, &result),
      Err(e) => self.note_error(&signal, &e),
    }
  }

  async fn place_or_replace(&self, signal: &TradeSignal) -> anyhow::Result<OrderResult> {
    if signal.source == liquidity_provider::NAME {
      if let Some(replacer) = &self.deps.replacer {
        let key = (signal.token_id.clone(), signal.side);
        let previous = self.lp_orders.lock().get(&key).cloned();
        if let Some(previous_id) = previous {
          return replacer.replace_order(&previous_id, signal).await;
        }
      }
    }
    self.deps.orders.place_order(signal).await
  }

  fn note_placed(&self, signal: &TradeSignal, result: &OrderResult) {
    info!(
      id = %signal.id,
      order_id = %result.order_id,
      token = %signal.token_id,
      side = %signal.side,
      source = %signal.source,
      "order placed"
    );
    self
      .deps
      .metrics
      .orders_placed
      .with_label_values(&["accepted"])
      .inc();
    if signal.source == liquidity_provider::NAME {
      self
        .lp_orders
        .lock()
        .insert((signal.token_id.clone(), signal.side), result.order_id.clone());
    }
  }

  fn note_rejected(&self, signal: &TradeSignal, result: &OrderResult) {
    warn!(
      id = %signal.id,
      status = %result.status,
      message = %result.message,
      "order rejected"
    );
    self
      .deps
      .metrics
      .orders_placed
      .with_label_values(&["rejected"])
      .inc();
  }

  fn note_error(&self, signal: &TradeSignal, error: &anyhow::Error) {
    warn!(id = %signal.id, error = %error, "order placement failed");
    self
      .deps
      .metrics
      .orders_placed
      .with_label_values(&["error"])
      .inc();
  }

  fn drop_signal(&self, signal: &TradeSignal, reason: &str) {
    debug!(id = %signal.id, reason, "signal dropped");
    self
      .deps
      .metrics
      .signals_dropped
      .with_label_values(&[reason])
      .inc();
  }

  /// Sleep before the retry; false when shutdown interrupted it.
  async fn retry_pause(&self) -> bool {
    let mut shutdown_rx = self.deps.shutdown_tx.subscribe();
    tokio::select! {
      _ = shutdown_rx.recv() => false,
      () = tokio::time::sleep(self.config.retry_delay) => true,
    }
  }

  /// Place a completed leg group, record the execution once.
  async fn execute_leg_group(&self, group: CompletedLegGroup) {
    let arb_type = group
      .legs
      .first()
      .and_then(|l| l.metadata.get(META_ARB_TYPE))
      .and_then(|s| s.parse::<ArbType>().ok())
      .unwrap_or(ArbType::Rebalancing);
    let opportunity_id = group
      .legs
      .first()
      .and_then(|l| l.metadata.get(META_OPP_ID))
      .cloned()
      .unwrap_or_default();

    let mut exec = ArbExecution::begin(arb_type, &opportunity_id, &group.group_id);
    let mut failed = false;

    for leg_signal in &group.legs {
      if failed && group.policy == LegPolicy::AllOrNone {
        exec.legs.push(skipped_leg(leg_signal));
        continue;
      }
      match self.deps.orders.place_order(leg_signal).await {
        Ok(result) if result.success => {
          let filled = if result.filled_price_ticks > 0 {
            result.filled_price_ticks
          } else {
            leg_signal.price_ticks
          };
          exec.legs.push(ArbLeg {
            order_id: result.order_id,
            market_id: leg_signal.market_id.clone(),
            token_id: leg_signal.token_id.clone(),
            side: leg_signal.side,
            expected_price_ticks: leg_signal.price_ticks,
            filled_price_ticks: filled,
            size_units: leg_signal.size_units,
            fee_usd: result.fee_usd,
            slippage_bps: ArbLeg::slippage(leg_signal.price_ticks, filled),
            status: LegStatus::Filled,
          });
        }
        Ok(result) => {
          warn!(
            group_id = %group.group_id,
            token = %leg_signal.token_id,
            message = %result.message,
            "leg placement rejected"
          );
          exec.legs.push(failed_leg(leg_signal));
          failed = true;
        }
        Err(e) => {
          warn!(
            group_id = %group.group_id,
            token = %leg_signal.token_id,
            error = %e,
            "leg placement failed"
          );
          exec.legs.push(failed_leg(leg_signal));
          failed = true;
        }
      }
    }

    exec.finalize();
    exec.net_pnl_usd = self.deps.arb.compute_realized_pnl(&exec);
    self.deps.pnl.add(exec.net_pnl_usd);
    self.deps.metrics.realized_pnl.set(self.deps.pnl.get());
    self.deps.metrics.leg_groups_completed.inc();
    info!(
      group_id = %group.group_id,
      execution_id = %exec.id,
      status = ?exec.status,
      net_pnl_usd = exec.net_pnl_usd,
      "leg group executed"
    );

    // Store failures are logged, never abort the executor.
    if let Err(e) = self.deps.store.create(&exec).await {
      error!(execution_id = %exec.id, error = %e, "failed to persist execution record");
    }
  }

  /// Process whatever is already queued, bounded per signal.
  async fn drain(
    &self,
    signal_rx: &mut mpsc::Receiver<TradeSignal>,
    completed_rx: &mut mpsc::UnboundedReceiver<CompletedLegGroup>,
  ) {
    info!("shutdown: draining pending signals");
    while let Ok(signal) = signal_rx.try_recv() {
      let work = self.process_signal(signal);
      if tokio::time::timeout(self.config.drain_timeout, work)
        .await
        .is_err()
      {
        warn!("drain: signal processing exceeded budget");
      }
    }
    while let Ok(group) = completed_rx.try_recv() {
      let work = self.execute_leg_group(group);
      if tokio::time::timeout(self.config.drain_timeout, work)
        .await
        .is_err()
      {
        warn!("drain: leg group execution exceeded budget");
      }
    }
  }
}

fn failed_leg(signal: &TradeSignal) -> ArbLeg {
  ArbLeg {
    order_id: String::new(),
    market_id: signal.market_id.clone(),
    token_id: signal.token_id.clone(),
    side: signal.side,
    expected_price_ticks: signal.price_ticks,
    filled_price_ticks: 0,
    size_units: signal.size_units,
    fee_usd: 0.0,
    slippage_bps: 0.0,
    status: LegStatus::Failed,
  }
}

fn skipped_leg(signal: &TradeSignal) -> ArbLeg {
  ArbLeg {
    status: LegStatus::Skipped,
    ..failed_leg(signal)
  }
}
