//! Strategy Engine - Event Fan-out and Signal Egress
//!
//! Two operating modes:
//! - **Single-active**: one strategy handles every event inline on the
//!   dispatching task.
//! - **Multi-active**: each strategy gets its own task fed by three
//!   bounded channels (book / price change / trade). Fan-out never
//!   blocks: a full channel drops the event for that strategy only.
//!
//! Every emitted signal goes to the shared egress channel in per-
//! strategy order and into a bounded ring of recent signals for
//! introspection (newest first, copied on read).

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::adapters::metrics::BotMetrics;
use crate::domain::orderbook::{OrderbookSnapshot, PriceChange, TradeEvent};
use crate::domain::signal::TradeSignal;

use super::registry::{SharedStrategy, StrategyRegistry};

/// Per-strategy event channel depth in multi-active mode.
const STRATEGY_CHANNEL_BUFFER: usize = 32;

/// Default capacity of the recent-signals ring.
pub const DEFAULT_RING_CAPACITY: usize = 500;

type SignalRing = Arc<Mutex<VecDeque<TradeSignal>>>;

struct Worker {
  name: String,
  book_tx: mpsc::Sender<OrderbookSnapshot>,
  change_tx: mpsc::Sender<PriceChange>,
  trade_tx: mpsc::Sender<TradeEvent>,
  handle: JoinHandle<()>,
}

enum EngineMode {
  Idle,
  Single {
    name: String,
    strategy: SharedStrategy,
  },
  Multi {
    workers: Vec<Worker>,
  },
}

/// Strategy engine owning the signal egress channel.
pub struct StrategyEngine {
  registry: Arc<StrategyRegistry>,
  egress_tx: mpsc::Sender<TradeSignal>,
  ring: SignalRing,
  ring_capacity: usize,
  mode: tokio::sync::RwLock<EngineMode>,
  metrics: Arc<BotMetrics>,
}

impl StrategyEngine {
  /// Create an engine plus the receiving end of its egress channel.
  pub fn new(
    registry: Arc<StrategyRegistry>,
    metrics: Arc<BotMetrics>,
    egress_buffer: usize,
  ) -> (Arc<Self>, mpsc::Receiver<TradeSignal>) {
    let (egress_tx, egress_rx) = mpsc::channel(egress_buffer);
    let engine = Arc::new(Self {
      registry,
      egress_tx,
      ring: Arc::new(Mutex::new(VecDeque::with_capacity(DEFAULT_RING_CAPACITY))),
      ring_capacity: DEFAULT_RING_CAPACITY,
      mode: tokio::sync::RwLock::new(EngineMode::Idle),
      metrics,
    });
    (engine, egress_rx)
  }

  /// A sender into the egress channel, for producers outside the
  /// engine (the arb detector feeds converted opportunities here).
  pub fn signal_sender(&self) -> mpsc::Sender<TradeSignal> {
    self.egress_tx.clone()
  }

  /// Activate exactly one strategy, dispatched inline.
  pub async fn set_active(&self, name: &str) -> anyhow::Result<()> {
    let strategy = self.registry.get(name)?;
    let mut mode = self.mode.write().await;
    teardown(&mut mode).await;
    *mode = EngineMode::Single {
      name: name.to_string(),
      strategy,
    };
    info!(strategy = name, "single-active strategy set");
    Ok(())
  }

  /// Activate several strategies, each on its own worker task.
  ///
  /// Every name is validated against the registry before anything is
  /// torn down, so a bad name leaves the engine unchanged.
  pub async fn set_active_names(&self, names: &[String]) -> anyhow::Result<()> {
    let mut resolved = Vec::with_capacity(names.len());
    for name in names {
      resolved.push((name.clone(), self.registry.get(name)?));
    }

    let mut mode = self.mode.write().await;
    teardown(&mut mode).await;
    let workers = resolved
      .into_iter()
      .map(|(name, strategy)| self.spawn_worker(name, strategy))
      .collect();
    *mode = EngineMode::Multi { workers };
    info!(strategies = names.len(), "multi-active strategies set");
    Ok(())
  }

  /// Name of the single active strategy, `None` in multi mode or idle.
  pub async fn active_name(&self) -> Option<String> {
    match &*self.mode.read().await {
      EngineMode::Single { name, .. } => Some(name.clone()),
      _ => None,
    }
  }

  /// All currently active strategy names.
  pub async fn active_names(&self) -> Vec<String> {
    match &*self.mode.read().await {
      EngineMode::Idle => Vec::new(),
      EngineMode::Single { name, .. } => vec![name.clone()],
      EngineMode::Multi { workers } => workers.iter().map(|w| w.name.clone()).collect(),
    }
  }

  /// All registered strategy names (sorted).
  pub fn list_names(&self) -> Vec<String> {
    self.registry.list()
  }

  /// Up to `limit` recent signals, newest first, copied out.
  pub fn recent_signals(&self, limit: usize) -> Vec<TradeSignal> {
    let ring = self.ring.lock();
    ring.iter().rev().take(limit).cloned().collect()
  }

  /// Deactivate everything, closing strategies and worker channels.
  pub async fn shutdown(&self) {
    let mut mode = self.mode.write().await;
    teardown(&mut mode).await;
  }

  /// Dispatch a book snapshot to the active strategy set.
  pub async fn on_book_update(&self, snapshot: &OrderbookSnapshot) {
    let mode = self.mode.read().await;
    match &*mode {
      EngineMode::Idle => {}
      EngineMode::Single { name, strategy } => {
        let result = strategy.lock().await.on_book_update(snapshot).await;
        self.finish_inline(name, result).await;
      }
      EngineMode::Multi { workers } => {
        for worker in workers {
          if worker.book_tx.try_send(snapshot.clone()).is_err() {
            self.note_fanout_drop(&worker.name);
          }
        }
      }
    }
  }

  /// Dispatch a level change to the active strategy set.
  pub async fn on_price_change(&self, change: &PriceChange) {
    let mode = self.mode.read().await;
    match &*mode {
      EngineMode::Idle => {}
      EngineMode::Single { name, strategy } => {
        let result = strategy.lock().await.on_price_change(change).await;
        self.finish_inline(name, result).await;
      }
      EngineMode::Multi { workers } => {
        for worker in workers {
          if worker.change_tx.try_send(change.clone()).is_err() {
            self.note_fanout_drop(&worker.name);
          }
        }
      }
    }
  }

  /// Dispatch a trade print to the active strategy set.
  pub async fn on_trade(&self, trade: &TradeEvent) {
    let mode = self.mode.read().await;
    match &*mode {
      EngineMode::Idle => {}
      EngineMode::Single { name, strategy } => {
        let result = strategy.lock().await.on_trade(trade).await;
        self.finish_inline(name, result).await;
      }
      EngineMode::Multi { workers } => {
        for worker in workers {
          if worker.trade_tx.try_send(trade.clone()).is_err() {
            self.note_fanout_drop(&worker.name);
          }
        }
      }
    }
  }

  async fn finish_inline(
    &self,
    name: &str,
    result: anyhow::Result<Vec<TradeSignal>>,
  ) {
    match result {
      Ok(signals) => {
        forward_signals(
          signals,
          &self.egress_tx,
          &self.ring,
          self.ring_capacity,
          &self.metrics,
        )
        .await;
      }
      Err(e) => warn!(strategy = name, error = %e, "strategy handler failed"),
    }
  }

  fn note_fanout_drop(&self, strategy: &str) {
    self
      .metrics
      .fanout_dropped
      .with_label_values(&[strategy])
      .inc();
    debug!(strategy, "strategy channel full, event dropped");
  }

  fn spawn_worker(&self, name: String, strategy: SharedStrategy) -> Worker {
    let (book_tx, mut book_rx) = mpsc::channel::<OrderbookSnapshot>(STRATEGY_CHANNEL_BUFFER);
    let (change_tx, mut change_rx) = mpsc::channel::<PriceChange>(STRATEGY_CHANNEL_BUFFER);
    let (trade_tx, mut trade_rx) = mpsc::channel::<TradeEvent>(STRATEGY_CHANNEL_BUFFER);

    let egress = self.egress_tx.clone();
    let ring = Arc::clone(&self.ring);
    let ring_capacity = self.ring_capacity;
    let metrics = Arc::clone(&self.metrics);
    let task_name = name.clone();

    let handle = tokio::spawn(async move {
      loop {
        let result = tokio::select! {
          maybe = book_rx.recv() => match maybe {
            Some(snapshot) => strategy.lock().await.on_book_update(&snapshot).await,
            None => break,
          },
          maybe = change_rx.recv() => match maybe {
            Some(change) => strategy.lock().await.on_price_change(&change).await,
            None => break,
          },
          maybe = trade_rx.recv() => match maybe {
            Some(trade) => strategy.lock().await.on_trade(&trade).await,
            None => break,
          },
        };
        match result {
          Ok(signals) => {
            let open =
              forward_signals(signals, &egress, &ring, ring_capacity, &metrics).await;
            if !open {
              break;
            }
          }
          Err(e) => warn!(strategy = %task_name, error = %e, "strategy handler failed"),
        }
      }
      if let Err(e) = strategy.lock().await.close() {
        warn!(strategy = %task_name, error = %e, "strategy close failed");
      }
      debug!(strategy = %task_name, "worker task stopped");
    });

    Worker {
      name,
      book_tx,
      change_tx,
      trade_tx,
      handle,
    }
  }
}

/// Push signals to the ring and egress channel in order.
///
/// Returns `false` once the egress receiver is gone, which is the
/// engine-wide cancellation signal.
async fn forward_signals(
  signals: Vec<TradeSignal>,
  egress: &mpsc::Sender<TradeSignal>,
  ring: &SignalRing,
  ring_capacity: usize,
  metrics: &BotMetrics,
) -> bool {
  for signal in signals {
    {
      let mut ring = ring.lock();
      if ring.len() == ring_capacity {
        ring.pop_front();
      }
      ring.push_back(signal.clone());
    }
    metrics
      .signals_emitted
      .with_label_values(&[signal.source.as_str()])
      .inc();
    if egress.send(signal).await.is_err() {
      return false;
    }
  }
  true
}

async fn teardown(mode: &mut EngineMode) {
  match std::mem::replace(mode, EngineMode::Idle) {
    EngineMode::Idle => {}
    EngineMode::Single { name, strategy } => {
      if let Err(e) = strategy.lock().await.close() {
        warn!(strategy = %name, error = %e, "strategy close failed");
      }
    }
    EngineMode::Multi { workers } => {
      let mut handles = Vec::with_capacity(workers.len());
      for worker in workers {
        // Dropping the senders lets the task drain and exit.
        let Worker {
          handle,
          book_tx,
          change_tx,
          trade_tx,
          ..
        } = worker;
        drop(book_tx);
        drop(change_tx);
        drop(trade_tx);
        handles.push(handle);
      }
      for handle in handles {
        let _ = handle.await;
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use async_trait::async_trait;
  use chrono::Utc;

  use crate::domain::orderbook::{to_ticks, Side};
  use crate::domain::signal::Urgency;
  use crate::usecases::strategy::Strategy;

  struct Echo {
    name: String,
  }

  #[async_trait]
  impl Strategy for Echo {
    fn name(&self) -> &str {
      &self.name
    }

    async fn on_price_change(
      &mut self,
      change: &PriceChange,
    ) -> anyhow::Result<Vec<TradeSignal>> {
      Ok(vec![TradeSignal::new(
        self.name.clone(),
        "m1",
        change.asset_id.clone(),
        Side::Buy,
        change.price_ticks,
        1_000_000,
        Urgency::Low,
        "echo",
        chrono::Duration::seconds(30),
      )])
    }
  }

  fn change(price: f64) -> PriceChange {
    PriceChange {
      asset_id: "t1".to_string(),
      side: Side::Buy,
      price_ticks: to_ticks(price),
      size_units: 1_000_000,
      timestamp: Utc::now(),
    }
  }

  fn setup(names: &[&str]) -> (Arc<StrategyEngine>, mpsc::Receiver<TradeSignal>) {
    let registry = Arc::new(StrategyRegistry::new());
    for name in names {
      registry.register(Box::new(Echo {
        name: (*name).to_string(),
      }));
    }
    let metrics = Arc::new(BotMetrics::new().unwrap());
    StrategyEngine::new(registry, metrics, 64)
  }

  #[tokio::test]
  async fn test_single_active_dispatch_reaches_egress_and_ring() {
    let (engine, mut egress) = setup(&["echo"]);
    engine.set_active("echo").await.unwrap();

    engine.on_price_change(&change(0.40)).await;

    let signal = egress.recv().await.unwrap();
    assert_eq!(signal.source, "echo");
    assert_eq!(signal.price_ticks, to_ticks(0.40));

    let recent = engine.recent_signals(10);
    assert_eq!(recent.len(), 1);
    assert_eq!(engine.active_name().await.as_deref(), Some("echo"));
  }

  #[tokio::test]
  async fn test_multi_active_fans_out_to_all_strategies() {
    let (engine, mut egress) = setup(&["one", "two"]);
    engine
      .set_active_names(&["one".to_string(), "two".to_string()])
      .await
      .unwrap();

    engine.on_price_change(&change(0.50)).await;

    let mut sources = vec![
      egress.recv().await.unwrap().source,
      egress.recv().await.unwrap().source,
    ];
    sources.sort();
    assert_eq!(sources, vec!["one", "two"]);
    assert_eq!(engine.active_names().await.len(), 2);

    engine.shutdown().await;
  }

  #[tokio::test]
  async fn test_set_active_names_rejects_unknown_and_keeps_state() {
    let (engine, mut egress) = setup(&["good"]);
    engine.set_active("good").await.unwrap();

    let err = engine
      .set_active_names(&["good".to_string(), "ghost".to_string()])
      .await
      .unwrap_err();
    assert!(err.to_string().contains("ghost"));

    // The previous single-active strategy still runs.
    engine.on_price_change(&change(0.60)).await;
    assert_eq!(egress.recv().await.unwrap().source, "good");
  }

  #[tokio::test]
  async fn test_recent_signals_newest_first_with_limit() {
    let (engine, mut egress) = setup(&["echo"]);
    engine.set_active("echo").await.unwrap();

    for price in [0.40, 0.41, 0.42] {
      engine.on_price_change(&change(price)).await;
      let _ = egress.recv().await.unwrap();
    }

    let recent = engine.recent_signals(2);
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].price_ticks, to_ticks(0.42));
    assert_eq!(recent[1].price_ticks, to_ticks(0.41));
  }
}
