//! Leg Group Accumulator - Buffer Multi-Leg Signals Until Complete
//!
//! Signals sharing a `leg_group_id` are buffered until the tagged
//! `leg_count` arrive, then the whole group is sent down the completed
//! channel exactly once, legs in arrival order. A max-gap timer runs
//! between consecutive legs; if it fires first the group is discarded
//! with a warning and nothing executes (`best_effort` groups included:
//! an incomplete bundle is treated as a failed bundle, not a smaller
//! one).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::adapters::metrics::BotMetrics;
use crate::domain::signal::{LegPolicy, TradeSignal};

/// A fully assembled leg group ready for execution.
#[derive(Debug)]
pub struct CompletedLegGroup {
  pub group_id: String,
  pub legs: Vec<TradeSignal>,
  pub policy: LegPolicy,
}

struct PendingGroup {
  legs: Vec<TradeSignal>,
  expected: usize,
  policy: LegPolicy,
  /// Bumped on every arrival; lets a stale gap timer recognize that a
  /// newer leg already rearmed the clock.
  generation: u64,
}

type GroupMap = Arc<Mutex<HashMap<String, PendingGroup>>>;

/// Buffers grouped signals and emits complete groups.
pub struct LegGroupAccumulator {
  max_gap: Duration,
  groups: GroupMap,
  completed_tx: mpsc::UnboundedSender<CompletedLegGroup>,
  metrics: Option<Arc<BotMetrics>>,
}

impl LegGroupAccumulator {
  /// `max_gap` bounds the wait between consecutive legs (default
  /// behavior is configured from `arbitrage.max_leg_gap_ms`).
  pub fn new(max_gap: Duration) -> (Self, mpsc::UnboundedReceiver<CompletedLegGroup>) {
    let (completed_tx, completed_rx) = mpsc::unbounded_channel();
    (
      Self {
        max_gap,
        groups: Arc::new(Mutex::new(HashMap::new())),
        completed_tx,
        metrics: None,
      },
      completed_rx,
    )
  }

  /// Count timed-out groups on the given registry.
  #[must_use]
  pub fn with_metrics(mut self, metrics: Arc<BotMetrics>) -> Self {
    self.metrics = Some(metrics);
    self
  }

  /// Feed one signal. Returns true when the signal was absorbed into
  /// a group and must not be executed as a single leg.
  pub fn add(&self, signal: TradeSignal) -> bool {
    let Some(group_id) = signal.leg_group_id().map(str::to_string) else {
      return false;
    };
    let expected = signal.leg_count().unwrap_or(1).max(1);
    let policy = signal.leg_policy();

    let generation;
    {
      let mut groups = self.groups.lock();
      let group = groups.entry(group_id.clone()).or_insert_with(|| PendingGroup {
        legs: Vec::with_capacity(expected),
        expected,
        policy,
        generation: 0,
      });
      group.legs.push(signal);
      group.generation += 1;
      generation = group.generation;

      if group.legs.len() >= group.expected {
        if let Some(group) = groups.remove(&group_id) {
          debug!(group_id = %group_id, legs = group.legs.len(), "leg group complete");
          let _ = self.completed_tx.send(CompletedLegGroup {
            group_id,
            legs: group.legs,
            policy: group.policy,
          });
        }
        return true;
      }
    }

    self.arm_gap_timer(group_id, generation);
    true
  }

  /// Number of groups still assembling (diagnostics).
  pub fn pending_groups(&self) -> usize {
    self.groups.lock().len()
  }

  fn arm_gap_timer(&self, group_id: String, generation: u64) {
    let groups = Arc::clone(&self.groups);
    let max_gap = self.max_gap;
    let metrics = self.metrics.clone();
    tokio::spawn(async move {
      tokio::time::sleep(max_gap).await;
      let mut groups = groups.lock();
      let timed_out = groups
        .get(&group_id)
        .is_some_and(|g| g.generation == generation);
      if timed_out {
        if let Some(group) = groups.remove(&group_id) {
          warn!(
            group_id = %group_id,
            received = group.legs.len(),
            expected = group.expected,
            policy = %group.policy,
            "leg group timed out, discarding"
          );
          if let Some(metrics) = &metrics {
            metrics.leg_groups_timed_out.inc();
          }
        }
      }
    });
  }
}
