//! Arbitrage Ports - Opportunity Gates and Execution Persistence
//!
//! The detector calls `evaluate` before `record`; the executor calls
//! `compute_realized_pnl` while assembling an execution record and
//! persists it exactly once through `ArbExecutionStore`.

use async_trait::async_trait;

use crate::domain::arb::{ArbExecution, ArbOpportunity};

/// Trait for arbitrage opportunity evaluation and recording.
#[async_trait]
pub trait ArbService: Send + Sync + 'static {
  /// Apply gross/net edge gates and duplicate suppression.
  ///
  /// Returns whether the opportunity should be recorded and acted on.
  async fn evaluate(&self, opp: &ArbOpportunity) -> anyhow::Result<bool>;

  /// Record an accepted opportunity (bus + durable stream).
  async fn record(&self, opp: &ArbOpportunity) -> anyhow::Result<()>;

  /// Realized P&L of an execution from its leg fills, USD.
  fn compute_realized_pnl(&self, exec: &ArbExecution) -> f64;
}

/// Trait for persisting completed arbitrage executions.
#[async_trait]
pub trait ArbExecutionStore: Send + Sync + 'static {
  /// Persist one execution record; called exactly once per execution.
  async fn create(&self, exec: &ArbExecution) -> anyhow::Result<()>;
}
