//! Strategy Registry - Name to Strategy Lookup
//!
//! Insertion-replacement map guarded for concurrent reads and writes.
//! Entries are shared handles: the registry keeps one for lookup and
//! listing while the engine's worker task holds another for event
//! dispatch. The per-strategy mutex is what upholds the single-owner
//! invocation contract.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::domain::error::BotError;

use super::Strategy;

/// Shared, exclusively-lockable strategy handle.
pub type SharedStrategy = Arc<tokio::sync::Mutex<Box<dyn Strategy>>>;

/// Concurrent name -> strategy map.
#[derive(Default)]
pub struct StrategyRegistry {
  inner: RwLock<HashMap<String, SharedStrategy>>,
}

impl StrategyRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a strategy under its own name, replacing any previous
  /// entry with that name.
  pub fn register(&self, strategy: Box<dyn Strategy>) {
    let name = strategy.name().to_string();
    let handle: SharedStrategy = Arc::new(tokio::sync::Mutex::new(strategy));
    self.inner.write().insert(name, handle);
  }

  /// Look up a strategy, failing with `NotFound` for unknown names.
  pub fn get(&self, name: &str) -> anyhow::Result<SharedStrategy> {
    self
      .inner
      .read()
      .get(name)
      .cloned()
      .ok_or_else(|| BotError::NotFound(format!("strategy:{name}")).into())
  }

  /// Registered names, lexicographically sorted.
  pub fn list(&self) -> Vec<String> {
    let mut names: Vec<String> = self.inner.read().keys().cloned().collect();
    names.sort_unstable();
    names
  }
}
