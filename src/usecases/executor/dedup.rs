//! Dedup Filter - TTL'd Set of Recently Seen Signal IDs
//!
//! First sighting of an id records it and reports "not a duplicate";
//! any sighting within the TTL reports "duplicate". Periodic
//! `cleanup` evicts expired entries so the map stays bounded.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Thread-safe TTL'd id set.
pub struct DedupFilter {
  ttl: Duration,
  seen: Mutex<HashMap<String, Instant>>,
}

impl DedupFilter {
  pub fn new(ttl: Duration) -> Self {
    Self {
      ttl,
      seen: Mutex::new(HashMap::new()),
    }
  }

  /// Returns true when `id` was recorded within the TTL; otherwise
  /// records it now and returns false.
  pub fn is_duplicate(&self, id: &str) -> bool {
    let now = Instant::now();
    let mut seen = self.seen.lock();
    match seen.get(id) {
      Some(&at) if now.duration_since(at) < self.ttl => true,
      _ => {
        seen.insert(id.to_string(), now);
        false
      }
    }
  }

  /// Evict entries older than the TTL.
  pub fn cleanup(&self) {
    let now = Instant::now();
    self
      .seen
      .lock()
      .retain(|_, &mut at| now.duration_since(at) < self.ttl);
  }

  /// Number of tracked ids (diagnostics).
  pub fn len(&self) -> usize {
    self.seen.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}
