//! Signal Bus Port - Pub/Sub and Durable Streams
//!
//! Two delivery models behind one trait:
//! - `publish`/`subscribe`: ephemeral fan-out, at-most-once, no replay.
//!   Channels containing `*`, `?` or `[` are glob patterns.
//! - `stream_append`/`stream_read`: durable, at-least-once, bounded to
//!   roughly [`STREAM_MAXLEN`] entries with the oldest trimmed first.
//!
//! Dropping a [`Subscription`] closes the backing subscription; the
//! consumer side never has to unsubscribe explicitly.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Approximate upper bound on durable stream length.
pub const STREAM_MAXLEN: usize = 10_000;

/// Topic carrying book/price summaries for downstream consumers.
pub const TOPIC_PRICES: &str = "prices";

/// Topic carrying accepted arbitrage opportunities.
pub const TOPIC_ARB: &str = "arb";

/// Durable stream of last-trade prints.
pub const STREAM_TRADES: &str = "trades";

/// Durable stream of recorded arbitrage opportunities.
pub const STREAM_ARB: &str = "arb";

/// One durable stream entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEntry {
  /// Backend-assigned, monotonically increasing id.
  pub id: String,
  /// Opaque payload as appended.
  pub payload: String,
}

/// Live subscription handle yielding published payloads.
///
/// The sequence ends when the bus shuts down or the subscription is
/// dropped. A forwarding task, when one exists, is aborted on drop.
pub struct Subscription {
  rx: mpsc::Receiver<String>,
  forwarder: Option<JoinHandle<()>>,
}

impl Subscription {
  /// Wrap a payload receiver, optionally owning its forwarding task.
  pub fn new(rx: mpsc::Receiver<String>, forwarder: Option<JoinHandle<()>>) -> Self {
    Self { rx, forwarder }
  }

  /// Receive the next payload; `None` once the subscription is closed.
  pub async fn recv(&mut self) -> Option<String> {
    self.rx.recv().await
  }
}

impl Drop for Subscription {
  fn drop(&mut self) {
    if let Some(handle) = self.forwarder.take() {
      handle.abort();
    }
  }
}

/// Whether a channel name is a glob pattern (Redis glob syntax).
pub fn is_pattern(channel: &str) -> bool {
  channel.contains(['*', '?', '['])
}

/// Trait for the process-wide signal bus.
#[async_trait]
pub trait SignalBus: Send + Sync + 'static {
  /// Deliver `payload` to all current subscribers of `channel`.
  ///
  /// Fire-and-forget: absent subscribers simply miss the message.
  async fn publish(&self, channel: &str, payload: &str) -> anyhow::Result<()>;

  /// Subscribe to a channel or glob pattern.
  async fn subscribe(&self, channel: &str) -> anyhow::Result<Subscription>;

  /// Durably append to a bounded stream, returning the assigned id.
  async fn stream_append(&self, stream: &str, payload: &str) -> anyhow::Result<String>;

  /// Read up to `count` entries strictly after `last_id`.
  ///
  /// Pass an empty `last_id` to read from the beginning. An empty
  /// result is not an error.
  async fn stream_read(
    &self,
    stream: &str,
    last_id: &str,
    count: usize,
  ) -> anyhow::Result<Vec<StreamEntry>>;
}
