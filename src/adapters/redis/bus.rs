//! Redis Signal Bus - PUBLISH/SUBSCRIBE plus Bounded Streams
//!
//! Pub/sub delivery is at-most-once; durable streams are at-least-once
//! with `XADD MAXLEN ~` trimming around [`STREAM_MAXLEN`]. Channel
//! names carrying glob meta-characters subscribe via `PSUBSCRIBE`.

use async_trait::async_trait;
use futures_util::StreamExt;
use redis::aio::ConnectionManager;
use redis::streams::StreamReadReply;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::ports::bus::{is_pattern, SignalBus, StreamEntry, Subscription, STREAM_MAXLEN};

const SUBSCRIBER_BUFFER: usize = 1024;
const PAYLOAD_FIELD: &str = "payload";

/// Redis-backed signal bus.
pub struct RedisBus {
    /// For dedicated pub/sub connections.
    client: redis::Client,
    /// For PUBLISH and stream commands.
    conn: ConnectionManager,
}

impl RedisBus {
    pub fn new(client: redis::Client, conn: ConnectionManager) -> Self {
        Self { client, conn }
    }
}

#[async_trait]
impl SignalBus for RedisBus {
    async fn publish(&self, channel: &str, payload: &str) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        let receivers: i64 = redis::cmd("PUBLISH")
            .arg(channel)
            .arg(payload)
            .query_async(&mut conn)
            .await?;
        debug!(channel, receivers, "published");
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> anyhow::Result<Subscription> {
        let mut pubsub = self.client.get_async_connection().await?.into_pubsub();
        if is_pattern(channel) {
            pubsub.psubscribe(channel).await?;
        } else {
            pubsub.subscribe(channel).await?;
        }

        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let channel_name = channel.to_string();
        let forwarder = tokio::spawn(async move {
            let mut messages = pubsub.on_message();
            while let Some(msg) = messages.next().await {
                let payload: String = match msg.get_payload() {
                    Ok(p) => p,
                    Err(e) => {
                        warn!(channel = %channel_name, error = %e, "undecodable bus payload");
                        continue;
                    }
                };
                if tx.send(payload).await.is_err() {
                    break;
                }
            }
        });

        Ok(Subscription::new(rx, Some(forwarder)))
    }

    async fn stream_append(&self, stream: &str, payload: &str) -> anyhow::Result<String> {
        let mut conn = self.conn.clone();
        let id: String = redis::cmd("XADD")
            .arg(stream)
            .arg("MAXLEN")
            .arg("~")
            .arg(STREAM_MAXLEN)
            .arg("*")
            .arg(PAYLOAD_FIELD)
            .arg(payload)
            .query_async(&mut conn)
            .await?;
        Ok(id)
    }

    async fn stream_read(
        &self,
        stream: &str,
        last_id: &str,
        count: usize,
    ) -> anyhow::Result<Vec<StreamEntry>> {
        let mut conn = self.conn.clone();
        let last = if last_id.is_empty() { "0" } else { last_id };
        let reply: Option<StreamReadReply> = redis::cmd("XREAD")
            .arg("COUNT")
            .arg(count)
            .arg("STREAMS")
            .arg(stream)
            .arg(last)
            .query_async(&mut conn)
            .await?;

        let mut entries = Vec::new();
        if let Some(reply) = reply {
            for key in reply.keys {
                for sid in key.ids {
                    let payload: String = sid.get(PAYLOAD_FIELD).unwrap_or_default();
                    entries.push(StreamEntry {
                        id: sid.id,
                        payload,
                    });
                }
            }
        }
        Ok(entries)
    }
}
