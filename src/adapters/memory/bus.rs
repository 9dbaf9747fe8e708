//! In-Memory Signal Bus - Pub/Sub and Bounded Streams
//!
//! Pub/sub fans out over per-subscriber channels; a slow subscriber
//! with a full buffer misses messages rather than stalling the
//! publisher (at-most-once, same as the Redis backend). Streams are
//! bounded deques trimmed from the oldest end.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::ports::bus::{is_pattern, SignalBus, StreamEntry, Subscription, STREAM_MAXLEN};

const SUBSCRIBER_BUFFER: usize = 1024;

struct MemorySubscriber {
    channel: String,
    pattern: bool,
    tx: mpsc::Sender<String>,
}

struct MemoryStream {
    next_seq: u64,
    entries: VecDeque<StreamEntry>,
}

/// Process-local signal bus.
#[derive(Default)]
pub struct MemoryBus {
    subscribers: Mutex<Vec<MemorySubscriber>>,
    streams: Mutex<HashMap<String, MemoryStream>>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SignalBus for MemoryBus {
    async fn publish(&self, channel: &str, payload: &str) -> anyhow::Result<()> {
        let mut subs = self.subscribers.lock();
        subs.retain(|s| !s.tx.is_closed());
        for sub in subs.iter() {
            let matched = if sub.pattern {
                glob_match(&sub.channel, channel)
            } else {
                sub.channel == channel
            };
            if matched {
                // Full buffer means the subscriber loses this message.
                let _ = sub.tx.try_send(payload.to_string());
            }
        }
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> anyhow::Result<Subscription> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        self.subscribers.lock().push(MemorySubscriber {
            channel: channel.to_string(),
            pattern: is_pattern(channel),
            tx,
        });
        Ok(Subscription::new(rx, None))
    }

    async fn stream_append(&self, stream: &str, payload: &str) -> anyhow::Result<String> {
        let mut streams = self.streams.lock();
        let entry = streams.entry(stream.to_string()).or_insert(MemoryStream {
            next_seq: 1,
            entries: VecDeque::new(),
        });
        let id = format!("{}-0", entry.next_seq);
        entry.next_seq += 1;
        entry.entries.push_back(StreamEntry {
            id: id.clone(),
            payload: payload.to_string(),
        });
        while entry.entries.len() > STREAM_MAXLEN {
            entry.entries.pop_front();
        }
        Ok(id)
    }

    async fn stream_read(
        &self,
        stream: &str,
        last_id: &str,
        count: usize,
    ) -> anyhow::Result<Vec<StreamEntry>> {
        let streams = self.streams.lock();
        let Some(mem) = streams.get(stream) else {
            return Ok(Vec::new());
        };
        let after = parse_seq(last_id);
        Ok(mem
            .entries
            .iter()
            .filter(|e| parse_seq(&e.id) > after)
            .take(count)
            .cloned()
            .collect())
    }
}

fn parse_seq(id: &str) -> u64 {
    id.split('-')
        .next()
        .and_then(|s| s.parse().ok())
        .unwrap_or(0)
}

/// Redis-style glob match: `*` any run, `?` any char, `[...]` classes
/// with `^`/`!` negation and `a-z` ranges.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;

    while ti < t.len() {
        let step = if pi < p.len() {
            match p[pi] {
                '*' => {
                    star = Some((pi, ti));
                    pi += 1;
                    continue;
                }
                '?' => {
                    pi += 1;
                    ti += 1;
                    true
                }
                '[' => match match_class(&p, pi, t[ti]) {
                    Some((true, next)) => {
                        pi = next;
                        ti += 1;
                        true
                    }
                    _ => false,
                },
                c if c == t[ti] => {
                    pi += 1;
                    ti += 1;
                    true
                }
                _ => false,
            }
        } else {
            false
        };

        if !step {
            match star {
                Some((sp, st)) => {
                    pi = sp + 1;
                    ti = st + 1;
                    star = Some((sp, st + 1));
                }
                None => return false,
            }
        }
    }

    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

/// Match one character against the class starting at `p[start] == '['`.
/// Returns (matched, index just past the closing bracket).
fn match_class(p: &[char], start: usize, c: char) -> Option<(bool, usize)> {
    let mut i = start + 1;
    let negate = matches!(p.get(i), Some('^') | Some('!'));
    if negate {
        i += 1;
    }
    let mut matched = false;
    let mut first = true;
    while i < p.len() {
        // ']' as the first class member is a literal.
        if p[i] == ']' && !first {
            return Some((matched != negate, i + 1));
        }
        first = false;
        if i + 2 < p.len() && p[i + 1] == '-' && p[i + 2] != ']' {
            if p[i] <= c && c <= p[i + 2] {
                matched = true;
            }
            i += 3;
        } else {
            if p[i] == c {
                matched = true;
            }
            i += 1;
        }
    }
    None
}
