//! Trade Signals - Strategy Output Contract
//!
//! A `TradeSignal` is the single currency between strategies and the
//! executor: every strategy emits them, the executor consumes them.
//! Multi-leg intent rides in the metadata map under well-known keys so
//! the signal itself stays flat and serializable.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::orderbook::Side;

/// Metadata key: leg group membership.
pub const META_LEG_GROUP_ID: &str = "leg_group_id";
/// Metadata key: expected number of legs in the group.
pub const META_LEG_COUNT: &str = "leg_count";
/// Metadata key: group execution policy.
pub const META_LEG_POLICY: &str = "leg_policy";
/// Metadata key: arbitrage flavor for execution records.
pub const META_ARB_TYPE: &str = "arb_type";
/// Metadata key: originating opportunity id.
pub const META_OPP_ID: &str = "opp_id";

/// How urgently the executor should treat a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Low,
    Medium,
    High,
    Immediate,
}

/// Execution policy for a leg group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegPolicy {
    /// Stop on the first failed leg; partial groups are a failure.
    AllOrNone,
    /// Place every leg regardless of individual failures.
    BestEffort,
    /// Place legs strictly one after another.
    Sequential,
}

impl std::str::FromStr for LegPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all_or_none" => Ok(Self::AllOrNone),
            "best_effort" => Ok(Self::BestEffort),
            "sequential" => Ok(Self::Sequential),
            other => Err(format!("unknown leg policy: {other}")),
        }
    }
}

impl std::fmt::Display for LegPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AllOrNone => write!(f, "all_or_none"),
            Self::BestEffort => write!(f, "best_effort"),
            Self::Sequential => write!(f, "sequential"),
        }
    }
}

/// An actionable trade emitted by a strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeSignal {
    /// Unique id; the executor dedups on it.
    pub id: String,
    /// Emitting strategy name.
    pub source: String,
    /// Market the order targets.
    pub market_id: String,
    /// Outcome token to trade.
    pub token_id: String,
    /// Buy or sell.
    pub side: Side,
    /// Limit price in ticks (1e6 scale).
    pub price_ticks: i64,
    /// Order size in units (1e6 scale).
    pub size_units: i64,
    /// Scheduling hint for the executor.
    pub urgency: Urgency,
    /// Human-readable rationale for logs and the dashboard.
    pub reason: String,
    /// Free-form annotations; leg grouping uses the `META_*` keys.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// Emission time.
    pub created_at: DateTime<Utc>,
    /// Hard expiry; the executor drops the signal past this instant.
    pub expires_at: Option<DateTime<Utc>>,
}

impl TradeSignal {
    /// Create a signal with a fresh id and the given time-to-live.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: impl Into<String>,
        market_id: impl Into<String>,
        token_id: impl Into<String>,
        side: Side,
        price_ticks: i64,
        size_units: i64,
        urgency: Urgency,
        reason: impl Into<String>,
        ttl: chrono::Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            source: source.into(),
            market_id: market_id.into(),
            token_id: token_id.into(),
            side,
            price_ticks,
            size_units,
            urgency,
            reason: reason.into(),
            metadata: HashMap::new(),
            created_at: now,
            expires_at: Some(now + ttl),
        }
    }

    /// Attach a metadata entry, builder style.
    #[must_use]
    pub fn with_meta(mut self, key: &str, value: impl Into<String>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Tag this signal as one leg of a group.
    #[must_use]
    pub fn with_leg_group(self, group_id: &str, count: usize, policy: LegPolicy) -> Self {
        self.with_meta(META_LEG_GROUP_ID, group_id)
            .with_meta(META_LEG_COUNT, count.to_string())
            .with_meta(META_LEG_POLICY, policy.to_string())
    }

    /// Whether the signal has expired as of `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }

    /// Leg group id, when this signal is part of a bundle.
    pub fn leg_group_id(&self) -> Option<&str> {
        self.metadata.get(META_LEG_GROUP_ID).map(String::as_str)
    }

    /// Expected leg count for the group, when tagged and parseable.
    pub fn leg_count(&self) -> Option<usize> {
        self.metadata.get(META_LEG_COUNT)?.parse().ok()
    }

    /// Group policy; defaults to `AllOrNone` when absent or malformed.
    pub fn leg_policy(&self) -> LegPolicy {
        self.metadata
            .get(META_LEG_POLICY)
            .and_then(|s| s.parse().ok())
            .unwrap_or(LegPolicy::AllOrNone)
    }
}
