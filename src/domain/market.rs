//! Market Catalog - Binary Prediction Market Metadata
//!
//! A `Market` describes one binary Polymarket market: two outcomes,
//! two outcome tokens, one condition. The `MarketCatalog` indexes the
//! configured markets for the lookups strategies need: token -> market,
//! condition groups for rebalancing, and paired markets for temporal
//! overlap detection.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketStatus {
    /// Open for trading.
    Active,
    /// Trading halted, awaiting resolution.
    Closed,
    /// Resolved and redeemable.
    Settled,
}

/// A binary Polymarket prediction market.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    /// Market identifier (Gamma market id).
    pub id: String,
    /// Market question (e.g., "Will BTC be above $50,000 at 16:05 UTC?")
    pub question: String,
    /// URL slug.
    pub slug: String,
    /// Outcome labels, YES first.
    pub outcomes: [String; 2],
    /// Outcome token IDs, YES first.
    pub token_ids: [String; 2],
    /// CTF condition ID.
    pub condition_id: String,
    /// Whether the market belongs to a negative-risk event.
    pub neg_risk: bool,
    /// Lifetime traded volume in USDC.
    pub volume: f64,
    /// Current lifecycle status.
    pub status: MarketStatus,
    /// When the market was first seen.
    pub created_at: DateTime<Utc>,
    /// Last metadata refresh.
    pub updated_at: DateTime<Utc>,
    /// Scheduled resolution time, when known.
    pub end_date: Option<DateTime<Utc>>,
}

impl Market {
    /// Token ID of the YES outcome.
    pub fn yes_token(&self) -> &str {
        &self.token_ids[0]
    }

    /// Token ID of the NO outcome.
    pub fn no_token(&self) -> &str {
        &self.token_ids[1]
    }
}

/// Indexed view over the configured markets.
///
/// Built once at startup; strategies hold it behind an `Arc` and only
/// read, so no locking is needed.
#[derive(Debug, Default)]
pub struct MarketCatalog {
    markets: Vec<Market>,
    by_id: HashMap<String, usize>,
    by_token: HashMap<String, usize>,
    /// Condition groups: group name -> market ids whose YES prices should sum to 1.
    groups: HashMap<String, Vec<String>>,
    /// Temporal pairs: market id -> the related market id at another horizon.
    pairs: HashMap<String, String>,
}

impl MarketCatalog {
    /// Build a catalog from markets plus group/pair assignments.
    pub fn new(
        markets: Vec<Market>,
        groups: HashMap<String, Vec<String>>,
        pairs: HashMap<String, String>,
    ) -> Self {
        let mut by_id = HashMap::new();
        let mut by_token = HashMap::new();
        for (i, m) in markets.iter().enumerate() {
            by_id.insert(m.id.clone(), i);
            for tid in &m.token_ids {
                by_token.insert(tid.clone(), i);
            }
        }
        Self {
            markets,
            by_id,
            by_token,
            groups,
            pairs,
        }
    }

    /// Look up a market by its id.
    pub fn market(&self, id: &str) -> Option<&Market> {
        self.by_id.get(id).map(|&i| &self.markets[i])
    }

    /// Look up the market owning an outcome token.
    pub fn market_for_token(&self, token_id: &str) -> Option<&Market> {
        self.by_token.get(token_id).map(|&i| &self.markets[i])
    }

    /// All configured markets.
    pub fn markets(&self) -> &[Market] {
        &self.markets
    }

    /// Markets belonging to a condition group, in declaration order.
    pub fn group(&self, name: &str) -> Vec<&Market> {
        self.groups
            .get(name)
            .map(|ids| ids.iter().filter_map(|id| self.market(id)).collect())
            .unwrap_or_default()
    }

    /// Names of the configured condition groups.
    pub fn group_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.groups.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// The market temporally paired with `id`, if any.
    pub fn paired_market(&self, id: &str) -> Option<&Market> {
        self.pairs.get(id).and_then(|pid| self.market(pid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn market(id: &str, yes: &str, no: &str) -> Market {
        Market {
            id: id.to_string(),
            question: format!("{id}?"),
            slug: id.to_string(),
            outcomes: ["Yes".to_string(), "No".to_string()],
            token_ids: [yes.to_string(), no.to_string()],
            condition_id: format!("cond-{id}"),
            neg_risk: false,
            volume: 0.0,
            status: MarketStatus::Active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            end_date: None,
        }
    }

    #[test]
    fn test_token_lookup_finds_owner() {
        let catalog = MarketCatalog::new(
            vec![market("m1", "ty", "tn")],
            HashMap::new(),
            HashMap::new(),
        );
        assert_eq!(catalog.market_for_token("tn").unwrap().id, "m1");
        assert!(catalog.market_for_token("unknown").is_none());
    }

    #[test]
    fn test_group_preserves_declaration_order() {
        let mut groups = HashMap::new();
        groups.insert("g".to_string(), vec!["m2".to_string(), "m1".to_string()]);
        let catalog = MarketCatalog::new(
            vec![market("m1", "a", "b"), market("m2", "c", "d")],
            groups,
            HashMap::new(),
        );
        let ids: Vec<_> = catalog.group("g").iter().map(|m| m.id.clone()).collect();
        assert_eq!(ids, vec!["m2", "m1"]);
    }
}
