//! Arbitrage Domain Types - Opportunities and Executions
//!
//! An `ArbOpportunity` is a detector's claim that edge exists right
//! now; an `ArbExecution` is the audit record of acting on one, with
//! per-leg fills, slippage, and realized P&L.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::orderbook::{ticks_to_f64, Side};

/// Arbitrage flavor, carried through signals into execution records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArbType {
    /// Condition-group YES prices deviating from summing to 1.
    Rebalancing,
    /// Implied-vs-actual price across related market groups.
    Combinatorial,
    /// Same event priced differently across venues.
    CrossPlatform,
}

impl std::fmt::Display for ArbType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rebalancing => write!(f, "rebalancing"),
            Self::Combinatorial => write!(f, "combinatorial"),
            Self::CrossPlatform => write!(f, "cross_platform"),
        }
    }
}

impl std::str::FromStr for ArbType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rebalancing" => Ok(Self::Rebalancing),
            "combinatorial" => Ok(Self::Combinatorial),
            "cross_platform" => Ok(Self::CrossPlatform),
            other => Err(format!("unknown arb type: {other}")),
        }
    }
}

/// Which way the cross-venue trade goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArbDirection {
    /// Buy the Polymarket leg, sell the Kalshi leg.
    BuyPolySellKalshi,
    /// Sell the Polymarket leg, buy the Kalshi leg.
    SellPolyBuyKalshi,
}

/// A detected arbitrage opportunity, costed in basis points.
///
/// Invariant: `net_edge_bps = gross_edge_bps - est_fee_bps -
/// est_slippage_bps - est_latency_bps`; only positive net edge is
/// worth recording.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArbOpportunity {
    /// Opportunity identifier.
    pub id: String,
    /// Polymarket market id.
    pub poly_market_id: String,
    /// Polymarket outcome token.
    pub poly_token_id: String,
    /// Polymarket reference price.
    pub poly_price: f64,
    /// Kalshi market id, when cross-venue.
    pub kalshi_market_id: String,
    /// Kalshi reference price, when cross-venue.
    pub kalshi_price: f64,
    /// Raw edge before costs.
    pub gross_edge_bps: f64,
    /// Estimated fee cost.
    pub est_fee_bps: f64,
    /// Estimated slippage cost.
    pub est_slippage_bps: f64,
    /// Estimated latency cost.
    pub est_latency_bps: f64,
    /// Edge after all estimated costs.
    pub net_edge_bps: f64,
    /// Trade direction.
    pub direction: ArbDirection,
    /// Maximum notional to deploy, USD.
    pub max_amount: f64,
    /// Expected profit at `max_amount`.
    pub expected_pnl_usd: f64,
    /// Detection time.
    pub detected_at: DateTime<Utc>,
    /// How long the pricing has persisted, milliseconds.
    pub duration_ms: u64,
    /// Whether an execution was attempted.
    pub executed: bool,
}

impl ArbOpportunity {
    /// Apply the cost model: net = gross - fee - slippage - latency.
    pub fn with_costs(mut self, fee_bps: f64, slippage_bps: f64, latency_bps: f64) -> Self {
        self.est_fee_bps = fee_bps;
        self.est_slippage_bps = slippage_bps;
        self.est_latency_bps = latency_bps;
        self.net_edge_bps = self.gross_edge_bps - fee_bps - slippage_bps - latency_bps;
        self.expected_pnl_usd = self.max_amount * self.net_edge_bps / 10_000.0;
        self
    }

    /// Whether the opportunity survives its own cost model.
    pub fn is_viable(&self) -> bool {
        self.net_edge_bps > 0.0
    }
}

/// Fill status of a single leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LegStatus {
    Pending,
    Filled,
    Failed,
    Skipped,
}

/// One placed (or skipped) leg of an arbitrage execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArbLeg {
    /// Venue order id, empty if never placed.
    pub order_id: String,
    /// Market traded.
    pub market_id: String,
    /// Outcome token traded.
    pub token_id: String,
    /// Buy or sell.
    pub side: Side,
    /// Price the signal asked for, ticks.
    pub expected_price_ticks: i64,
    /// Price actually filled, ticks (zero when unfilled).
    pub filled_price_ticks: i64,
    /// Size in units.
    pub size_units: i64,
    /// Fees charged on this leg, USD.
    pub fee_usd: f64,
    /// `(filled - expected) / expected * 10_000`.
    pub slippage_bps: f64,
    /// Outcome of this leg.
    pub status: LegStatus,
}

impl ArbLeg {
    /// Slippage of a fill against its expected price, in bps.
    pub fn slippage(expected_ticks: i64, filled_ticks: i64) -> f64 {
        if expected_ticks == 0 {
            return 0.0;
        }
        (filled_ticks - expected_ticks) as f64 / expected_ticks as f64 * 10_000.0
    }

    /// Signed cash flow of this leg in USD: negative when buying,
    /// positive when selling. Unfilled legs contribute nothing.
    pub fn cash_flow_usd(&self) -> f64 {
        if self.status != LegStatus::Filled {
            return 0.0;
        }
        let notional = ticks_to_f64(self.filled_price_ticks) * ticks_to_f64(self.size_units);
        let signed = match self.side {
            Side::Buy => -notional,
            Side::Sell => notional,
        };
        signed - self.fee_usd
    }
}

/// Execution lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Pending,
    Partial,
    Filled,
    Cancelled,
    Failed,
}

/// Audit record of one multi-leg arbitrage execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArbExecution {
    /// Execution identifier.
    pub id: String,
    /// Opportunity that triggered it, when known.
    pub opportunity_id: String,
    /// Arbitrage flavor.
    pub arb_type: ArbType,
    /// Leg group the executor assembled.
    pub leg_group_id: String,
    /// Legs in placement order.
    pub legs: Vec<ArbLeg>,
    /// Edge claimed at detection, bps.
    pub gross_edge_bps: f64,
    /// Sum of leg fees, USD.
    pub total_fees: f64,
    /// Sum of leg slippage, bps.
    pub total_slippage: f64,
    /// Realized profit and loss, USD.
    pub net_pnl_usd: f64,
    /// Overall outcome.
    pub status: ExecutionStatus,
    /// When placement began.
    pub started_at: DateTime<Utc>,
    /// When the last leg settled, if the execution finished.
    pub completed_at: Option<DateTime<Utc>>,
}

impl ArbExecution {
    /// Start a new execution record for a leg group.
    pub fn begin(arb_type: ArbType, opportunity_id: &str, leg_group_id: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            opportunity_id: opportunity_id.to_string(),
            arb_type,
            leg_group_id: leg_group_id.to_string(),
            legs: Vec::new(),
            gross_edge_bps: 0.0,
            total_fees: 0.0,
            total_slippage: 0.0,
            net_pnl_usd: 0.0,
            status: ExecutionStatus::Pending,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Roll up leg totals and derive the overall status.
    pub fn finalize(&mut self) {
        self.total_fees = self.legs.iter().map(|l| l.fee_usd).sum();
        self.total_slippage = self
            .legs
            .iter()
            .filter(|l| l.status == LegStatus::Filled)
            .map(|l| l.slippage_bps)
            .sum();
        let filled = self
            .legs
            .iter()
            .filter(|l| l.status == LegStatus::Filled)
            .count();
        self.status = if filled == self.legs.len() && filled > 0 {
            ExecutionStatus::Filled
        } else if filled > 0 {
            ExecutionStatus::Partial
        } else {
            ExecutionStatus::Failed
        };
        self.completed_at = Some(Utc::now());
    }
}
