//! Domain layer - Core business types and models.
//!
//! This module contains the pure domain types for the trading bot.
//! No external dependencies allowed here (hexagonal architecture inner ring).
//! All types are serializable and testable in isolation.

pub mod arb;
pub mod error;
pub mod market;
pub mod orderbook;
pub mod signal;

// Re-export core types for convenience
pub use arb::{
    ArbDirection, ArbExecution, ArbLeg, ArbOpportunity, ArbType, ExecutionStatus, LegStatus,
};
pub use error::BotError;
pub use market::{Market, MarketCatalog, MarketStatus};
pub use orderbook::{
    ticks_to_f64, to_ticks, OrderbookSnapshot, PriceChange, PriceLevel, PriceTopicEvent, Side,
    TradeEvent, PRICE_SCALE, SIZE_SCALE,
};
pub use signal::{LegPolicy, TradeSignal, Urgency};
