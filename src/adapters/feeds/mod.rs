//! Market Data Feed Adapters - Real-time Price Streaming
//!
//! Provides the Polymarket CLOB WebSocket feed (auto-reconnect,
//! subscription replay) and the cross-venue quote cache consumed by
//! the cross-platform strategy.

pub mod polymarket_ws;
pub mod venue_quotes;

pub use polymarket_ws::PolymarketFeed;
pub use venue_quotes::{VenueQuote, VenueQuoteCache};
